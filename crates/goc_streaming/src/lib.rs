//! The Streaming Pipeline (spec.md §4.4): assembles provider text fragments
//! into rows, runs a reduced row-at-a-time realism pass, and republishes
//! them to a consumer over a bounded, cancellable channel.

pub mod assembler;
pub mod cancel;
pub mod pipeline;
pub mod types;

pub use assembler::RowAssembler;
pub use cancel::CancellationToken;
pub use pipeline::{stream_rows, DEFAULT_BUFFER_CAPACITY};
pub use types::{StreamChunk, TerminalStatus};
