//! Scores and orders providers for a job, invokes the fallback chain, and
//! merges ensemble output. Generalizes the teacher's path-pattern confidence
//! scoring (`ai/pathfinder/analyzer.rs`) to provider routing.

pub mod ensemble;
pub mod fallback;
pub mod score;
pub mod weights;

pub use ensemble::{merge_ensemble, EnsembleResult, RowScorer};
pub use fallback::invoke_with_fallback;
pub use score::{rank_providers, ScoredProvider};
pub use weights::ProviderWeights;
