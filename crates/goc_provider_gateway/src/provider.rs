//! The [`Provider`] trait every concrete vendor module implements, grounded
//! on the teacher's `LlmProvider` trait (`cli/tui/llm/mod.rs`) generalized
//! from a single-vendor chat assistant to a multi-vendor batch/stream
//! generation gateway. Providers are a closed set at compile time (Design
//! Notes §9: "Avoid open-ended registries; new providers are added at
//! compile time") — there is no dynamic plugin registration.

use async_trait::async_trait;
use futures::stream::BoxStream;
use goc_protocol::GocError;

use crate::types::{GenerationChunk, GenerationRequest, GenerationResponse};

#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> goc_protocol::Provider;

    /// Cheapest model this provider serves, used by [`crate::health`]'s
    /// minimal-prompt health check (spec.md §4.2).
    fn cheapest_model(&self) -> &'static str;

    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResponse, GocError>;

    async fn generate_stream(
        &self,
        req: &GenerationRequest,
    ) -> Result<BoxStream<'static, Result<GenerationChunk, GocError>>, GocError>;
}
