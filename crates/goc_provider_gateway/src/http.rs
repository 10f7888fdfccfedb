//! HTTP-backed [`Provider`], grounded on the teacher's `ClaudeProvider`
//! (`cli/tui/llm/claude.rs`): a `reqwest::Client`, a bearer token, and SSE
//! parsing over a byte stream. Generalized from Anthropic's per-vendor
//! Messages API to the mediated gateway endpoint every vendor shares
//! (spec.md §4.2) — one request/response shape, one `gateway_path` per
//! model rather than one client struct per vendor.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use goc_ids::CorrelationId;
use goc_protocol::{GocError, Provider as ProviderKind};
use reqwest::Client;
use tokio::sync::mpsc;

use crate::provider::Provider;
use crate::types::{GenerationChunk, GenerationRequest, GenerationResponse};

/// Provider backed by a real call to the mediated gateway HTTP endpoint.
/// `base_url` plus the model's `gateway_path` (from [`crate::pricing::model_routes`])
/// form the request URL; the same bearer token authenticates every vendor
/// since the gateway mediates on the caller's behalf.
pub struct HttpProvider {
    client: Client,
    kind: ProviderKind,
    cheapest_model: &'static str,
    base_url: String,
    gateway_path: &'static str,
    bearer_token: String,
}

impl HttpProvider {
    pub fn new(
        kind: ProviderKind,
        cheapest_model: &'static str,
        base_url: impl Into<String>,
        gateway_path: &'static str,
        bearer_token: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            kind,
            cheapest_model,
            base_url: base_url.into(),
            gateway_path,
            bearer_token: bearer_token.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.gateway_path)
    }

    fn correlation_error(&self, message: String, correlation_id: CorrelationId) -> GocError {
        GocError::ProviderTransient {
            provider: self.kind.id().to_string(),
            message,
            correlation_id,
        }
    }

    /// SSE lines look like `data: {...json GenerationChunk...}`, the same
    /// framing the teacher's Claude client parses, minus the vendor-specific
    /// event envelope.
    fn parse_sse_line(line: &str) -> Option<GenerationChunk> {
        let json_str = line.strip_prefix("data: ")?;
        if json_str.is_empty() || json_str == "[DONE]" {
            return None;
        }
        serde_json::from_str(json_str).ok()
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn cheapest_model(&self) -> &'static str {
        self.cheapest_model
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResponse, GocError> {
        let correlation_id = CorrelationId::new();
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.bearer_token)
            .json(req)
            .send()
            .await
            .map_err(|e| self.correlation_error(e.to_string(), correlation_id.clone()))?;

        let status = response.status();
        if status.as_u16() == 503 || status.as_u16() == 500 || status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(GocError::ProviderTransient {
                provider: self.kind.id().to_string(),
                message: format!("HTTP {status}: {body}"),
                correlation_id,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GocError::ProviderUnavailable {
                provider: self.kind.id().to_string(),
                message: format!("HTTP {status}: {body}"),
                correlation_id,
            });
        }

        response
            .json::<GenerationResponse>()
            .await
            .map_err(|e| self.correlation_error(format!("malformed response body: {e}"), correlation_id))
    }

    async fn generate_stream(
        &self,
        req: &GenerationRequest,
    ) -> Result<BoxStream<'static, Result<GenerationChunk, GocError>>, GocError> {
        let correlation_id = CorrelationId::new();
        let mut streaming_req = req.clone();
        streaming_req.stop_sequences = req.stop_sequences.clone();

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.bearer_token)
            .query(&[("stream", "true")])
            .json(&streaming_req)
            .send()
            .await
            .map_err(|e| self.correlation_error(e.to_string(), correlation_id.clone()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GocError::ProviderTransient {
                provider: self.kind.id().to_string(),
                message: format!("HTTP {status}: {body}"),
                correlation_id,
            });
        }

        let (tx, rx) = mpsc::channel::<Result<GenerationChunk, GocError>>(64);
        let provider_id = self.kind.id().to_string();
        let mut byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(GocError::ProviderTransient {
                                provider: provider_id.clone(),
                                message: e.to_string(),
                                correlation_id: correlation_id.clone(),
                            }))
                            .await;
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer = buffer[pos + 1..].to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(generation_chunk) = HttpProvider::parse_sse_line(&line) {
                        if tx.send(Ok(generation_chunk)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(tokio_stream::wrappers::ReceiverStream::new(rx).boxed())
    }
}
