//! Reasoning collaborator abstraction
//!
//! The dialogue graph only sees the `Reasoner` trait; the concrete provider
//! behind it is interchangeable.

mod error;
mod openai;

pub use error::{ReasonerError, ReasonerErrorKind};
pub use openai::OpenAiCompatReasoner;

use crate::message::{ModelResponse, Utterance};
use async_trait::async_trait;
use std::sync::Arc;

/// Tool definition advertised to the reasoner
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One reasoning request: system preamble, normalized history, available tools
#[derive(Debug, Clone)]
pub struct ReasonerRequest {
    pub system: String,
    pub messages: Vec<Utterance>,
    pub tools: Vec<ToolDefinition>,
}

/// Common interface for reasoning collaborators
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Produce one assistant-shaped response for the given history
    async fn respond(&self, request: &ReasonerRequest) -> Result<ModelResponse, ReasonerError>;

    /// Model identifier, for logging
    fn model_id(&self) -> &str;
}

/// Logging wrapper for reasoners
pub struct LoggingReasoner {
    inner: Arc<dyn Reasoner>,
    model_id: String,
}

impl LoggingReasoner {
    pub fn new(inner: Arc<dyn Reasoner>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl Reasoner for LoggingReasoner {
    async fn respond(&self, request: &ReasonerRequest) -> Result<ModelResponse, ReasonerError> {
        let start = std::time::Instant::now();
        let result = self.inner.respond(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    tool_calls = response.tool_calls.len(),
                    "Reasoner request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Reasoner request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
