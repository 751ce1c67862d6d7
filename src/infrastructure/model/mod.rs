//! Model endpoint abstraction.

mod openai;

pub use openai::OpenAiEndpoint;

use crate::config::ModelConfig;
use crate::domain::{ChatMessage, ToolDefinition};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("model endpoint returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("model endpoint returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// One generation against an OpenAI-compatible endpoint. Implementations
/// must accept both an empty and a non-empty tool catalog.
#[async_trait]
pub trait ModelEndpoint: Send + Sync {
    async fn generate(
        &self,
        model: &ModelConfig,
        transcript: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage, GenerationError>;
}
