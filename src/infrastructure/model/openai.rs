use super::{GenerationError, ModelEndpoint};
use crate::config::ModelConfig;
use crate::domain::{ChatMessage, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for OpenAI-compatible `/chat/completions` endpoints. Works with
/// any provider speaking the same wire shape; the concrete provider is
/// whatever the [`ModelConfig`] points at.
pub struct OpenAiEndpoint {
    client: reqwest::Client,
}

impl OpenAiEndpoint {
    pub fn new() -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

/// A base URL that already names the completions path is used verbatim so
/// gateways with non-standard prefixes keep working.
fn completions_url(base_url: &str) -> String {
    if base_url.contains("/chat/completions") {
        return base_url.to_string();
    }
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

#[derive(Serialize)]
struct CompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolDefinition],
}

#[derive(Deserialize)]
struct CompletionsResponse {
    choices: Vec<CompletionsChoice>,
}

#[derive(Deserialize)]
struct CompletionsChoice {
    message: ChatMessage,
}

#[async_trait]
impl ModelEndpoint for OpenAiEndpoint {
    async fn generate(
        &self,
        model: &ModelConfig,
        transcript: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage, GenerationError> {
        let url = completions_url(&model.base_url);
        let payload = CompletionsRequest {
            model: &model.model,
            messages: transcript,
            tools,
        };

        debug!(
            model = %model.model,
            messages = transcript.len(),
            tools = tools.len(),
            "requesting completion"
        );

        let mut request = self.client.post(&url).json(&payload);
        if !model.api_key.is_empty() {
            request = request.bearer_auth(&model.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionsResponse = response
            .json()
            .await
            .map_err(|err| GenerationError::InvalidResponse(err.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| GenerationError::InvalidResponse("response carried no choices".into()))
    }
}
