//! Bounded model/tool conversation loop.
//!
//! One run per top-level request. Each iteration asks the model endpoint
//! for the next turn with the current tool catalog attached; assistant
//! turns carrying tool calls route through the registry and their results
//! come back as tool-role turns, in call order, until the model answers
//! without tools or the iteration bound is hit.


use crate::application::registry::SessionRegistry;
use crate::config::ModelConfig;
use crate::domain::{ChatMessage, ToolCall};
use crate::infrastructure::model::{GenerationError, ModelEndpoint};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model generation failed at iteration {iteration}: {source}")]
    Generation {
        iteration: u32,
        #[source]
        source: GenerationError,
    },
    #[error("conversation did not settle within {limit} iterations")]
    IterationsExceeded { limit: u32 },
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_iterations: u32,
    /// Platform-specific restyling instruction for the final answer.
    pub formatting_instruction: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            formatting_instruction: None,
        }
    }
}

pub struct ConversationLoop {
    registry: Arc<SessionRegistry>,
    endpoint: Arc<dyn ModelEndpoint>,
}

impl ConversationLoop {
    pub fn new(registry: Arc<SessionRegistry>, endpoint: Arc<dyn ModelEndpoint>) -> Self {
        Self { registry, endpoint }
    }

    /// Run one conversation to completion. The transcript is expected to
    /// already carry the system prompt and the user turn.
    pub async fn run(
        &self,
        model: &ModelConfig,
        mut transcript: Vec<ChatMessage>,
        options: RunOptions,
    ) -> Result<String, EngineError> {
        let run_id = Uuid::new_v4();
        let tools = self.registry.list_tools();
        info!(%run_id, tools = tools.len(), "conversation run started");

        for iteration in 1..=options.max_iterations {
            let turn = self
                .endpoint
                .generate(model, &transcript, &tools)
                .await
                .map_err(|source| EngineError::Generation { iteration, source })?;

            if turn.tool_calls.is_empty() {
                let answer = turn.content.unwrap_or_default();
                debug!(%run_id, iteration, "model settled on a final answer");
                return Ok(self
                    .apply_formatting(model, run_id, answer, options.formatting_instruction)
                    .await);
            }

            let calls = turn.tool_calls.clone();
            transcript.push(turn);
            for call in &calls {
                let output = self.execute_call(run_id, call).await;
                transcript.push(ChatMessage::tool(call.id.clone(), output));
            }
        }

        warn!(%run_id, limit = options.max_iterations, "conversation exhausted its iteration bound");
        Err(EngineError::IterationsExceeded {
            limit: options.max_iterations,
        })
    }

    /// Execute one tool call. Argument parse failures and tool failures
    /// become the content of the tool-result turn; they never abort the
    /// run.
    async fn execute_call(&self, run_id: Uuid, call: &ToolCall) -> String {
        let tool = &call.function.name;
        let raw = call.function.arguments.trim();
        let arguments = if raw.is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(value @ Value::Object(_)) => value,
                Ok(_) => {
                    return format!("error: arguments for tool '{tool}' must be a JSON object");
                }
                Err(err) => {
                    return format!("error: could not parse arguments for tool '{tool}': {err}");
                }
            }
        };

        debug!(%run_id, tool = %tool, "invoking tool");
        match self.registry.call_tool(tool, arguments).await {
            Ok(output) => output,
            Err(err) => {
                warn!(%run_id, tool = %tool, %err, "tool call failed");
                format!("error: tool '{tool}' failed: {err}")
            }
        }
    }

    /// One extra tool-free generation that restyles the final answer.
    /// Failure is non-fatal; the unformatted answer is returned.
    async fn apply_formatting(
        &self,
        model: &ModelConfig,
        run_id: Uuid,
        answer: String,
        instruction: Option<String>,
    ) -> String {
        let Some(instruction) = instruction else {
            return answer;
        };
        if answer.trim().is_empty() {
            return answer;
        }

        let transcript = vec![ChatMessage::system(instruction), ChatMessage::user(&answer)];
        match self.endpoint.generate(model, &transcript, &[]).await {
            Ok(turn) => match turn.content {
                Some(styled) if !styled.trim().is_empty() => styled,
                _ => answer,
            },
            Err(err) => {
                warn!(%run_id, %err, "formatting pass failed; returning unformatted answer");
                answer
            }
        }
    }
}
