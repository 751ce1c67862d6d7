use super::error::RegistryError;
use super::session::Session;
use crate::infrastructure::transport::TransportError;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

pub const MAX_ATTEMPTS: u32 = 2;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);
const BACKOFF_STEP: Duration = Duration::from_millis(500);

/// Bounded retry pipeline for one tool invocation: up to [`MAX_ATTEMPTS`]
/// attempts, a linear backoff before each retry, and a per-attempt
/// deadline. Success resets the session's failure counter; exhaustion
/// increments it by exactly one.
pub async fn invoke(
    session: &Session,
    tool: &str,
    arguments: Value,
) -> Result<String, RegistryError> {
    let mut last_error: Option<TransportError> = None;

    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(BACKOFF_STEP * attempt).await;
        }

        match attempt_call(session, tool, arguments.clone()).await {
            Ok(output) => {
                session.record_success();
                debug!(
                    provider = %session.provider_name,
                    tool,
                    attempt = attempt + 1,
                    "tool invocation succeeded"
                );
                return Ok(output);
            }
            Err(err) => {
                warn!(
                    provider = %session.provider_name,
                    tool,
                    attempt = attempt + 1,
                    %err,
                    "tool invocation attempt failed"
                );
                last_error = Some(err);
            }
        }
    }

    session.record_failure();
    Err(RegistryError::InvocationFailed {
        provider: session.provider_name.clone(),
        tool: tool.to_string(),
        attempts: MAX_ATTEMPTS,
        source: last_error.unwrap_or_else(|| TransportError::Terminated {
            provider: session.provider_name.clone(),
        }),
    })
}

async fn attempt_call(
    session: &Session,
    tool: &str,
    arguments: Value,
) -> Result<String, TransportError> {
    let params = json!({ "name": tool, "arguments": arguments });
    let request = session.channel.request("tools/call", params);

    let result = tokio::time::timeout(ATTEMPT_TIMEOUT, request)
        .await
        .map_err(|_| TransportError::TimedOut {
            provider: session.provider_name.clone(),
            seconds: ATTEMPT_TIMEOUT.as_secs(),
        })??;

    let text = collect_text(&result);
    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(TransportError::Transport {
            provider: session.provider_name.clone(),
            message: if text.is_empty() {
                format!("tool '{tool}' reported an error")
            } else {
                text
            },
        });
    }
    Ok(text)
}

/// Concatenate the `text` content items of a `tools/call` result.
fn collect_text(result: &Value) -> String {
    let Some(items) = result.get("content").and_then(Value::as_array) else {
        return String::new();
    };
    items
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}
