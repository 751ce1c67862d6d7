use super::{ToolChannel, TransportError, build_http_client, envelope, unwrap_rpc};
use crate::config::{ProxyConfig, ToolProviderConfig};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Streamed-HTTP channel: every request is one JSON-RPC POST. The provider
/// may answer with a plain JSON body or an event-stream body carrying the
/// response as `data:` lines; both are accepted.
pub struct HttpChannel {
    provider: String,
    endpoint: String,
    client: reqwest::Client,
    id_counter: AtomicU64,
}

impl HttpChannel {
    pub fn new(config: &ToolProviderConfig, proxy: &ProxyConfig) -> Result<Self, TransportError> {
        let client = build_http_client(config, proxy)?;
        Ok(Self {
            provider: config.name.clone(),
            endpoint: config.url.clone(),
            client,
            id_counter: AtomicU64::new(1),
        })
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json, text/event-stream")
            .json(payload)
            .send()
            .await
            .map_err(|err| TransportError::Transport {
                provider: self.provider.clone(),
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(TransportError::Transport {
                provider: self.provider.clone(),
                message: format!("provider returned HTTP {}", response.status()),
            });
        }
        Ok(response)
    }

    fn parse_body(&self, content_type: &str, body: &str, id: u64) -> Result<Value, TransportError> {
        if content_type.starts_with("text/event-stream") {
            return self.parse_event_stream(body, id);
        }
        serde_json::from_str(body).map_err(|source| TransportError::InvalidJson {
            provider: self.provider.clone(),
            source,
        })
    }

    /// Scan an event-stream body for the response matching our request id.
    fn parse_event_stream(&self, body: &str, id: u64) -> Result<Value, TransportError> {
        for line in body.lines() {
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let Ok(message) = serde_json::from_str::<Value>(data.trim()) else {
                debug!(provider = %self.provider, "skipping non-JSON event-stream line");
                continue;
            };
            if message.get("id").and_then(Value::as_u64) == Some(id) {
                return Ok(message);
            }
        }
        Err(TransportError::Transport {
            provider: self.provider.clone(),
            message: format!("event-stream body carried no response for request {id}"),
        })
    }
}

#[async_trait]
impl ToolChannel for HttpChannel {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let payload = envelope(Some(id), method, params);

        let response = self.post(&payload).await?;
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/json")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Transport {
                provider: self.provider.clone(),
                message: err.to_string(),
            })?;

        let message = self.parse_body(&content_type, &body, id)?;
        unwrap_rpc(&self.provider, message)
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        let payload = envelope(None, method, params);
        self.post(&payload).await?;
        Ok(())
    }

    async fn close(&self) {
        // Stateless per-request transport; nothing to tear down.
    }
}
