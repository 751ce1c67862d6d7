//! Channels to tool providers.
//!
//! The closed set of transports is fixed at configuration-parse time
//! ([`TransportKind`]); all three speak the same JSON-RPC request/response
//! protocol and expose it through [`ToolChannel`]. The provider handshake
//! (`initialize`, `notifications/initialized`, `tools/list`) is driven by
//! the session registry, not by the channels themselves.

mod error;
mod http;
mod sse;
mod stdio;

pub use error::TransportError;
pub use http::HttpChannel;
pub use sse::SseChannel;
pub use stdio::StdioChannel;

use crate::config::{ProxyConfig, ToolProviderConfig, TransportKind};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const PROTOCOL_VERSION: &str = "2025-06-18";

const HTTP_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Capability surface of one live provider connection: send a request and
/// await its correlated response, fire a one-way notification, tear down.
#[async_trait]
pub trait ToolChannel: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;
    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError>;
    async fn close(&self);
}

impl std::fmt::Debug for dyn ToolChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ToolChannel")
    }
}

/// Construct the channel matching the provider's configured transport.
/// Network dials and subprocess spawns happen here; protocol handshakes do
/// not.
pub async fn open_channel(
    config: &ToolProviderConfig,
    proxy: &ProxyConfig,
) -> Result<Arc<dyn ToolChannel>, TransportError> {
    match config.transport {
        TransportKind::StreamableHttp => Ok(Arc::new(HttpChannel::new(config, proxy)?)),
        TransportKind::Sse => Ok(Arc::new(SseChannel::connect(config, proxy).await?)),
        TransportKind::Stdio => Ok(Arc::new(StdioChannel::spawn(config, proxy)?)),
    }
}

/// Per-provider HTTP client: injected headers (values already env-expanded
/// at config-parse time) and optional proxy routing.
fn build_http_client(
    config: &ToolProviderConfig,
    proxy: &ProxyConfig,
) -> Result<reqwest::Client, TransportError> {
    let mut headers = HeaderMap::new();
    for (key, value) in &config.headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
            TransportError::Connect {
                provider: config.name.clone(),
                message: format!("invalid header name '{key}': {err}"),
            }
        })?;
        let value = HeaderValue::from_str(value).map_err(|err| TransportError::Connect {
            provider: config.name.clone(),
            message: format!("invalid header value for '{key}': {err}"),
        })?;
        headers.insert(name, value);
    }

    let mut builder = reqwest::Client::builder()
        .timeout(HTTP_CLIENT_TIMEOUT)
        .default_headers(headers);

    if config.use_proxy && !proxy.url.is_empty() {
        let proxy = reqwest::Proxy::all(&proxy.url).map_err(|err| TransportError::Connect {
            provider: config.name.clone(),
            message: format!("invalid proxy URL: {err}"),
        })?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(|err| TransportError::Connect {
        provider: config.name.clone(),
        message: format!("failed to build HTTP client: {err}"),
    })
}

fn envelope(id: Option<u64>, method: &str, params: Value) -> Value {
    let mut payload = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    });
    if let Some(id) = id {
        payload["id"] = Value::from(id);
    }
    payload
}

/// Extract the `result` of a JSON-RPC response, mapping `error` members to
/// [`TransportError::Rpc`].
fn unwrap_rpc(provider: &str, response: Value) -> Result<Value, TransportError> {
    if let Some(error) = response.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(TransportError::Rpc {
            provider: provider.to_string(),
            code,
            message,
        });
    }
    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}
