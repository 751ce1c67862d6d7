use super::{ToolChannel, TransportError, envelope, unwrap_rpc};
use crate::config::{ProxyConfig, ToolProviderConfig};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

/// Subprocess channel: the provider runs as a child process and speaks
/// line-delimited JSON-RPC over its standard pipes. A background task owns
/// the read side and routes responses to waiting callers by id.
pub struct StdioChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    provider: String,
    child: Mutex<Option<Child>>,
    writer: Mutex<Option<BufWriter<ChildStdin>>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value, TransportError>>>>,
    id_counter: AtomicU64,
}

impl StdioChannel {
    /// Launch the provider command. The child inherits the parent
    /// environment; standard proxy variables are added when the provider
    /// opts in, and provider-specific entries are overlaid last so they may
    /// override the proxy settings.
    pub fn spawn(
        config: &ToolProviderConfig,
        proxy: &ProxyConfig,
    ) -> Result<Self, TransportError> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if config.use_proxy && !proxy.url.is_empty() {
            for key in ["HTTP_PROXY", "HTTPS_PROXY", "http_proxy", "https_proxy"] {
                command.env(key, &proxy.url);
            }
            debug!(provider = %config.name, proxy = %proxy.url, "provider subprocess will use proxy");
        }
        for (key, value) in &config.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| TransportError::Spawn {
            provider: config.name.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or_else(|| TransportError::Connect {
            provider: config.name.clone(),
            message: "failed to capture provider stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| TransportError::Connect {
            provider: config.name.clone(),
            message: "failed to capture provider stdout".to_string(),
        })?;

        let inner = Arc::new(ChannelInner {
            provider: config.name.clone(),
            child: Mutex::new(Some(child)),
            writer: Mutex::new(Some(BufWriter::new(stdin))),
            pending: Mutex::new(HashMap::new()),
            id_counter: AtomicU64::new(1),
        });

        let reader_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            reader_inner.reader_loop(stdout).await;
        });

        Ok(Self { inner })
    }
}

#[async_trait]
impl ToolChannel for StdioChannel {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.inner.id_counter.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(id, tx);

        let payload = envelope(Some(id), method, params);
        if let Err(err) = self.inner.write_message(&payload).await {
            self.inner.pending.lock().await.remove(&id);
            return Err(err);
        }

        match rx.await {
            Ok(Ok(message)) => unwrap_rpc(&self.inner.provider, message),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(TransportError::Terminated {
                provider: self.inner.provider.clone(),
            }),
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        self.inner.write_message(&envelope(None, method, params)).await
    }

    async fn close(&self) {
        self.inner.shutdown().await;
    }
}

impl ChannelInner {
    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(item) = lines.next_line().await {
            let Some(raw) = item else { break };
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Some providers leak ANSI-decorated log lines onto stdout.
            if trimmed.starts_with('\u{1b}') {
                debug!(provider = %self.provider, "skipping non-JSON log line from provider");
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => self.route_inbound(value).await,
                Err(source) => {
                    warn!(provider = %self.provider, %source, "received invalid JSON from provider");
                }
            }
        }
        self.shutdown().await;
    }

    async fn route_inbound(&self, value: Value) {
        let id = value.get("id").and_then(Value::as_u64);
        let is_request = value.get("method").is_some();
        match (id, is_request) {
            (Some(id), false) => self.resolve_pending(id, value).await,
            (Some(id), true) => self.answer_server_request(id, &value).await,
            (None, true) => {
                let method = value.get("method").and_then(Value::as_str).unwrap_or("");
                debug!(provider = %self.provider, method, "received notification from provider");
            }
            (None, false) => {}
        }
    }

    async fn resolve_pending(&self, id: u64, value: Value) {
        let sender = self.pending.lock().await.remove(&id);
        match sender {
            Some(sender) => {
                let _ = sender.send(Ok(value));
            }
            None => {
                debug!(provider = %self.provider, id, "received response for unknown request");
            }
        }
    }

    async fn answer_server_request(&self, id: u64, value: &Value) {
        let method = value.get("method").and_then(Value::as_str).unwrap_or("");
        let reply = match method {
            "ping" => serde_json::json!({"jsonrpc": "2.0", "id": id, "result": {}}),
            other => {
                warn!(provider = %self.provider, method = other, "provider sent unsupported request");
                serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": -32601,
                        "message": format!("client does not implement method '{other}'"),
                    },
                })
            }
        };
        if let Err(err) = self.write_message(&reply).await {
            warn!(provider = %self.provider, %err, "failed to answer provider request");
        }
    }

    async fn write_message(&self, message: &Value) -> Result<(), TransportError> {
        let encoded =
            serde_json::to_string(message).map_err(|source| TransportError::InvalidJson {
                provider: self.provider.clone(),
                source,
            })?;

        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or_else(|| TransportError::Terminated {
            provider: self.provider.clone(),
        })?;
        let io_err = |source: std::io::Error| TransportError::Transport {
            provider: self.provider.clone(),
            message: source.to_string(),
        };
        stream.write_all(encoded.as_bytes()).await.map_err(io_err)?;
        stream.write_all(b"\n").await.map_err(io_err)?;
        stream.flush().await.map_err(io_err)?;
        Ok(())
    }

    async fn shutdown(&self) {
        self.writer.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                debug!(
                    provider = %self.provider,
                    %err,
                    "failed to kill provider process (may have already exited)"
                );
            }
            let _ = child.wait().await;
        }

        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(TransportError::Terminated {
                provider: self.provider.clone(),
            }));
        }
    }
}
