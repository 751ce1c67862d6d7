use super::{ToolChannel, TransportError, build_http_client, envelope, unwrap_rpc};
use crate::config::{ProxyConfig, ToolProviderConfig};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, TransportError>>>>>;

/// Server-push channel: the provider streams responses over an event source
/// while requests are POSTed to the endpoint announced on that stream.
/// Responses are correlated to in-flight requests by JSON-RPC id.
pub struct SseChannel {
    provider: String,
    client: reqwest::Client,
    post_url: reqwest::Url,
    pending: PendingMap,
    id_counter: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SseChannel {
    pub async fn connect(
        config: &ToolProviderConfig,
        proxy: &ProxyConfig,
    ) -> Result<Self, TransportError> {
        let provider = config.name.clone();
        let client = build_http_client(config, proxy)?;

        let stream_url =
            reqwest::Url::parse(&config.url).map_err(|err| TransportError::Connect {
                provider: provider.clone(),
                message: format!("invalid stream URL: {err}"),
            })?;

        let mut source =
            EventSource::new(client.get(stream_url.clone())).map_err(|err| {
                TransportError::Connect {
                    provider: provider.clone(),
                    message: format!("failed to open event stream: {err}"),
                }
            })?;

        // The first pushed event names the URL requests must be POSTed to.
        let post_url = loop {
            match source.next().await {
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(message))) if message.event == "endpoint" => {
                    break stream_url.join(message.data.trim()).map_err(|err| {
                        TransportError::Connect {
                            provider: provider.clone(),
                            message: format!("invalid endpoint event payload: {err}"),
                        }
                    })?;
                }
                Some(Ok(Event::Message(message))) => {
                    debug!(provider = %provider, event = %message.event, "ignoring pre-endpoint event");
                }
                Some(Err(err)) => {
                    return Err(TransportError::Connect {
                        provider,
                        message: format!("event stream failed before endpoint event: {err}"),
                    });
                }
                None => {
                    return Err(TransportError::Connect {
                        provider,
                        message: "event stream closed before endpoint event".to_string(),
                    });
                }
            }
        };

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(reader_loop(provider.clone(), source, pending.clone()));

        Ok(Self {
            provider,
            client,
            post_url,
            pending,
            id_counter: AtomicU64::new(1),
            reader: Mutex::new(Some(reader)),
        })
    }

    async fn post(&self, payload: &Value) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.post_url.clone())
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
        Ok(())
    }
}

#[async_trait]
impl ToolChannel for SseChannel {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let payload = envelope(Some(id), method, params);
        if let Err(err) = self.post(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match rx.await {
            Ok(Ok(message)) => unwrap_rpc(&self.provider, message),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(TransportError::Terminated {
                provider: self.provider.clone(),
            }),
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        self.post(&envelope(None, method, params)).await
    }

    async fn close(&self) {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        fail_pending(&self.provider, &self.pending).await;
    }
}

async fn reader_loop(provider: String, mut source: EventSource, pending: PendingMap) {
    while let Some(event) = source.next().await {
        match event {
            Ok(Event::Open) => {}
            Ok(Event::Message(message)) => {
                let value = match serde_json::from_str::<Value>(&message.data) {
                    Ok(value) => value,
                    Err(source) => {
                        warn!(provider = %provider, %source, "received invalid JSON on event stream");
                        continue;
                    }
                };
                let Some(id) = value.get("id").and_then(Value::as_u64) else {
                    debug!(provider = %provider, "ignoring pushed message without request id");
                    continue;
                };
                let sender = pending.lock().await.remove(&id);
                match sender {
                    Some(sender) => {
                        let _ = sender.send(Ok(value));
                    }
                    None => {
                        debug!(provider = %provider, id, "received response for unknown request");
                    }
                }
            }
            Err(err) => {
                warn!(provider = %provider, %err, "event stream failed");
                break;
            }
        }
    }
    fail_pending(&provider, &pending).await;
}

async fn fail_pending(provider: &str, pending: &PendingMap) {
    let mut pending = pending.lock().await;
    for (_, sender) in pending.drain() {
        let _ = sender.send(Err(TransportError::Terminated {
            provider: provider.to_string(),
        }));
    }
}
