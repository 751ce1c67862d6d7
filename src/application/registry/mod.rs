//! Provider sessions and the merged tool catalog.
//!
//! The registry owns every live provider connection. Connecting a provider
//! runs the handshake (`initialize`, `notifications/initialized`) and tool
//! discovery (`tools/list`); discovered tools land in one merged catalog
//! and a tool-name index pointing at the owning session. Lookups are
//! read-heavy and never block each other; sessions are only added during
//! connect and removed during shutdown.

mod error;
mod invoke;
mod session;
#[cfg(test)]
mod tests;

pub use error::RegistryError;
pub use session::{FAIL_THRESHOLD, Health, Session};

use crate::config::{ProxyConfig, ToolProviderConfig};
use crate::domain::ToolDefinition;
use crate::infrastructure::transport::{
    PROTOCOL_VERSION, ToolChannel, TransportError, open_channel,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SessionRegistry {
    proxy: ProxyConfig,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    catalog: RwLock<Vec<ToolDefinition>>,
    index: RwLock<HashMap<String, Arc<Session>>>,
    // Tool names whose owning session has been shut down, kept so lookups
    // can distinguish "never registered" from "provider went away".
    retired: RwLock<HashMap<String, String>>,
}

impl SessionRegistry {
    pub fn new(proxy: ProxyConfig) -> Self {
        Self {
            proxy,
            sessions: RwLock::new(HashMap::new()),
            catalog: RwLock::new(Vec::new()),
            index: RwLock::new(HashMap::new()),
            retired: RwLock::new(HashMap::new()),
        }
    }

    /// Connect every configured provider. Failures are logged and the
    /// provider skipped; one bad provider never takes down the rest.
    pub async fn connect_all(&self, configs: &HashMap<String, ToolProviderConfig>) {
        for config in configs.values() {
            match self.connect_server(config).await {
                Ok(count) => {
                    info!(provider = %config.name, tools = count, "provider connected");
                }
                Err(err) => {
                    warn!(provider = %config.name, %err, "skipping provider");
                }
            }
        }
    }

    /// Connect one provider: channel construction plus handshake under a
    /// 15 s deadline, then discovery under its own 10 s deadline. There is
    /// no retry here; a failed provider stays out of the usable set for
    /// the life of the process.
    pub async fn connect_server(
        &self,
        config: &ToolProviderConfig,
    ) -> Result<usize, RegistryError> {
        let channel =
            dial_with_deadline(config, open_channel(config, &self.proxy)).await?;
        self.discover_and_register(config.clone(), channel).await
    }

    /// Discover a connected channel's tools and register the session.
    pub(crate) async fn discover_and_register(
        &self,
        config: ToolProviderConfig,
        channel: Arc<dyn ToolChannel>,
    ) -> Result<usize, RegistryError> {
        let provider = config.name.clone();

        let listing =
            tokio::time::timeout(DISCOVERY_TIMEOUT, channel.request("tools/list", json!({})))
                .await
                .map_err(|_| TransportError::TimedOut {
                    provider: provider.clone(),
                    seconds: DISCOVERY_TIMEOUT.as_secs(),
                })
                .and_then(|result| result);
        let listing = match listing {
            Ok(listing) => listing,
            Err(source) => {
                channel.close().await;
                return Err(RegistryError::DiscoveryFailed { provider, source });
            }
        };

        let tools = parse_tool_listing(&listing);
        let session = Arc::new(Session::new(config, channel));
        self.register(session, &tools);
        Ok(tools.len())
    }

    /// Insert a session and its tools. On a tool-name collision the last
    /// registration wins, in both catalog and index.
    fn register(&self, session: Arc<Session>, tools: &[ToolDefinition]) {
        let mut sessions = self.sessions.write().expect("session map lock");
        let mut catalog = self.catalog.write().expect("catalog lock");
        let mut index = self.index.write().expect("tool index lock");
        let mut retired = self.retired.write().expect("retired set lock");

        sessions.insert(session.provider_name.clone(), Arc::clone(&session));
        for tool in tools {
            let name = tool.name().to_string();
            if index.contains_key(&name) {
                warn!(
                    provider = %session.provider_name,
                    tool = %name,
                    "tool name collision; later registration wins"
                );
            }
            catalog.retain(|existing| existing.name() != name);
            catalog.push(tool.clone());
            index.insert(name.clone(), Arc::clone(&session));
            retired.remove(&name);
        }
    }

    /// Snapshot of the merged catalog.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.catalog.read().expect("catalog lock").clone()
    }

    /// Invoke a tool by name through the retry pipeline. Fails fast when
    /// the name was never registered or its provider has been shut down.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, RegistryError> {
        let session = {
            let index = self.index.read().expect("tool index lock");
            index.get(tool).cloned()
        };

        let Some(session) = session else {
            let retired = self.retired.read().expect("retired set lock");
            if let Some(provider) = retired.get(tool) {
                return Err(RegistryError::SessionClosed {
                    provider: provider.clone(),
                });
            }
            return Err(RegistryError::ToolNotFound {
                tool: tool.to_string(),
            });
        };

        if session.is_closed() {
            return Err(RegistryError::SessionClosed {
                provider: session.provider_name.clone(),
            });
        }

        invoke::invoke(&session, tool, arguments).await
    }

    /// Per-provider health: open and below the failure threshold.
    pub fn health_check(&self) -> HashMap<String, bool> {
        let sessions = self.sessions.read().expect("session map lock");
        sessions
            .iter()
            .map(|(name, session)| (name.clone(), session.is_healthy()))
            .collect()
    }

    /// Shut every session down, tearing down subprocess providers, and
    /// clear the catalog and index in the same critical section as the
    /// close. Idempotent.
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().expect("session map lock");
            let mut catalog = self.catalog.write().expect("catalog lock");
            let mut index = self.index.write().expect("tool index lock");
            let mut retired = self.retired.write().expect("retired set lock");

            for (tool, session) in index.drain() {
                retired.insert(tool, session.provider_name.clone());
            }
            catalog.clear();
            let drained: Vec<Arc<Session>> = sessions.drain().map(|(_, s)| s).collect();
            for session in &drained {
                session.mark_closed();
            }
            drained
        };

        for session in drained {
            debug!(provider = %session.provider_name, "closing session");
            session.channel.close().await;
        }
    }
}

/// Dial and handshake under the connect deadline. The opened channel is
/// parked in a slot the timeout branch can reach, so a provider that
/// dials but never answers `initialize` is torn down instead of leaking
/// its reader task (and, for subprocess transports, the child process).
pub(crate) async fn dial_with_deadline<Fut>(
    config: &ToolProviderConfig,
    open: Fut,
) -> Result<Arc<dyn ToolChannel>, RegistryError>
where
    Fut: Future<Output = Result<Arc<dyn ToolChannel>, TransportError>>,
{
    let opened: Mutex<Option<Arc<dyn ToolChannel>>> = Mutex::new(None);

    let handshake = async {
        let channel = open.await?;
        *opened.lock().expect("dialed channel slot") = Some(Arc::clone(&channel));
        if let Err(err) = initialize(config, channel.as_ref()).await {
            channel.close().await;
            return Err(err);
        }
        Ok(channel)
    };

    match tokio::time::timeout(CONNECT_TIMEOUT, handshake).await {
        Ok(Ok(channel)) => Ok(channel),
        Ok(Err(source)) => Err(RegistryError::ConnectFailed {
            provider: config.name.clone(),
            source,
        }),
        Err(_) => {
            let leftover = opened.lock().expect("dialed channel slot").take();
            if let Some(channel) = leftover {
                warn!(provider = %config.name, "handshake deadline expired; tearing the channel down");
                channel.close().await;
            }
            Err(RegistryError::ConnectFailed {
                provider: config.name.clone(),
                source: TransportError::TimedOut {
                    provider: config.name.clone(),
                    seconds: CONNECT_TIMEOUT.as_secs(),
                },
            })
        }
    }
}

async fn initialize(
    config: &ToolProviderConfig,
    channel: &dyn ToolChannel,
) -> Result<(), TransportError> {
    let params = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    });
    let result = channel.request("initialize", params).await?;
    debug!(
        provider = %config.name,
        server_version = %result
            .pointer("/serverInfo/version")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown"),
        "provider handshake complete"
    );
    channel.notify("notifications/initialized", json!({})).await
}

fn parse_tool_listing(listing: &Value) -> Vec<ToolDefinition> {
    let Some(entries) = listing.get("tools").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name").and_then(Value::as_str)?;
            let description = entry
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let schema = entry.get("inputSchema").cloned();
            Some(ToolDefinition::function(name, description, schema))
        })
        .collect()
}
