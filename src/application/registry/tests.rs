use super::*;
use crate::config::TransportKind;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// What a scripted channel does with the next `tools/call` request.
enum CallScript {
    Reply(Result<Value, TransportError>),
    Hang,
}

struct ScriptedChannel {
    provider: String,
    tools: Vec<&'static str>,
    calls: Mutex<VecDeque<CallScript>>,
    call_count: AtomicU32,
    closed: AtomicBool,
}

impl ScriptedChannel {
    fn new(provider: &str, tools: Vec<&'static str>) -> Self {
        Self {
            provider: provider.to_string(),
            tools,
            calls: Mutex::new(VecDeque::new()),
            call_count: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn script(self, scripts: Vec<CallScript>) -> Self {
        *self.calls.lock().unwrap() = scripts.into();
        self
    }

    fn transport_error(&self) -> TransportError {
        TransportError::Transport {
            provider: self.provider.clone(),
            message: "scripted failure".into(),
        }
    }
}

fn text_result(text: &str) -> Value {
    json!({ "content": [{ "type": "text", "text": text }] })
}

#[async_trait]
impl ToolChannel for ScriptedChannel {
    async fn request(&self, method: &str, _params: Value) -> Result<Value, TransportError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": { "name": self.provider, "version": "0.0.1" },
            })),
            "tools/list" => {
                let tools: Vec<Value> = self
                    .tools
                    .iter()
                    .map(|name| {
                        json!({
                            "name": name,
                            "description": "scripted tool",
                            "inputSchema": { "type": "object", "properties": {} },
                        })
                    })
                    .collect();
                Ok(json!({ "tools": tools }))
            }
            "tools/call" => {
                self.call_count.fetch_add(1, Ordering::SeqCst);
                let script = self.calls.lock().unwrap().pop_front();
                match script {
                    Some(CallScript::Reply(reply)) => reply,
                    Some(CallScript::Hang) => futures::future::pending().await,
                    None => Ok(text_result("ok")),
                }
            }
            other => Err(TransportError::Rpc {
                provider: self.provider.clone(),
                code: -32601,
                message: format!("unexpected method {other}"),
            }),
        }
    }

    async fn notify(&self, _method: &str, _params: Value) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn provider_config(name: &str) -> ToolProviderConfig {
    ToolProviderConfig {
        name: name.to_string(),
        transport: TransportKind::StreamableHttp,
        url: format!("http://{name}.test"),
        headers: HashMap::new(),
        use_proxy: false,
        command: String::new(),
        args: Vec::new(),
        env: HashMap::new(),
    }
}

fn broken_stdio_config(name: &str) -> ToolProviderConfig {
    ToolProviderConfig {
        name: name.to_string(),
        transport: TransportKind::Stdio,
        url: String::new(),
        headers: HashMap::new(),
        use_proxy: false,
        command: "/nonexistent/provider-binary".into(),
        args: Vec::new(),
        env: HashMap::new(),
    }
}

async fn register_scripted(
    registry: &SessionRegistry,
    channel: ScriptedChannel,
) -> Result<usize, RegistryError> {
    let config = provider_config(&channel.provider);
    registry
        .discover_and_register(config, Arc::new(channel))
        .await
}

/// Channel that dials fine but never answers the handshake.
struct InitHangChannel {
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl ToolChannel for InitHangChannel {
    async fn request(&self, method: &str, _params: Value) -> Result<Value, TransportError> {
        match method {
            "initialize" => futures::future::pending().await,
            _ => Ok(json!({})),
        }
    }

    async fn notify(&self, _method: &str, _params: Value) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn connect_deadline_tears_down_the_dialed_channel() {
    let closed = Arc::new(AtomicBool::new(false));
    let channel: Arc<dyn ToolChannel> = Arc::new(InitHangChannel {
        closed: Arc::clone(&closed),
    });
    let config = provider_config("hung");

    let err = dial_with_deadline(&config, async move { Ok(channel) })
        .await
        .unwrap_err();

    match err {
        RegistryError::ConnectFailed { source, .. } => {
            assert!(matches!(source, TransportError::TimedOut { seconds: 15, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(closed.load(Ordering::SeqCst), "channel must be closed on deadline");
}

#[tokio::test]
async fn one_bad_provider_does_not_block_the_rest() {
    let registry = SessionRegistry::new(ProxyConfig::default());

    let mut configs = HashMap::new();
    configs.insert("broken".to_string(), broken_stdio_config("broken"));
    registry.connect_all(&configs).await;
    assert!(registry.list_tools().is_empty());

    register_scripted(&registry, ScriptedChannel::new("alpha", vec!["fetch"]))
        .await
        .expect("alpha registers");
    register_scripted(&registry, ScriptedChannel::new("beta", vec!["search"]))
        .await
        .expect("beta registers");

    let names: Vec<String> = registry
        .list_tools()
        .iter()
        .map(|tool| tool.name().to_string())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"fetch".to_string()));
    assert!(names.contains(&"search".to_string()));
    assert_eq!(registry.health_check().get("alpha"), Some(&true));
}

#[tokio::test]
async fn unknown_tool_fails_fast() {
    let registry = SessionRegistry::new(ProxyConfig::default());
    register_scripted(&registry, ScriptedChannel::new("alpha", vec!["fetch"]))
        .await
        .expect("registers");

    let err = registry.call_tool("no-such-tool", json!({})).await.unwrap_err();
    assert!(matches!(err, RegistryError::ToolNotFound { .. }));
}

#[tokio::test(start_paused = true)]
async fn exhausted_invocation_increments_counter_once() {
    let registry = SessionRegistry::new(ProxyConfig::default());
    let channel = ScriptedChannel::new("alpha", vec!["fetch"]);
    let failures = vec![
        CallScript::Reply(Err(channel.transport_error())),
        CallScript::Reply(Err(channel.transport_error())),
    ];
    register_scripted(&registry, channel.script(failures))
        .await
        .expect("registers");

    let err = registry.call_tool("fetch", json!({})).await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::InvocationFailed { attempts: 2, .. }
    ));

    let sessions = registry.sessions.read().unwrap();
    let health = sessions.get("alpha").unwrap().health();
    assert_eq!(health.consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn hung_tool_times_out_per_attempt() {
    let registry = SessionRegistry::new(ProxyConfig::default());
    let channel = ScriptedChannel::new("alpha", vec!["fetch"]);
    register_scripted(
        &registry,
        channel.script(vec![CallScript::Hang, CallScript::Hang]),
    )
    .await
    .expect("registers");

    let err = registry.call_tool("fetch", json!({})).await.unwrap_err();
    match err {
        RegistryError::InvocationFailed { source, .. } => {
            assert!(matches!(source, TransportError::TimedOut { seconds: 60, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn health_flips_at_threshold_and_recovers_on_success() {
    let registry = SessionRegistry::new(ProxyConfig::default());
    let channel = ScriptedChannel::new("alpha", vec!["fetch"]);
    // Five invocations of two failing attempts each, then one success.
    let mut scripts = Vec::new();
    for _ in 0..(FAIL_THRESHOLD * 2) {
        scripts.push(CallScript::Reply(Err(channel.transport_error())));
    }
    scripts.push(CallScript::Reply(Ok(text_result("back"))));
    register_scripted(&registry, channel.script(scripts))
        .await
        .expect("registers");

    for _ in 0..FAIL_THRESHOLD {
        let _ = registry.call_tool("fetch", json!({})).await;
    }
    assert_eq!(registry.health_check().get("alpha"), Some(&false));

    let output = registry.call_tool("fetch", json!({})).await.expect("recovers");
    assert_eq!(output, "back");
    assert_eq!(registry.health_check().get("alpha"), Some(&true));
}

#[tokio::test]
async fn close_all_reports_session_closed_for_known_tools() {
    let registry = SessionRegistry::new(ProxyConfig::default());
    register_scripted(&registry, ScriptedChannel::new("alpha", vec!["fetch"]))
        .await
        .expect("registers");

    registry.close_all().await;
    registry.close_all().await; // idempotent

    assert!(registry.list_tools().is_empty());
    let err = registry.call_tool("fetch", json!({})).await.unwrap_err();
    assert!(matches!(err, RegistryError::SessionClosed { .. }));
    let err = registry.call_tool("never-existed", json!({})).await.unwrap_err();
    assert!(matches!(err, RegistryError::ToolNotFound { .. }));
}

#[tokio::test]
async fn tool_name_collision_routes_to_last_registration() {
    let registry = SessionRegistry::new(ProxyConfig::default());
    let first = ScriptedChannel::new("alpha", vec!["dup"])
        .script(vec![CallScript::Reply(Ok(text_result("from alpha")))]);
    let second = ScriptedChannel::new("beta", vec!["dup"])
        .script(vec![CallScript::Reply(Ok(text_result("from beta")))]);
    register_scripted(&registry, first).await.expect("alpha");
    register_scripted(&registry, second).await.expect("beta");

    assert_eq!(registry.list_tools().len(), 1);
    let output = registry.call_tool("dup", json!({})).await.expect("routes");
    assert_eq!(output, "from beta");
}
