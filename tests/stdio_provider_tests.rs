// End-to-end registry tests against a real subprocess provider.
//
// The provider is a small shell script speaking line-delimited JSON-RPC:
// it answers the handshake, advertises one tool, and serves a single call.

use convoke::application::registry::{RegistryError, SessionRegistry};
use convoke::config::{ProxyConfig, ToolProviderConfig, TransportKind};
use serde_json::json;
use std::collections::HashMap;

const FAKE_PROVIDER: &str = r#"
read a; echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-06-18","serverInfo":{"name":"fake","version":"1.0.0"}}}'
read b
read c; echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo","description":"echoes back","inputSchema":{"type":"object","properties":{}}}]}}'
read d; echo '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"hello from fake provider"}]}}'
"#;

fn fake_provider_config(name: &str, script: &str) -> ToolProviderConfig {
    ToolProviderConfig {
        name: name.to_string(),
        transport: TransportKind::Stdio,
        url: String::new(),
        headers: HashMap::new(),
        use_proxy: false,
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        env: HashMap::new(),
    }
}

#[tokio::test]
async fn discovers_and_calls_a_subprocess_tool() {
    let registry = SessionRegistry::new(ProxyConfig::default());
    let tools = registry
        .connect_server(&fake_provider_config("fake", FAKE_PROVIDER))
        .await
        .expect("provider connects");
    assert_eq!(tools, 1);

    let catalog = registry.list_tools();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].name(), "echo");

    let output = registry
        .call_tool("echo", json!({"message": "hi"}))
        .await
        .expect("tool call succeeds");
    assert_eq!(output, "hello from fake provider");

    registry.close_all().await;
    let err = registry.call_tool("echo", json!({})).await.unwrap_err();
    assert!(matches!(err, RegistryError::SessionClosed { .. }));
}

#[tokio::test]
async fn unlaunchable_command_reports_connect_failure() {
    let registry = SessionRegistry::new(ProxyConfig::default());
    let mut config = fake_provider_config("broken", FAKE_PROVIDER);
    config.command = "/nonexistent/provider-binary".to_string();

    let err = registry.connect_server(&config).await.unwrap_err();
    assert!(matches!(err, RegistryError::ConnectFailed { .. }));
    assert!(registry.list_tools().is_empty());
}

#[tokio::test]
async fn provider_that_exits_mid_handshake_is_rejected() {
    let registry = SessionRegistry::new(ProxyConfig::default());
    let config = fake_provider_config("flaky", "exit 0");

    let err = registry.connect_server(&config).await.unwrap_err();
    assert!(matches!(err, RegistryError::ConnectFailed { .. }));
}
