use super::error::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;

/// How a tool provider is reached. Selected once at configuration-parse
/// time; the registry builds the matching channel from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Point-to-point streamed HTTP: JSON-RPC over POST.
    StreamableHttp,
    /// Server-push event stream with POSTed requests.
    Sse,
    /// Locally spawned subprocess speaking JSON-RPC over standard pipes.
    Stdio,
}

/// One tool provider's configuration, immutable for the registry's lifetime.
#[derive(Debug, Clone)]
pub struct ToolProviderConfig {
    pub name: String,
    pub transport: TransportKind,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub use_proxy: bool,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct RawProvider {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    use_proxy: bool,
    #[serde(default)]
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

impl RawProvider {
    pub(super) fn into_config(self, name: &str) -> Result<ToolProviderConfig, ConfigError> {
        // A configured command implies stdio even without an explicit type,
        // matching how operators tend to write these entries.
        let transport = match self.kind.as_deref() {
            Some("stdio") => TransportKind::Stdio,
            None | Some("") if !self.command.is_empty() => TransportKind::Stdio,
            Some("sse") => TransportKind::Sse,
            None | Some("") | Some("streamable_http") => TransportKind::StreamableHttp,
            Some(other) => {
                return Err(ConfigError::UnknownTransport {
                    provider: name.to_string(),
                    kind: other.to_string(),
                });
            }
        };

        match transport {
            TransportKind::Stdio if self.command.is_empty() => {
                return Err(ConfigError::MissingCommand {
                    provider: name.to_string(),
                });
            }
            TransportKind::StreamableHttp | TransportKind::Sse if self.url.is_empty() => {
                return Err(ConfigError::MissingUrl {
                    provider: name.to_string(),
                });
            }
            _ => {}
        }

        let expand = |s: &str| -> String {
            shellexpand::full(s)
                .map(|cow| cow.into_owned())
                .unwrap_or_else(|_| s.to_string())
        };

        Ok(ToolProviderConfig {
            name: name.to_string(),
            transport,
            url: self.url,
            headers: self
                .headers
                .into_iter()
                .map(|(k, v)| (k, expand(&v)))
                .collect(),
            use_proxy: self.use_proxy,
            command: expand(&self.command),
            args: self.args.iter().map(|arg| expand(arg)).collect(),
            env: self.env.into_iter().map(|(k, v)| (k, expand(&v))).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn raw(kind: Option<&str>, url: &str, command: &str) -> RawProvider {
        RawProvider {
            kind: kind.map(String::from),
            url: url.to_string(),
            headers: HashMap::new(),
            use_proxy: false,
            command: command.to_string(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    #[test]
    fn command_implies_stdio_transport() {
        let cfg = raw(None, "", "npx").into_config("search").unwrap();
        assert_eq!(cfg.transport, TransportKind::Stdio);
    }

    #[test]
    fn defaults_to_streamable_http() {
        let cfg = raw(None, "http://localhost:3000/rpc", "")
            .into_config("remote")
            .unwrap();
        assert_eq!(cfg.transport, TransportKind::StreamableHttp);
    }

    #[test]
    fn stdio_without_command_is_rejected() {
        let err = raw(Some("stdio"), "", "").into_config("broken").unwrap_err();
        assert!(matches!(err, ConfigError::MissingCommand { .. }));
    }

    #[test]
    fn network_transport_without_url_is_rejected() {
        let err = raw(Some("sse"), "", "").into_config("broken").unwrap_err();
        assert!(matches!(err, ConfigError::MissingUrl { .. }));
    }

    #[test]
    fn unknown_transport_is_rejected() {
        let err = raw(Some("carrier-pigeon"), "http://x", "")
            .into_config("broken")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTransport { .. }));
    }

    #[test]
    fn expands_env_vars_in_headers_and_command() {
        unsafe {
            env::set_var("CONVOKE_TEST_KEY", "secret-123");
        }
        let mut provider = raw(Some("streamable_http"), "http://localhost:1234", "");
        provider
            .headers
            .insert("Authorization".into(), "Bearer ${CONVOKE_TEST_KEY}".into());
        let cfg = provider.into_config("auth").unwrap();
        assert_eq!(cfg.headers["Authorization"], "Bearer secret-123");
        unsafe {
            env::remove_var("CONVOKE_TEST_KEY");
        }
    }
}
