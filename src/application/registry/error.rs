use crate::infrastructure::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no provider registered tool '{tool}'")]
    ToolNotFound { tool: String },
    #[error("provider '{provider}' session is closed")]
    SessionClosed { provider: String },
    #[error("failed to connect provider '{provider}': {source}")]
    ConnectFailed {
        provider: String,
        #[source]
        source: TransportError,
    },
    #[error("tool discovery failed for provider '{provider}': {source}")]
    DiscoveryFailed {
        provider: String,
        #[source]
        source: TransportError,
    },
    #[error("tool '{tool}' on provider '{provider}' failed after {attempts} attempts: {source}")]
    InvocationFailed {
        provider: String,
        tool: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },
}
