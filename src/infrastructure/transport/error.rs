use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to spawn provider '{provider}': {source}")]
    Spawn {
        provider: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to connect to provider '{provider}': {message}")]
    Connect { provider: String, message: String },
    #[error("provider '{provider}' transport error: {message}")]
    Transport { provider: String, message: String },
    #[error("provider '{provider}' returned invalid JSON: {source}")]
    InvalidJson {
        provider: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("provider '{provider}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        provider: String,
        code: i64,
        message: String,
    },
    #[error("provider '{provider}' channel terminated unexpectedly")]
    Terminated { provider: String },
    #[error("request to provider '{provider}' timed out after {seconds}s")]
    TimedOut { provider: String, seconds: u64 },
}
