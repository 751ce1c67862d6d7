use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path:?}")]
    NotFound { path: PathBuf },

    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required field 'model.base_url' in configuration")]
    MissingBaseUrl,

    #[error("missing required field 'model.model' in configuration")]
    MissingModel,

    #[error("provider '{provider}' uses a stdio transport but has no 'command'")]
    MissingCommand { provider: String },

    #[error("provider '{provider}' uses a network transport but has no 'url'")]
    MissingUrl { provider: String },

    #[error("provider '{provider}' has unknown transport kind '{kind}'")]
    UnknownTransport { provider: String, kind: String },
}
