use super::error::ConfigError;
use super::model::ModelConfig;
use super::provider::RawProvider;
use super::push::PushConfig;
use super::{AppConfig, CONFIG_PATH, PersonaConfig, ProxyConfig};
use dotenvy::from_filename;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Once;
use tracing::debug;

static ENV_LOADER: Once = Once::new();

/// Raw configuration structure for deserialization from TOML
#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    model: ModelConfig,
    #[serde(default)]
    proxy: Option<ProxyConfig>,
    #[serde(default)]
    providers: HashMap<String, RawProvider>,
    #[serde(default)]
    push: Option<PushConfig>,
    #[serde(default)]
    allowed_users: Vec<String>,
    #[serde(default)]
    allowed_platforms: HashMap<String, Vec<String>>,
    #[serde(default)]
    platform_prompts: HashMap<String, String>,
    #[serde(default)]
    personas: HashMap<String, PersonaConfig>,
}

/// Ensures environment variables are loaded from config/.env
fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        let _ = from_filename("config/.env");
    });
}

/// Load and validate configuration from a file path
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    ensure_env_loaded();
    let config_path = path.unwrap_or_else(|| Path::new(CONFIG_PATH));
    read_config(config_path)
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    debug!(path = %path.display(), "Reading configuration file");

    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let parsed: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_and_build(parsed)
}

fn validate_and_build(parsed: RawConfig) -> Result<AppConfig, ConfigError> {
    if parsed.model.base_url.is_empty() {
        return Err(ConfigError::MissingBaseUrl);
    }
    if parsed.model.model.is_empty() {
        return Err(ConfigError::MissingModel);
    }

    let mut providers = HashMap::new();
    for (name, raw) in parsed.providers {
        let provider = raw.into_config(&name)?;
        providers.insert(name, provider);
    }

    let platform_prompts = parsed
        .platform_prompts
        .into_iter()
        .map(|(platform, prompt)| (platform.to_ascii_lowercase(), prompt))
        .collect();

    Ok(AppConfig {
        model: parsed.model,
        proxy: parsed.proxy.unwrap_or_default(),
        providers,
        push: parsed.push.unwrap_or_default(),
        allowed_users: parsed.allowed_users,
        allowed_platforms: parsed
            .allowed_platforms
            .into_iter()
            .map(|(platform, ids)| (platform.to_ascii_lowercase(), ids))
            .collect(),
        platform_prompts,
        personas: parsed.personas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn loads_full_configuration() {
        let file = write_config(
            r#"
            [model]
            provider = "openai"
            base_url = "https://api.example.com/v1"
            api_key = "sk-test"
            model = "gpt-test"
            default_prompt = "You are helpful."

            [proxy]
            url = "http://127.0.0.1:7890"

            [providers.news]
            type = "streamable_http"
            url = "http://localhost:3001/rpc"
            use_proxy = true

            [providers.search]
            command = "npx"
            args = ["search-tools"]

            [providers.feed]
            type = "sse"
            url = "http://localhost:3002/events"

            [push]
            enabled = true
            time = "08:00"
            targets = ["telegram:123"]
            prompt = "Summarize today's news"

            allowed_users = ["u1"]

            [platform_prompts]
            Telegram = "use markdown"
            "#,
        );

        let cfg = load_config(Some(file.path())).expect("config loads");
        assert_eq!(cfg.model.model, "gpt-test");
        assert_eq!(cfg.proxy.url, "http://127.0.0.1:7890");
        assert_eq!(cfg.providers.len(), 3);
        assert_eq!(cfg.providers["news"].transport, TransportKind::StreamableHttp);
        assert_eq!(cfg.providers["search"].transport, TransportKind::Stdio);
        assert_eq!(cfg.providers["feed"].transport, TransportKind::Sse);
        assert!(cfg.push.enabled);
        assert_eq!(cfg.push.time, "08:00");
        assert_eq!(cfg.platform_prompt("telegram"), Some("use markdown"));
    }

    #[test]
    fn rejects_missing_model_fields() {
        let file = write_config("[model]\nbase_url = \"https://x\"\n");
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingModel));
    }

    #[test]
    fn missing_file_yields_not_found() {
        let err = load_config(Some(Path::new("/nonexistent/convoke.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
