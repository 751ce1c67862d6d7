mod error;
mod loader;
mod model;
mod provider;
mod push;

pub use error::ConfigError;
pub use loader::load_config;
pub use model::ModelConfig;
pub use provider::{ToolProviderConfig, TransportKind};
pub use push::PushConfig;

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Default configuration path, relative to the working directory.
pub const CONFIG_PATH: &str = "config/convoke.toml";

/// Proxy routing shared by all providers that opt in via `use_proxy`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub url: String,
}

/// Per-user persona: a custom system prompt replacing the default one.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonaConfig {
    pub name: String,
    pub prompt: String,
}

/// Application configuration loaded once at process start; immutable for the
/// registry's lifetime.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub proxy: ProxyConfig,
    pub providers: HashMap<String, ToolProviderConfig>,
    pub push: PushConfig,
    pub allowed_users: Vec<String>,
    pub allowed_platforms: HashMap<String, Vec<String>>,
    pub platform_prompts: HashMap<String, String>,
    pub personas: HashMap<String, PersonaConfig>,
}

impl AppConfig {
    /// Load configuration from a file path (or the default path if None).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        loader::load_config(path)
    }

    /// Whether the platform-qualified user may talk to the engine. Checks
    /// the platform-specific list first, then the legacy global list.
    pub fn is_allowed(&self, platform: &str, user_id: &str) -> bool {
        let platform = platform.to_ascii_lowercase();
        if let Some(ids) = self.allowed_platforms.get(&platform) {
            if ids.iter().any(|id| id == user_id) {
                return true;
            }
        }
        self.allowed_users.iter().any(|id| id == user_id)
    }

    /// Persona prompt for a `platform:user` key, if one is configured.
    pub fn persona_prompt(&self, storage_key: &str) -> Option<&str> {
        self.personas
            .get(storage_key)
            .map(|persona| persona.prompt.as_str())
    }

    /// Final-formatting instruction for a platform, if one is configured.
    pub fn platform_prompt(&self, platform: &str) -> Option<&str> {
        self.platform_prompts
            .get(&platform.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            model: ModelConfig::default(),
            proxy: ProxyConfig::default(),
            providers: HashMap::new(),
            push: PushConfig::default(),
            allowed_users: vec!["global-1".into()],
            allowed_platforms: HashMap::from([(
                "telegram".to_string(),
                vec!["tg-1".to_string()],
            )]),
            platform_prompts: HashMap::from([(
                "telegram".to_string(),
                "keep it short".to_string(),
            )]),
            personas: HashMap::new(),
        }
    }

    #[test]
    fn allow_list_checks_platform_then_global() {
        let cfg = sample();
        assert!(cfg.is_allowed("Telegram", "tg-1"));
        assert!(cfg.is_allowed("telegram", "global-1"));
        assert!(cfg.is_allowed("qq", "global-1"));
        assert!(!cfg.is_allowed("qq", "tg-1"));
    }

    #[test]
    fn platform_prompt_lookup_is_case_insensitive() {
        let cfg = sample();
        assert_eq!(cfg.platform_prompt("Telegram"), Some("keep it short"));
        assert_eq!(cfg.platform_prompt("qq"), None);
    }
}
