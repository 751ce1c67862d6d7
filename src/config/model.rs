use serde::{Deserialize, Serialize};

/// Model-endpoint settings. This is both the static default loaded from the
/// config file and the value type of per-user overrides, so it serializes
/// round-trip through the override store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub default_prompt: String,
}
