use serde::Deserialize;

/// Scheduled broadcast settings: a daily fire time and the delivery targets
/// the result fans out to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Local fire time, "HH:MM".
    #[serde(default)]
    pub time: String,
    /// "platform:recipient" pairs, e.g. "telegram:123" or "qq:group:456".
    #[serde(default)]
    pub targets: Vec<String>,
    /// Prompt seeding the unattended conversation run.
    #[serde(default)]
    pub prompt: String,
}
