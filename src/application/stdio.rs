//! Interactive console front-end.
//!
//! Plain lines run a conversation; slash commands manage per-user model
//! overrides and inspect the registry. The console behaves like any other
//! chat platform: it has a platform name, a user id, and goes through the
//! same allow list and override store.

use crate::application::orchestrator::{ConversationLoop, RunOptions};
use crate::application::registry::SessionRegistry;
use crate::config::{AppConfig, ModelConfig};
use crate::domain::ChatMessage;
use crate::infrastructure::storage::OverrideStore;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

const PLATFORM: &str = "stdio";
const RUN_DEADLINE: Duration = Duration::from_secs(120);
const FALLBACK_PROMPT: &str = "You are a helpful assistant.";
const NEWS_PERSONA: &str =
    "You are a professional news anchor. Fetch the latest news and summarize it clearly.";
const NEWS_REQUEST: &str =
    "Search for today's latest news and summarize the key stories as a list.";
const SET_AI_USAGE: &str = "usage: /set_ai key=YOUR_KEY model=MODEL_NAME url=API_URL";

#[derive(Debug, Error)]
pub enum StdioError {
    #[error("stdin/stdout I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ConsoleFrontEnd {
    config: AppConfig,
    engine: Arc<ConversationLoop>,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn OverrideStore>,
    user_id: String,
}

impl ConsoleFrontEnd {
    pub fn new(
        config: AppConfig,
        engine: Arc<ConversationLoop>,
        registry: Arc<SessionRegistry>,
        store: Arc<dyn OverrideStore>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            config,
            engine,
            registry,
            store,
            user_id: user_id.into(),
        }
    }

    pub async fn run(&self) -> Result<(), StdioError> {
        let stdin = BufReader::new(io::stdin());
        let mut lines = stdin.lines();
        let mut stdout = io::stdout();

        write_line(
            &mut stdout,
            "ready. commands: /tools /health /news /set_ai /reset_ai /exit",
        )
        .await?;

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "/exit" {
                break;
            }
            let reply = self.dispatch(line).await;
            write_line(&mut stdout, &reply).await?;
        }
        info!("console session ended");
        Ok(())
    }

    async fn dispatch(&self, line: &str) -> String {
        if !self.allowed() {
            warn!(user = %self.user_id, "rejected message from user outside the allow list");
            return "you are not on the allow list".to_string();
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        match command {
            "/tools" => self.render_tools(),
            "/health" => self.render_health(),
            "/news" => self.news().await,
            "/set_ai" => self.set_ai(rest),
            "/reset_ai" => self.reset_ai(),
            other if other.starts_with('/') => format!("unknown command '{other}'"),
            _ => self.chat(line).await,
        }
    }

    /// The console is open when no allow list is configured at all;
    /// otherwise the usual platform/global lists apply.
    fn allowed(&self) -> bool {
        if self.config.allowed_users.is_empty() && self.config.allowed_platforms.is_empty() {
            return true;
        }
        self.config.is_allowed(PLATFORM, &self.user_id)
    }

    fn storage_key(&self) -> String {
        format!("{PLATFORM}:{}", self.user_id)
    }

    fn active_model(&self) -> ModelConfig {
        self.store
            .get(&self.storage_key())
            .unwrap_or_else(|| self.config.model.clone())
    }

    async fn chat(&self, text: &str) -> String {
        let model = self.active_model();
        let prompt = self
            .config
            .persona_prompt(&self.storage_key())
            .map(str::to_string)
            .unwrap_or_else(|| {
                if model.default_prompt.is_empty() {
                    FALLBACK_PROMPT.to_string()
                } else {
                    model.default_prompt.clone()
                }
            });

        let transcript = vec![ChatMessage::system(prompt), ChatMessage::user(text)];
        let options = RunOptions {
            formatting_instruction: self.config.platform_prompt(PLATFORM).map(str::to_string),
            ..RunOptions::default()
        };
        self.run_bounded(&model, transcript, options).await
    }

    async fn news(&self) -> String {
        let model = self.active_model();
        let transcript = vec![
            ChatMessage::system(NEWS_PERSONA),
            ChatMessage::user(NEWS_REQUEST),
        ];
        self.run_bounded(&model, transcript, RunOptions::default())
            .await
    }

    async fn run_bounded(
        &self,
        model: &ModelConfig,
        transcript: Vec<ChatMessage>,
        options: RunOptions,
    ) -> String {
        match tokio::time::timeout(RUN_DEADLINE, self.engine.run(model, transcript, options)).await
        {
            Ok(Ok(answer)) if answer.trim().is_empty() => "(the model returned no text)".into(),
            Ok(Ok(answer)) => answer,
            Ok(Err(err)) => format!("conversation failed: {err}"),
            Err(_) => format!("request timed out after {}s", RUN_DEADLINE.as_secs()),
        }
    }

    fn set_ai(&self, args: &str) -> String {
        if args.split_whitespace().next().is_none() {
            return SET_AI_USAGE.to_string();
        }
        let base = self.active_model();
        let updated = apply_overrides(base, args);
        match self.store.set(&self.storage_key(), updated) {
            Ok(()) => "model settings updated".to_string(),
            Err(err) => format!("failed to save settings: {err}"),
        }
    }

    fn reset_ai(&self) -> String {
        match self.store.clear(&self.storage_key()) {
            Ok(()) => "model settings reset to the global default".to_string(),
            Err(err) => format!("failed to reset settings: {err}"),
        }
    }

    fn render_tools(&self) -> String {
        let tools = self.registry.list_tools();
        if tools.is_empty() {
            return "no tools registered".to_string();
        }
        let mut lines: Vec<String> = tools
            .iter()
            .map(|tool| format!("{} - {}", tool.name(), tool.function.description))
            .collect();
        lines.sort();
        lines.join("\n")
    }

    fn render_health(&self) -> String {
        let health = self.registry.health_check();
        if health.is_empty() {
            return "no providers connected".to_string();
        }
        let mut lines: Vec<String> = health
            .iter()
            .map(|(provider, healthy)| {
                format!(
                    "{provider}: {}",
                    if *healthy { "healthy" } else { "unhealthy" }
                )
            })
            .collect();
        lines.sort();
        lines.join("\n")
    }
}

/// Fold `key=value` pairs into a model configuration. Unknown keys and
/// bare words are ignored.
fn apply_overrides(mut config: ModelConfig, args: &str) -> ModelConfig {
    for pair in args.split_whitespace() {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "key" | "api_key" => config.api_key = value.to_string(),
            "model" => config.model = value.to_string(),
            "url" | "base_url" => config.base_url = value.to_string(),
            "provider" => config.provider = value.to_string(),
            _ => {}
        }
    }
    config
}

async fn write_line(stdout: &mut io::Stdout, text: &str) -> Result<(), StdioError> {
    stdout.write_all(text.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
