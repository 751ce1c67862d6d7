use clap::{Parser, ValueEnum};
use convoke::application::orchestrator::{ConversationLoop, RunOptions};
use convoke::application::registry::SessionRegistry;
use convoke::application::scheduler::BroadcastDriver;
use convoke::application::stdio::ConsoleFrontEnd;
use convoke::config::AppConfig;
use convoke::domain::ChatMessage;
use convoke::infrastructure::delivery::LogSink;
use convoke::infrastructure::model::OpenAiEndpoint;
use convoke::infrastructure::storage::JsonFileStore;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_STORE_PATH: &str = "config/overrides.json";

#[derive(Parser, Debug)]
#[command(name = "convoke", version, about = "Tool-augmented conversation engine")]
struct Cli {
    /// Configuration file path (defaults to config/convoke.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Per-user override store path.
    #[arg(long, default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,
    /// User id the interactive console runs as.
    #[arg(long, default_value = "local")]
    user: String,
    #[arg(long, value_enum, default_value_t = RunMode::Stdio)]
    mode: RunMode,
    /// Prompt for `once` mode.
    prompt: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RunMode {
    /// Interactive console session.
    Stdio,
    /// Run a single prompt and exit.
    Once,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let cli = Cli::parse();
    info!("starting convoke");
    debug!(?cli.mode, config = ?cli.config, "CLI arguments parsed");

    let config = AppConfig::load(cli.config.as_deref())?;
    let registry = Arc::new(SessionRegistry::new(config.proxy.clone()));
    registry.connect_all(&config.providers).await;
    info!(tools = registry.list_tools().len(), "provider discovery finished");

    let endpoint = Arc::new(OpenAiEndpoint::new()?);
    let engine = Arc::new(ConversationLoop::new(registry.clone(), endpoint));
    let store = Arc::new(JsonFileStore::open(&cli.store)?);

    let broadcast = if config.push.enabled {
        info!(time = %config.push.time, targets = config.push.targets.len(), "broadcast driver enabled");
        let driver = BroadcastDriver::new(
            engine.clone(),
            Arc::new(LogSink),
            config.model.clone(),
            config.push.clone(),
        );
        Some(tokio::spawn(driver.run()))
    } else {
        None
    };

    match cli.mode {
        RunMode::Stdio => {
            let console = ConsoleFrontEnd::new(
                config.clone(),
                engine.clone(),
                registry.clone(),
                store,
                cli.user.clone(),
            );
            tokio::select! {
                result = console.run() => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received; shutting down");
                }
            }
        }
        RunMode::Once => {
            let prompt = cli.prompt.join(" ").trim().to_string();
            if prompt.is_empty() {
                return Err("prompt required in once mode".into());
            }
            let system = if config.model.default_prompt.is_empty() {
                "You are a helpful assistant.".to_string()
            } else {
                config.model.default_prompt.clone()
            };
            let transcript = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
            let answer = engine
                .run(&config.model, transcript, RunOptions::default())
                .await?;
            println!("{answer}");
        }
    }

    if let Some(task) = broadcast {
        task.abort();
    }
    registry.close_all().await;
    info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}
