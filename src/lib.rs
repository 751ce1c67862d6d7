pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::orchestrator::{ConversationLoop, EngineError, RunOptions};
pub use application::registry::SessionRegistry;
pub use application::scheduler::BroadcastDriver;
pub use config::AppConfig;
