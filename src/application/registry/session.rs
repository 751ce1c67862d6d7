use crate::config::ToolProviderConfig;
use crate::infrastructure::transport::ToolChannel;
use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};

/// A session becomes unhealthy once this many invocations in a row have
/// exhausted their attempts.
pub const FAIL_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Default)]
pub struct Health {
    pub last_used_at: Option<DateTime<Local>>,
    pub consecutive_failures: u32,
    pub closed: bool,
}

/// One live provider connection plus its bookkeeping. Health fields are
/// guarded by a per-session lock so concurrent invocations against
/// different providers never serialize on each other.
pub struct Session {
    pub provider_name: String,
    pub config: ToolProviderConfig,
    pub channel: Arc<dyn ToolChannel>,
    health: Mutex<Health>,
}

impl Session {
    pub fn new(config: ToolProviderConfig, channel: Arc<dyn ToolChannel>) -> Self {
        Self {
            provider_name: config.name.clone(),
            config,
            channel,
            health: Mutex::new(Health::default()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.health.lock().expect("session health lock").closed
    }

    /// Healthy means open and below the consecutive-failure threshold.
    pub fn is_healthy(&self) -> bool {
        let health = self.health.lock().expect("session health lock");
        !health.closed && health.consecutive_failures < FAIL_THRESHOLD
    }

    pub fn mark_closed(&self) {
        self.health.lock().expect("session health lock").closed = true;
    }

    pub fn record_success(&self) {
        let mut health = self.health.lock().expect("session health lock");
        health.consecutive_failures = 0;
        health.last_used_at = Some(Local::now());
    }

    /// One increment per exhausted invocation, regardless of how many
    /// attempts it burned.
    pub fn record_failure(&self) {
        let mut health = self.health.lock().expect("session health lock");
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
    }

    pub fn health(&self) -> Health {
        self.health.lock().expect("session health lock").clone()
    }
}
