//! Daily scheduled broadcast.
//!
//! The driver sleeps until the configured local fire time, runs one
//! conversation with the broadcast prompt, and fans the answer out to the
//! configured targets. A guard delay after each firing keeps a slow wall
//! clock from firing twice at the boundary.

use crate::application::orchestrator::{ConversationLoop, RunOptions};
use crate::config::{ModelConfig, PushConfig};
use crate::domain::ChatMessage;
use crate::infrastructure::delivery::{DeliveryTarget, MessageSink};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveTime, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

const GUARD_DELAY: Duration = Duration::from_secs(60);
const BROADCAST_PERSONA: &str = "You are a news reporter.";

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("malformed fire time '{0}' (expected HH:MM)")]
    MalformedTime(String),
    #[error("fire time '{0}' does not exist in the local timezone")]
    Unrepresentable(String),
}

/// Next instant the broadcast should fire: today at `fire_time` when that
/// is still ahead of `now`, otherwise the same time tomorrow. An exactly
/// equal instant deliberately counts as "today", i.e. the driver fires
/// immediately; the post-fire guard delay keeps that from double-firing.
pub fn next_fire_at(
    now: DateTime<Local>,
    fire_time: &str,
) -> Result<DateTime<Local>, ScheduleError> {
    let time = NaiveTime::parse_from_str(fire_time, "%H:%M")
        .map_err(|_| ScheduleError::MalformedTime(fire_time.to_string()))?;

    let mut next = now.date_naive().and_time(time);
    if next < now.naive_local() {
        next += ChronoDuration::days(1);
    }
    Local
        .from_local_datetime(&next)
        .earliest()
        .ok_or_else(|| ScheduleError::Unrepresentable(fire_time.to_string()))
}

pub struct BroadcastDriver {
    engine: Arc<ConversationLoop>,
    sink: Arc<dyn MessageSink>,
    model: ModelConfig,
    push: PushConfig,
}

impl BroadcastDriver {
    pub fn new(
        engine: Arc<ConversationLoop>,
        sink: Arc<dyn MessageSink>,
        model: ModelConfig,
        push: PushConfig,
    ) -> Self {
        Self {
            engine,
            sink,
            model,
            push,
        }
    }

    /// Drive the fire/sleep cycle until the task is dropped. A malformed
    /// fire time stops this loop only; the host process keeps running.
    pub async fn run(self) {
        loop {
            let now = Local::now();
            let next = match next_fire_at(now, &self.push.time) {
                Ok(next) => next,
                Err(err) => {
                    error!(%err, "broadcast driver stopping");
                    return;
                }
            };
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next_run = %next, "broadcast scheduled");
            tokio::time::sleep(wait).await;

            self.fire_once().await;
            tokio::time::sleep(GUARD_DELAY).await;
        }
    }

    async fn fire_once(&self) {
        info!("running scheduled broadcast");
        let transcript = vec![
            ChatMessage::system(BROADCAST_PERSONA),
            ChatMessage::user(&self.push.prompt),
        ];

        let answer = match self
            .engine
            .run(&self.model, transcript, RunOptions::default())
            .await
        {
            Ok(answer) => answer,
            Err(err) => {
                error!(%err, "broadcast generation failed");
                return;
            }
        };
        if answer.trim().is_empty() {
            warn!("broadcast produced no content; nothing delivered");
            return;
        }

        for raw in &self.push.targets {
            let target = match DeliveryTarget::parse(raw) {
                Ok(target) => target,
                Err(err) => {
                    warn!(%err, "skipping malformed broadcast target");
                    continue;
                }
            };
            info!(to = %target, "delivering broadcast");
            if let Err(err) = self.sink.deliver(&target, &answer).await {
                warn!(to = %target, %err, "broadcast delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 10, hour, minute, 0).unwrap()
    }

    #[test]
    fn fire_time_still_ahead_fires_today() {
        let next = next_fire_at(at(8, 0), "09:30").unwrap();
        assert_eq!(next, at(9, 30));
    }

    #[test]
    fn fire_time_already_past_fires_tomorrow() {
        let next = next_fire_at(at(10, 0), "09:30").unwrap();
        assert_eq!(next, at(9, 30) + ChronoDuration::days(1));
    }

    #[test]
    fn fire_time_exactly_now_fires_immediately() {
        let now = at(9, 30);
        assert_eq!(next_fire_at(now, "09:30").unwrap(), now);
    }

    #[test]
    fn malformed_fire_time_is_rejected() {
        for bad in ["9am", "99:99", "0930", "09:30:00", ""] {
            let err = next_fire_at(at(8, 0), bad).unwrap_err();
            assert!(matches!(err, ScheduleError::MalformedTime(_)), "{bad}");
        }
    }
}
