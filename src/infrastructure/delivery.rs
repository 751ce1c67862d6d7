//! Outbound message delivery.
//!
//! The engine only knows how to address a message; actual platform adapters
//! live behind [`MessageSink`].

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("malformed delivery target '{0}' (expected 'platform:recipient')")]
    MalformedTarget(String),
    #[error("delivery to '{target}' failed: {message}")]
    Failed { target: String, message: String },
}

/// Address of one broadcast recipient. The recipient part may itself
/// contain colons; only the first one separates the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub platform: String,
    pub recipient: String,
}

impl DeliveryTarget {
    pub fn parse(raw: &str) -> Result<Self, DeliveryError> {
        let mut parts = raw.splitn(2, ':');
        match (parts.next(), parts.next()) {
            (Some(platform), Some(recipient)) if !platform.is_empty() && !recipient.is_empty() => {
                Ok(Self {
                    platform: platform.to_string(),
                    recipient: recipient.to_string(),
                })
            }
            _ => Err(DeliveryError::MalformedTarget(raw.to_string())),
        }
    }
}

impl fmt::Display for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.recipient)
    }
}

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, target: &DeliveryTarget, text: &str) -> Result<(), DeliveryError>;
}

/// Sink that writes broadcasts to the log instead of a chat platform.
/// Useful when no adapter is wired in.
pub struct LogSink;

#[async_trait]
impl MessageSink for LogSink {
    async fn deliver(&self, target: &DeliveryTarget, text: &str) -> Result<(), DeliveryError> {
        tracing::info!(to = %target, "broadcast:\n{text}");
        Ok(())
    }
}
