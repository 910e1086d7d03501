//! Alerting: markdown rendering and delivery

pub mod format;
pub mod webhook;

use async_trait::async_trait;

pub use format::{AlertFormatter, ChangesBySchema};
pub use webhook::WebhookSink;

/// Destination for rendered alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Returns whether the alert counts as delivered. Never errors.
    async fn deliver(&self, content: &str) -> bool;
}
