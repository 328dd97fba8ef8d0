use async_trait::async_trait;
use tracing::info;

use crate::events::Event;

/// Delivery side of domain events (email, push, webhooks). Implementations
/// must not fail the caller; delivery problems are theirs to log.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &Event);
}

/// Writes every event to the log as structured JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &Event) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        info!(event = event.name(), %payload, "notification dispatched");
    }
}
