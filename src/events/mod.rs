use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use metrics::counter;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::services::notifications::Notifier;

/// Domain events published after a state change has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    CartCleared {
        cart_id: Uuid,
        owner_id: Uuid,
    },
    OrderPlaced {
        order_id: Uuid,
        order_number: String,
        owner_id: Uuid,
        total_amount: i64,
        coupon_id: Option<Uuid>,
        placed_at: DateTime<Utc>,
    },
    OrderStatusChanged {
        order_id: Uuid,
        owner_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderUpdated {
        order_id: Uuid,
    },
    OrderDeleted {
        order_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::CartCleared { .. } => "cart_cleared",
            Event::OrderPlaced { .. } => "order_placed",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderUpdated { .. } => "order_updated",
            Event::OrderDeleted { .. } => "order_deleted",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("event channel closed: {0}")]
pub struct EventError(String);

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), EventError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| EventError(e.to_string()))
    }

    /// Fire-and-forget publish for callers whose state change already
    /// committed. Never waits on the channel: a full or closed channel drops
    /// the event with a warning.
    pub fn send_or_log(&self, event: Event) {
        let name = event.name();
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                counter!("storefront_events_dropped_total", 1, "reason" => "full");
                warn!(event = name, "event channel full; dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                counter!("storefront_events_dropped_total", 1, "reason" => "closed");
                warn!(event = name, "event channel closed; dropping event");
            }
        }
    }
}

/// Drains the event channel and hands each event to the notifier.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, notifier: Arc<dyn Notifier>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        notifier.notify(&event).await;
    }

    info!("Event channel closed; event processing loop stopped");
}
