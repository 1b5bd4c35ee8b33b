use crate::notifications::BranchNotifier;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Queues an event emitted after a committed transaction without waiting
    /// for channel capacity. A full or closed channel drops the event with a
    /// warning; the business operation has already succeeded.
    pub fn send_or_log(&self, event: Event) {
        let kind = event.kind();
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(event = kind, "event channel full; dropping post-commit event");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(event = kind, "event channel closed; dropping post-commit event");
            }
        }
    }
}

/// Events emitted after a request transition commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    RequestApproved {
        request_id: Uuid,
        code: String,
        branch_id: Uuid,
    },
    RequestRejected {
        request_id: Uuid,
        code: String,
        branch_id: Uuid,
        reason: String,
    },
    RequestShipped {
        request_id: Uuid,
        code: String,
        branch_id: Uuid,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::RequestApproved { .. } => "request_approved",
            Event::RequestRejected { .. } => "request_rejected",
            Event::RequestShipped { .. } => "request_shipped",
        }
    }

    pub fn branch_id(&self) -> Uuid {
        match self {
            Event::RequestApproved { branch_id, .. }
            | Event::RequestRejected { branch_id, .. }
            | Event::RequestShipped { branch_id, .. } => *branch_id,
        }
    }
}

/// Notification worker. Runs until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, notifier: Arc<BranchNotifier>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!(event = event.kind(), branch_id = %event.branch_id(), "Received event");

        match notifier.notify(&event).await {
            Ok(delivered) => info!(
                event = event.kind(),
                delivered, "Branch admins notified"
            ),
            Err(e) => error!(
                event = event.kind(),
                error = %e,
                "Failed to notify branch admins"
            ),
        }
    }

    info!("Event channel closed; event processing loop stopped");
}
