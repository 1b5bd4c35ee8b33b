//! Best-effort e-mail notifications to branch admins.
//!
//! Delivery happens on the event worker after the triggering transaction has
//! committed. Failures are logged and never retried.

use crate::events::Event;
use crate::services::directory;
use async_trait::async_trait;
use futures::future::join_all;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument};

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Recipient lookup failed: {0}")]
    Lookup(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Relay rejected message with status {0}")]
    Rejected(u16),
}

/// Outbound message transport.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), NotificationError>;
}

/// Sink that only writes messages to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<(), NotificationError> {
        info!(to, subject, "notification (log sink)");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Sink that posts `{to, subject, html}` JSON to a mail relay.
#[derive(Debug, Clone)]
pub struct RelayNotificationSink {
    client: reqwest::Client,
    url: String,
}

impl RelayNotificationSink {
    pub fn new(url: impl Into<String>) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for RelayNotificationSink {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.url)
            .json(&RelayMessage { to, subject, html })
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Turns request events into messages for every active admin of the
/// request's branch.
pub struct BranchNotifier {
    db: Arc<DatabaseConnection>,
    sink: Arc<dyn NotificationSink>,
    subject_prefix: String,
}

impl BranchNotifier {
    pub fn new(
        db: Arc<DatabaseConnection>,
        sink: Arc<dyn NotificationSink>,
        subject_prefix: impl Into<String>,
    ) -> Self {
        Self {
            db,
            sink,
            subject_prefix: subject_prefix.into(),
        }
    }

    /// Subject (with prefix) and HTML message fragment for an event.
    pub fn render(&self, event: &Event) -> (String, String) {
        let (subject, message) = match event {
            Event::RequestApproved { code, .. } => (
                "Request approved",
                format!(
                    "Your request <b>{}</b> has been <b>APPROVED</b> by the central warehouse. Please wait for the goods to be shipped.",
                    code
                ),
            ),
            Event::RequestShipped { code, .. } => (
                "Goods on the way",
                format!(
                    "Your request <b>{}</b> is now <b>SHIPPED</b>. Please confirm receipt in the application once the goods arrive.",
                    code
                ),
            ),
            Event::RequestRejected { code, reason, .. } => (
                "Request rejected",
                format!(
                    "Your request <b>{}</b> has been <b>REJECTED</b> by the central warehouse.<br/><br/><b>Reason:</b> {}",
                    code, reason
                ),
            ),
        };
        (format!("{} {}", self.subject_prefix, subject), message)
    }

    pub fn render_html(admin_name: &str, message: &str) -> String {
        format!(
            r#"<div style="font-family: Arial, sans-serif; padding: 20px; border: 1px solid #eee; max-width: 600px;">
  <h3>Hello {admin_name},</h3>
  <p>{message}</p>
  <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;"/>
  <p style="font-size: 12px; color: #888;">Log in to the application to see the full details.</p>
</div>"#
        )
    }

    /// Sends the event's message to every active admin of its branch and
    /// returns how many deliveries succeeded.
    #[instrument(skip(self, event), fields(event = event.kind()))]
    pub async fn notify(&self, event: &Event) -> Result<usize, NotificationError> {
        let admins = directory::branch_admins(&*self.db, event.branch_id())
            .await
            .map_err(|e| NotificationError::Lookup(e.to_string()))?;

        if admins.is_empty() {
            info!(branch_id = %event.branch_id(), "no active branch admins to notify");
            return Ok(0);
        }

        let (subject, message) = self.render(event);
        let deliveries = admins.iter().map(|admin| {
            let html = Self::render_html(&admin.name, &message);
            let subject = subject.as_str();
            async move {
                let result = self.sink.send(&admin.email, subject, &html).await;
                if let Err(e) = &result {
                    error!(to = %admin.email, error = %e, "notification delivery failed");
                }
                result
            }
        });

        let delivered = join_all(deliveries)
            .await
            .into_iter()
            .filter(Result::is_ok)
            .count();
        Ok(delivered)
    }
}
