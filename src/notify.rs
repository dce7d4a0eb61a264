//! Fire-and-forget notification dispatch.
//!
//! Services enqueue jobs keyed by order id after their unit of work commits.
//! Delivery (email, admin alerts) happens in a consumer outside this crate.
//! Enqueue failures are logged and never undo committed state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Errors that can occur when enqueueing a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification queue is full")]
    QueueFull,

    #[error("Notification queue is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderConfirmation,
    PaymentSuccess,
    PaymentFailure,
    AdminNewOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub kind: NotificationKind,
    pub order_id: Uuid,
}

/// Destination for notification jobs. Implementations must not block on
/// delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, job: NotificationJob) -> Result<(), NotifyError>;

    /// Return the notifier name for logging.
    fn name(&self) -> &str;
}

/// Enqueue each kind for an order, logging failures instead of returning them.
pub async fn notify_all(notifier: &dyn Notifier, order_id: Uuid, kinds: &[NotificationKind]) {
    for &kind in kinds {
        if let Err(e) = notifier.notify(NotificationJob { kind, order_id }).await {
            warn!(
                notifier = %notifier.name(),
                %order_id,
                ?kind,
                error = %e,
                "Failed to enqueue notification"
            );
        }
    }
}

/// Bounded in-process queue. The receiving half is handed to the delivery
/// worker.
pub struct ChannelNotifier {
    sender: mpsc::Sender<NotificationJob>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<NotificationJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, job: NotificationJob) -> Result<(), NotifyError> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
        })
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// No-op notifier for tools and tests that do not deliver notifications.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, job: NotificationJob) -> Result<(), NotifyError> {
        debug!(
            order_id = %job.order_id,
            kind = ?job.kind,
            "Notification discarded (null notifier)"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_notifier_delivers_in_order() {
        let (notifier, mut receiver) = ChannelNotifier::new(4);
        let order_id = Uuid::new_v4();

        notify_all(
            &notifier,
            order_id,
            &[NotificationKind::OrderConfirmation, NotificationKind::AdminNewOrder],
        )
        .await;

        assert_eq!(receiver.recv().await.unwrap().kind, NotificationKind::OrderConfirmation);
        assert_eq!(receiver.recv().await.unwrap().kind, NotificationKind::AdminNewOrder);
    }

    #[tokio::test]
    async fn test_full_queue_reports_error() {
        let (notifier, _receiver) = ChannelNotifier::new(1);
        let job = NotificationJob {
            kind: NotificationKind::PaymentSuccess,
            order_id: Uuid::new_v4(),
        };
        notifier.notify(job.clone()).await.unwrap();
        assert!(matches!(notifier.notify(job).await, Err(NotifyError::QueueFull)));
    }

    #[tokio::test]
    async fn test_closed_queue_reports_error() {
        let (notifier, receiver) = ChannelNotifier::new(1);
        drop(receiver);
        let job = NotificationJob {
            kind: NotificationKind::PaymentFailure,
            order_id: Uuid::new_v4(),
        };
        assert!(matches!(notifier.notify(job).await, Err(NotifyError::Closed)));
    }

    #[tokio::test]
    async fn test_null_notifier() {
        let job = NotificationJob {
            kind: NotificationKind::OrderConfirmation,
            order_id: Uuid::new_v4(),
        };
        assert!(NullNotifier.notify(job).await.is_ok());
    }
}
