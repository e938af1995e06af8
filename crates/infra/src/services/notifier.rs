use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::info;

use procureflow_core::{AggregateId, BusinessId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A mirrored request landed in the seller's inbox.
    OrderSent,
    /// The supplier is not on the network; someone has to send the order by hand.
    ManualDispatch,
    RequestProcessed,
    RequestShipped,
    RequestCompleted,
    RequestRejected,
    GoodsReceived,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::OrderSent => "order_sent",
            NotificationKind::ManualDispatch => "manual_dispatch",
            NotificationKind::RequestProcessed => "request_processed",
            NotificationKind::RequestShipped => "request_shipped",
            NotificationKind::RequestCompleted => "request_completed",
            NotificationKind::RequestRejected => "request_rejected",
            NotificationKind::GoodsReceived => "goods_received",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Business the notification is sent on behalf of.
    pub sender: BusinessId,
    /// Partner id (buyer side) or business id (seller side) of the recipient.
    pub recipient: String,
    pub kind: NotificationKind,
    /// Order or request the notification is about.
    pub document_id: AggregateId,
}

/// Fire-and-forget delivery. Implementations must not block on the recipient.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    fn notify(&self, notification: Notification) {
        (**self).notify(notification)
    }
}

/// Writes notifications to the log; the default when no chat service is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            sender = %notification.sender,
            recipient = %notification.recipient,
            kind = notification.kind.as_str(),
            document_id = %notification.document_id,
            "notification dispatched"
        );
    }
}

/// Keeps every notification in memory for inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.sent().into_iter().filter(|n| n.kind == kind).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }
}
