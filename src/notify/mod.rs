//! Notification Emitter
//!
//! Fire-and-forget events for users, the operator channel and broadcast
//! subscribers. The core never reads a notification back and never waits on
//! delivery: [`ChannelNotifier::emit`] is a non-blocking `try_send` into a
//! bounded queue drained by [`NotificationDispatcher`].

use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core_types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "user_id", rename_all = "snake_case")]
pub enum Recipient {
    User(UserId),
    /// Human operator / support queue
    Operator,
    /// Everyone watching the offer board
    Broadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OfferAccepted,
    OfferWithdrawn,
    EscrowAwaitingDeposit,
    EscrowFunded,
    EscrowOverfunded,
    PaymentSubmitted,
    PaymentConfirmed,
    TradeCompleted,
    TradeCancelled,
    TradeDisputed,
    ReleaseFailed,
    VendorJobAssigned,
    VendorPaymentSubmitted,
    VendorPaymentConfirmed,
    HandoffStarted,
    HandoffCompleted,
    VerificationLocked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

impl Notification {
    pub fn new(recipient: Recipient, kind: NotificationKind, payload: serde_json::Value) -> Self {
        Self {
            recipient,
            kind,
            payload,
        }
    }

    pub fn user(user_id: UserId, kind: NotificationKind, payload: serde_json::Value) -> Self {
        Self::new(Recipient::User(user_id), kind, payload)
    }

    pub fn operator(kind: NotificationKind, payload: serde_json::Value) -> Self {
        Self::new(Recipient::Operator, kind, payload)
    }
}

pub trait NotificationEmitter: Send + Sync {
    /// Queue for delivery. Never blocks, never fails the caller.
    fn emit(&self, notification: Notification);

    fn emit_all(&self, notifications: Vec<Notification>) {
        for n in notifications {
            self.emit(n);
        }
    }
}

/// Sender half: bounded queue, drops on overflow with a warning
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl NotificationEmitter for ChannelNotifier {
    fn emit(&self, notification: Notification) {
        if let Err(e) = self.tx.try_send(notification) {
            warn!(error = %e, "Notification dropped");
        }
    }
}

/// Receiver half: logs every notification and optionally POSTs it to a webhook
pub struct NotificationDispatcher {
    rx: mpsc::Receiver<Notification>,
    webhook: Option<(reqwest::Client, String)>,
}

/// Create a notifier pair with the given queue capacity
pub fn notification_channel(
    buffer: usize,
    webhook_url: Option<String>,
) -> (ChannelNotifier, NotificationDispatcher) {
    let (tx, rx) = mpsc::channel(buffer);
    let webhook = webhook_url.and_then(|url| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map(|client| (client, url))
            .map_err(|e| warn!(error = %e, "Notification webhook disabled"))
            .ok()
    });
    (ChannelNotifier { tx }, NotificationDispatcher { rx, webhook })
}

impl NotificationDispatcher {
    /// Drain until every sender is dropped
    pub async fn run(mut self) {
        info!(webhook = self.webhook.is_some(), "Notification dispatcher started");
        while let Some(n) = self.rx.recv().await {
            self.deliver(&n).await;
        }
        debug!("Notification dispatcher stopped");
    }

    async fn deliver(&self, n: &Notification) {
        match n.recipient {
            Recipient::Operator => {
                warn!(kind = ?n.kind, payload = %n.payload, "Operator notification")
            }
            _ => info!(recipient = ?n.recipient, kind = ?n.kind, "Notification"),
        }

        if let Some((client, url)) = &self.webhook
            && let Err(e) = client.post(url).json(n).send().await
        {
            warn!(error = %e, kind = ?n.kind, "Notification webhook delivery failed");
        }
    }
}

#[cfg(any(test, feature = "mock-api"))]
pub use recording::RecordingNotifier;

#[cfg(any(test, feature = "mock-api"))]
mod recording {
    use super::{Notification, NotificationEmitter, NotificationKind, Recipient};
    use std::sync::Mutex;

    /// Keeps every emitted notification for assertions
    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn all(&self) -> Vec<Notification> {
            self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        pub fn count(&self, kind: NotificationKind) -> usize {
            self.all().iter().filter(|n| n.kind == kind).count()
        }

        pub fn count_for(&self, recipient: Recipient, kind: NotificationKind) -> usize {
            self.all()
                .iter()
                .filter(|n| n.recipient == recipient && n.kind == kind)
                .count()
        }
    }

    impl NotificationEmitter for RecordingNotifier {
        fn emit(&self, notification: Notification) {
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_channel_delivers_in_order() {
        let (notifier, mut dispatcher) = notification_channel(8, None);
        notifier.emit(Notification::user(1, NotificationKind::OfferAccepted, json!({})));
        notifier.emit(Notification::operator(NotificationKind::TradeDisputed, json!({})));

        assert_eq!(
            dispatcher.rx.recv().await.unwrap().kind,
            NotificationKind::OfferAccepted
        );
        assert_eq!(
            dispatcher.rx.recv().await.unwrap().recipient,
            Recipient::Operator
        );
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (notifier, _dispatcher) = notification_channel(1, None);
        notifier.emit(Notification::user(1, NotificationKind::OfferAccepted, json!({})));
        notifier.emit(Notification::user(2, NotificationKind::OfferAccepted, json!({})));
    }

    #[test]
    fn test_recipient_serialization() {
        let v = serde_json::to_value(Recipient::User(42)).unwrap();
        assert_eq!(v, json!({"type": "user", "user_id": 42}));
        let v = serde_json::to_value(Recipient::Operator).unwrap();
        assert_eq!(v, json!({"type": "operator"}));
    }
}
