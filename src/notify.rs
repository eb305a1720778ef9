//! Fire-and-forget notification delivery.
//!
//! Transitions hand events to a [`Notifier`], which only enqueues. A single
//! dispatcher task drains the queue into the [`NotificationSink`]; publish
//! failures and timeouts are logged and the event is dropped.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::models::notification::Notification;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, notification: &Notification) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Never blocks the caller. A full or closed queue drops the event.
    pub fn notify(&self, notification: Notification) {
        if let Err(e) = self.tx.try_send(notification) {
            let n = match &e {
                mpsc::error::TrySendError::Full(n) | mpsc::error::TrySendError::Closed(n) => n,
            };
            warn!(
                event = ?n.event_type,
                recipient = %n.recipient_id,
                "Dropping notification: {}",
                e
            );
        }
    }
}

pub async fn run_dispatcher(
    mut rx: mpsc::Receiver<Notification>,
    sink: Arc<dyn NotificationSink>,
    publish_timeout: Duration,
) {
    while let Some(notification) = rx.recv().await {
        match tokio::time::timeout(publish_timeout, sink.publish(&notification)).await {
            Ok(Ok(())) => debug!(
                event = ?notification.event_type,
                recipient = %notification.recipient_id,
                "Notification published"
            ),
            Ok(Err(e)) => error!(
                event = ?notification.event_type,
                recipient = %notification.recipient_id,
                "Failed to publish notification: {}",
                e
            ),
            Err(_) => error!(
                event = ?notification.event_type,
                recipient = %notification.recipient_id,
                "Timed out publishing notification after {:?}",
                publish_timeout
            ),
        }
    }
    debug!("Notification queue closed, dispatcher exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::EventType;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Mutex;

    struct FlakySink {
        published: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        async fn publish(&self, n: &Notification) -> anyhow::Result<()> {
            if n.recipient_id == "broken" {
                anyhow::bail!("broker unavailable");
            }
            self.published.lock().unwrap().push(n.recipient_id.clone());
            Ok(())
        }
    }

    fn event(recipient: &str) -> Notification {
        Notification::new(EventType::RideCreated, recipient, json!({}), Utc::now())
    }

    #[tokio::test]
    async fn failed_publish_does_not_stop_the_dispatcher() {
        let sink = Arc::new(FlakySink {
            published: Mutex::new(Vec::new()),
        });
        let (notifier, rx) = Notifier::new(8);

        notifier.notify(event("a"));
        notifier.notify(event("broken"));
        notifier.notify(event("b"));
        drop(notifier);

        run_dispatcher(rx, sink.clone(), Duration::from_secs(1)).await;

        assert_eq!(*sink.published.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (notifier, mut rx) = Notifier::new(1);
        notifier.notify(event("first"));
        notifier.notify(event("second"));

        assert_eq!(rx.recv().await.unwrap().recipient_id, "first");
        assert!(rx.try_recv().is_err());
    }
}
