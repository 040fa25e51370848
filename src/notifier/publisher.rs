//! Detached notification delivery.
//!
//! The crank hands events to an unbounded channel and never awaits delivery. A
//! background task drains the channel and publishes; publish errors are logged at
//! debug level and otherwise discarded.

use kanal::{unbounded_async, AsyncSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, span, Instrument, Level};

use super::variant::NotifierVariant;
use crate::traits::Notifier;
use crate::types::RoundEvent;

/// Sending half of the notification pipeline.
#[derive(Clone)]
pub struct NotificationPublisher {
    tx: AsyncSender<RoundEvent>,
}

impl NotificationPublisher {
    /// Spawn the delivery task. Must be called from within a tokio runtime.
    pub fn spawn(notifier: NotifierVariant) -> (Self, JoinHandle<()>) {
        let (tx, rx) = unbounded_async::<RoundEvent>();

        let handle = tokio::spawn(
            async move {
                info!("Notification task started (notifier={})", notifier.name());
                while let Ok(event) = rx.recv().await {
                    if let Err(e) = notifier.publish(&event).await {
                        debug!(
                            round_id = event.round_id(),
                            "Notification dropped: {}", e
                        );
                    }
                }
                info!("Notification task finished (channel closed)");
            }
            .instrument(span!(Level::INFO, "notification_task")),
        );

        (Self { tx }, handle)
    }

    /// Queue an event. Never blocks; a closed pipeline drops the event.
    pub fn publish(&self, event: RoundEvent) {
        let round_id = event.round_id();
        match self.tx.try_send(event) {
            Ok(true) => {}
            Ok(false) | Err(_) => debug!(round_id, "Notification pipeline unavailable, event dropped"),
        }
    }
}
