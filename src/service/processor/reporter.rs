use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::models::StatusEvent;

/// Event name for every record status transition.
pub const STATUS_EVENT: &str = "analysis:status";

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// Fire-and-forget fan-out of status events.
///
/// `emit` must not block and must not fail the caller.
pub trait Notifier: Send + Sync {
    fn emit(&self, event: &str, payload: &StatusEvent);
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotifierEvent {
    pub name: String,
    pub payload: StatusEvent,
}

/// In-process notifier backed by a `tokio::sync::broadcast` channel.
///
/// Slow subscribers lose the oldest events (`RecvError::Lagged`); there is no replay.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<NotifierEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotifierEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier for BroadcastNotifier {
    fn emit(&self, event: &str, payload: &StatusEvent) {
        trace!(record_id = %payload.id, status = %payload.status, "Emitting {}", event);
        // SendError only means nobody is listening.
        let _ = self.sender.send(NotifierEvent {
            name: event.to_string(),
            payload: payload.clone(),
        });
    }
}
