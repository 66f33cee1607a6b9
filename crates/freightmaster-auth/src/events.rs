//! Session lifecycle notifications
//!
//! The core never navigates. It reports lifecycle changes on a broadcast
//! channel and the host application decides what to show: the landing view
//! after `Authenticated`, the login prompt after `Expired` or `LoggedOut`.

use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Code exchange succeeded and tokens were stored
    Authenticated,
    /// Refresh failed after a 401; tokens were wiped and the user must log in again
    Expired,
    /// The user signed out
    LoggedOut,
}

/// Cloneable sender side of the session event channel.
#[derive(Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no listener is not an error.
    pub fn emit(&self, event: SessionEvent) {
        match self.tx.send(event) {
            Ok(listeners) => debug!(?event, listeners, "session event emitted"),
            Err(_) => debug!(?event, "session event emitted with no listeners"),
        }
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let events = SessionEvents::new();
        let mut rx = events.subscribe();

        events.emit(SessionEvent::Authenticated);
        events.emit(SessionEvent::Expired);

        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Authenticated);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Expired);
    }

    #[test]
    fn emit_without_listeners_does_not_panic() {
        SessionEvents::new().emit(SessionEvent::LoggedOut);
    }
}
