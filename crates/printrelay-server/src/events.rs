// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Live event feed for front ends.
//
// A broadcast channel fans every state change and job outcome out to all
// current subscribers. There is no replay: a subscriber sees what happens
// after it subscribed. A subscriber that falls too far behind skips the
// events it missed and keeps going.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

use printrelay_core::types::{EventKind, RelayEvent};

/// Events buffered per subscriber before it starts losing the oldest.
pub const EVENT_CAPACITY: usize = 1024;

/// Publishing side of the event feed.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RelayEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Stamp and publish an event. Having no subscribers is fine.
    pub fn publish(&self, kind: EventKind) {
        let _ = self.tx.send(RelayEvent::now(kind));
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One subscriber's view of the event feed.
#[derive(Debug)]
pub struct EventStream {
    rx: broadcast::Receiver<RelayEvent>,
}

impl EventStream {
    /// Wait for the next event. `None` once the server is gone.
    pub async fn next(&mut self) -> Option<RelayEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber fell behind; skipping missed events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued.
    pub fn try_next(&mut self) -> Option<RelayEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber fell behind; skipping missed events");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printrelay_core::types::{ServerState, StateChange};

    fn change(to: ServerState) -> EventKind {
        EventKind::StateChange(StateChange {
            from: ServerState::Stopped,
            to,
            reason: None,
        })
    }

    #[tokio::test]
    async fn subscribers_only_see_later_events() {
        let bus = EventBus::default();
        bus.publish(change(ServerState::Starting));

        let mut stream = bus.subscribe();
        assert!(stream.try_next().is_none());

        bus.publish(change(ServerState::Listening));
        let event = stream.next().await.unwrap();
        assert_eq!(event.kind, change(ServerState::Listening));
    }

    #[tokio::test]
    async fn every_subscriber_gets_every_event() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(change(ServerState::Starting));

        assert!(a.next().await.is_some());
        assert!(b.next().await.is_some());
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let bus = EventBus::new(2);
        let mut stream = bus.subscribe();
        bus.publish(change(ServerState::Starting));
        bus.publish(change(ServerState::Listening));
        bus.publish(change(ServerState::Stopping));

        let event = stream.next().await.unwrap();
        assert_eq!(event.kind, change(ServerState::Listening));
    }

    #[tokio::test]
    async fn stream_ends_when_bus_is_dropped() {
        let bus = EventBus::default();
        let mut stream = bus.subscribe();
        drop(bus);
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        bus.publish(change(ServerState::Starting));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
