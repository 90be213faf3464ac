//! Session event broadcasting.
//!
//! Every session owns a broadcast channel. Subscribers receive events in
//! emission order; a slow subscriber that falls behind the channel capacity
//! gets a synthesized [`SessionEvent::EventGap`] naming how many events it
//! missed, then resumes from the live stream. Lagging never blocks the
//! orchestrator.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::session::{FeedbackKind, FeedbackOutcome, SessionId};

/// Events emitted by the orchestrator, in the total order of the session's
/// state transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
#[serde(rename_all_fields = "camelCase")]
pub enum SessionEvent {
    SessionStarted {
        session_id: SessionId,
    },
    PhaseStarted {
        session_id: SessionId,
        phase_id: u8,
        phase_name: String,
    },
    PhaseProgress {
        session_id: SessionId,
        phase_id: u8,
        progress: u8,
    },
    PhaseCompleted {
        session_id: SessionId,
        phase_id: u8,
        quality_score: f64,
        artifact_ref: Uuid,
    },
    PhaseErrored {
        session_id: SessionId,
        phase_id: u8,
        detail: String,
    },
    FeedbackWindowOpened {
        session_id: SessionId,
        phase_id: u8,
        timeout_seconds: u64,
    },
    FeedbackApplied {
        session_id: SessionId,
        phase_id: u8,
        kind: FeedbackKind,
        outcome: FeedbackOutcome,
    },
    FeedbackTimedOut {
        session_id: SessionId,
        phase_id: u8,
    },
    SessionCompleted {
        session_id: SessionId,
    },
    SessionFailed {
        session_id: SessionId,
        phase_id: u8,
    },
    SessionCancelled {
        session_id: SessionId,
    },
    /// Synthesized locally for a subscriber that lagged behind the channel
    /// capacity; never sent by the orchestrator itself.
    EventGap {
        session_id: SessionId,
        missed: u64,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::SessionStarted { session_id }
            | Self::PhaseStarted { session_id, .. }
            | Self::PhaseProgress { session_id, .. }
            | Self::PhaseCompleted { session_id, .. }
            | Self::PhaseErrored { session_id, .. }
            | Self::FeedbackWindowOpened { session_id, .. }
            | Self::FeedbackApplied { session_id, .. }
            | Self::FeedbackTimedOut { session_id, .. }
            | Self::SessionCompleted { session_id }
            | Self::SessionFailed { session_id, .. }
            | Self::SessionCancelled { session_id }
            | Self::EventGap { session_id, .. } => *session_id,
        }
    }
}

/// Per-session event fan-out.
#[derive(Debug, Clone)]
pub struct SessionBroadcaster {
    session_id: SessionId,
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionBroadcaster {
    pub fn new(session_id: SessionId, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { session_id, tx }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Publish an event. A send error only means there are no subscribers,
    /// which is fine; the orchestrator never waits on consumers.
    pub fn publish(&self, event: SessionEvent) {
        tracing::debug!(session_id = %self.session_id, ?event, "session event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream {
            session_id: self.session_id,
            rx: self.tx.subscribe(),
        }
    }
}

/// A subscriber's view of a session's event stream.
pub struct EventStream {
    session_id: SessionId,
    rx: broadcast::Receiver<SessionEvent>,
}

impl EventStream {
    /// Receive the next event. Returns `None` once the session's
    /// broadcaster is dropped and the backlog is drained. Lag is surfaced
    /// in-band as [`SessionEvent::EventGap`].
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => Some(SessionEvent::EventGap {
                session_id: self.session_id,
                missed,
            }),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid() -> SessionId {
        SessionId::new()
    }

    #[test]
    fn events_serialize_with_snake_case_tag_and_camel_case_fields() {
        let id = sid();
        let event = SessionEvent::PhaseCompleted {
            session_id: id,
            phase_id: 3,
            quality_score: 0.82,
            artifact_ref: Uuid::nil(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "phase_completed");
        assert_eq!(json["sessionId"], serde_json::to_value(id).unwrap());
        assert_eq!(json["phaseId"], 3);
        assert_eq!(json["qualityScore"], 0.82);
        assert!(json["artifactRef"].is_string());
    }

    #[test]
    fn feedback_window_event_carries_timeout() {
        let event = SessionEvent::FeedbackWindowOpened {
            session_id: sid(),
            phase_id: 5,
            timeout_seconds: 1800,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "feedback_window_opened");
        assert_eq!(json["timeoutSeconds"], 1800);
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let broadcaster = SessionBroadcaster::new(sid(), 16);
        let mut stream = broadcaster.subscribe();
        let id = broadcaster.session_id();

        broadcaster.publish(SessionEvent::SessionStarted { session_id: id });
        broadcaster.publish(SessionEvent::PhaseStarted {
            session_id: id,
            phase_id: 1,
            phase_name: "concept".into(),
        });

        assert_eq!(
            stream.recv().await,
            Some(SessionEvent::SessionStarted { session_id: id })
        );
        match stream.recv().await {
            Some(SessionEvent::PhaseStarted { phase_id: 1, .. }) => {}
            other => panic!("expected phase_started, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_block_or_panic() {
        let broadcaster = SessionBroadcaster::new(sid(), 4);
        broadcaster.publish(SessionEvent::SessionCompleted {
            session_id: broadcaster.session_id(),
        });
    }

    #[tokio::test]
    async fn lagged_subscriber_sees_gap_marker_then_live_events() {
        let broadcaster = SessionBroadcaster::new(sid(), 2);
        let mut stream = broadcaster.subscribe();
        let id = broadcaster.session_id();

        // Overflow the 2-slot channel: the oldest events are dropped.
        for phase_id in 1..=4u8 {
            broadcaster.publish(SessionEvent::PhaseProgress {
                session_id: id,
                phase_id,
                progress: 50,
            });
        }

        match stream.recv().await {
            Some(SessionEvent::EventGap { missed, .. }) => assert_eq!(missed, 2),
            other => panic!("expected event_gap, got {other:?}"),
        }
        match stream.recv().await {
            Some(SessionEvent::PhaseProgress { phase_id: 3, .. }) => {}
            other => panic!("expected progress for phase 3, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_closes_when_broadcaster_dropped() {
        let broadcaster = SessionBroadcaster::new(sid(), 4);
        let mut stream = broadcaster.subscribe();
        let id = broadcaster.session_id();
        broadcaster.publish(SessionEvent::SessionCancelled { session_id: id });
        drop(broadcaster);

        assert_eq!(
            stream.recv().await,
            Some(SessionEvent::SessionCancelled { session_id: id })
        );
        assert_eq!(stream.recv().await, None);
    }
}
