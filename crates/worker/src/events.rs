//! Job lifecycle events on a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>`. Publishing never blocks;
//! with no subscribers the event is dropped.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::drain::DrainReport;

/// Something the worker did.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    DrainStarted {
        drain_id: Uuid,
    },
    JobSucceeded {
        drain_id: Uuid,
        work_key: String,
        results_stored: usize,
    },
    JobFailed {
        drain_id: Uuid,
        /// The raw token, which may not be a valid work key.
        token: String,
        category: &'static str,
        error: String,
    },
    DrainFinished {
        report: DrainReport,
    },
}

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Slow receivers past `capacity` observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: JobEvent) {
        // A send error only means there are no receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let drain_id = Uuid::now_v7();

        bus.publish(JobEvent::DrainStarted { drain_id });

        match rx.recv().await.unwrap() {
            JobEvent::DrainStarted { drain_id: got } => assert_eq!(got, drain_id),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        EventBus::default().publish(JobEvent::DrainStarted {
            drain_id: Uuid::now_v7(),
        });
    }

    #[test]
    fn serialized_with_event_tag() {
        let json = serde_json::to_value(JobEvent::JobFailed {
            drain_id: Uuid::nil(),
            token: "bad".into(),
            category: "malformed_key",
            error: "Malformed work key".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "job_failed");
        assert_eq!(json["category"], "malformed_key");
    }
}
