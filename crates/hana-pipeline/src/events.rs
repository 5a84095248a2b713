//! Pipeline event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers (progress printers, tests) can follow a run without coupling to
//! the executor internals.

use serde::{Deserialize, Serialize};

use hana_types::OperationPath;

/// States of the executor's state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Running(OperationPath),
    Completed,
    Aborted(String),
}

/// Events emitted during pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    PipelineStarted {
        operations: usize,
        dry_run: bool,
    },
    Resumed {
        from: OperationPath,
    },
    StateChanged(PipelineState),
    OperationStarted {
        path: OperationPath,
        command: String,
    },
    OperationSkipped {
        path: OperationPath,
    },
    OperationCompleted {
        path: OperationPath,
        command: String,
        duration_ms: u64,
    },
    LoopIteration {
        path: OperationPath,
        index: usize,
        total: usize,
    },
    CheckpointSaved {
        last_op: Option<OperationPath>,
    },
    PipelineCompleted {
        executed: usize,
        duration_ms: u64,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(PipelineEvent::PipelineStarted {
            operations: 3,
            dry_run: false,
        });

        match rx.recv().await.unwrap() {
            PipelineEvent::PipelineStarted {
                operations,
                dry_run,
            } => {
                assert_eq!(operations, 3);
                assert!(!dry_run);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let emitter = EventEmitter::new(16);
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();

        emitter.emit(PipelineEvent::StateChanged(PipelineState::Running(
            OperationPath::from(vec![2, 0]),
        )));

        let json1 = serde_json::to_string(&rx1.recv().await.unwrap()).unwrap();
        let json2 = serde_json::to_string(&rx2.recv().await.unwrap()).unwrap();
        assert_eq!(json1, json2);
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(16);
        emitter.emit(PipelineEvent::StateChanged(PipelineState::Aborted(
            "tool failed".into(),
        )));
    }

    #[test]
    fn event_serialization_round_trip() {
        let event = PipelineEvent::OperationCompleted {
            path: OperationPath::from(vec![1, 3]),
            command: "ordering".into(),
            duration_ms: 123,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("[1,3]"));
        match serde_json::from_str::<PipelineEvent>(&json).unwrap() {
            PipelineEvent::OperationCompleted {
                path,
                command,
                duration_ms,
            } => {
                assert_eq!(path, OperationPath::from(vec![1, 3]));
                assert_eq!(command, "ordering");
                assert_eq!(duration_ms, 123);
            }
            other => panic!("unexpected variant after round-trip: {:?}", other),
        }
    }
}
