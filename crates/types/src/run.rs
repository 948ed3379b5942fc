//! Run outcome and progress event types.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::RunError;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every node that was asked to run completed without error.
    Success,
    /// The run surfaced an error (including cancellation).
    Failure,
}

/// Lifecycle event emitted around node execution.
///
/// Events are transient; the engine does not retain them past emission.
/// Group and parallel children are addressed transparently under their own
/// paths, while a loop is opaque: it emits its own started/completed pair
/// and reports its children only through [`ProgressEvent::LoopChildProgress`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A node is about to execute.
    NodeStarted {
        path: String,
        name: String,
        type_name: String,
    },
    /// A node reached a terminal state.
    NodeCompleted {
        path: String,
        duration: Duration,
        error: Option<String>,
    },
    /// A loop is executing the named child for iteration `index` of `total`.
    LoopChildProgress {
        loop_path: String,
        child_name: String,
        index: usize,
        total: usize,
    },
}

/// Terminal value returned to the caller of a run.
///
/// Always populated regardless of outcome: callers branch on `status` and
/// `error`, never on result presence, and can report partial work (node
/// count, recorded outputs) even when the run failed.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Overall outcome.
    pub status: RunStatus,
    /// Number of task nodes that completed execution (successfully or not).
    pub tasks_executed: u64,
    /// Output recorded per node path.
    pub outputs: HashMap<String, JsonValue>,
    /// First error encountered, present iff `status` is `Failure`.
    pub error: Option<RunError>,
}

impl ExecutionResult {
    /// A successful result carrying the given counters and outputs.
    pub fn success(tasks_executed: u64, outputs: HashMap<String, JsonValue>) -> Self {
        Self {
            status: RunStatus::Success,
            tasks_executed,
            outputs,
            error: None,
        }
    }

    /// A failed result carrying the partial work done before the error.
    pub fn failure(tasks_executed: u64, outputs: HashMap<String, JsonValue>, error: RunError) -> Self {
        Self {
            status: RunStatus::Failure,
            tasks_executed,
            outputs,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_result_is_always_populated() {
        let error = RunError::Canceled { path: "0".into() };
        let result = ExecutionResult::failure(3, HashMap::new(), error);
        assert_eq!(result.status, RunStatus::Failure);
        assert_eq!(result.tasks_executed, 3);
        assert!(result.error.as_ref().is_some_and(RunError::is_cancellation));
    }

    #[test]
    fn progress_event_serializes_with_tag() {
        let event = ProgressEvent::LoopChildProgress {
            loop_path: "retry".into(),
            child_name: "fetch".into(),
            index: 1,
            total: 3,
        };
        let raw = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(raw["event"], "loop_child_progress");
        assert_eq!(raw["index"], 1);
    }
}
