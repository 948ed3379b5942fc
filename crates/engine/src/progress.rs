//! Progress reporting around node execution.
//!
//! The evaluator calls a [`ProgressReporter`] on every state transition.
//! These calls have no effect on control flow: the engine behaves
//! identically with the no-op implementation.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use bento_types::{ProgressEvent, RunError};

/// Callback interface invoked by the evaluator on node state transitions.
pub trait ProgressReporter: Send + Sync {
    /// A node is about to execute.
    fn on_node_started(&self, path: &str, name: &str, type_name: &str);
    /// A node reached a terminal state.
    fn on_node_completed(&self, path: &str, duration: Duration, error: Option<&RunError>);
    /// A loop is executing the named child for iteration `index` of `total`.
    fn on_loop_child_progress(&self, loop_path: &str, child_name: &str, index: usize, total: usize);
}

/// Reporter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn on_node_started(&self, _path: &str, _name: &str, _type_name: &str) {}
    fn on_node_completed(&self, _path: &str, _duration: Duration, _error: Option<&RunError>) {}
    fn on_loop_child_progress(&self, _loop_path: &str, _child_name: &str, _index: usize, _total: usize) {}
}

/// Reporter that forwards events over an unbounded channel, for interactive
/// consumers that render progress elsewhere. Send failures are ignored: a
/// dropped receiver must not affect the run.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    event_tx: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(event_tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { event_tx }
    }
}

impl ProgressReporter for ChannelProgress {
    fn on_node_started(&self, path: &str, name: &str, type_name: &str) {
        let _ = self.event_tx.send(ProgressEvent::NodeStarted {
            path: path.to_string(),
            name: name.to_string(),
            type_name: type_name.to_string(),
        });
    }

    fn on_node_completed(&self, path: &str, duration: Duration, error: Option<&RunError>) {
        let _ = self.event_tx.send(ProgressEvent::NodeCompleted {
            path: path.to_string(),
            duration,
            error: error.map(ToString::to_string),
        });
    }

    fn on_loop_child_progress(&self, loop_path: &str, child_name: &str, index: usize, total: usize) {
        let _ = self.event_tx.send(ProgressEvent::LoopChildProgress {
            loop_path: loop_path.to_string(),
            child_name: child_name.to_string(),
            index,
            total,
        });
    }
}

/// Reporter that forwards lifecycle events to the tracing sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn on_node_started(&self, path: &str, name: &str, type_name: &str) {
        info!(path = %path, name = %name, type_name = %type_name, "node started");
    }

    fn on_node_completed(&self, path: &str, duration: Duration, error: Option<&RunError>) {
        match error {
            None => info!(path = %path, duration_ms = duration.as_millis() as u64, "node completed"),
            Some(error) => {
                warn!(path = %path, duration_ms = duration.as_millis() as u64, error = %error, "node failed")
            }
        }
    }

    fn on_loop_child_progress(&self, loop_path: &str, child_name: &str, index: usize, total: usize) {
        info!(loop_path = %loop_path, child = %child_name, index, total, "loop iteration");
    }
}
