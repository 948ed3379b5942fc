//! Accumulating execution state threaded through one run.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

/// Mutable state shared by one run.
///
/// A single context exists per top-level serve call. Sequential traversal
/// shares one mutable instance; parallel fan-out gives each branch a frozen
/// snapshot taken at fan-out time, and branch outputs are merged back by the
/// coordinating container after every branch completes. The outputs map is
/// append-only: an entry recorded for a path is never overwritten within a
/// run.
#[derive(Debug, Default, Clone)]
pub struct RunContext {
    /// Output recorded per node path.
    pub outputs: HashMap<String, JsonValue>,
    /// Read-only ambient variables seeded at run start, plus per-iteration
    /// locals inside loops.
    pub variables: HashMap<String, JsonValue>,
}

impl RunContext {
    /// Context seeded with the run's ambient variables.
    pub fn with_variables(variables: HashMap<String, JsonValue>) -> Self {
        Self {
            outputs: HashMap::new(),
            variables,
        }
    }

    /// Frozen read snapshot handed to a parallel branch at fan-out time.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Record a node's output. Existing entries win: the outputs map grows
    /// monotonically and never overwrites within a run.
    pub fn record_output(&mut self, path: &str, value: JsonValue) {
        self.outputs.entry(path.to_string()).or_insert(value);
    }

    /// Merge a completed branch's outputs back into this context. Performed
    /// only by the coordinating container, never by branches themselves.
    pub fn merge_outputs(&mut self, branch_outputs: HashMap<String, JsonValue>) {
        for (path, value) in branch_outputs {
            self.outputs.entry(path).or_insert(value);
        }
    }
}
