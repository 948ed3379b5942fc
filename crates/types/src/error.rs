//! Error taxonomy for a bento run.
//!
//! Four terminal conditions exist: definition errors (detected at node
//! entry), resolution errors (detected before a neta executes), execution
//! errors (raised by the neta itself), and cancellation. Errors are enriched
//! with the originating node's path as they propagate and are never
//! downgraded to a log line.

use thiserror::Error;

/// Failure produced while resolving a parameter value against the run
/// context. Resolution aborts the node before its neta is ever invoked, so
/// partially substituted values never reach task logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A `${secret:NAME}` placeholder named a secret the store cannot supply.
    #[error("unknown secret '{name}': {detail}")]
    MissingSecret { name: String, detail: String },

    /// A `${{ vars.NAME }}` placeholder named an ambient variable that was
    /// not seeded for this run or loop iteration.
    #[error("unknown ambient variable '{name}'")]
    MissingVariable { name: String },

    /// A `${{ nodes.ID... }}` placeholder referenced a node output that is
    /// not present in the context.
    #[error("no recorded output for node '{reference}'")]
    MissingOutput { reference: String },

    /// A placeholder path selected into a value that does not contain it.
    #[error("path '{path}' not found in '{reference}'")]
    MissingPath { reference: String, path: String },
}

/// First error encountered during a run, tagged with the path of the node
/// where it originated.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    /// A task node's `type` string has no factory registered in the pantry.
    #[error("node '{path}': no neta registered for type '{type_name}'")]
    UnregisteredType { path: String, type_name: String },

    /// Malformed container configuration, e.g. an invalid group mode or a
    /// leaf node with children.
    #[error("node '{path}': invalid definition: {reason}")]
    InvalidDefinition { path: String, reason: String },

    /// Parameter resolution failed before the node could execute.
    #[error("node '{path}': {source}")]
    Resolution {
        path: String,
        #[source]
        source: ResolveError,
    },

    /// The neta implementation itself reported a failure.
    #[error("node '{path}': {message}")]
    Task { path: String, message: String },

    /// Cancellation was observed before this node started.
    #[error("run canceled before node '{path}' started")]
    Canceled { path: String },
}

impl RunError {
    /// Path of the node where this error originated.
    pub fn path(&self) -> &str {
        match self {
            Self::UnregisteredType { path, .. }
            | Self::InvalidDefinition { path, .. }
            | Self::Resolution { path, .. }
            | Self::Task { path, .. }
            | Self::Canceled { path } => path,
        }
    }

    /// Whether this error is the distinct cancellation condition rather
    /// than a task failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }
}
