//! Shared type definitions for the bento workflow engine.
//!
//! The models here are consumed by the engine, the builtin neta
//! implementations, and the CLI. They intentionally preserve authoring order
//! (via `IndexMap`) so parameters and multi-bento documents render in a
//! predictable sequence.

pub mod error;
pub mod node;
pub mod run;

pub use error::{ResolveError, RunError};
pub use node::{GroupMode, NodeDefinition, NodeKind};
pub use run::{ExecutionResult, ProgressEvent, RunStatus};
