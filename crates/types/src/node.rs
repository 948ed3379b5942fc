//! Declarative node tree loaded from a bento document.
//!
//! A bento is a tree of [`NodeDefinition`]s. The `type` discriminator selects
//! the execution discipline: `group`, `parallel`, and `loop` are container
//! kinds owned by the engine, while every other string names a leaf neta
//! looked up in the pantry at run time. The definition tree is read once at
//! run start and never mutated during execution; all mutable state lives in
//! the engine's run context.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Execution discipline of a node, resolved once from the `type` string.
///
/// Modeled as a closed enum so the evaluator's state machine stays exhaustive
/// rather than scattering string comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    /// Leaf unit of work backed by the named neta type in the pantry.
    Task(String),
    /// Container whose children run per its `mode` parameter
    /// (sequential by default).
    Group,
    /// Container whose children always run as concurrent branches.
    /// Shorthand for a group with `mode: parallel`.
    Parallel,
    /// Opaque repeating container (`times` or `forEach` mode).
    Loop,
}

impl From<String> for NodeKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "group" => Self::Group,
            "parallel" => Self::Parallel,
            "loop" => Self::Loop,
            _ => Self::Task(raw),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.type_name().to_string()
    }
}

impl NodeKind {
    /// The authored `type` string for this kind.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Task(name) => name,
            Self::Group => "group",
            Self::Parallel => "parallel",
            Self::Loop => "loop",
        }
    }

    /// Whether this kind consults `children`.
    pub fn is_container(&self) -> bool {
        !matches!(self, Self::Task(_))
    }
}

/// Execution mode of a `group` container, declared via its `mode` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMode {
    /// Children run strictly in declared order with full mutual visibility.
    #[default]
    Sequential,
    /// Children run as concurrent branches over frozen context snapshots.
    Parallel,
}

impl GroupMode {
    /// Parse an authored `mode` value. Returns `None` for unknown strings so
    /// the evaluator can surface a definition error naming the bad value.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sequential" => Some(Self::Sequential),
            "parallel" => Some(Self::Parallel),
            _ => None,
        }
    }
}

/// One node in a bento definition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Stable identifier used for output addressing. When absent the node is
    /// addressed positionally under its parent.
    #[serde(default)]
    pub id: Option<String>,
    /// Execution discipline discriminator.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Display label for progress reporting; never used for addressing.
    #[serde(default)]
    pub name: Option<String>,
    /// Authored parameters, order preserved. Values may be scalars, nested
    /// maps, arrays, or strings containing placeholder expressions.
    #[serde(default)]
    pub parameters: IndexMap<String, JsonValue>,
    /// Child nodes; meaningful only for container kinds.
    #[serde(default)]
    pub children: Vec<NodeDefinition>,
}

impl NodeDefinition {
    /// Display label: explicit `name`, else `id`, else the type string.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or_else(|| self.kind.type_name())
    }
}
