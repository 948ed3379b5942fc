//! Bento document structures.
//!
//! A document is either a single bento (a named node tree) or a multi-bento
//! bundle keyed by name. Authoring order of the bundle is preserved.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use bento_types::NodeDefinition;

/// A single authored bento: a name plus the root of its node tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BentoSpec {
    /// Canonical name used for lookups; defaults to "default" when the
    /// document omits it.
    #[serde(default)]
    pub bento: Option<String>,
    /// Optional descriptive copy shown by surrounding tooling.
    #[serde(default)]
    pub description: Option<String>,
    /// Root node of the definition tree.
    pub root: NodeDefinition,
}

/// A parsed document holding one or more bentos by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BentoBundle {
    /// Bentos in authoring order.
    pub bentos: IndexMap<String, BentoSpec>,
}
