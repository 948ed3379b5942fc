//! The pantry: type-name to neta-factory lookup table.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio_util::sync::CancellationToken;

/// A leaf unit of work.
///
/// Implementations receive only their own resolved parameter map, never the
/// shared run context, so no cross-task aliasing is possible. Long-running
/// implementations should honor the cancellation token cooperatively.
#[async_trait]
pub trait Neta: Send + Sync {
    /// Execute with fully resolved parameters. The returned value is
    /// recorded under the node's path in the run context.
    async fn execute(&self, cancel: &CancellationToken, params: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue>;
}

/// Factory producing a fresh neta instance per invocation.
///
/// Freshness matters: concurrent parallel branches may construct and execute
/// several instances of the same type simultaneously, so implementations
/// must not carry state across invocations.
pub type NetaFactory = Box<dyn Fn() -> Box<dyn Neta> + Send + Sync>;

/// Registry mapping a node `type` string to its neta factory.
#[derive(Default)]
pub struct Pantry {
    factories: HashMap<String, NetaFactory>,
}

impl Pantry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a type name, replacing any previous entry.
    pub fn register(&mut self, type_name: impl Into<String>, factory: NetaFactory) {
        self.factories.insert(type_name.into(), factory);
    }

    /// Construct a fresh neta for the given type name, or `None` when the
    /// type was never registered.
    pub fn lookup(&self, type_name: &str) -> Option<Box<dyn Neta>> {
        self.factories.get(type_name).map(|factory| factory())
    }

    /// Whether a type name is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted for stable display.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for Pantry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pantry").field("types", &self.type_names()).finish()
    }
}
