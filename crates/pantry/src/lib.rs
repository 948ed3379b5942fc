//! Builtin neta implementations.
//!
//! Each neta is a self-contained adapter behind the engine's single execute
//! contract: it receives only its resolved parameter map and the run's
//! cancellation token, never the shared context. Factories hand out a fresh
//! instance per invocation so concurrent parallel branches never share
//! state.

use bento_engine::Pantry;

pub mod echo;
pub mod fsio;
pub mod http;
pub mod shell;
pub mod sleep;

pub use echo::EchoNeta;
pub use fsio::{FileReadNeta, FileWriteNeta};
pub use http::HttpNeta;
pub use shell::ShellNeta;
pub use sleep::SleepNeta;

/// Pantry stocked with every builtin neta type.
pub fn default_pantry() -> Pantry {
    let mut pantry = Pantry::new();
    pantry.register("echo", Box::new(|| Box::new(EchoNeta)));
    pantry.register("shell", Box::new(|| Box::new(ShellNeta)));
    pantry.register("http", Box::new(|| Box::new(HttpNeta)));
    pantry.register("file.read", Box::new(|| Box::new(FileReadNeta)));
    pantry.register("file.write", Box::new(|| Box::new(FileWriteNeta)));
    pantry.register("sleep", Box::new(|| Box::new(SleepNeta)));
    pantry
}

/// Fetch a required string parameter, with a uniform error shape.
pub(crate) fn required_str<'a>(
    params: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> anyhow::Result<&'a str> {
    params
        .get(key)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing required string parameter '{}'", key))
}
