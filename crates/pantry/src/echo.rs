//! Echo neta: returns its resolved parameters unchanged.
//!
//! Useful for wiring values between nodes, smoke-testing bentos, and as the
//! simplest possible neta reference.

use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio_util::sync::CancellationToken;
use tracing::info;

use bento_engine::Neta;

pub struct EchoNeta;

#[async_trait]
impl Neta for EchoNeta {
    async fn execute(&self, _cancel: &CancellationToken, params: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue> {
        if let Some(message) = params.get("message").and_then(JsonValue::as_str) {
            info!(message = %message, "echo");
        }
        Ok(JsonValue::Object(params.clone()))
    }
}
