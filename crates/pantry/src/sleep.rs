//! Sleep neta: pauses the branch for a fixed duration.
//!
//! Parameters: `duration` (required) — a number of seconds, or a string with
//! an `ms`, `s`, or `m` suffix ("250ms", "2s", "1m"). A bare numeric string
//! means seconds.
//!
//! Output: `{"slept_ms": <requested duration in milliseconds>}`.
//! Cancellation wakes the sleep immediately and fails the node.

use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use tokio_util::sync::CancellationToken;

use bento_engine::Neta;

pub struct SleepNeta;

#[async_trait]
impl Neta for SleepNeta {
    async fn execute(&self, cancel: &CancellationToken, params: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue> {
        let duration = match params.get("duration") {
            Some(value) => parse_duration(value)?,
            None => bail!("missing required parameter 'duration'"),
        };

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = cancel.cancelled() => bail!("sleep canceled"),
        }

        Ok(json!({"slept_ms": duration.as_millis() as u64}))
    }
}

fn parse_duration(value: &JsonValue) -> anyhow::Result<Duration> {
    match value {
        JsonValue::Number(n) => {
            let seconds = n.as_f64().ok_or_else(|| anyhow!("invalid duration number"))?;
            if seconds < 0.0 {
                bail!("duration must not be negative");
            }
            Ok(Duration::from_secs_f64(seconds))
        }
        JsonValue::String(raw) => parse_duration_str(raw.trim()),
        other => bail!("duration must be a number or string, got {}", other),
    }
}

fn parse_duration_str(raw: &str) -> anyhow::Result<Duration> {
    let (digits, unit) = if let Some(rest) = raw.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = raw.strip_suffix('s') {
        (rest, 1_000)
    } else if let Some(rest) = raw.strip_suffix('m') {
        (rest, 60_000)
    } else {
        (raw, 1_000)
    };
    let amount: f64 = digits
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid duration: {}", raw))?;
    if amount < 0.0 {
        bail!("duration must not be negative");
    }
    Ok(Duration::from_millis((amount * unit as f64) as u64))
}
