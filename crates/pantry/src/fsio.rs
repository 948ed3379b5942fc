//! File netas: read and write text files.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use tokio_util::sync::CancellationToken;

use bento_engine::Neta;

use crate::required_str;

/// Reads a file as UTF-8 text.
///
/// Parameters: `path` (string, required).
/// Output: `{"path": ..., "content": ...}`.
pub struct FileReadNeta;

#[async_trait]
impl Neta for FileReadNeta {
    async fn execute(&self, _cancel: &CancellationToken, params: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue> {
        let path = required_str(params, "path")?;
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path))?;
        Ok(json!({"path": path, "content": content}))
    }
}

/// Writes text content to a file, creating parent directories as needed.
///
/// Parameters: `path` (string, required), `content` (string or any JSON,
/// required; non-strings are written as pretty JSON).
/// Output: `{"path": ..., "bytes_written": ...}`.
pub struct FileWriteNeta;

#[async_trait]
impl Neta for FileWriteNeta {
    async fn execute(&self, _cancel: &CancellationToken, params: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue> {
        let path = required_str(params, "path")?;
        let content = match params.get("content") {
            Some(JsonValue::String(text)) => text.clone(),
            Some(other) => serde_json::to_string_pretty(other).context("failed to serialize content")?,
            None => anyhow::bail!("missing required parameter 'content'"),
        };

        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(path, content.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", path))?;

        Ok(json!({"path": path, "bytes_written": content.len()}))
    }
}
