//! HTTP neta: issues one request and returns the response.
//!
//! Parameters:
//! - `url` (string, required).
//! - `method` (string): GET (default), POST, PUT, PATCH, DELETE, HEAD.
//! - `headers` (object of strings).
//! - `body` (any JSON): sent as a JSON body when present.
//! - `allow_error_status` (bool): when true, non-2xx responses are returned
//!   in the output instead of failing the node.
//!
//! Output: `{"status": <code>, "body": <parsed JSON or raw text>}`.

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bento_engine::Neta;

use crate::required_str;

pub struct HttpNeta;

#[async_trait]
impl Neta for HttpNeta {
    async fn execute(&self, cancel: &CancellationToken, params: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue> {
        let url = required_str(params, "url")?;
        let method = parse_method(params.get("method").and_then(JsonValue::as_str).unwrap_or("GET"))?;
        debug!(method = %method, url = %url, "http neta starting");

        let client = reqwest::Client::new();
        let mut request = client.request(method, url);

        if let Some(JsonValue::Object(headers)) = params.get("headers") {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }
        if let Some(body) = params.get("body") {
            request = request.json(body);
        }

        let response = tokio::select! {
            response = request.send() => response.with_context(|| format!("request to {} failed", url))?,
            _ = cancel.cancelled() => bail!("http request canceled"),
        };

        let status = response.status();
        let text = response.text().await.context("failed to read response body")?;
        let body = serde_json::from_str::<JsonValue>(&text).unwrap_or(JsonValue::String(text));

        let allow_error_status = params
            .get("allow_error_status")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        if !status.is_success() && !allow_error_status {
            bail!("request to {} returned status {}", url, status.as_u16());
        }

        Ok(json!({
            "status": status.as_u16(),
            "body": body,
        }))
    }
}

fn parse_method(raw: &str) -> anyhow::Result<Method> {
    match raw.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        "HEAD" => Ok(Method::HEAD),
        other => Err(anyhow!("unsupported http method: {}", other)),
    }
}
