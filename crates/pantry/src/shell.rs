//! Shell neta: runs a command line through the platform shell.
//!
//! Parameters:
//! - `command` (string, required): the command line, run via `sh -c` (or
//!   `cmd /C` on Windows).
//! - `cwd` (string): working directory.
//! - `env` (object of strings): extra environment variables.
//! - `allow_failure` (bool): when true, a non-zero exit is returned in the
//!   output instead of failing the node.
//!
//! Output: `{"status": <exit code>, "stdout": ..., "stderr": ...}`.
//!
//! Cancellation kills the child process (`kill_on_drop`).

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bento_engine::Neta;

use crate::required_str;

pub struct ShellNeta;

#[async_trait]
impl Neta for ShellNeta {
    async fn execute(&self, cancel: &CancellationToken, params: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue> {
        let command_line = required_str(params, "command")?;
        debug!(command = %command_line, "shell neta starting");

        let mut command = platform_shell(command_line);
        command.kill_on_drop(true);
        command.stdout(std::process::Stdio::piped());
        command.stderr(std::process::Stdio::piped());

        if let Some(cwd) = params.get("cwd").and_then(JsonValue::as_str) {
            command.current_dir(cwd);
        }
        if let Some(JsonValue::Object(env)) = params.get("env") {
            for (key, value) in env {
                if let Some(value) = value.as_str() {
                    command.env(key, value);
                }
            }
        }

        let child = command.spawn().with_context(|| format!("failed to spawn: {}", command_line))?;

        let output = tokio::select! {
            output = child.wait_with_output() => output.context("failed to collect command output")?,
            _ = cancel.cancelled() => bail!("shell command canceled"),
        };

        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let allow_failure = params.get("allow_failure").and_then(JsonValue::as_bool).unwrap_or(false);
        if !output.status.success() && !allow_failure {
            bail!("command exited with status {}: {}", status, stderr.trim());
        }

        Ok(json!({
            "status": status,
            "stdout": stdout,
            "stderr": stderr,
        }))
    }
}

#[cfg(unix)]
fn platform_shell(command_line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(command_line);
    command
}

#[cfg(windows)]
fn platform_shell(command_line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(command_line);
    command
}
