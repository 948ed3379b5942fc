//! Parameter resolution against the run context.
//!
//! Applied recursively over maps, arrays, and scalars immediately before a
//! node executes, so variable and secret changes mid-run are observed
//! per-node rather than hoisted once. Two placeholder families exist and are
//! resolved in strict order:
//!
//! 1. `${secret:NAME}` — resolved through the secret store. Every secret
//!    placeholder in a value must resolve before any other substitution
//!    happens.
//! 2. `${{ ... }}` — ambient variables (`vars.NAME` or a bare `NAME`) and
//!    prior node outputs (`nodes.ID[.path.to.field]`, with an optional
//!    `output` segment after the id). Dot paths navigate nested values and
//!    accept numeric array indices.
//!
//! An unknown secret, variable, or output reference is a hard error: values
//! never reach a neta partially substituted. Placeholder-free input passes
//! through unchanged, so resolution is idempotent.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map as JsonMap, Value as JsonValue};

use bento_types::ResolveError;
use bento_util::SecretStore;

use crate::context::RunContext;

static SECRET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{secret:([\w+_-]*)}").expect("secret pattern compiles"));

/// Resolve a node's full parameter map.
pub fn resolve_parameters(
    parameters: &IndexMap<String, JsonValue>,
    context: &RunContext,
    secrets: &dyn SecretStore,
) -> Result<JsonMap<String, JsonValue>, ResolveError> {
    let mut resolved = JsonMap::new();
    for (key, value) in parameters {
        resolved.insert(key.clone(), resolve_value(value, context, secrets)?);
    }
    Ok(resolved)
}

/// Recursively resolve placeholders in a JSON value.
pub fn resolve_value(value: &JsonValue, context: &RunContext, secrets: &dyn SecretStore) -> Result<JsonValue, ResolveError> {
    match value {
        JsonValue::String(raw) => resolve_string(raw, context, secrets),
        JsonValue::Array(items) => {
            let mut resolved_items = Vec::with_capacity(items.len());
            for item in items {
                resolved_items.push(resolve_value(item, context, secrets)?);
            }
            Ok(JsonValue::Array(resolved_items))
        }
        JsonValue::Object(map) => {
            let mut resolved_map = JsonMap::new();
            for (key, entry) in map {
                resolved_map.insert(key.clone(), resolve_value(entry, context, secrets)?);
            }
            Ok(JsonValue::Object(resolved_map))
        }
        // Non-string scalars pass through unchanged.
        other => Ok(other.clone()),
    }
}

fn resolve_string(raw: &str, context: &RunContext, secrets: &dyn SecretStore) -> Result<JsonValue, ResolveError> {
    let after_secrets = resolve_secret_placeholders(raw, secrets)?;
    resolve_context_placeholders(&after_secrets, context)
}

/// Substitute every `${secret:NAME}` occurrence, failing on the first name
/// the store cannot supply.
fn resolve_secret_placeholders(raw: &str, secrets: &dyn SecretStore) -> Result<String, ResolveError> {
    let mut resolved_pairs = Vec::new();
    for capture in SECRET_PATTERN.captures_iter(raw) {
        let secret_name = capture[1].to_string();
        let secret_value = secrets.resolve(&secret_name).map_err(|error| ResolveError::MissingSecret {
            name: secret_name.clone(),
            detail: error.to_string(),
        })?;
        resolved_pairs.push((capture[0].to_string(), secret_value));
    }

    let mut result = raw.to_string();
    for (placeholder, secret_value) in resolved_pairs {
        result = result.replace(&placeholder, &secret_value);
    }
    Ok(result)
}

/// Substitute `${{ ... }}` expressions. A string that consists of exactly one
/// placeholder resolves to the referenced value with its JSON type intact
/// (so a `forEach` expression can yield a list); mixed content is rendered
/// into a string.
fn resolve_context_placeholders(input: &str, context: &RunContext) -> Result<JsonValue, ResolveError> {
    let trimmed = input.trim();
    if trimmed.starts_with("${{")
        && trimmed.ends_with("}}")
        && trimmed.find("}}") == Some(trimmed.len() - 2)
    {
        let expression = trimmed[3..trimmed.len() - 2].trim();
        return resolve_expression(expression, context);
    }

    let mut output = String::new();
    let mut remaining = input;
    let mut substituted = false;

    while let Some(start) = remaining.find("${{") {
        let (before, after) = remaining.split_at(start);
        output.push_str(before);

        match after.find("}}") {
            Some(end) => {
                let expression = after[3..end].trim();
                let resolved = resolve_expression(expression, context)?;
                output.push_str(&format_json_value(&resolved));
                substituted = true;
                remaining = &after[end + 2..];
            }
            None => {
                // No closing marker: preserve the rest as-is.
                output.push_str(after);
                remaining = "";
                break;
            }
        }
    }

    if !substituted && output.is_empty() {
        return Ok(JsonValue::String(input.to_string()));
    }
    output.push_str(remaining);
    Ok(JsonValue::String(output))
}

/// Resolve a single placeholder expression to a JSON value.
fn resolve_expression(expression: &str, context: &RunContext) -> Result<JsonValue, ResolveError> {
    if let Some(rest) = expression.strip_prefix("nodes.") {
        let mut parts = rest.split('.');
        let node_id = parts.next().unwrap_or_default();
        let root = context
            .outputs
            .get(node_id)
            .ok_or_else(|| ResolveError::MissingOutput {
                reference: node_id.to_string(),
            })?;
        let mut path_parts: Vec<&str> = parts.collect();
        // Allow an optional "output" segment for clarity.
        if path_parts.first().copied() == Some("output") {
            path_parts.remove(0);
        }
        return navigate_json_path(root, &path_parts).ok_or_else(|| ResolveError::MissingPath {
            reference: node_id.to_string(),
            path: path_parts.join("."),
        });
    }

    let variable_expression = expression.strip_prefix("vars.").unwrap_or(expression);
    let mut parts = variable_expression.split('.');
    let variable_name = parts.next().unwrap_or_default();
    let root = context
        .variables
        .get(variable_name)
        .ok_or_else(|| ResolveError::MissingVariable {
            name: variable_name.to_string(),
        })?;
    let path_parts: Vec<&str> = parts.collect();
    navigate_json_path(root, &path_parts).ok_or_else(|| ResolveError::MissingPath {
        reference: variable_name.to_string(),
        path: path_parts.join("."),
    })
}

/// Navigate a JSON value by field names and numeric array indices. Returns
/// `None` when any segment is missing or applied to the wrong shape.
fn navigate_json_path(root: &JsonValue, path_parts: &[&str]) -> Option<JsonValue> {
    let mut current = root;
    for part in path_parts {
        match current {
            JsonValue::Object(map) => current = map.get(*part)?,
            JsonValue::Array(items) => {
                let index: usize = part.parse().ok()?;
                current = items.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current.clone())
}

fn format_json_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}
