//! The `bento` binary: run and inspect bento workflow files, and manage the
//! variables and secrets those runs consume.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use bento_engine::{BentoSpec, Itamae, NoopProgress, ProgressReporter, parse_bento_file};
use bento_pantry::default_pantry;
use bento_types::{RunError, RunStatus};
use bento_util::{KeychainSecretStore, Preferences, VariableStore, keystore::default_secret_store};

#[derive(Parser)]
#[command(name = "bento", about = "Declarative workflow runner", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a bento from a YAML or JSON file.
    Run {
        /// Path to the bento document.
        file: PathBuf,
        /// Name of the bento to run when the file holds several.
        #[arg(long)]
        bento: Option<String>,
        /// Ambient variable override, repeatable (KEY=VALUE; VALUE is parsed
        /// as JSON when possible, otherwise taken as a string).
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
        /// Print the final result as JSON instead of a summary.
        #[arg(long)]
        json: bool,
        /// Suppress per-node progress lines.
        #[arg(long)]
        quiet: bool,
    },
    /// List the bentos defined in a file.
    List {
        /// Path to the bento document.
        file: PathBuf,
    },
    /// Show or set the default directory searched for bento files.
    Dir {
        /// New default directory; prints the current one when omitted.
        path: Option<String>,
    },
    /// Manage persisted ambient variables.
    #[command(subcommand)]
    Vars(VarsCommand),
    /// Manage secrets in the OS keychain.
    #[command(subcommand)]
    Secrets(SecretsCommand),
}

#[derive(Subcommand)]
enum VarsCommand {
    /// Print every persisted variable.
    List,
    /// Print one variable's value.
    Get { key: String },
    /// Persist a variable (VALUE is parsed as JSON when possible).
    Set { key: String, value: String },
    /// Remove a persisted variable.
    Unset { key: String },
}

#[derive(Subcommand)]
enum SecretsCommand {
    /// Store a secret under NAME.
    Set { name: String, value: String },
    /// Remove the secret stored under NAME.
    Remove { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            file,
            bento,
            vars,
            json,
            quiet,
        } => run_bento(&file, bento.as_deref(), &vars, json, quiet).await,
        Command::List { file } => list_bentos(&file),
        Command::Dir { path } => run_dir_cmd(path),
        Command::Vars(command) => run_vars_cmd(command),
        Command::Secrets(command) => run_secrets_cmd(command),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .try_init();
}

async fn run_bento(file: &PathBuf, name: Option<&str>, overrides: &[String], json: bool, quiet: bool) -> Result<()> {
    let bundle = parse_bento_file(locate_file(file))?;
    let spec = select_bento(&bundle.bentos, name)?;

    let variables = collect_variables(overrides)?;

    let itamae = Itamae::new(Arc::new(default_pantry()))
        .with_secrets(Arc::from(default_secret_store()))
        .with_progress(progress_sink(json, quiet));

    // Ctrl-C requests cooperative cancellation; in-flight netas observe the
    // token, and nothing new starts afterwards.
    let cancel = CancellationToken::new();
    let signal_guard = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_guard.cancel();
        }
    });

    let result = itamae.serve(&spec.root, variables, cancel).await;

    if json {
        let rendered = serde_json::json!({
            "status": result.status,
            "tasks_executed": result.tasks_executed,
            "outputs": result.outputs,
            "error": result.error.as_ref().map(ToString::to_string),
        });
        println!("{}", serde_json::to_string_pretty(&rendered)?);
    } else {
        match &result.error {
            None => println!("done: {} task(s) executed", result.tasks_executed),
            Some(error) if error.is_cancellation() => {
                println!("canceled after {} task(s)", result.tasks_executed)
            }
            Some(error) => println!("failed after {} task(s): {}", result.tasks_executed, error),
        }
    }

    match result.status {
        RunStatus::Success => Ok(()),
        RunStatus::Failure => {
            // The summary above already told the story; exit non-zero
            // without repeating it through anyhow's reporter.
            std::process::exit(1);
        }
    }
}

fn select_bento<'a>(bentos: &'a IndexMap<String, BentoSpec>, name: Option<&str>) -> Result<&'a BentoSpec> {
    match name {
        Some(name) => bentos
            .get(name)
            .ok_or_else(|| anyhow!("bento '{}' not found; available: {}", name, available(bentos))),
        None if bentos.len() == 1 => Ok(bentos.values().next().expect("one bento")),
        None => bail!("file defines several bentos; pick one with --bento ({})", available(bentos)),
    }
}

fn available(bentos: &IndexMap<String, BentoSpec>) -> String {
    bentos.keys().cloned().collect::<Vec<_>>().join(", ")
}

/// Merge of the persisted variable store and command-line overrides, with
/// overrides winning.
fn collect_variables(overrides: &[String]) -> Result<HashMap<String, JsonValue>> {
    let parsed = overrides.iter().map(|pair| parse_override(pair)).collect::<Result<Vec<_>>>()?;

    let store = VariableStore::open().context("failed to open variable store")?;
    let mut variables: HashMap<String, JsonValue> = store.all().into_iter().collect();
    variables.extend(parsed);
    Ok(variables)
}

fn parse_override(pair: &str) -> Result<(String, JsonValue)> {
    let (key, raw) = pair
        .split_once('=')
        .with_context(|| format!("invalid --var '{}': expected KEY=VALUE", pair))?;
    Ok((key.to_string(), parse_value(raw)))
}

/// JSON when it parses as JSON, a plain string otherwise.
fn parse_value(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

fn progress_sink(json: bool, quiet: bool) -> Arc<dyn ProgressReporter> {
    if json || quiet {
        Arc::new(NoopProgress)
    } else {
        Arc::new(LineProgress)
    }
}

/// Progress sink that prints one line per lifecycle event.
struct LineProgress;

impl ProgressReporter for LineProgress {
    fn on_node_started(&self, path: &str, name: &str, type_name: &str) {
        println!("-> {} [{}] ({})", name, path, type_name);
    }

    fn on_node_completed(&self, path: &str, duration: Duration, error: Option<&RunError>) {
        match error {
            None => println!("ok {} ({}ms)", path, duration.as_millis()),
            Some(error) => println!("!! {} ({}ms): {}", path, duration.as_millis(), error),
        }
    }

    fn on_loop_child_progress(&self, loop_path: &str, child_name: &str, index: usize, total: usize) {
        println!(".. {} iteration {}/{}: {}", loop_path, index + 1, total, child_name);
    }
}

fn list_bentos(file: &PathBuf) -> Result<()> {
    let bundle = parse_bento_file(locate_file(file))?;
    for (name, spec) in &bundle.bentos {
        match &spec.description {
            Some(description) => println!("{}\t{}", name, description),
            None => println!("{}", name),
        }
    }
    Ok(())
}

/// Locate a bento document: the path as given when it resolves, otherwise
/// the same relative path under the configured default bento directory.
fn locate_file(file: &Path) -> PathBuf {
    if file.exists() || file.is_absolute() {
        return file.to_path_buf();
    }
    if let Ok(preferences) = Preferences::open()
        && let Some(dir) = preferences.bento_dir()
    {
        let candidate = dir.join(file);
        if candidate.exists() {
            return candidate;
        }
    }
    file.to_path_buf()
}

fn run_dir_cmd(path: Option<String>) -> Result<()> {
    let preferences = Preferences::open().context("failed to open preferences")?;
    match path {
        Some(path) => preferences.set_bento_dir(Some(path))?,
        None => match preferences.bento_dir() {
            Some(dir) => println!("{}", dir.display()),
            None => println!("(unset)"),
        },
    }
    Ok(())
}

fn run_vars_cmd(command: VarsCommand) -> Result<()> {
    let store = VariableStore::open().context("failed to open variable store")?;
    match command {
        VarsCommand::List => {
            for (key, value) in store.all() {
                println!("{} = {}", key, value);
            }
        }
        VarsCommand::Get { key } => match store.get(&key) {
            Some(value) => println!("{}", value),
            None => bail!("no variable named '{}'", key),
        },
        VarsCommand::Set { key, value } => {
            store.set(&key, Some(parse_value(&value)))?;
        }
        VarsCommand::Unset { key } => {
            store.set(&key, None)?;
        }
    }
    Ok(())
}

fn run_secrets_cmd(command: SecretsCommand) -> Result<()> {
    let keychain = KeychainSecretStore;
    match command {
        SecretsCommand::Set { name, value } => {
            keychain.store(&name, &value)?;
            println!("stored secret '{}'", name);
        }
        SecretsCommand::Remove { name } => {
            keychain.remove(&name)?;
            println!("removed secret '{}'", name);
        }
    }
    Ok(())
}
