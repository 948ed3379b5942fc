//! The itamae: recursive evaluator that walks a bento definition tree.
//!
//! Each node is resolved against the accumulating run context, dispatched by
//! its discipline (task, sequential group, parallel group, loop), and
//! reported to the progress sink. The first error at any level aborts that
//! level's remaining sequential siblings; parallel groups wait for every
//! launched branch to reach a terminal state before surfacing the first
//! error in declared-child order, merging completed work regardless.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use serde_json::{Value as JsonValue, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bento_types::{ExecutionResult, GroupMode, NodeDefinition, NodeKind, RunError};
use bento_util::{SecretError, SecretStore};

use crate::context::RunContext;
use crate::pantry::Pantry;
use crate::progress::{NoopProgress, ProgressReporter};
use crate::resolve::resolve_parameters;

static NOOP_PROGRESS: NoopProgress = NoopProgress;

/// Secret store used when none is wired in: every lookup fails, which keeps
/// `${secret:...}` references a hard error rather than a silent blank.
struct NoSecrets;

impl SecretStore for NoSecrets {
    fn resolve(&self, name: &str) -> Result<String, SecretError> {
        Err(SecretError::Missing {
            name: name.to_string(),
            detail: "no secret store configured".into(),
        })
    }
}

/// Outcome of evaluating one subtree: how many task nodes ran, and the first
/// error if the subtree failed. The count survives failure so callers can
/// report partial work.
struct EvalOutcome {
    tasks_executed: u64,
    error: Option<RunError>,
}

impl EvalOutcome {
    fn ok(tasks_executed: u64) -> Self {
        Self {
            tasks_executed,
            error: None,
        }
    }

    fn failed(tasks_executed: u64, error: RunError) -> Self {
        Self {
            tasks_executed,
            error: Some(error),
        }
    }
}

/// The orchestration engine.
///
/// Holds the pantry (type-name to neta lookup), the secret store consulted
/// during parameter resolution, and the progress sink. One `Itamae` can
/// serve any number of bentos; all per-run state lives in the run context.
pub struct Itamae {
    pantry: Arc<Pantry>,
    secrets: Arc<dyn SecretStore>,
    progress: Arc<dyn ProgressReporter>,
}

impl Itamae {
    /// Engine with no secret store and no progress sink.
    pub fn new(pantry: Arc<Pantry>) -> Self {
        Self {
            pantry,
            secrets: Arc::new(NoSecrets),
            progress: Arc::new(NoopProgress),
        }
    }

    /// Wire in a secret store consulted for `${secret:NAME}` placeholders.
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Wire in a progress sink.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Execute a bento to completion and return the always-populated result.
    ///
    /// `variables` seeds the run's ambient variables; `cancel` is checked
    /// cooperatively before each node starts and is handed to every neta.
    pub async fn serve(
        &self,
        bento: &NodeDefinition,
        variables: HashMap<String, JsonValue>,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let mut context = RunContext::with_variables(variables);
        let root_path = bento.id.clone().unwrap_or_else(|| "0".to_string());
        info!(root = %root_path, "bento run started");

        let outcome = self
            .evaluate(bento, root_path, &mut context, &cancel, self.progress.as_ref())
            .await;

        match outcome.error {
            None => {
                info!(tasks = outcome.tasks_executed, "bento run succeeded");
                ExecutionResult::success(outcome.tasks_executed, context.outputs)
            }
            Some(error) => {
                warn!(tasks = outcome.tasks_executed, error = %error, "bento run failed");
                ExecutionResult::failure(outcome.tasks_executed, context.outputs, error)
            }
        }
    }

    /// Evaluate one node. Boxed because the tree walk is recursive.
    fn evaluate<'a>(
        &'a self,
        node: &'a NodeDefinition,
        path: String,
        context: &'a mut RunContext,
        cancel: &'a CancellationToken,
        progress: &'a dyn ProgressReporter,
    ) -> BoxFuture<'a, EvalOutcome> {
        async move {
            // Cooperative cancellation: observed before a node starts, it
            // prevents the node and everything after it in sequential scope.
            if cancel.is_cancelled() {
                return EvalOutcome::failed(0, RunError::Canceled { path });
            }

            match &node.kind {
                NodeKind::Task(type_name) => self.run_task(node, type_name, path, context, cancel, progress).await,
                NodeKind::Group => match group_mode(node, &path) {
                    Ok(GroupMode::Sequential) => self.run_sequential(node, path, context, cancel, progress).await,
                    Ok(GroupMode::Parallel) => self.run_parallel(node, path, context, cancel, progress).await,
                    Err(error) => EvalOutcome::failed(0, error),
                },
                NodeKind::Parallel => self.run_parallel(node, path, context, cancel, progress).await,
                NodeKind::Loop => self.run_loop(node, path, context, cancel, progress).await,
            }
        }
        .boxed()
    }

    async fn run_task(
        &self,
        node: &NodeDefinition,
        type_name: &str,
        path: String,
        context: &mut RunContext,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> EvalOutcome {
        if !node.children.is_empty() {
            return EvalOutcome::failed(
                0,
                RunError::InvalidDefinition {
                    path,
                    reason: format!("leaf node of type '{}' declares children", type_name),
                },
            );
        }

        let Some(neta) = self.pantry.lookup(type_name) else {
            return EvalOutcome::failed(
                0,
                RunError::UnregisteredType {
                    path,
                    type_name: type_name.to_string(),
                },
            );
        };

        let params = match resolve_parameters(&node.parameters, context, self.secrets.as_ref()) {
            Ok(params) => params,
            Err(source) => return EvalOutcome::failed(0, RunError::Resolution { path, source }),
        };

        progress.on_node_started(&path, node.display_name(), type_name);
        debug!(path = %path, type_name = %type_name, "task started");

        let started = Instant::now();
        let execution = neta.execute(cancel, &params).await;
        let duration = started.elapsed();

        match execution {
            Ok(output) => {
                context.record_output(&path, output);
                progress.on_node_completed(&path, duration, None);
                EvalOutcome::ok(1)
            }
            Err(error) => {
                let run_error = RunError::Task {
                    path: path.clone(),
                    message: format!("{error:#}"),
                };
                progress.on_node_completed(&path, duration, Some(&run_error));
                EvalOutcome::failed(1, run_error)
            }
        }
    }

    /// Sequential discipline: strict declared order, full mutual visibility,
    /// fail-fast on the first child error.
    async fn run_sequential(
        &self,
        node: &NodeDefinition,
        path: String,
        context: &mut RunContext,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> EvalOutcome {
        let mut tasks_executed = 0u64;
        for (index, child) in node.children.iter().enumerate() {
            let outcome = self
                .evaluate(child, child_path(&path, child, index), context, cancel, progress)
                .await;
            tasks_executed += outcome.tasks_executed;
            if let Some(error) = outcome.error {
                return EvalOutcome::failed(tasks_executed, error);
            }
        }
        EvalOutcome::ok(tasks_executed)
    }

    /// Parallel discipline: every child becomes a concurrent branch over a
    /// frozen snapshot of the context. The group waits for all branches, then
    /// performs every merge itself; branches never write the shared context.
    /// When several branches fail, the surfaced error is the one from the
    /// lowest declared child index.
    async fn run_parallel(
        &self,
        node: &NodeDefinition,
        path: String,
        context: &mut RunContext,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> EvalOutcome {
        let snapshot = context.snapshot();
        let branches: Vec<_> = node
            .children
            .iter()
            .enumerate()
            .map(|(index, child)| {
                let branch_path = child_path(&path, child, index);
                let mut branch_context = snapshot.clone();
                async move {
                    let outcome = self.evaluate(child, branch_path, &mut branch_context, cancel, progress).await;
                    (branch_context, outcome)
                }
            })
            .collect();

        let mut tasks_executed = 0u64;
        let mut first_error = None;
        for (branch_context, outcome) in join_all(branches).await {
            tasks_executed += outcome.tasks_executed;
            // Completed work is kept even when a sibling failed.
            context.merge_outputs(branch_context.outputs);
            if first_error.is_none() {
                first_error = outcome.error;
            }
        }

        match first_error {
            None => EvalOutcome::ok(tasks_executed),
            Some(error) => EvalOutcome::failed(tasks_executed, error),
        }
    }

    /// Loop discipline: an opaque container that re-executes its child
    /// subtree per iteration, in strict index order. The loop records how
    /// many iterations completed in its own output, on success and failure
    /// alike, so callers can report "k of n" on partial failure.
    async fn run_loop(
        &self,
        node: &NodeDefinition,
        path: String,
        context: &mut RunContext,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> EvalOutcome {
        let params = match resolve_parameters(&node.parameters, context, self.secrets.as_ref()) {
            Ok(params) => params,
            Err(source) => return EvalOutcome::failed(0, RunError::Resolution { path, source }),
        };
        let plan = match loop_plan(&params, &path) {
            Ok(plan) => plan,
            Err(error) => return EvalOutcome::failed(0, error),
        };

        progress.on_node_started(&path, node.display_name(), "loop");
        let started = Instant::now();
        let total = plan.total();

        let mut tasks_executed = 0u64;
        let mut completed_iterations = 0usize;
        let mut first_error: Option<RunError> = None;

        'iterations: for index in 0..total {
            // Each iteration works on a derived context; child outputs are
            // iteration-scoped and discarded when the iteration ends, so the
            // shared context stays monotone across iterations that reuse ids.
            let mut iteration_context = context.clone();
            iteration_context.variables.insert("index".to_string(), json!(index));
            if let LoopPlan::ForEach(items) = &plan {
                let item = items[index].clone();
                if let JsonValue::Object(fields) = &item {
                    for (key, value) in fields {
                        iteration_context.variables.insert(key.clone(), value.clone());
                    }
                }
                iteration_context.variables.insert("item".to_string(), item);
            }

            for (child_index, child) in node.children.iter().enumerate() {
                progress.on_loop_child_progress(&path, child.display_name(), index, total);
                let outcome = self
                    .evaluate(
                        child,
                        child_path(&path, child, child_index),
                        &mut iteration_context,
                        cancel,
                        &NOOP_PROGRESS,
                    )
                    .await;
                tasks_executed += outcome.tasks_executed;
                if let Some(error) = outcome.error {
                    first_error = Some(error);
                    break 'iterations;
                }
            }
            completed_iterations += 1;
        }

        context.record_output(&path, json!({ "iterations": completed_iterations }));
        progress.on_node_completed(&path, started.elapsed(), first_error.as_ref());

        match first_error {
            None => EvalOutcome::ok(tasks_executed),
            Some(error) => EvalOutcome::failed(tasks_executed, error),
        }
    }
}

/// Path addressing: a node's own id when present, else parent path plus
/// positional index. Display and correlation only; no execution effect.
fn child_path(parent: &str, child: &NodeDefinition, index: usize) -> String {
    child.id.clone().unwrap_or_else(|| format!("{parent}.{index}"))
}

fn group_mode(node: &NodeDefinition, path: &str) -> Result<GroupMode, RunError> {
    match node.parameters.get("mode") {
        None => Ok(GroupMode::Sequential),
        Some(JsonValue::String(raw)) => GroupMode::parse(raw).ok_or_else(|| RunError::InvalidDefinition {
            path: path.to_string(),
            reason: format!("unknown group mode '{}'", raw),
        }),
        Some(other) => Err(RunError::InvalidDefinition {
            path: path.to_string(),
            reason: format!("group mode must be a string, got {}", other),
        }),
    }
}

/// Resolved iteration plan for a loop node.
enum LoopPlan {
    Times(usize),
    ForEach(Vec<JsonValue>),
}

impl LoopPlan {
    fn total(&self) -> usize {
        match self {
            Self::Times(count) => *count,
            Self::ForEach(items) => items.len(),
        }
    }
}

fn loop_plan(params: &serde_json::Map<String, JsonValue>, path: &str) -> Result<LoopPlan, RunError> {
    let times = params.get("times");
    let for_each = params.get("forEach");

    match (times, for_each) {
        (Some(_), Some(_)) => Err(invalid_loop(path, "declares both 'times' and 'forEach'")),
        (Some(raw), None) => {
            let count = match raw {
                JsonValue::Number(number) => number.as_u64(),
                JsonValue::String(text) => text.trim().parse::<u64>().ok(),
                _ => None,
            };
            match count {
                Some(count) => Ok(LoopPlan::Times(count as usize)),
                None => Err(invalid_loop(path, "'times' must resolve to a non-negative integer")),
            }
        }
        (None, Some(JsonValue::Array(items))) => Ok(LoopPlan::ForEach(items.clone())),
        (None, Some(_)) => Err(invalid_loop(path, "'forEach' must resolve to a list")),
        (None, None) => Err(invalid_loop(path, "requires a 'times' or 'forEach' parameter")),
    }
}

fn invalid_loop(path: &str, reason: &str) -> RunError {
    RunError::InvalidDefinition {
        path: path.to_string(),
        reason: format!("loop {}", reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pantry::Neta;
    use async_trait::async_trait;
    use bento_types::{ProgressEvent, RunStatus};
    use indexmap::IndexMap;
    use serde_json::{Map as JsonMap, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    fn node(id: Option<&str>, kind: NodeKind, params: &[(&str, JsonValue)], children: Vec<NodeDefinition>) -> NodeDefinition {
        NodeDefinition {
            id: id.map(str::to_string),
            kind,
            name: None,
            parameters: params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<IndexMap<_, _>>(),
            children,
        }
    }

    fn task(id: &str, type_name: &str, params: &[(&str, JsonValue)]) -> NodeDefinition {
        node(Some(id), NodeKind::Task(type_name.into()), params, vec![])
    }

    fn group(children: Vec<NodeDefinition>) -> NodeDefinition {
        node(Some("root"), NodeKind::Group, &[], children)
    }

    struct StaticNeta(JsonValue);

    #[async_trait]
    impl Neta for StaticNeta {
        async fn execute(&self, _cancel: &CancellationToken, _params: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue> {
            Ok(self.0.clone())
        }
    }

    struct EchoNeta;

    #[async_trait]
    impl Neta for EchoNeta {
        async fn execute(&self, _cancel: &CancellationToken, params: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue> {
            Ok(JsonValue::Object(params.clone()))
        }
    }

    struct FailNeta;

    #[async_trait]
    impl Neta for FailNeta {
        async fn execute(&self, _cancel: &CancellationToken, _params: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue> {
            anyhow::bail!("boom")
        }
    }

    /// Fails when its `value` parameter equals "boom", succeeds otherwise.
    struct TripwireNeta;

    #[async_trait]
    impl Neta for TripwireNeta {
        async fn execute(&self, _cancel: &CancellationToken, params: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue> {
            if params.get("value") == Some(&json!("boom")) {
                anyhow::bail!("tripwire hit");
            }
            Ok(JsonValue::Object(params.clone()))
        }
    }

    /// Counts invocations; lets tests verify a neta was never executed.
    struct CountingNeta {
        calls: Arc<AtomicU64>,
    }

    #[async_trait]
    impl Neta for CountingNeta {
        async fn execute(&self, _cancel: &CancellationToken, _params: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({}))
        }
    }

    /// Signals cancellation from inside its own execution, then succeeds.
    struct CancellingNeta;

    #[async_trait]
    impl Neta for CancellingNeta {
        async fn execute(&self, cancel: &CancellationToken, _params: &JsonMap<String, JsonValue>) -> anyhow::Result<JsonValue> {
            cancel.cancel();
            Ok(json!({}))
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl RecordingProgress {
        fn events(&self) -> Vec<ProgressEvent> {
            self.events.lock().expect("events lock").clone()
        }

        fn signatures(&self) -> Vec<String> {
            self.events()
                .iter()
                .map(|event| match event {
                    ProgressEvent::NodeStarted { path, .. } => format!("started:{path}"),
                    ProgressEvent::NodeCompleted { path, .. } => format!("completed:{path}"),
                    ProgressEvent::LoopChildProgress { loop_path, index, .. } => format!("loop:{loop_path}:{index}"),
                })
                .collect()
        }
    }

    impl ProgressReporter for RecordingProgress {
        fn on_node_started(&self, path: &str, name: &str, type_name: &str) {
            self.events.lock().expect("events lock").push(ProgressEvent::NodeStarted {
                path: path.to_string(),
                name: name.to_string(),
                type_name: type_name.to_string(),
            });
        }

        fn on_node_completed(&self, path: &str, duration: Duration, error: Option<&RunError>) {
            self.events.lock().expect("events lock").push(ProgressEvent::NodeCompleted {
                path: path.to_string(),
                duration,
                error: error.map(ToString::to_string),
            });
        }

        fn on_loop_child_progress(&self, loop_path: &str, child_name: &str, index: usize, total: usize) {
            self.events.lock().expect("events lock").push(ProgressEvent::LoopChildProgress {
                loop_path: loop_path.to_string(),
                child_name: child_name.to_string(),
                index,
                total,
            });
        }
    }

    fn standard_pantry() -> Pantry {
        let mut pantry = Pantry::new();
        pantry.register("echo", Box::new(|| Box::new(EchoNeta)));
        pantry.register("fail", Box::new(|| Box::new(FailNeta)));
        pantry.register("tripwire", Box::new(|| Box::new(TripwireNeta)));
        pantry.register("cancelling", Box::new(|| Box::new(CancellingNeta)));
        pantry
    }

    fn engine_with_progress(pantry: Pantry) -> (Itamae, Arc<RecordingProgress>) {
        let progress = Arc::new(RecordingProgress::default());
        let itamae = Itamae::new(Arc::new(pantry)).with_progress(progress.clone());
        (itamae, progress)
    }

    #[tokio::test]
    async fn sequential_child_sees_earlier_sibling_output() {
        let mut pantry = standard_pantry();
        pantry.register("produce", Box::new(|| Box::new(StaticNeta(json!({"x": "v"})))));
        let (itamae, progress) = engine_with_progress(pantry);

        let bento = group(vec![
            task("a", "produce", &[]),
            task("b", "echo", &[("ref", json!("${{ nodes.a.x }}"))]),
        ]);
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.tasks_executed, 2);
        assert_eq!(result.outputs["b"]["ref"], "v");
        assert_eq!(
            progress.signatures(),
            vec!["started:a", "completed:a", "started:b", "completed:b"]
        );
    }

    #[tokio::test]
    async fn sequential_group_fails_fast_and_keeps_prior_work() {
        let calls = Arc::new(AtomicU64::new(0));
        let mut pantry = standard_pantry();
        let counter = calls.clone();
        pantry.register("counting", Box::new(move || Box::new(CountingNeta { calls: counter.clone() })));
        let (itamae, _) = engine_with_progress(pantry);

        let bento = group(vec![
            task("a", "echo", &[("k", json!(1))]),
            task("b", "fail", &[]),
            task("c", "counting", &[]),
        ]);
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Failure);
        assert_eq!(result.tasks_executed, 2);
        assert!(result.outputs.contains_key("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "sibling after failure must never start");
        assert!(matches!(result.error, Some(RunError::Task { .. })));
    }

    #[tokio::test]
    async fn parallel_children_all_succeed_and_merge() {
        let (itamae, progress) = engine_with_progress(standard_pantry());

        let bento = node(
            Some("fanout"),
            NodeKind::Parallel,
            &[],
            vec![
                task("a", "echo", &[("n", json!(1))]),
                task("b", "echo", &[("n", json!(2))]),
                task("c", "echo", &[("n", json!(3))]),
            ],
        );
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.tasks_executed, 3);
        for id in ["a", "b", "c"] {
            assert!(result.outputs.contains_key(id));
        }
        let signatures = progress.signatures();
        assert_eq!(signatures.len(), 6);
        for id in ["a", "b", "c"] {
            assert!(signatures.contains(&format!("started:{id}")));
            assert!(signatures.contains(&format!("completed:{id}")));
        }
    }

    #[tokio::test]
    async fn parallel_sibling_outputs_are_never_visible() {
        let mut pantry = standard_pantry();
        pantry.register("produce", Box::new(|| Box::new(StaticNeta(json!({"x": "v"})))));
        let (itamae, _) = engine_with_progress(pantry);

        // b references a's output; in a parallel group that is always a
        // resolution error regardless of real completion timing.
        let bento = node(
            Some("fanout"),
            NodeKind::Group,
            &[("mode", json!("parallel"))],
            vec![
                task("a", "produce", &[]),
                task("b", "echo", &[("ref", json!("${{ nodes.a.x }}"))]),
            ],
        );
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Failure);
        assert!(matches!(result.error, Some(RunError::Resolution { .. })));
        // a's completed work is merged despite the sibling failure.
        assert_eq!(result.outputs["a"]["x"], "v");
    }

    #[tokio::test]
    async fn parallel_surfaces_error_from_lowest_declared_index() {
        let (itamae, _) = engine_with_progress(standard_pantry());

        let bento = node(
            Some("fanout"),
            NodeKind::Parallel,
            &[],
            vec![task("first-fail", "fail", &[]), task("second-fail", "fail", &[])],
        );
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Failure);
        assert_eq!(result.error.expect("error").path(), "first-fail");
    }

    #[tokio::test]
    async fn for_each_over_empty_list_is_a_successful_noop() {
        let (itamae, progress) = engine_with_progress(standard_pantry());

        let bento = node(
            Some("spin"),
            NodeKind::Loop,
            &[("forEach", json!([]))],
            vec![task("work", "echo", &[])],
        );
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.tasks_executed, 0);
        assert_eq!(result.outputs["spin"]["iterations"], 0);
        assert_eq!(progress.signatures(), vec!["started:spin", "completed:spin"]);
    }

    #[tokio::test]
    async fn times_zero_is_a_successful_noop() {
        let (itamae, _) = engine_with_progress(standard_pantry());

        let bento = node(Some("spin"), NodeKind::Loop, &[("times", json!(0))], vec![task("work", "echo", &[])]);
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.outputs["spin"]["iterations"], 0);
    }

    #[tokio::test]
    async fn times_loop_runs_every_iteration_and_reports_count() {
        let (itamae, _) = engine_with_progress(standard_pantry());

        let bento = node(
            Some("spin"),
            NodeKind::Loop,
            &[("times", json!(5))],
            vec![task("work", "echo", &[("i", json!("${{ index }}"))])],
        );
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.tasks_executed, 5);
        assert_eq!(result.outputs["spin"]["iterations"], 5);
    }

    #[tokio::test]
    async fn loop_failure_reports_completed_iterations_and_stops() {
        let (itamae, progress) = engine_with_progress(standard_pantry());

        let bento = node(
            Some("spin"),
            NodeKind::Loop,
            &[("forEach", json!(["ok", "boom", "never"]))],
            vec![task("work", "tripwire", &[("value", json!("${{ item }}"))])],
        );
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Failure);
        assert_eq!(result.outputs["spin"]["iterations"], 1);
        assert_eq!(result.tasks_executed, 2);
        let signatures = progress.signatures();
        assert!(signatures.contains(&"loop:spin:0".to_string()));
        assert!(signatures.contains(&"loop:spin:1".to_string()));
        assert!(!signatures.contains(&"loop:spin:2".to_string()), "iteration 2 must never start");
    }

    #[tokio::test]
    async fn for_each_object_items_merge_their_fields_into_locals() {
        let (itamae, _) = engine_with_progress(standard_pantry());

        let bento = node(
            Some("spin"),
            NodeKind::Loop,
            &[("forEach", json!([{"host": "a.example"}, {"host": "b.example"}]))],
            vec![task("work", "echo", &[("target", json!("${{ host }}"))])],
        );
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.outputs["spin"]["iterations"], 2);
    }

    #[tokio::test]
    async fn loop_children_share_context_within_one_iteration() {
        let mut pantry = standard_pantry();
        pantry.register("produce", Box::new(|| Box::new(StaticNeta(json!({"x": "v"})))));
        let (itamae, _) = engine_with_progress(pantry);

        let bento = node(
            Some("spin"),
            NodeKind::Loop,
            &[("times", json!(2))],
            vec![
                task("first", "produce", &[]),
                task("second", "echo", &[("ref", json!("${{ nodes.first.x }}"))]),
            ],
        );
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.tasks_executed, 4);
        // The loop is opaque: its children's outputs stay iteration-scoped.
        assert!(!result.outputs.contains_key("first"));
        assert_eq!(result.outputs["spin"]["iterations"], 2);
    }

    #[tokio::test]
    async fn missing_secret_aborts_before_the_neta_runs() {
        let calls = Arc::new(AtomicU64::new(0));
        let mut pantry = standard_pantry();
        let counter = calls.clone();
        pantry.register("counting", Box::new(move || Box::new(CountingNeta { calls: counter.clone() })));
        let (itamae, _) = engine_with_progress(pantry);

        let bento = group(vec![task("deploy", "counting", &[("token", json!("${secret:MISSING}"))])]);
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Failure);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "execute must never be invoked");
        assert!(matches!(result.error, Some(RunError::Resolution { .. })));
    }

    #[tokio::test]
    async fn cancellation_before_any_node_starts() {
        let (itamae, progress) = engine_with_progress(standard_pantry());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let bento = group(vec![task("a", "echo", &[])]);
        let result = itamae.serve(&bento, HashMap::new(), cancel).await;

        assert_eq!(result.status, RunStatus::Failure);
        assert_eq!(result.tasks_executed, 0);
        assert!(result.error.as_ref().is_some_and(RunError::is_cancellation));
        assert!(progress.events().is_empty());
    }

    #[tokio::test]
    async fn cancellation_between_sequential_children() {
        let calls = Arc::new(AtomicU64::new(0));
        let mut pantry = standard_pantry();
        let counter = calls.clone();
        pantry.register("counting", Box::new(move || Box::new(CountingNeta { calls: counter.clone() })));
        let (itamae, _) = engine_with_progress(pantry);

        let bento = group(vec![task("a", "cancelling", &[]), task("b", "counting", &[])]);
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.tasks_executed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "b must never start");
        assert!(result.error.as_ref().is_some_and(RunError::is_cancellation));
    }

    #[tokio::test]
    async fn unregistered_type_is_a_deterministic_error() {
        let (itamae, _) = engine_with_progress(standard_pantry());

        let bento = group(vec![task("odd", "spreadsheet", &[])]);
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Failure);
        match result.error {
            Some(RunError::UnregisteredType { path, type_name }) => {
                assert_eq!(path, "odd");
                assert_eq!(type_name, "spreadsheet");
            }
            other => panic!("expected unregistered type error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn leaf_node_with_children_is_a_definition_error() {
        let (itamae, _) = engine_with_progress(standard_pantry());

        let bento = node(Some("bad"), NodeKind::Task("echo".into()), &[], vec![task("child", "echo", &[])]);
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert!(matches!(result.error, Some(RunError::InvalidDefinition { .. })));
    }

    #[tokio::test]
    async fn unknown_group_mode_is_a_definition_error() {
        let (itamae, _) = engine_with_progress(standard_pantry());

        let bento = node(
            Some("root"),
            NodeKind::Group,
            &[("mode", json!("concurrent"))],
            vec![task("a", "echo", &[])],
        );
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        match result.error {
            Some(RunError::InvalidDefinition { reason, .. }) => assert!(reason.contains("concurrent")),
            other => panic!("expected definition error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ambient_variables_reach_task_parameters() {
        let (itamae, _) = engine_with_progress(standard_pantry());

        let mut variables = HashMap::new();
        variables.insert("region".to_string(), json!("us"));
        let bento = group(vec![task("a", "echo", &[("where", json!("${{ vars.region }}"))])]);
        let result = itamae.serve(&bento, variables, CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.outputs["a"]["where"], "us");
    }

    #[tokio::test]
    async fn positional_paths_are_assigned_when_ids_are_absent() {
        let (itamae, progress) = engine_with_progress(standard_pantry());

        let bento = node(
            None,
            NodeKind::Group,
            &[],
            vec![node(None, NodeKind::Task("echo".into()), &[], vec![])],
        );
        let result = itamae.serve(&bento, HashMap::new(), CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Success);
        assert!(result.outputs.contains_key("0.0"));
        assert_eq!(progress.signatures(), vec!["started:0.0", "completed:0.0"]);
    }
}
