//! Task and check execution.
//!
//! A task item names a registered [`Operation`]. Checks are predicates retried
//! until they return true; processing tasks run exactly once. Any failure in a
//! sequence of items aborts the sequence with a [`ProcessingError`].

mod args;
pub use args::TaskArgs;

mod registry;
pub use registry::TaskRegistry;

pub mod builtin;

use async_trait::async_trait;
use ens_cluster::ClusterBackend;
use ens_exec::Executor;
use ens_model::{TaskSpec, Value, Vars, back_reference};
use tracing::{debug, error, info, instrument, warn};

use crate::{Engine, EngineConfig, OperationError, ProcessingError, TaskError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Idempotent predicate, retried until true.
    Check,
    /// Side effect, invoked once.
    Task,
}

/// What an operation sees of the engine while it runs.
pub struct OpContext<'a> {
    pub engine: &'a Engine,
    /// Active variable namespace (run, or batch/ensemble for batch level items).
    pub scope: &'a Vars,
    /// Free-form `value` of the task entry.
    pub value: Option<&'a Value>,
}

impl OpContext<'_> {
    pub fn backend(&self) -> &dyn ClusterBackend {
        self.engine.backend()
    }

    pub fn exec(&self) -> &Executor {
        self.engine.exec()
    }

    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }
}

/// A named check or processing task.
#[async_trait]
pub trait Operation: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> OperationKind;

    /// Whether `cwd` defaults to the scope's `dir` when not given.
    fn accepts_cwd(&self) -> bool {
        false
    }

    /// For checks, `Ok(false)` means "not yet". For tasks it is logged and otherwise ignored.
    async fn invoke(&self, ctx: &OpContext<'_>, args: &TaskArgs) -> Result<bool, OperationError>;
}

/// Substitute `"run.<field>"` argument values from `scope`.
pub fn resolve_args(
    spec: &TaskSpec,
    op: &dyn Operation,
    scope: &Vars,
) -> Result<TaskArgs, TaskError> {
    let mut resolved = Vars::new();
    for (key, value) in spec.args.iter() {
        let value = match back_reference(value) {
            Some(field) => scope
                .field(field)
                .map_err(|_| TaskError::UnresolvedReference {
                    task: spec.name.clone(),
                    arg: key.clone(),
                    field: field.to_string(),
                })?
                .clone(),
            None => value.clone(),
        };
        debug!(task = %spec.name, arg = %key, %value, "resolved argument");
        resolved.insert(key.clone(), value);
    }

    if op.accepts_cwd()
        && resolved.get("cwd").is_none_or(Value::is_null)
        && let Some(dir) = scope.get("dir")
    {
        resolved.insert("cwd", dir.clone());
    }
    Ok(TaskArgs::new(resolved))
}

/// Invoke one task item against `scope`.
#[instrument(level = "debug", skip_all, fields(task = %spec.name))]
pub async fn run_item(engine: &Engine, spec: &TaskSpec, scope: &Vars) -> Result<(), TaskError> {
    let op = engine.registry().resolve(&spec.name)?;

    if op.kind() == OperationKind::Check && engine.config().no_checks {
        info!(check = %spec.name, "skipping check");
        return Ok(());
    }

    let args = resolve_args(spec, op.as_ref(), scope)?;
    let ctx = OpContext {
        engine,
        scope,
        value: spec.value.as_ref(),
    };

    match op.kind() {
        OperationKind::Check => run_check(&ctx, op.as_ref(), &args).await,
        OperationKind::Task => run_task(&ctx, op.as_ref(), &args).await,
    }
}

/// Retry a check until it returns true, sleeping the check interval after each false.
///
/// An error from the predicate is never retried.
pub async fn run_check(
    ctx: &OpContext<'_>,
    op: &dyn Operation,
    args: &TaskArgs,
) -> Result<(), TaskError> {
    let interval = ctx.config().intervals.check;
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        match op.invoke(ctx, args).await {
            Ok(true) => {
                debug!(check = op.name(), attempt, "check passed");
                return Ok(());
            }
            Ok(false) => {
                info!(
                    check = op.name(),
                    attempt,
                    wait_ms = interval.as_millis() as u64,
                    "check not satisfied, waiting for next attempt"
                );
                tokio::time::sleep(interval).await;
            }
            Err(source) => {
                error!(check = op.name(), attempt, error = %source, "check raised, abandoning");
                return Err(TaskError::Check {
                    name: op.name().to_string(),
                    source,
                });
            }
        }
    }
}

/// Invoke a processing task once.
pub async fn run_task(
    ctx: &OpContext<'_>,
    op: &dyn Operation,
    args: &TaskArgs,
) -> Result<(), TaskError> {
    match op.invoke(ctx, args).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!(task = op.name(), "task reported an unsuccessful result");
            Ok(())
        }
        Err(source) => {
            error!(task = op.name(), error = %source, "task raised");
            Err(TaskError::Task {
                name: op.name().to_string(),
                source,
            })
        }
    }
}

/// Run `items` in order; the first failure aborts the rest.
pub async fn run_task_items(
    engine: &Engine,
    items: &[TaskSpec],
    scope: &Vars,
) -> Result<(), ProcessingError> {
    for item in items {
        debug!(task = %item.name, "running task item");
        run_item(engine, item, scope).await?;
    }
    Ok(())
}
