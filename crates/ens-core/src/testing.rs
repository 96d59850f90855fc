//! Test doubles: a scriptable backend, counting operations and batch fixtures.

use std::{
    collections::HashSet,
    os::unix::fs::PermissionsExt,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use ens_cluster::{
    ClusterBackend, ClusterError,
    local::{COMPLETED, FINISH_STATES, RUNNING, START_STATES},
};
use ens_model::{Batch, Job, JobId, Run, Vars};

use crate::{
    Engine, EngineConfig, Intervals, OperationError,
    task::{OpContext, Operation, OperationKind, TaskArgs},
};

/// Backend double. Jobs finish on first lookup unless configured otherwise.
#[derive(Default)]
pub struct MockBackend {
    current: Mutex<Vec<String>>,
    rejected: Mutex<HashSet<String>>,
    submit_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    submits: AtomicUsize,
    lookups: AtomicUsize,
    lookup_failures: AtomicUsize,
    running_polls: AtomicUsize,
}

pub fn mock_backend() -> Arc<MockBackend> {
    Arc::new(MockBackend::default())
}

impl MockBackend {
    pub fn set_current(&self, names: &[&str]) {
        *self.current.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
    }

    /// Submissions for `run_id` return no job identifier.
    pub fn reject(&self, run_id: &str) {
        self.rejected.lock().unwrap().insert(run_id.to_string());
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = delay;
    }

    /// The next `n` lookups fail.
    pub fn fail_lookups(&self, n: usize) {
        self.lookup_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` successful lookups report a running job.
    pub fn running_for(&self, n: usize) {
        self.running_polls.store(n, Ordering::SeqCst);
    }

    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn peak_concurrent_submits(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ClusterBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn start_states(&self) -> &'static [&'static str] {
        START_STATES
    }

    fn finish_states(&self) -> &'static [&'static str] {
        FINISH_STATES
    }

    async fn submit_job(&self, run: &Run, _script: &Path) -> Result<Option<JobId>, ClusterError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.submits.fetch_add(1, Ordering::SeqCst);

        let delay = *self.submit_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.rejected.lock().unwrap().contains(&run.id) {
            return Ok(None);
        }
        Ok(Some(run.id.clone()))
    }

    async fn find_by_id(&self, job_id: &str) -> Result<Job, ClusterError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.lookup_failures) {
            return Err(ClusterError::UnknownJob(job_id.to_string()));
        }
        let mut job = Job::new(job_id, COMPLETED);
        job.started = true;
        if take_one(&self.running_polls) {
            job.state = RUNNING.to_string();
        } else {
            job.finished = true;
        }
        Ok(job)
    }

    async fn current_jobs(&self, _scope: &Vars, prefix: &str) -> Result<Vec<Job>, ClusterError> {
        Ok(self
            .current
            .lock()
            .unwrap()
            .iter()
            .filter(|name| name.starts_with(prefix))
            .map(|name| Job::new(name.as_str(), RUNNING))
            .collect())
    }
}

/// Engine over `backend` with short intervals and `/bin/sh`.
pub fn engine_with<B>(backend: Arc<B>, configure: impl FnOnce(&mut EngineConfig)) -> Engine
where
    B: ClusterBackend + 'static,
{
    let tick = Duration::from_millis(10);
    let mut config = EngineConfig {
        shell: "/bin/sh".into(),
        intervals: Intervals {
            check: tick,
            submit: tick,
            running: tick,
            error: tick,
            max_stagger: Duration::ZERO,
        },
        ..Default::default()
    };
    configure(&mut config);
    Engine::new(config, backend)
}

enum CheckMode {
    SucceedAfter(usize),
    Raise,
}

/// Check named `counting`.
pub struct CountingCheck {
    mode: CheckMode,
    calls: AtomicUsize,
}

impl CountingCheck {
    /// Returns false `n` times, then true.
    pub fn succeed_after(n: usize) -> Self {
        Self {
            mode: CheckMode::SucceedAfter(n),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn raising() -> Self {
        Self {
            mode: CheckMode::Raise,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Operation for CountingCheck {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Check
    }

    async fn invoke(&self, _ctx: &OpContext<'_>, _args: &TaskArgs) -> Result<bool, OperationError> {
        let previous = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            CheckMode::SucceedAfter(n) => Ok(previous >= n),
            CheckMode::Raise => Err(OperationError::Failed("predicate raised".into())),
        }
    }
}

/// Processing task that records its invocations.
pub struct RecordingTask {
    name: &'static str,
    /// Invocations before the task starts failing; `None` never fails.
    fail_after: Option<usize>,
    calls: AtomicUsize,
    last_args: Mutex<Option<Vars>>,
}

impl RecordingTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fail_after: None,
            calls: AtomicUsize::new(0),
            last_args: Mutex::new(None),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self::failing_after(name, 0)
    }

    pub fn failing_after(name: &'static str, successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            ..Self::new(name)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_args(&self) -> Option<Vars> {
        self.last_args.lock().unwrap().clone()
    }
}

#[async_trait]
impl Operation for RecordingTask {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Task
    }

    async fn invoke(&self, _ctx: &OpContext<'_>, args: &TaskArgs) -> Result<bool, OperationError> {
        let previous = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock().unwrap() = Some(args.vars().clone());
        match self.fail_after {
            Some(successes) if previous >= successes => {
                Err(OperationError::Failed(format!("{} failed", self.name)))
            }
            _ => Ok(true),
        }
    }
}

/// Check `fail_if` raising for the run whose `idx` equals the `idx` argument.
pub struct FailIf;

#[async_trait]
impl Operation for FailIf {
    fn name(&self) -> &'static str {
        "fail_if"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Check
    }

    async fn invoke(&self, ctx: &OpContext<'_>, args: &TaskArgs) -> Result<bool, OperationError> {
        let target = args.req_u64("idx")?;
        match ctx.scope.get("idx").and_then(|v| v.as_u64()) {
            Some(idx) if idx == target => Err(OperationError::Failed(format!("run {idx} refused"))),
            _ => Ok(true),
        }
    }
}

/// Counts concurrently active runs between `enter` and `leave`.
///
/// With a rendezvous of `n`, `enter` holds each run until `n` runs have been
/// active at the same time, so overlap does not depend on scheduling luck.
#[derive(Default)]
pub struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
    rendezvous: usize,
}

impl Gauge {
    pub fn rendezvous(n: usize) -> Self {
        Self {
            rendezvous: n,
            ..Default::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn ops(self: &Arc<Self>) -> [Arc<dyn Operation>; 2] {
        [Arc::new(Enter(Arc::clone(self))), Arc::new(Leave(Arc::clone(self)))]
    }
}

struct Enter(Arc<Gauge>);
struct Leave(Arc<Gauge>);

#[async_trait]
impl Operation for Enter {
    fn name(&self) -> &'static str {
        "enter"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Task
    }

    async fn invoke(&self, _ctx: &OpContext<'_>, _args: &TaskArgs) -> Result<bool, OperationError> {
        let now = self.0.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.peak.fetch_max(now, Ordering::SeqCst);
        while self.0.peak() < self.0.rendezvous {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(true)
    }
}

#[async_trait]
impl Operation for Leave {
    fn name(&self) -> &'static str {
        "leave"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Task
    }

    async fn invoke(&self, _ctx: &OpContext<'_>, _args: &TaskArgs) -> Result<bool, OperationError> {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
        Ok(true)
    }
}

/// Batch `tmpl` with one run (`seed: 11`) below `root`.
///
/// The template directory holds an executable `job.sh.j2` with `script` and a
/// static file; run directories go to `root/out`.
pub fn template_batch(root: &Path, script: &str) -> Batch {
    let templatedir = root.join("tmpl");
    std::fs::create_dir_all(&templatedir).unwrap();
    let template = templatedir.join("job.sh.j2");
    std::fs::write(&template, script).unwrap();
    std::fs::set_permissions(&template, std::fs::Permissions::from_mode(0o755)).unwrap();
    std::fs::write(templatedir.join("static.txt"), "static\n").unwrap();

    let yaml = format!(
        r#"
name: tmpl
templatedir: {tmpl}
templates: [job.sh.j2]
job_file: job.sh
basedir: {out}
maxjobs: 1
maxruns: 1
runs:
  - seed: 11
"#,
        tmpl = templatedir.display(),
        out = root.join("out").display(),
    );
    serde_yaml::from_str(&yaml).unwrap()
}

/// `template_batch` renamed to `name` with `runs` run entries.
pub fn batch_with_runs(root: &Path, name: &str, runs: usize, script: &str) -> Batch {
    let mut batch = template_batch(root, script);
    batch.name = name.to_string();
    batch.runs = (0..runs)
        .map(|i| {
            let mut vars = Vars::new();
            vars.insert("seed", i);
            vars
        })
        .collect();
    batch
}

#[cfg(test)]
mod scenarios {
    use super::*;
    use crate::{
        BatchError, EnsembleError, EnsembleExecutor, RunState, StopReason, TaskRegistry,
        execute_batch,
    };
    use ens_cluster::{BackendConfig, LocalBackend};
    use ens_model::{Ensemble, TaskSpec};

    fn registry(ops: impl IntoIterator<Item = Arc<dyn Operation>>) -> TaskRegistry {
        let mut registry = TaskRegistry::with_builtins();
        for op in ops {
            registry.register(op);
        }
        registry
    }

    #[tokio::test]
    async fn active_runs_never_exceed_maxruns() {
        let root = tempfile::tempdir().unwrap();
        let mut batch = batch_with_runs(root.path(), "bound", 6, "echo\n");
        batch.maxruns = 2;
        batch.pre_run = vec![TaskSpec::new("enter")];
        batch.post_run = vec![TaskSpec::new("leave")];

        let gauge = Arc::new(Gauge::rendezvous(2));
        let engine = engine_with(mock_backend(), |cfg| cfg.no_submission = true)
            .with_registry(registry(gauge.ops()));

        let report = execute_batch(&engine, &batch, &Vars::new()).await.unwrap();

        assert_eq!(report.outcomes.len(), 6);
        assert_eq!(gauge.peak(), 2);
        assert_eq!(gauge.active(), 0);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[tokio::test]
    async fn check_retries_are_logged_with_batch_and_run_context() {
        let root = tempfile::tempdir().unwrap();
        let mut batch = template_batch(root.path(), "echo\n");
        batch.pre_run = vec![TaskSpec::new("counting")];

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let engine = engine_with(mock_backend(), |_| {}).with_registry(registry([
            Arc::new(CountingCheck::succeed_after(1)) as Arc<dyn Operation>,
        ]));
        execute_batch(&engine, &batch, &Vars::new()).await.unwrap();

        let lines = captured.lines();
        let retry = lines
            .iter()
            .find(|line| line.contains("check not satisfied"))
            .unwrap();
        assert!(retry.contains("INFO"));
        assert!(retry.contains("batch{batch=tmpl}"));
        assert!(retry.contains("run{batch=tmpl run=tmpl-0}"));
        assert!(retry.contains("task=counting"));
    }

    #[tokio::test]
    async fn single_job_slot_serializes_submissions() {
        let root = tempfile::tempdir().unwrap();
        let mut batch = batch_with_runs(root.path(), "serial", 3, "echo\n");
        batch.maxruns = 3;
        batch.maxjobs = 1;

        let backend = mock_backend();
        backend.set_submit_delay(Duration::from_millis(30));
        let engine = engine_with(backend.clone(), |_| {});

        let report = execute_batch(&engine, &batch, &Vars::new()).await.unwrap();

        assert_eq!(backend.submits(), 3);
        assert_eq!(backend.peak_concurrent_submits(), 1);
        assert!(report.outcomes.iter().all(|o| o.state == RunState::Done));
    }

    #[tokio::test]
    async fn raising_check_abandons_only_its_run() {
        let root = tempfile::tempdir().unwrap();
        let mut batch = batch_with_runs(root.path(), "siblings", 3, "echo\n");
        batch.maxruns = 3;
        batch.pre_run = vec![TaskSpec::new("fail_if").with_arg("idx", 1)];

        let engine = engine_with(mock_backend(), |_| {}).with_registry(registry([
            Arc::new(FailIf) as Arc<dyn Operation>,
        ]));

        let report = execute_batch(&engine, &batch, &Vars::new()).await.unwrap();

        let by_idx = |idx: usize| report.outcomes.iter().find(|o| o.run.idx == idx).unwrap();
        assert!(by_idx(1).abandoned());
        assert!(by_idx(1).job_id.is_none());
        assert_eq!(by_idx(0).job_id.as_deref(), Some("siblings-0"));
        assert_eq!(by_idx(2).job_id.as_deref(), Some("siblings-2"));
        assert_eq!(report.skipped, [1].into_iter().collect());
    }

    #[tokio::test]
    async fn skipped_index_is_not_rescheduled_in_next_cycle() {
        let root = tempfile::tempdir().unwrap();
        let mut batch = batch_with_runs(root.path(), "rep", 2, "echo\n");
        batch.repeat = true;
        batch.maxruns = 2;
        batch.post_batch = vec![TaskSpec::new("stop")];

        let backend = mock_backend();
        backend.reject("rep-1");
        let stop = Arc::new(RecordingTask::failing_after("stop", 1));
        let engine = engine_with(backend.clone(), |cfg| cfg.pickup = true)
            .with_registry(registry([stop.clone() as Arc<dyn Operation>]));

        let report = execute_batch(&engine, &batch, &Vars::new()).await.unwrap();

        assert_eq!(report.cycles, 2);
        assert_eq!(report.stop, StopReason::PostBatchFailed);
        let second: Vec<usize> = report
            .outcomes
            .iter()
            .filter(|o| o.run.cycle == 2)
            .map(|o| o.run.idx)
            .collect();
        assert_eq!(second, vec![0]);
        assert_eq!(backend.submits(), 3);
    }

    #[tokio::test]
    async fn batch_stops_when_every_index_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let mut batch = batch_with_runs(root.path(), "dead", 2, "echo\n");
        batch.repeat = true;

        let backend = mock_backend();
        backend.reject("dead-0");
        backend.reject("dead-1");
        let engine = engine_with(backend.clone(), |cfg| cfg.pickup = true);

        let report = execute_batch(&engine, &batch, &Vars::new()).await.unwrap();

        assert_eq!(report.cycles, 1);
        assert_eq!(report.stop, StopReason::NoEligibleRuns);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(backend.submits(), 2);
    }

    #[tokio::test]
    async fn local_backend_runs_every_job_to_completion() {
        let root = tempfile::tempdir().unwrap();
        let mut batch = batch_with_runs(
            root.path(),
            "local",
            3,
            "#!/bin/sh\necho {{ id }} > done.txt\n",
        );
        batch.maxruns = 2;
        batch.maxjobs = 1;

        let backend = Arc::new(LocalBackend::new(BackendConfig {
            shell: "/bin/sh".into(),
            retry_interval: Duration::from_millis(10),
            max_stagger: Duration::ZERO,
        }));
        let engine = engine_with(backend, |_| {});

        let report = execute_batch(&engine, &batch, &Vars::new()).await.unwrap();

        assert_eq!(report.outcomes.len(), 3);
        for outcome in &report.outcomes {
            assert_eq!(outcome.job_id.as_deref(), Some(outcome.run.id.as_str()));
            assert_eq!(outcome.state, RunState::Done);
            let written = std::fs::read_to_string(outcome.run.dir.join("done.txt")).unwrap();
            assert_eq!(written.trim(), outcome.run.id);
        }
    }

    #[tokio::test]
    async fn existing_run_directory_abandons_without_running_tasks() {
        let root = tempfile::tempdir().unwrap();
        let mut batch = template_batch(root.path(), "echo\n");
        batch.pre_run = vec![TaskSpec::new("record")];
        batch.post_run = vec![TaskSpec::new("record")];
        std::fs::create_dir_all(root.path().join("out").join("tmpl-0")).unwrap();

        let record = Arc::new(RecordingTask::new("record"));
        let backend = mock_backend();
        let engine = engine_with(backend.clone(), |_| {})
            .with_registry(registry([record.clone() as Arc<dyn Operation>]));

        let report = execute_batch(&engine, &batch, &Vars::new()).await.unwrap();

        let outcome = &report.outcomes[0];
        assert!(outcome.job_id.is_none());
        assert!(outcome.abandoned());
        assert_eq!(record.calls(), 0);
        assert_eq!(backend.submits(), 0);
    }

    #[tokio::test]
    async fn unsuffixed_template_abandons_the_run() {
        let root = tempfile::tempdir().unwrap();
        let mut batch = template_batch(root.path(), "echo\n");
        batch.templates = vec!["static.txt".into()];

        let engine = engine_with(mock_backend(), |_| {});
        let report = execute_batch(&engine, &batch, &Vars::new()).await.unwrap();

        assert!(report.outcomes[0].job_id.is_none());
        assert!(!report.outcomes[0].run.dir.exists());
    }

    #[tokio::test]
    async fn lookup_errors_and_running_polls_are_retried() {
        let root = tempfile::tempdir().unwrap();
        let batch = template_batch(root.path(), "echo\n");

        let backend = mock_backend();
        backend.fail_lookups(2);
        backend.running_for(3);
        let engine = engine_with(backend.clone(), |_| {});

        let report = execute_batch(&engine, &batch, &Vars::new()).await.unwrap();

        assert_eq!(report.outcomes[0].state, RunState::Done);
        // two failures, one registration poll, two running polls, one finished poll
        assert_eq!(backend.lookups(), 6);
    }

    #[tokio::test]
    async fn dry_run_uses_run_id_and_never_submits() {
        let root = tempfile::tempdir().unwrap();
        let batch = batch_with_runs(root.path(), "dry", 2, "echo\n");

        let backend = mock_backend();
        let engine = engine_with(backend.clone(), |cfg| cfg.no_submission = true);

        let report = execute_batch(&engine, &batch, &Vars::new()).await.unwrap();

        assert_eq!(backend.submits(), 0);
        let ids: Vec<_> = report.outcomes.iter().map(|o| o.job_id.clone()).collect();
        assert_eq!(ids, vec![Some("dry-0".into()), Some("dry-1".into())]);
    }

    #[tokio::test]
    async fn post_run_failure_keeps_job_id() {
        let root = tempfile::tempdir().unwrap();
        let mut batch = template_batch(root.path(), "echo\n");
        batch.post_run = vec![TaskSpec::new("boom")];

        let engine = engine_with(mock_backend(), |_| {}).with_registry(registry([
            Arc::new(RecordingTask::failing("boom")) as Arc<dyn Operation>,
        ]));
        let report = execute_batch(&engine, &batch, &Vars::new()).await.unwrap();

        let outcome = &report.outcomes[0];
        assert!(outcome.abandoned());
        assert_eq!(outcome.job_id.as_deref(), Some("tmpl-0"));
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn selection_filters_limit_scheduled_indices() {
        let root = tempfile::tempdir().unwrap();
        let batch = batch_with_runs(root.path(), "sel", 4, "echo\n");

        let engine = engine_with(mock_backend(), |cfg| {
            cfg.no_submission = true;
            cfg.skips = 1;
            cfg.indexes = Some([0, 2, 3].into_iter().collect());
        });
        let report = execute_batch(&engine, &batch, &Vars::new()).await.unwrap();

        let scheduled: Vec<usize> = report.outcomes.iter().map(|o| o.run.idx).collect();
        assert_eq!(scheduled, vec![2, 3]);
    }

    #[tokio::test]
    async fn pre_batch_failure_aborts_before_any_run() {
        let root = tempfile::tempdir().unwrap();
        let mut batch = template_batch(root.path(), "echo\n");
        batch.pre_batch = vec![TaskSpec::new("boom")];

        let backend = mock_backend();
        let engine = engine_with(backend.clone(), |_| {}).with_registry(registry([
            Arc::new(RecordingTask::failing("boom")) as Arc<dyn Operation>,
        ]));

        assert!(matches!(
            execute_batch(&engine, &batch, &Vars::new()).await,
            Err(BatchError::PreBatch { .. })
        ));
        assert!(!root.path().join("out").join("tmpl-0").exists());
        assert_eq!(backend.submits(), 0);
    }

    #[tokio::test]
    async fn ensemble_continues_past_aborted_batch() {
        let root = tempfile::tempdir().unwrap();
        let mut first = batch_with_runs(root.path(), "first", 1, "echo\n");
        first.pre_batch = vec![TaskSpec::new("boom")];
        let second = batch_with_runs(root.path(), "second", 1, "echo {{ greeting }}\n");

        let mut vars = Vars::new();
        vars.insert("greeting", "hello");
        let ensemble = Ensemble {
            vars,
            pre_process: vec![TaskSpec::new("record")],
            post_process: vec![TaskSpec::new("record")],
            batches: vec![first, second],
        };

        let record = Arc::new(RecordingTask::new("record"));
        let engine = engine_with(mock_backend(), |_| {}).with_registry(registry([
            Arc::new(RecordingTask::failing("boom")) as Arc<dyn Operation>,
            record.clone() as Arc<dyn Operation>,
        ]));

        let report = EnsembleExecutor::new(&engine, &ensemble).run().await.unwrap();

        assert!(!report.success());
        assert_eq!(report.aborted[0].0, "first");
        assert_eq!(report.batches.len(), 1);
        assert_eq!(report.batches[0].name, "second");
        assert_eq!(record.calls(), 2);
        let script = root.path().join("out").join("second-0").join("job.sh");
        assert_eq!(std::fs::read_to_string(script).unwrap(), "echo hello\n");
    }

    #[tokio::test]
    async fn pre_process_failure_stops_the_ensemble() {
        let ensemble = Ensemble {
            vars: Vars::new(),
            pre_process: vec![TaskSpec::new("boom")],
            post_process: vec![],
            batches: vec![],
        };
        let engine = engine_with(mock_backend(), |_| {}).with_registry(registry([
            Arc::new(RecordingTask::failing("boom")) as Arc<dyn Operation>,
        ]));

        assert!(matches!(
            EnsembleExecutor::new(&engine, &ensemble).run().await,
            Err(EnsembleError::PreProcess(_))
        ));
    }
}
