use ens_model::{Batch, Job, JobId, Run, Vars};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    Engine, ProcessingError,
    prepare::prepare,
    task::{OpContext, TaskArgs, builtin::Jobs, run_check, run_task_items},
};

/// Lifecycle position of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Prepared,
    PreRunDone,
    AwaitingSlot,
    Submitted,
    PollingStart,
    Running,
    Terminal,
    /// Post-run tasks completed.
    Done,
    Abandoned,
}

/// Result of driving one run.
///
/// A missing `job_id` means the run never obtained a job and its index is
/// skipped in later cycles.
#[derive(Debug)]
pub struct RunOutcome {
    pub job_id: Option<JobId>,
    pub run: Run,
    pub state: RunState,
}

impl RunOutcome {
    pub fn abandoned(&self) -> bool {
        self.state == RunState::Abandoned
    }

    pub fn submitted(&self) -> bool {
        self.job_id.is_some()
    }
}

/// Drives runs of one batch cycle from preparation to post-run tasks.
///
/// `job_slots` bounds outstanding submissions to the batch's `maxjobs`; a slot
/// is held from the job count check until the scheduler reports the job.
pub struct RunDriver<'a> {
    engine: &'a Engine,
    batch: &'a Batch,
    job_slots: &'a Semaphore,
}

impl<'a> RunDriver<'a> {
    pub fn new(engine: &'a Engine, batch: &'a Batch, job_slots: &'a Semaphore) -> Self {
        Self {
            engine,
            batch,
            job_slots,
        }
    }

    /// Every record of the run, including task and backend logs, is emitted
    /// inside a `run` span carrying the batch name and run id.
    #[instrument(
        name = "run",
        level = "info",
        skip_all,
        fields(batch = %self.batch.name, run = %run.id)
    )]
    pub async fn drive(&self, run: Run) -> RunOutcome {
        info!(cycle = run.cycle, "run started");
        let mut state = RunState::Created;

        if let Err(e) = prepare(self.engine, self.batch, &run).await {
            error!(run = %run.id, error = %e, "cannot template the run, abandoning");
            return abandon(None, run);
        }
        advance(&run, &mut state, RunState::Prepared);

        if let Err(e) = run_task_items(self.engine, &self.batch.pre_run, &run.vars).await {
            report_failure(&run, "pre-run", &e);
            return abandon(None, run);
        }
        advance(&run, &mut state, RunState::PreRunDone);

        let job_id = if self.engine.config().no_submission {
            info!(run = %run.id, "skipping job submission");
            run.id.clone()
        } else {
            match self.submit_and_wait(&run, &mut state).await {
                Some(job_id) => job_id,
                None => return abandon(None, run),
            }
        };
        advance(&run, &mut state, RunState::Terminal);

        if let Err(e) = run_task_items(self.engine, &self.batch.post_run, &run.vars).await {
            report_failure(&run, "post-run", &e);
            return abandon(Some(job_id), run);
        }
        advance(&run, &mut state, RunState::Done);

        info!(run = %run.id, job = %job_id, "run finished");
        RunOutcome {
            job_id: Some(job_id),
            run,
            state,
        }
    }

    /// Submit under a job slot and follow the job to a finish state.
    ///
    /// `None` when no job identifier was obtained.
    async fn submit_and_wait(&self, run: &Run, state: &mut RunState) -> Option<JobId> {
        advance(run, state, RunState::AwaitingSlot);
        let Ok(slot) = self.job_slots.acquire().await else {
            error!(run = %run.id, "job slots closed, abandoning");
            return None;
        };

        if let Err(e) = self.wait_for_job_capacity(run).await {
            report_failure(run, "job count check", &ProcessingError::from(e));
            return None;
        }

        let backend = self.engine.backend();
        let script = run.script_path(self.batch);
        let job_id = match backend.submit_job(run, &script).await {
            Ok(Some(job_id)) => job_id,
            Ok(None) => {
                warn!(run = %run.id, batch = %self.batch.name, "submission could not be confirmed, not continuing");
                return None;
            }
            Err(e) => {
                error!(run = %run.id, batch = %self.batch.name, error = %e, "submission failed");
                return None;
            }
        };
        info!(run = %run.id, job = %job_id, "job submitted");
        advance(run, state, RunState::Submitted);

        advance(run, state, RunState::PollingStart);
        let registered = self.await_registration(run, &job_id).await;
        drop(slot);

        advance(run, state, RunState::Running);
        let job = if backend.is_finished(&registered) {
            registered
        } else {
            self.await_finish(run, &job_id).await
        };
        info!(run = %run.id, job = %job_id, state = %job.state, "job reached a finish state");
        Some(job_id)
    }

    async fn wait_for_job_capacity(&self, run: &Run) -> Result<(), crate::TaskError> {
        if self.engine.config().no_checks {
            return Ok(());
        }
        let mut args = Vars::new();
        args.insert("limit", self.batch.maxjobs);
        args.insert("match", self.batch.name.clone());

        let ctx = OpContext {
            engine: self.engine,
            scope: &run.vars,
            value: None,
        };
        run_check(&ctx, &Jobs, &TaskArgs::new(args)).await
    }

    /// Poll until the job is in a start or finish state.
    async fn await_registration(&self, run: &Run, job_id: &str) -> Job {
        let backend = self.engine.backend();
        let interval = self.engine.config().intervals.submit;
        loop {
            match backend.find_by_id(job_id).await {
                Ok(job) if backend.is_started(&job) || backend.is_finished(&job) => {
                    debug!(run = %run.id, job = %job_id, state = %job.state, "job registered");
                    return job;
                }
                Ok(job) => {
                    debug!(run = %run.id, job = %job_id, state = %job.state, "job not started yet");
                }
                Err(e) => {
                    warn!(run = %run.id, job = %job_id, error = %e, "job not registered yet, or lookup failed");
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Poll until the job is in a finish state; lookup errors back off and retry.
    async fn await_finish(&self, run: &Run, job_id: &str) -> Job {
        let backend = self.engine.backend();
        let intervals = self.engine.config().intervals;
        loop {
            match backend.find_by_id(job_id).await {
                Ok(job) if backend.is_finished(&job) => return job,
                Ok(job) => {
                    debug!(run = %run.id, job = %job_id, state = %job.state, "monitor got state");
                    tokio::time::sleep(intervals.running).await;
                }
                Err(e) => {
                    warn!(
                        run = %run.id,
                        job = %job_id,
                        error = %e,
                        retry_ms = intervals.error.as_millis() as u64,
                        "job status lookup failed while running, retrying"
                    );
                    tokio::time::sleep(intervals.error).await;
                }
            }
        }
    }
}

fn advance(run: &Run, state: &mut RunState, next: RunState) {
    trace!(run = %run.id, from = ?state, to = ?next, "run state");
    *state = next;
}

fn abandon(job_id: Option<JobId>, run: Run) -> RunOutcome {
    warn!(run = %run.id, job = ?job_id, "run abandoned");
    RunOutcome {
        job_id,
        run,
        state: RunState::Abandoned,
    }
}

fn report_failure(run: &Run, stage: &str, err: &ProcessingError) {
    if err.is_not_tolerated() {
        error!(run = %run.id, stage, error = %err, "failure not tolerated, abandoning run");
    } else {
        error!(run = %run.id, stage, error = %err, "run failure caught, abandoning run but not the batch");
    }
}
