//! Local stand-in for a cluster scheduler.
//!
//! Job scripts run on tokio's blocking worker threads; the job table is shared
//! with those threads behind a plain mutex. A job leaves the table once a
//! lookup has reported it finished.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use ens_exec::{CommandSpec, Executor};
use ens_model::{Job, JobId, Run, Vars};
use tracing::{debug, info, warn};

use crate::{BackendConfig, ClusterBackend, ClusterError};

pub const SUBMITTED: &str = "SUBMITTED";
pub const RUNNING: &str = "RUNNING";
pub const COMPLETED: &str = "COMPLETED";
pub const FAILED: &str = "FAILED";

pub const START_STATES: &[&str] = &[SUBMITTED, RUNNING];
pub const FINISH_STATES: &[&str] = &[COMPLETED, FAILED];

type JobTable = Arc<Mutex<HashMap<JobId, Job>>>;

pub struct LocalBackend {
    exec: Executor,
    jobs: JobTable,
    query_lock: tokio::sync::Mutex<()>,
}

impl LocalBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            exec: Executor::new(config.shell),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            query_lock: tokio::sync::Mutex::new(()),
        }
    }
}

fn table(jobs: &Mutex<HashMap<JobId, Job>>) -> MutexGuard<'_, HashMap<JobId, Job>> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

fn transition(jobs: &JobTable, id: &str, state: &str) {
    if let Some(job) = table(jobs).get_mut(id) {
        job.state = state.to_string();
        job.started = true;
        job.finished = FINISH_STATES.contains(&state);
    }
}

#[async_trait]
impl ClusterBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn start_states(&self) -> &'static [&'static str] {
        START_STATES
    }

    fn finish_states(&self) -> &'static [&'static str] {
        FINISH_STATES
    }

    async fn submit_job(&self, run: &Run, script: &Path) -> Result<Option<JobId>, ClusterError> {
        let id: JobId = run.id.clone();
        table(&self.jobs).insert(id.clone(), Job::new(&run.id, SUBMITTED));

        let spec = CommandSpec::argv(self.exec.shell(), [script]).cwd(&run.dir);
        let exec = self.exec.clone();
        let jobs = Arc::clone(&self.jobs);
        let job_id = id.clone();

        tokio::task::spawn_blocking(move || {
            transition(&jobs, &job_id, RUNNING);
            let state = match exec.run_blocking(&spec) {
                Ok(out) if out.success() => COMPLETED,
                Ok(out) => {
                    warn!(job = %job_id, code = ?out.code, "local job exited with failure");
                    FAILED
                }
                Err(e) => {
                    warn!(job = %job_id, error = %e, "local job could not be started");
                    FAILED
                }
            };
            transition(&jobs, &job_id, state);
            debug!(job = %job_id, state, "local job finished");
        });

        info!(job = %id, "submitted local job");
        Ok(Some(id))
    }

    async fn find_by_id(&self, job_id: &str) -> Result<Job, ClusterError> {
        let _guard = self.query_lock.lock().await;
        let mut jobs = table(&self.jobs);
        let job = jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| ClusterError::UnknownJob(job_id.to_string()))?;
        if job.finished {
            jobs.remove(job_id);
            debug!(job = %job_id, state = %job.state, "finished local job reported, dropped from table");
        }
        Ok(job)
    }

    async fn current_jobs(&self, _scope: &Vars, prefix: &str) -> Result<Vec<Job>, ClusterError> {
        let _guard = self.query_lock.lock().await;
        let jobs = table(&self.jobs)
            .values()
            .filter(|job| job.name.starts_with(prefix) && job.in_states(START_STATES))
            .cloned()
            .collect();
        Ok(jobs)
    }
}
