use std::{path::Path, time::Duration};

use async_trait::async_trait;
use ens_exec::default_shell;
use ens_model::{Job, JobId, Run, Vars};

use crate::ClusterError;

/// Settings shared by all backends.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// Shell used for scheduler commands and local job scripts.
    pub shell: String,
    /// Wait between queries while a job is not yet visible.
    pub retry_interval: Duration,
    /// Upper bound of the random delay before a submission.
    pub max_stagger: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            shell: default_shell().to_string(),
            retry_interval: Duration::from_secs(10),
            max_stagger: Duration::ZERO,
        }
    }
}

/// Uniform contract over a cluster scheduler.
///
/// Implementations serialize `find_by_id` and `current_jobs` against each other
/// with a backend-scoped lock, so a query never observes a half-registered submission.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// States of a job that is accepted or in flight.
    fn start_states(&self) -> &'static [&'static str];

    /// Terminal states, success or failure.
    fn finish_states(&self) -> &'static [&'static str];

    fn is_started(&self, job: &Job) -> bool {
        job.in_states(self.start_states())
    }

    fn is_finished(&self, job: &Job) -> bool {
        job.in_states(self.finish_states())
    }

    /// Submit the job script of `run`; `Ok(None)` when submission could not be confirmed.
    async fn submit_job(&self, run: &Run, script: &Path) -> Result<Option<JobId>, ClusterError>;

    /// Report the job, waiting until the scheduler knows about it.
    async fn find_by_id(&self, job_id: &str) -> Result<Job, ClusterError>;

    /// Jobs whose name starts with `prefix` and whose state is a start state.
    ///
    /// `scope` is the active variable namespace; backends may read scheduler options (e.g. `cluster`) from it.
    async fn current_jobs(&self, scope: &Vars, prefix: &str) -> Result<Vec<Job>, ClusterError>;
}
