//! SLURM backend driven through `sbatch`, `sacct` and `squeue`.

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};

use async_trait::async_trait;
use ens_exec::{CommandSpec, Executor};
use ens_model::{Job, JobId, Run, Vars};
use rand::Rng;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::{BackendConfig, ClusterBackend, ClusterError};

pub const START_STATES: &[&str] = &[
    "COMPLETING",
    "PENDING",
    "RESV_DEL_HOLD",
    "RUNNING",
    "SUSPENDED",
    "CONFIGURING",
    "REQUEUE_FED",
    "REQUEUE_HOLD",
    "REQUEUED",
    "RESIZING",
    "REVOKED",
    "SIGNALED",
    "STOPPED",
];

pub const FINISH_STATES: &[&str] = &[
    "COMPLETED",
    "FAILED",
    "CANCELLED",
    "OUT_OF_MEMORY",
    "DEADLINE",
    "NODE_FAIL",
    "PREEMPTED",
    "TIMEOUT",
];

static SBATCH_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Submitted batch job (\d+)$").expect("valid sbatch regex")
});

pub struct SlurmBackend {
    exec: Executor,
    retry_interval: Duration,
    max_stagger: Duration,
    /// Directory holding the scheduler commands; looked up on `PATH` when unset.
    bin_dir: Option<PathBuf>,
    query_lock: tokio::sync::Mutex<()>,
}

impl SlurmBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            exec: Executor::new(config.shell),
            retry_interval: config.retry_interval,
            max_stagger: config.max_stagger,
            bin_dir: None,
            query_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    fn program(&self, name: &str) -> String {
        match &self.bin_dir {
            Some(dir) => dir.join(name).display().to_string(),
            None => name.to_string(),
        }
    }

    fn stagger(&self) -> Duration {
        let max_ms = self.max_stagger.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }
}

#[async_trait]
impl ClusterBackend for SlurmBackend {
    fn name(&self) -> &'static str {
        "slurm"
    }

    fn start_states(&self) -> &'static [&'static str] {
        START_STATES
    }

    fn finish_states(&self) -> &'static [&'static str] {
        FINISH_STATES
    }

    async fn submit_job(&self, run: &Run, script: &Path) -> Result<Option<JobId>, ClusterError> {
        let delay = self.stagger();
        if !delay.is_zero() {
            debug!(run = %run.id, delay_ms = delay.as_millis() as u64, "staggering submission");
            tokio::time::sleep(delay).await;
        }

        let spec = CommandSpec::argv(self.program("sbatch"), [script]).cwd(&run.dir);
        let out = self.exec.run(&spec).await?;

        match parse_sbatch(&out.stdout) {
            Some(id) => {
                info!(run = %run.id, job = %id, "submitted job");
                Ok(Some(id))
            }
            None => {
                warn!(
                    run = %run.id,
                    code = ?out.code,
                    stdout = %out.stdout.trim(),
                    "sbatch did not confirm submission"
                );
                Ok(None)
            }
        }
    }

    async fn find_by_id(&self, job_id: &str) -> Result<Job, ClusterError> {
        let spec = CommandSpec::argv(
            self.program("sacct"),
            ["-XnP", "-j", job_id, "-o", "jobname,state,start,end"],
        );
        loop {
            let out = {
                let _guard = self.query_lock.lock().await;
                self.exec.run(&spec).await?
            };
            if out.success()
                && let Some(job) = parse_sacct(&out.stdout)
            {
                debug!(job = %job_id, name = %job.name, state = %job.state, "sacct result");
                return Ok(job);
            }
            warn!(job = %job_id, "job not visible in sacct yet, retrying");
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    async fn current_jobs(&self, scope: &Vars, prefix: &str) -> Result<Vec<Job>, ClusterError> {
        let mut spec = CommandSpec::argv(self.program("squeue"), ["-o", "%j,%T", "-h"]);
        if let Some(partition) = scope.get_str("cluster") {
            spec = spec.args_from(["-p", partition]);
        }

        loop {
            let out = {
                let _guard = self.query_lock.lock().await;
                self.exec.run(&spec).await?
            };
            if out.success() {
                let jobs = parse_squeue(&out.stdout, prefix);
                debug!(prefix, count = jobs.len(), "squeue result");
                return Ok(jobs);
            }
            warn!(prefix, code = ?out.code, "could not retrieve job list, retrying");
            tokio::time::sleep(self.retry_interval).await;
        }
    }
}

/// Job id from `sbatch` output.
pub fn parse_sbatch(stdout: &str) -> Option<JobId> {
    SBATCH_ID
        .captures(stdout.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// First job line of `sacct -XnP -o jobname,state,start,end`.
///
/// States such as `CANCELLED by 1000` are reduced to their first word.
pub fn parse_sacct(stdout: &str) -> Option<Job> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut fields = line.split('|');
    let name = fields.next()?;
    let state = fields.next()?.split_whitespace().next()?;
    let start = fields.next()?;
    let end = fields.next()?;

    Some(Job {
        name: name.to_string(),
        state: state.to_string(),
        started: is_known_time(start),
        finished: is_known_time(end),
    })
}

fn is_known_time(field: &str) -> bool {
    let field = field.trim();
    !(field.is_empty() || field == "Unknown" || field == "None")
}

/// Jobs from `squeue -o "%j,%T" -h` matching `prefix` and in a start state.
pub fn parse_squeue(stdout: &str, prefix: &str) -> Vec<Job> {
    stdout
        .lines()
        .filter_map(|line| line.trim().rsplit_once(','))
        .filter(|(name, state)| name.starts_with(prefix) && START_STATES.contains(state))
        .map(|(name, state)| Job {
            name: name.to_string(),
            state: state.to_string(),
            started: state != "PENDING",
            finished: false,
        })
        .collect()
}
