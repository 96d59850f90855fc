use std::{collections::BTreeSet, time::Duration};

use ens_cluster::BackendConfig;
use ens_exec::default_shell;

/// Retry cadence of the engine's polling loops.
///
/// These bound polling latency only, never job runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    /// Between attempts of a check that returned false.
    pub check: Duration,
    /// Between polls while a submitted job is not yet visible or started.
    pub submit: Duration,
    /// Between polls of a running job.
    pub running: Duration,
    /// After a scheduler query error while the job runs.
    pub error: Duration,
    /// Upper bound of the random delay before each submission.
    pub max_stagger: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            check: Duration::from_secs(10),
            submit: Duration::from_secs(10),
            running: Duration::from_secs(10),
            error: Duration::from_secs(120),
            max_stagger: Duration::from_secs(60),
        }
    }
}

/// Options for one orchestration pass, shared by every component.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Skip submission; runs count as finished immediately.
    pub no_submission: bool,
    /// Treat every check as passed without invoking it.
    pub no_checks: bool,
    /// Reuse existing run directories.
    pub pickup: bool,
    /// Skip the first `skips` run entries of every batch.
    pub skips: usize,
    /// When set, only these run indices are eligible.
    pub indexes: Option<BTreeSet<usize>>,
    pub shell: String,
    pub intervals: Intervals,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            no_submission: false,
            no_checks: false,
            pickup: false,
            skips: 0,
            indexes: None,
            shell: default_shell().to_string(),
            intervals: Intervals::default(),
        }
    }
}

impl EngineConfig {
    /// Whether the index passes the `skips`/`indexes` filters.
    pub fn selects(&self, idx: usize) -> bool {
        idx >= self.skips
            && self
                .indexes
                .as_ref()
                .is_none_or(|indexes| indexes.contains(&idx))
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            shell: self.shell.clone(),
            retry_interval: self.intervals.submit,
            max_stagger: self.intervals.max_stagger,
        }
    }
}
