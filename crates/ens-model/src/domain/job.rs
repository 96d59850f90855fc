use serde::{Deserialize, Serialize};

/// Scheduler-assigned job identifier.
///
/// Numeric for SLURM, the run identifier for the local backend.
pub type JobId = String;

/// Snapshot of a scheduler job as reported by one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job name; matches the run identifier.
    pub name: String,
    /// Scheduler-defined state string.
    pub state: String,
    pub started: bool,
    pub finished: bool,
}

impl Job {
    pub fn new(name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: state.into(),
            started: false,
            finished: false,
        }
    }

    /// True when the state is one of `states`.
    pub fn in_states(&self, states: &[&str]) -> bool {
        states.iter().any(|s| *s == self.state)
    }
}
