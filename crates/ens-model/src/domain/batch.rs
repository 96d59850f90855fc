use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ModelError, TaskList, Vars, domain::null_as_default};

/// Immutable specification of one batch of runs.
///
/// Everything that is not a task list or the run list is also exposed to
/// templates and tasks as a batch-level variable (see [`Batch::vars`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub name: String,
    /// Directory whose contents seed every run directory.
    pub templatedir: PathBuf,
    /// Files inside the run directory to render; each must carry the template suffix.
    #[serde(default, deserialize_with = "null_as_default")]
    pub templates: Vec<String>,
    /// Job script submitted to the cluster, relative to the run directory.
    pub job_file: String,
    /// Parent directory of all run directories.
    pub basedir: PathBuf,
    /// Maximum concurrently outstanding jobs.
    pub maxjobs: usize,
    /// Maximum concurrently active runs.
    pub maxruns: usize,
    #[serde(default)]
    pub repeat: bool,

    /// Scheduler partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntasks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,

    /// Per-run variable overrides; one run per entry.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing)]
    pub runs: Vec<Vars>,

    #[serde(default, deserialize_with = "null_as_default", skip_serializing)]
    pub pre_batch: TaskList,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing)]
    pub pre_run: TaskList,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing)]
    pub post_run: TaskList,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing)]
    pub post_batch: TaskList,

    /// Any further keys, carried through as batch variables.
    #[serde(flatten)]
    pub extra: Vars,
}

impl Batch {
    /// Identifier of the run at `idx`.
    pub fn run_id(&self, idx: usize) -> String {
        format!("{}-{}", self.name, idx)
    }

    /// Working directory of the run at `idx` below `basedir`.
    pub fn run_dir(&self, basedir: &Path, idx: usize) -> PathBuf {
        basedir.join(self.run_id(idx))
    }

    /// Batch-level variables: every field except task lists, the run list and unset options.
    pub fn vars(&self) -> Result<Vars, ModelError> {
        Vars::from_serialize(self)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::Invalid("batch name is empty".into()));
        }
        if self.maxjobs == 0 {
            return Err(ModelError::Invalid(format!(
                "batch {}: maxjobs must be at least 1",
                self.name
            )));
        }
        if self.maxruns == 0 {
            return Err(ModelError::Invalid(format!(
                "batch {}: maxruns must be at least 1",
                self.name
            )));
        }
        Ok(())
    }
}
