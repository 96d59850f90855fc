use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::{Batch, Vars};

/// Execution context of one run within one batch cycle.
///
/// `vars` is the full namespace seen by templates and tasks:
/// ensemble variables, then batch fields, then the run entry, then the generated
/// `idx`/`id`/`dir`/`cycle` fields, then extra command line variables.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub idx: usize,
    pub id: String,
    pub dir: PathBuf,
    pub cycle: usize,
    pub vars: Vars,
}

impl Run {
    /// Build the run at `idx` of `batch`.
    ///
    /// `scope` holds the ensemble and batch variables already layered, `basedir` must be absolute.
    pub fn new(
        batch: &Batch,
        scope: &Vars,
        basedir: &Path,
        idx: usize,
        cycle: usize,
        extra: &Vars,
    ) -> Self {
        let id = batch.run_id(idx);
        let dir = batch.run_dir(basedir, idx);

        let mut vars = scope.clone();
        if let Some(entry) = batch.runs.get(idx) {
            vars.extend(entry);
        }
        vars.insert("idx", idx);
        vars.insert("id", id.clone());
        vars.insert("dir", dir.display().to_string());
        vars.insert("cycle", cycle);
        vars.extend(extra);

        Self {
            idx,
            id,
            dir,
            cycle,
            vars,
        }
    }

    /// Path of the batch job script inside the run directory.
    pub fn script_path(&self, batch: &Batch) -> PathBuf {
        self.dir.join(&batch.job_file)
    }
}
