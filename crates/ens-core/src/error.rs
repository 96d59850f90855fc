use std::path::PathBuf;

use ens_cluster::ClusterError;
use ens_exec::ExecError;
use ens_model::ModelError;
use thiserror::Error;

/// Failure raised by an operation while it runs.
#[derive(Error, Debug)]
pub enum OperationError {
    /// The operation refuses to be retried; the run is abandoned.
    #[error("failure not tolerated: {0}")]
    NotTolerated(String),
    #[error("{0}")]
    Failed(String),
    #[error("invalid argument '{arg}': {reason}")]
    InvalidArgument { arg: String, reason: String },
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Failure of one task item.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("check '{name}' raised: {source}")]
    Check {
        name: String,
        #[source]
        source: OperationError,
    },
    #[error("task '{name}' raised: {source}")]
    Task {
        name: String,
        #[source]
        source: OperationError,
    },
    #[error("no operation named '{0}' is registered")]
    UnknownOperation(String),
    #[error("task '{task}': argument '{arg}' references unknown field '{field}'")]
    UnresolvedReference {
        task: String,
        arg: String,
        field: String,
    },
}

impl TaskError {
    pub fn is_not_tolerated(&self) -> bool {
        matches!(
            self,
            TaskError::Check {
                source: OperationError::NotTolerated(_),
                ..
            } | TaskError::Task {
                source: OperationError::NotTolerated(_),
                ..
            }
        )
    }
}

/// Raised out of a task item sequence; wraps the item failure that aborted it.
#[derive(Error, Debug)]
#[error("processing failed: {0}")]
pub struct ProcessingError(#[from] TaskError);

impl ProcessingError {
    pub fn cause(&self) -> &TaskError {
        &self.0
    }

    pub fn is_not_tolerated(&self) -> bool {
        self.0.is_not_tolerated()
    }
}

/// Run directory preparation failure; fatal to the affected run only.
#[derive(Error, Debug)]
pub enum TemplatingError {
    #[error("run directory {0} already exists")]
    DirectoryExists(PathBuf),
    #[error("{0} does not appear to be a template (expected suffix {1})")]
    NotATemplate(String, &'static str),
    #[error("could not copy template directory {src} to {dst}: {reason}")]
    Copy {
        src: PathBuf,
        dst: PathBuf,
        reason: String,
    },
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not render {file}: {source}")]
    Render {
        file: String,
        #[source]
        source: minijinja::Error,
    },
}

impl TemplatingError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| TemplatingError::Io { path, source }
    }
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("pre-batch tasks of {batch} failed: {source}")]
    PreBatch {
        batch: String,
        #[source]
        source: ProcessingError,
    },
    #[error("batch {batch}: io error on {path}: {source}")]
    Io {
        batch: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error("pre-process tasks failed: {0}")]
    PreProcess(#[source] ProcessingError),
    #[error("post-process tasks failed: {0}")]
    PostProcess(#[source] ProcessingError),
}
