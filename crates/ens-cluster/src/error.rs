use ens_exec::ExecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("scheduler command failed: {0}")]
    Exec(#[from] ExecError),
    #[error("job {0} is not known to the scheduler")]
    UnknownJob(String),
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),
}
