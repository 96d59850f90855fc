//! Cluster backends.
//!
//! A backend submits job scripts and reports job state for one scheduler.
//! The engine only talks to [`ClusterBackend`]; `slurm` drives a real SLURM
//! installation, `local` runs job scripts on worker threads of this process.

mod backend;
pub use backend::{BackendConfig, ClusterBackend};

mod error;
pub use error::ClusterError;

mod kind;
pub use kind::{BackendKind, build_backend};

pub mod local;
pub use local::LocalBackend;

pub mod slurm;
pub use slurm::SlurmBackend;
