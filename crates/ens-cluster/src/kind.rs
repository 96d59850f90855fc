use std::{str::FromStr, sync::Arc};

use crate::{BackendConfig, ClusterBackend, ClusterError, LocalBackend, SlurmBackend};

/// Selectable cluster backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Slurm,
    Local,
}

impl FromStr for BackendKind {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slurm" => Ok(BackendKind::Slurm),
            "local" | "dummy" => Ok(BackendKind::Local),
            _ => Err(ClusterError::UnsupportedBackend(s.to_string())),
        }
    }
}

pub fn build_backend(kind: BackendKind, config: BackendConfig) -> Arc<dyn ClusterBackend> {
    match kind {
        BackendKind::Slurm => Arc::new(SlurmBackend::new(config)),
        BackendKind::Local => Arc::new(LocalBackend::new(config)),
    }
}
