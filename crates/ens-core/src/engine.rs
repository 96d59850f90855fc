use std::sync::Arc;

use ens_cluster::ClusterBackend;
use ens_exec::Executor;
use ens_model::Vars;

use crate::{EngineConfig, TaskRegistry};

/// Everything a lifecycle needs beyond the batch and run themselves.
///
/// Cheap to clone; all members are shared.
#[derive(Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    registry: Arc<TaskRegistry>,
    backend: Arc<dyn ClusterBackend>,
    exec: Executor,
    extra: Arc<Vars>,
}

impl Engine {
    /// Engine with the built-in operations registered.
    pub fn new(config: EngineConfig, backend: Arc<dyn ClusterBackend>) -> Self {
        let exec = Executor::new(config.shell.clone());
        Self {
            config: Arc::new(config),
            registry: Arc::new(TaskRegistry::with_builtins()),
            backend,
            exec,
            extra: Arc::new(Vars::new()),
        }
    }

    #[inline]
    pub fn with_registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Variables layered last into every run.
    #[inline]
    pub fn with_extra_vars(mut self, extra: Vars) -> Self {
        self.extra = Arc::new(extra);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &dyn ClusterBackend {
        self.backend.as_ref()
    }

    pub fn exec(&self) -> &Executor {
        &self.exec
    }

    pub fn extra_vars(&self) -> &Vars {
        &self.extra
    }
}
