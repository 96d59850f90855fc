use std::{collections::HashMap, sync::Arc};

use tracing::trace;

use crate::{TaskError, task::Operation};

/// Operations addressable by name from task specifications.
#[derive(Default)]
pub struct TaskRegistry {
    ops: HashMap<String, Arc<dyn Operation>>,
}

impl TaskRegistry {
    #[inline]
    pub fn new() -> Self {
        Self {
            ops: HashMap::new(),
        }
    }

    /// Registry holding the built-in checks and processing tasks.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::task::builtin::register_all(&mut registry);
        registry
    }

    /// Register an operation under its own name, replacing any previous one.
    pub fn register(&mut self, op: Arc<dyn Operation>) -> &mut Self {
        trace!(name = op.name(), kind = ?op.kind(), "operation registered");
        self.ops.insert(op.name().to_string(), op);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Operation>> {
        self.ops.get(name)
    }

    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn Operation>, TaskError> {
        self.get(name)
            .ok_or_else(|| TaskError::UnknownOperation(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
