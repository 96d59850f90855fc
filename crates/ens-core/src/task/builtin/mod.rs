//! Operations registered by default.

mod hpc;
pub use hpc::{Jobs, Quota, parse_quota};

mod sys;
pub use sys::{Check, Execute, Move, Remove, rsync_command};

use std::sync::Arc;

use crate::TaskRegistry;

pub fn register_all(registry: &mut TaskRegistry) {
    registry
        .register(Arc::new(Jobs))
        .register(Arc::new(Quota))
        .register(Arc::new(Check))
        .register(Arc::new(Execute))
        .register(Arc::new(Move))
        .register(Arc::new(Remove));
}
