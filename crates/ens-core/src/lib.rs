//! Batch and run execution engine.
//!
//! [`EnsembleExecutor`] runs the process level tasks and every batch in order;
//! [`execute_batch`] drives the repeat cycles of one batch, scheduling run
//! lifecycles ([`RunDriver`]) under the batch's `maxruns` bound.

pub mod error;
pub use error::{
    BatchError, EnsembleError, OperationError, ProcessingError, TaskError, TemplatingError,
};

mod config;
pub use config::{EngineConfig, Intervals};

mod engine;
pub use engine::Engine;

pub mod task;
pub use task::{OpContext, Operation, OperationKind, TaskArgs, TaskRegistry};

pub mod prepare;

mod run;
pub use run::{RunDriver, RunOutcome, RunState};

mod batch;
pub use batch::{BatchReport, StopReason, execute_batch, run_bounded};

mod ensemble;
pub use ensemble::{EnsembleExecutor, EnsembleReport};

#[cfg(test)]
mod testing;
