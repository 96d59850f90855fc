//! Data model for ensemble orchestration.
//!
//! Batches, runs, task specifications and scheduler jobs, together with the
//! YAML loader that turns an ensemble file into these types.

mod domain;
pub use domain::*;

mod config;
pub use config::{Ensemble, EnsembleFile};

mod error;
pub use error::ModelError;
