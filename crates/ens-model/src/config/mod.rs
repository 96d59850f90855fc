mod ensemble;
pub use ensemble::{Ensemble, EnsembleFile};
