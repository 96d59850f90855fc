mod vars;
pub use vars::{Value, Vars, back_reference};

mod task;
pub use task::TaskSpec;

mod batch;
pub use batch::Batch;

mod run;
pub use run::Run;

mod job;
pub use job::{Job, JobId};

/// Ordered list of task specifications, executed front to back.
pub type TaskList = Vec<TaskSpec>;

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + serde::Deserialize<'de>,
{
    use serde::Deserialize;
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
