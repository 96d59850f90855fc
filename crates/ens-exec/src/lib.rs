//! Command execution for tasks and cluster backends.
//!
//! Commands run through a shell, or as a program with an argument vector,
//! with an optional working directory. The caller interprets the exit code;
//! a nonzero exit is never an error here.

mod error;
pub use error::{ExecError, ExecResult};

mod command;
pub use command::{CommandOutput, CommandSpec, Executor};

mod util;
pub use util::default_shell;
