use std::{ffi::OsString, process::Command as StdCommand};

use tokio::process::Command;

/// Shell used when neither the command nor the executor names one.
pub fn default_shell() -> &'static str {
    cfg_if::cfg_if! {
        if #[cfg(target_family = "windows")] {
            "cmd"
        } else {
            "/bin/bash"
        }
    }
}

fn shell_flag(shell: &str) -> &'static str {
    if shell.ends_with("cmd") || shell.ends_with("cmd.exe") {
        "/C"
    } else {
        "-c"
    }
}

/// `<shell> -c <script>` (or `cmd /C <script>`) for async execution.
pub fn shell_command(shell: &str, script: &str) -> Command {
    let mut cmd = Command::new(shell);
    cmd.arg(shell_flag(shell)).arg(script);
    cmd
}

/// Blocking counterpart of [`shell_command`], for worker threads.
pub fn shell_command_blocking(shell: &str, script: &str) -> StdCommand {
    let mut cmd = StdCommand::new(shell);
    cmd.arg(shell_flag(shell)).arg(script);
    cmd
}

/// `<program> <args..>` executed directly, without a shell.
pub fn argv_command(program: &str, args: &[OsString]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

/// Blocking counterpart of [`argv_command`].
pub fn argv_command_blocking(program: &str, args: &[OsString]) -> StdCommand {
    let mut cmd = StdCommand::new(program);
    cmd.args(args);
    cmd
}
