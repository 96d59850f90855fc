use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::{Output, Stdio},
};

use time::{OffsetDateTime, macros::format_description};
use tracing::{debug, info, trace, warn};

use crate::{
    error::{ExecError, ExecResult},
    util::{argv_command, argv_command_blocking, default_shell, shell_command, shell_command_blocking},
};

/// One command invocation.
///
/// Built with [`CommandSpec::new`] the command is a shell script. Built with
/// [`CommandSpec::argv`] it names a program that is executed directly with
/// `args`, so paths and patterns are never seen by a shell.
#[derive(Clone, Debug, Default)]
pub struct CommandSpec {
    pub command: String,
    /// Program arguments; `None` runs `command` through the shell.
    pub args: Option<Vec<OsString>>,
    /// Working directory; inherits the process directory when `None`.
    pub cwd: Option<PathBuf>,
    /// Overrides the executor's shell.
    pub shell: Option<String>,
    /// Write combined output to `execute_command.<time>.log` in `cwd`.
    pub log_output: bool,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn argv<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self {
            command: program.into(),
            args: Some(args.into_iter().map(|a| a.as_ref().to_os_string()).collect()),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args
            .get_or_insert_with(Vec::new)
            .push(arg.as_ref().to_os_string());
        self
    }

    pub fn args_from<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .get_or_insert_with(Vec::new)
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Command line for logs; arguments are shown lossily and unquoted.
    pub fn display(&self) -> String {
        match &self.args {
            Some(args) => args.iter().fold(self.command.clone(), |mut line, arg| {
                line.push(' ');
                line.push_str(&arg.to_string_lossy());
                line
            }),
            None => self.command.clone(),
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    pub fn log_output(mut self, log_output: bool) -> Self {
        self.log_output = log_output;
        self
    }
}

/// Result of a finished command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn from_output(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs commands, using a default shell for scripts.
#[derive(Clone, Debug)]
pub struct Executor {
    shell: String,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(default_shell())
    }
}

impl Executor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Run a command to completion and capture its output.
    ///
    /// Fails only when the command cannot be spawned or awaited.
    pub async fn run(&self, spec: &CommandSpec) -> ExecResult<CommandOutput> {
        if spec.command.trim().is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        let shell = spec.shell.as_deref().unwrap_or(&self.shell);
        debug!(
            target: "ens.exec",
            command = %spec.display(),
            cwd = %display_cwd(spec.cwd.as_deref()),
            "executing command"
        );
        let started = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());

        let mut cmd = match &spec.args {
            Some(args) => argv_command(&spec.command, args),
            None => shell_command(shell, &spec.command),
        };
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = cmd.output().await.map_err(|e| ExecError::Spawn {
            command: spec.display(),
            reason: e.to_string(),
        })?;
        let output = CommandOutput::from_output(output);

        if spec.log_output {
            write_log(spec.cwd.as_deref(), started, &output).await?;
        }
        report(spec, &output);
        Ok(output)
    }

    /// Blocking variant of [`Executor::run`] for use on worker threads.
    ///
    /// Output capture to a log file is not supported here.
    pub fn run_blocking(&self, spec: &CommandSpec) -> ExecResult<CommandOutput> {
        if spec.command.trim().is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        let shell = spec.shell.as_deref().unwrap_or(&self.shell);

        let mut cmd = match &spec.args {
            Some(args) => argv_command_blocking(&spec.command, args),
            None => shell_command_blocking(shell, &spec.command),
        };
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null());

        let output = cmd.output().map_err(|e| ExecError::Spawn {
            command: spec.display(),
            reason: e.to_string(),
        })?;
        let output = CommandOutput::from_output(output);
        report(spec, &output);
        Ok(output)
    }
}

fn report(spec: &CommandSpec, output: &CommandOutput) {
    if output.success() {
        trace!(target: "ens.exec", command = %spec.display(), "command successful");
    } else {
        warn!(
            target: "ens.exec",
            command = %spec.display(),
            code = ?output.code,
            stderr = %output.stderr.trim_end(),
            "command returned error"
        );
    }
}

fn display_cwd(cwd: Option<&Path>) -> String {
    cwd.map(|p| p.display().to_string())
        .unwrap_or_else(|| "unset".to_string())
}

async fn write_log(
    cwd: Option<&Path>,
    started: OffsetDateTime,
    output: &CommandOutput,
) -> ExecResult<()> {
    if output.stdout.is_empty() && output.stderr.is_empty() {
        return Ok(());
    }
    let stamp = started
        .format(format_description!(
            "[hour][minute][second].[subsecond digits:6]"
        ))
        .map_err(|e| ExecError::Io(e.to_string()))?;
    let name = format!("execute_command.{stamp}.log");
    let path = match cwd {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    };

    let mut body = output.stdout.clone();
    body.push_str(&output.stderr);
    tokio::fs::write(&path, body).await?;

    info!(target: "ens.exec", path = %path.display(), "command log written");
    Ok(())
}
