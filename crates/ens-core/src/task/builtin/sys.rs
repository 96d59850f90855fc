use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ens_exec::{CommandOutput, CommandSpec};
use tracing::{error, info, warn};

use crate::{
    OperationError,
    task::{OpContext, Operation, OperationKind, TaskArgs},
};

/// Passes on a zero exit of `cmd`; with `fail` set a nonzero exit abandons the run.
pub struct Check;

/// Runs `cmd` once, a nonzero exit is only reported.
pub struct Execute;

/// Copies the working directory to `dest/<id>` with rsync.
pub struct Move;

/// Removes `directory`, by default the run directory.
pub struct Remove;

async fn run_command(ctx: &OpContext<'_>, args: &TaskArgs) -> Result<CommandOutput, OperationError> {
    let mut spec = CommandSpec::new(args.req_str("cmd")?).log_output(args.flag("log")?);
    if let Some(cwd) = args.opt_path("cwd")? {
        spec = spec.cwd(cwd);
    }
    if let Some(shell) = args.opt_str("shell")? {
        spec = spec.shell(shell);
    }
    info!(command = %spec.display(), "running command");
    Ok(ctx.exec().run(&spec).await?)
}

#[async_trait]
impl Operation for Check {
    fn name(&self) -> &'static str {
        "check"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Check
    }

    fn accepts_cwd(&self) -> bool {
        true
    }

    async fn invoke(&self, ctx: &OpContext<'_>, args: &TaskArgs) -> Result<bool, OperationError> {
        let output = run_command(ctx, args).await?;
        if output.success() {
            return Ok(true);
        }
        if args.flag("fail")? {
            return Err(OperationError::NotTolerated(format!(
                "'{}' exited with {:?}",
                args.req_str("cmd")?,
                output.code
            )));
        }
        Ok(false)
    }
}

#[async_trait]
impl Operation for Execute {
    fn name(&self) -> &'static str {
        "execute"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Task
    }

    fn accepts_cwd(&self) -> bool {
        true
    }

    async fn invoke(&self, ctx: &OpContext<'_>, args: &TaskArgs) -> Result<bool, OperationError> {
        let output = run_command(ctx, args).await?;
        if !output.success() {
            warn!(code = ?output.code, stderr = %output.stderr.trim(), "command exited unsuccessfully");
        }
        Ok(output.success())
    }
}

/// `rsync -aXE` invocation copying `./` to `dest`.
///
/// Without explicit excludes, giving includes excludes everything else.
pub fn rsync_command(dest: &Path, include: &[String], mut exclude: Vec<String>) -> CommandSpec {
    if exclude.is_empty() && !include.is_empty() {
        exclude.push("*".to_string());
    }

    let filters = include
        .iter()
        .map(|p| format!("--include={}", p.trim_matches('"')))
        .chain(exclude.iter().map(|p| format!("--exclude={}", p.trim_matches('"'))));

    let mut target = dest.as_os_str().to_os_string();
    target.push("/");
    CommandSpec::argv("rsync", ["-aXE"])
        .args_from(filters)
        .arg("./")
        .arg(target)
}

#[async_trait]
impl Operation for Move {
    fn name(&self) -> &'static str {
        "move"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Task
    }

    fn accepts_cwd(&self) -> bool {
        true
    }

    async fn invoke(&self, ctx: &OpContext<'_>, args: &TaskArgs) -> Result<bool, OperationError> {
        let id = ctx
            .scope
            .get_str("id")
            .ok_or_else(|| OperationError::Failed("no run id available for move".into()))?;
        let dest = PathBuf::from(args.req_str("dest")?).join(id);

        let mut spec = rsync_command(&dest, &args.str_list("include")?, args.str_list("exclude")?);
        if let Some(cwd) = args.opt_path("cwd")? {
            spec = spec.cwd(cwd);
        }
        info!(command = %spec.display(), "moving run data");

        let output = ctx.exec().run(&spec).await?;
        if !output.success() {
            warn!(code = ?output.code, stderr = %output.stderr.trim(), dest = %dest.display(), "move failed");
        }
        Ok(output.success())
    }
}

#[async_trait]
impl Operation for Remove {
    fn name(&self) -> &'static str {
        "remove"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Task
    }

    async fn invoke(&self, ctx: &OpContext<'_>, args: &TaskArgs) -> Result<bool, OperationError> {
        let directory = match args.opt_path("directory")? {
            Some(dir) => dir,
            None => ctx
                .scope
                .get_str("dir")
                .map(PathBuf::from)
                .ok_or_else(|| OperationError::Failed("no directory to remove".into()))?,
        };

        info!(directory = %directory.display(), "removing directory");
        match tokio::fs::remove_dir_all(&directory).await {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(directory = %directory.display(), error = %e, "could not remove directory");
                Ok(false)
            }
        }
    }
}
