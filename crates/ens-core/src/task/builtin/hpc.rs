use async_trait::async_trait;
use ens_exec::CommandSpec;
use tracing::{debug, warn};

use crate::{
    OperationError,
    task::{OpContext, Operation, OperationKind, TaskArgs},
};

/// Passes while fewer than `limit` jobs named `match*` are queued or running.
pub struct Jobs;

#[async_trait]
impl Operation for Jobs {
    fn name(&self) -> &'static str {
        "jobs"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Check
    }

    async fn invoke(&self, ctx: &OpContext<'_>, args: &TaskArgs) -> Result<bool, OperationError> {
        let limit = args.req_u64("limit")?;
        let prefix = args.req_str("match")?;

        let jobs = ctx.backend().current_jobs(ctx.scope, prefix).await?;
        let count = jobs.len() as u64;
        debug!(prefix, count, limit, "current job count");
        Ok(count < limit)
    }
}

/// Passes while the user's remaining quota is at least `atleast` 1k blocks.
pub struct Quota;

#[async_trait]
impl Operation for Quota {
    fn name(&self) -> &'static str {
        "quota"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Check
    }

    async fn invoke(&self, ctx: &OpContext<'_>, args: &TaskArgs) -> Result<bool, OperationError> {
        let atleast = args.req_u64("atleast")?;
        let mut spec = CommandSpec::argv("quota", ["-uw"]);
        if let Some(mnt) = args.opt_str("mnt")? {
            spec = spec.args_from(["-f", mnt]);
        }

        let output = ctx.exec().run(&spec).await?;
        let Some((usage, limit)) = parse_quota(&output.stdout) else {
            warn!(stdout = %output.stdout.trim(), "could not determine quota information");
            return Ok(false);
        };

        let remaining = limit.saturating_sub(usage);
        if remaining < atleast {
            warn!(remaining, atleast, "quota remaining is below the requirement");
            return Ok(false);
        }
        Ok(true)
    }
}

/// `(usage, limit)` in 1k blocks from the last line of `quota -uw` output.
///
/// Usage over the soft limit is reported with a trailing `*`.
pub fn parse_quota(stdout: &str) -> Option<(u64, u64)> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    let mut fields = line.split_whitespace().skip(1);
    let usage = fields.next()?.trim_end_matches('*').parse().ok()?;
    let limit = fields.next()?.parse().ok()?;
    Some((usage, limit))
}
