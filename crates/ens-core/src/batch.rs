use std::{collections::BTreeSet, future::Future, path::PathBuf};

use ens_model::{Batch, Run, Vars};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use crate::{BatchError, Engine, RunDriver, RunOutcome, task::run_task_items};

/// Why a batch issued no further cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A non-repeating batch ran its single cycle.
    Completed,
    /// No run index was eligible for the next cycle.
    NoEligibleRuns,
    PostBatchFailed,
}

#[derive(Debug)]
pub struct BatchReport {
    pub name: String,
    pub cycles: usize,
    /// Outcomes of every cycle, in cycle order.
    pub outcomes: Vec<RunOutcome>,
    /// Indices that failed to obtain a job identifier.
    pub skipped: BTreeSet<usize>,
    pub stop: StopReason,
}

/// Run `futures` with at most `limit` of them in flight, in iteration order.
///
/// Results are returned in input order regardless of completion order.
pub async fn run_bounded<I, F>(limit: usize, futures: I) -> Vec<F::Output>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    let slots = Semaphore::new(limit.max(1));
    let slots = &slots;
    join_all(futures.into_iter().map(|fut| async move {
        let _permit = slots.acquire().await;
        fut.await
    }))
    .await
}

/// Execute every cycle of `batch`.
///
/// `globals` are the ensemble variables; the batch fields are layered on top.
#[instrument(name = "batch", level = "info", skip_all, fields(batch = %batch.name))]
pub async fn execute_batch(
    engine: &Engine,
    batch: &Batch,
    globals: &Vars,
) -> Result<BatchReport, BatchError> {
    info!(batch = %batch.name, runs = batch.runs.len(), "batch started");

    let basedir = absolute_basedir(batch)?;
    tokio::fs::create_dir_all(&basedir)
        .await
        .map_err(|source| BatchError::Io {
            batch: batch.name.clone(),
            path: basedir.clone(),
            source,
        })?;

    let scope = globals.merged(&batch.vars()?);
    let config = engine.config();
    let last_cycle = if batch.repeat {
        warn!(batch = %batch.name, "repeating until a batch task fails or no runs remain");
        usize::MAX
    } else {
        1
    };

    let mut report = BatchReport {
        name: batch.name.clone(),
        cycles: 0,
        outcomes: Vec::new(),
        skipped: BTreeSet::new(),
        stop: StopReason::Completed,
    };

    for cycle in 1..=last_cycle {
        info!(batch = %batch.name, cycle, "running cycle");

        if let Err(source) = run_task_items(engine, &batch.pre_batch, &scope).await {
            error!(batch = %batch.name, cycle, error = %source, "pre-batch failure, stopping batch");
            return Err(BatchError::PreBatch {
                batch: batch.name.clone(),
                source,
            });
        }

        let eligible: Vec<usize> = (0..batch.runs.len())
            .filter(|idx| {
                if !config.selects(*idx) {
                    warn!(batch = %batch.name, idx, "run index not selected, skipping");
                    false
                } else if report.skipped.contains(idx) {
                    warn!(batch = %batch.name, idx, "run index failed to submit earlier, skipping");
                    false
                } else {
                    true
                }
            })
            .collect();
        if eligible.is_empty() {
            error!(batch = %batch.name, cycle, "no runs left to execute in this batch");
            report.stop = StopReason::NoEligibleRuns;
            break;
        }
        report.cycles = cycle;

        let runs = eligible.into_iter().map(|idx| {
            Run::new(batch, &scope, &basedir, idx, cycle, engine.extra_vars())
        });
        let job_slots = Semaphore::new(batch.maxjobs);
        let driver = RunDriver::new(engine, batch, &job_slots);
        let outcomes = run_bounded(batch.maxruns, runs.map(|run| driver.drive(run))).await;

        for outcome in &outcomes {
            if outcome.job_id.is_none() && report.skipped.insert(outcome.run.idx) {
                warn!(
                    batch = %batch.name,
                    run = %outcome.run.id,
                    idx = outcome.run.idx,
                    "unsuccessful submission, index will be skipped"
                );
            }
        }
        report.outcomes.extend(outcomes);

        if let Err(e) = run_task_items(engine, &batch.post_batch, &scope).await {
            error!(batch = %batch.name, cycle, error = %e, "post-batch failure, stopping batch");
            report.stop = StopReason::PostBatchFailed;
            break;
        }
    }

    info!(
        batch = %batch.name,
        cycles = report.cycles,
        skipped = report.skipped.len(),
        "batch completed"
    );
    Ok(report)
}

fn absolute_basedir(batch: &Batch) -> Result<PathBuf, BatchError> {
    std::path::absolute(&batch.basedir).map_err(|source| BatchError::Io {
        batch: batch.name.clone(),
        path: batch.basedir.clone(),
        source,
    })
}
