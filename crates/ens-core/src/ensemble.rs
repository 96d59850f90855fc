use ens_model::Ensemble;
use tracing::{error, info};

use crate::{BatchReport, Engine, EnsembleError, execute_batch, task::run_task_items};

#[derive(Debug, Default)]
pub struct EnsembleReport {
    pub batches: Vec<BatchReport>,
    /// Batches stopped by a pre-batch failure, with the reason.
    pub aborted: Vec<(String, String)>,
}

impl EnsembleReport {
    pub fn success(&self) -> bool {
        self.aborted.is_empty()
    }
}

/// Runs the process level tasks and every batch in configuration order.
pub struct EnsembleExecutor<'a> {
    engine: &'a Engine,
    ensemble: &'a Ensemble,
}

impl<'a> EnsembleExecutor<'a> {
    pub fn new(engine: &'a Engine, ensemble: &'a Ensemble) -> Self {
        Self { engine, ensemble }
    }

    pub async fn run(&self) -> Result<EnsembleReport, EnsembleError> {
        let globals = &self.ensemble.vars;

        info!(batches = self.ensemble.batches.len(), "running pre-process tasks");
        run_task_items(self.engine, &self.ensemble.pre_process, globals)
            .await
            .map_err(EnsembleError::PreProcess)?;

        let mut report = EnsembleReport::default();
        for batch in &self.ensemble.batches {
            match execute_batch(self.engine, batch, globals).await {
                Ok(batch_report) => report.batches.push(batch_report),
                Err(e) => {
                    error!(batch = %batch.name, error = %e, "batch aborted");
                    report.aborted.push((batch.name.clone(), e.to_string()));
                }
            }
        }

        info!("running post-process tasks");
        run_task_items(self.engine, &self.ensemble.post_process, globals)
            .await
            .map_err(EnsembleError::PostProcess)?;

        Ok(report)
    }
}
