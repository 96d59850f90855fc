mod args;
mod daemon;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use ens_cluster::build_backend;
use ens_core::{Engine, EnsembleExecutor};
use ens_model::Ensemble;
use ens_observe::{LoggerConfig, logger_init};
use tracing::{error, info};

use crate::args::Args;

fn main() -> ExitCode {
    let args = Args::parse();

    if !args.no_daemon
        && let Err(e) = daemon::background_fork()
    {
        eprintln!("fork failed: {e}");
        return ExitCode::FAILURE;
    }

    let logger = LoggerConfig {
        format: args.log_format,
        use_color: args.no_daemon && LoggerConfig::default().use_color,
        ..Default::default()
    }
    .verbose(args.verbose)
    .file(args.log_file());
    let _log_guard = match logger_init(&logger) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("logger init failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("ensemble failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<bool> {
    info!(configuration = %args.configuration.display(), backend = ?args.backend, "model ensemble runner");

    let ensemble = Ensemble::from_path(&args.configuration)
        .with_context(|| format!("loading {}", args.configuration.display()))?;

    let config = args.engine_config();
    let backend = build_backend(args.backend, config.backend_config());
    let engine = Engine::new(config, backend).with_extra_vars(args.extra_vars());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;

    let report = runtime.block_on(EnsembleExecutor::new(&engine, &ensemble).run())?;

    for batch in &report.batches {
        let submitted = batch.outcomes.iter().filter(|o| o.submitted()).count();
        info!(
            batch = %batch.name,
            cycles = batch.cycles,
            runs = batch.outcomes.len(),
            submitted,
            skipped = batch.skipped.len(),
            stop = ?batch.stop,
            "batch summary"
        );
    }
    for (batch, reason) in &report.aborted {
        error!(batch = %batch, %reason, "batch aborted");
    }
    Ok(report.success())
}
