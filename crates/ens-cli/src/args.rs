use std::{collections::BTreeSet, path::PathBuf, time::Duration};

use clap::Parser;
use ens_cluster::BackendKind;
use ens_core::{EngineConfig, Intervals};
use ens_model::Vars;
use ens_observe::LoggerFormat;

/// Run an ensemble of batch jobs on an HPC cluster.
#[derive(Parser, Debug)]
#[command(name = "model-ensemble", version)]
pub struct Args {
    /// Ensemble configuration file (YAML)
    pub configuration: PathBuf,

    /// Cluster backend: slurm or local (alias dummy)
    #[arg(default_value = "slurm", value_parser = parse_backend)]
    pub backend: BackendKind,

    /// Stay in the foreground
    #[arg(short = 'n', long)]
    pub no_daemon: bool,

    /// Log verbosely
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not run check tasks
    #[arg(short = 'c', long)]
    pub no_checks: bool,

    /// Do not submit jobs, treat every run as finished
    #[arg(short = 's', long)]
    pub no_submission: bool,

    /// Reuse existing run directories, e.g. after a failed ensemble
    #[arg(short, long)]
    pub pickup: bool,

    /// Number of run entries to skip
    #[arg(short = 'k', long, default_value_t = 0)]
    pub skips: usize,

    /// Only run these indexes (comma separated)
    #[arg(short, long, value_parser = parse_indexes)]
    pub indexes: Option<BTreeSet<usize>>,

    /// Seconds between attempts of an unsatisfied check
    #[arg(long, default_value_t = 10)]
    pub check_timeout: u64,

    /// Seconds between polls for a submitted job
    #[arg(long, default_value_t = 10)]
    pub submit_timeout: u64,

    /// Seconds between polls for a running job
    #[arg(long, default_value_t = 10)]
    pub running_timeout: u64,

    /// Seconds to wait after a failed job lookup
    #[arg(long, default_value_t = 120)]
    pub error_timeout: u64,

    /// Upper bound in seconds of the random delay before a submission
    #[arg(long, default_value_t = 60)]
    pub max_stagger: u64,

    /// Shell for commands and job scripts
    #[arg(long)]
    pub shell: Option<String>,

    /// Log format: text, json or journald
    #[arg(long, default_value = "text", value_parser = parse_log_format)]
    pub log_format: LoggerFormat,

    /// Directory of the log file
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,

    /// Extra run variable as key=value, may be repeated
    #[arg(short = 'x', long = "extra", value_parser = parse_extra)]
    pub extra: Vec<(String, String)>,
}

impl Args {
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            no_submission: self.no_submission,
            no_checks: self.no_checks,
            pickup: self.pickup,
            skips: self.skips,
            indexes: self.indexes.clone(),
            shell: self.shell.clone().unwrap_or(defaults.shell),
            intervals: Intervals {
                check: Duration::from_secs(self.check_timeout),
                submit: Duration::from_secs(self.submit_timeout),
                running: Duration::from_secs(self.running_timeout),
                error: Duration::from_secs(self.error_timeout),
                max_stagger: Duration::from_secs(self.max_stagger),
            },
        }
    }

    pub fn extra_vars(&self) -> Vars {
        self.extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().into()))
            .collect()
    }

    /// `<log_dir>/<configuration file name>.log`
    pub fn log_file(&self) -> PathBuf {
        let name = self
            .configuration
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model-ensemble".to_string());
        self.log_dir.join(format!("{name}.log"))
    }
}

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_log_format(s: &str) -> Result<LoggerFormat, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_indexes(s: &str) -> Result<BTreeSet<usize>, String> {
    s.split(',')
        .map(|part| {
            let part = part.trim();
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("{s} is not a comma separated list of indexes"));
            }
            part.parse::<usize>()
                .map_err(|e| format!("index {part}: {e}"))
        })
        .collect()
}

fn parse_extra(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("{s} is not a key=value pair")),
    }
}
