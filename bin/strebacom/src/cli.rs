//! CLI argument parsing and tracing setup.

use std::{io, path::PathBuf, time::Duration};

use clap::{Parser, Subcommand, ValueEnum};
use strebacom_experiments::{
    Experiment, ExperimentOptions, OnFailure, experiments::DEFAULT_RESULTS_DIR,
};
use strebacom_ris_feed::DEFAULT_RIS_LIVE_URL;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// Stream consensus and N2N routing experiments on Ethereum testnets.
#[derive(Parser, Debug)]
#[command(name = "strebacom", version)]
#[command(about = "Stream consensus and N2N routing experiments on Ethereum testnets")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (can be repeated for more verbosity).
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format.
    #[arg(long, env = "STREBACOM_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// List experiments and their phases.
    List,
    /// Run one experiment.
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub(crate) struct RunArgs {
    /// Experiment to run.
    pub experiment: ExperimentKind,

    /// Directory for state snapshots and results files.
    #[arg(long, env = "STREBACOM_RESULTS_DIR", default_value = DEFAULT_RESULTS_DIR)]
    pub results_dir: PathBuf,

    /// Run only phases matching this filter (supports glob patterns).
    #[arg(long, short)]
    pub filter: Option<String>,

    /// Continue with the next phase after a failure.
    #[arg(long, default_value = "false")]
    pub keep_going: bool,

    /// Seed for synthetic baselines and the simulation.
    #[arg(long, env = "STREBACOM_SEED")]
    pub seed: Option<u64>,

    /// Number of transactions to submit or simulate.
    #[arg(long)]
    pub transactions: Option<usize>,

    /// Number of validators: ephemeral validators on chain, or the simulated set size.
    #[arg(long)]
    pub validators: Option<usize>,

    /// Seconds of live BGP processing.
    #[arg(long, default_value = "60")]
    pub feed_duration_secs: u64,

    /// RIS Live WebSocket endpoint.
    #[arg(long, env = "RIS_LIVE_URL", default_value = DEFAULT_RIS_LIVE_URL)]
    pub ris_live_url: String,

    /// Output format: text, json.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}

impl RunArgs {
    /// Options for [`strebacom_experiments::run_experiment`].
    pub(crate) fn options(&self) -> ExperimentOptions {
        ExperimentOptions {
            results_dir: self.results_dir.clone(),
            filter: self.filter.clone(),
            on_failure: if self.keep_going { OnFailure::Record } else { OnFailure::Abort },
            seed: self.seed,
            transactions: self.transactions,
            validators: self.validators,
            feed_duration: Duration::from_secs(self.feed_duration_secs),
            ris_live_url: self.ris_live_url.clone(),
        }
    }
}

/// Experiments selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ExperimentKind {
    /// Validators, stream transactions and rolling hash on chain.
    StreamConsensus,
    /// Live RIS BGP updates translated into N2N routes.
    N2nRisLive,
    /// Offline consensus simulation.
    ConsensusSim,
    /// BCADN sharding, anomaly detection and security evaluation.
    Bcadn,
    /// Quorum sensing and probabilistic finality on the core contract.
    StreamCharge,
}

impl From<ExperimentKind> for Experiment {
    fn from(kind: ExperimentKind) -> Self {
        match kind {
            ExperimentKind::StreamConsensus => Self::StreamConsensus,
            ExperimentKind::N2nRisLive => Self::N2nRisLive,
            ExperimentKind::ConsensusSim => Self::ConsensusSim,
            ExperimentKind::Bcadn => Self::Bcadn,
            ExperimentKind::StreamCharge => Self::StreamCharge,
        }
    }
}

/// Output format for experiment reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for CI integration.
    Json,
}

/// Format of log lines written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Initialize tracing with the specified verbosity level and format.
pub(crate) fn init_tracing(verbose: u8, format: LogFormat) {
    let filter = match verbose {
        0 => "strebacom=info,strebacom_experiments=info,strebacom_chain=info,strebacom_ris_feed=info",
        1 => {
            "strebacom=debug,strebacom_experiments=debug,strebacom_chain=debug,strebacom_ris_feed=debug"
        }
        _ => {
            "strebacom=trace,strebacom_experiments=trace,strebacom_chain=trace,strebacom_ris_feed=trace"
        }
    };

    let base = fmt::layer().with_writer(io::stderr);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Text => Box::new(base),
        LogFormat::Json => Box::new(base.json()),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}
