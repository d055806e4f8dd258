//! The experiments shipped with strebacom.
//!
//! Each experiment owns a serializable state, a [`PhasePlan`] over it and a `run` function
//! that prepares its dependencies, drives the plan and condenses the state into a summary.

use std::{path::PathBuf, time::Duration};

use alloy_primitives::{U256, utils::format_ether};
use chrono::Utc;
use eyre::Result;
use serde::Serialize;
use strebacom_chain::ChainClient;
use tokio::time::Instant;

use crate::{
    ExperimentReport, OnFailure, PhasePlan, PhaseResult, PhaseRunner, ResultsWriter,
    SyntheticBaselines,
};

mod bcadn;
mod consensus_sim;
mod n2n;
pub use n2n::{MAX_SEQUENCE_HOPS, N2nHop, as_path_to_sequence, route_key};
mod stream_charge;
mod stream_consensus;

/// Default location of snapshots and results files.
pub const DEFAULT_RESULTS_DIR: &str = "strebacom_results";

/// Default duration of live BGP processing.
pub const DEFAULT_FEED_DURATION: Duration = Duration::from_secs(60);

/// An experiment that can be listed and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Experiment {
    /// On-chain stream consensus: validators, stream transactions and rolling hash.
    StreamConsensus,
    /// Live RIS BGP updates translated into N2N routes.
    N2nRisLive,
    /// Offline consensus simulation.
    ConsensusSim,
    /// Adaptive sharding, anomaly detection and security compared with a traditional network.
    Bcadn,
    /// Single-contract stream consensus driven to probabilistic finality by quorum signals.
    StreamCharge,
}

impl Experiment {
    /// Every experiment, in listing order.
    pub const ALL: [Self; 5] = [
        Self::StreamConsensus,
        Self::N2nRisLive,
        Self::ConsensusSim,
        Self::Bcadn,
        Self::StreamCharge,
    ];

    /// Command-line name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::StreamConsensus => "stream-consensus",
            Self::N2nRisLive => "n2n-ris-live",
            Self::ConsensusSim => "consensus-sim",
            Self::Bcadn => "bcadn",
            Self::StreamCharge => "stream-charge",
        }
    }

    /// One-line description.
    pub const fn description(self) -> &'static str {
        match self {
            Self::StreamConsensus => {
                "Register validators, submit and validate stream transactions on chain"
            }
            Self::N2nRisLive => "Translate live RIS BGP updates into N2N routes",
            Self::ConsensusSim => "Simulate stream consensus throughput, resilience and finality",
            Self::Bcadn => {
                "Evaluate BCADN sharding and anomaly detection against a traditional network"
            }
            Self::StreamCharge => {
                "Drive stream transactions to probabilistic finality on the core contract"
            }
        }
    }

    /// Whether the experiment needs `PRIVATE_KEY` and an RPC endpoint.
    pub const fn requires_chain(self) -> bool {
        !matches!(self, Self::ConsensusSim)
    }

    /// Phase names in execution order.
    pub fn phase_names(self) -> Vec<String> {
        fn names<S>(plan: PhasePlan<S>) -> Vec<String> {
            plan.phase_names().map(str::to_string).collect()
        }

        match self {
            Self::StreamConsensus => names(stream_consensus::plan()),
            Self::N2nRisLive => names(n2n::plan()),
            Self::ConsensusSim => names(consensus_sim::plan()),
            Self::Bcadn => names(bcadn::plan()),
            Self::StreamCharge => names(stream_charge::plan()),
        }
    }
}

impl std::fmt::Display for Experiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings shared by every experiment run.
#[derive(Debug, Clone)]
pub struct ExperimentOptions {
    /// Directory for snapshots and results files.
    pub results_dir: PathBuf,
    /// Only run phases matching this glob.
    pub filter: Option<String>,
    /// Failure policy.
    pub on_failure: OnFailure,
    /// Seed for synthetic baselines and the simulation; random when `None`.
    pub seed: Option<u64>,
    /// Number of transactions, overriding the experiment default.
    pub transactions: Option<usize>,
    /// Number of validators, overriding the experiment default.
    pub validators: Option<usize>,
    /// How long to process live BGP updates.
    pub feed_duration: Duration,
    /// RIS Live endpoint.
    pub ris_live_url: String,
}

impl Default for ExperimentOptions {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            filter: None,
            on_failure: OnFailure::Abort,
            seed: None,
            transactions: None,
            validators: None,
            feed_duration: DEFAULT_FEED_DURATION,
            ris_live_url: strebacom_ris_feed::DEFAULT_RIS_LIVE_URL.to_string(),
        }
    }
}

/// What an experiment's `run` hands back.
#[derive(Debug)]
pub(crate) struct ExperimentOutcome {
    pub(crate) phases: Vec<PhaseResult>,
    pub(crate) summary: serde_json::Value,
    pub(crate) results_file: Option<PathBuf>,
}

/// Shared dependencies of an experiment run.
#[derive(Debug)]
pub(crate) struct RunContext<'a> {
    pub(crate) options: &'a ExperimentOptions,
    pub(crate) runner: PhaseRunner,
    pub(crate) writer: ResultsWriter,
    pub(crate) baselines: SyntheticBaselines,
}

/// Runs `experiment` to completion and reports every phase.
///
/// Errors are returned only when the experiment cannot start, e.g. missing configuration.
/// Phase failures are reported in the returned [`ExperimentReport`].
pub async fn run_experiment(
    experiment: Experiment,
    options: &ExperimentOptions,
) -> Result<ExperimentReport> {
    let started_at = Utc::now();
    let started = Instant::now();
    let baselines = SyntheticBaselines::new(options.seed);
    let seed = baselines.seed();

    tracing::info!(%experiment, seed, results_dir = %options.results_dir.display(), "Starting experiment");

    let ctx = RunContext {
        options,
        runner: PhaseRunner::new()
            .with_filter(options.filter.clone())
            .with_on_failure(options.on_failure),
        writer: ResultsWriter::new(&options.results_dir),
        baselines,
    };

    let outcome = match experiment {
        Experiment::StreamConsensus => stream_consensus::run(ctx).await?,
        Experiment::N2nRisLive => n2n::run(ctx).await?,
        Experiment::ConsensusSim => consensus_sim::run(ctx).await?,
        Experiment::Bcadn => bcadn::run(ctx).await?,
        Experiment::StreamCharge => stream_charge::run(ctx).await?,
    };

    let report = ExperimentReport {
        experiment: experiment.name().to_string(),
        started_at,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        seed,
        phases: outcome.phases,
        summary: outcome.summary,
        results_file: outcome.results_file,
    };

    tracing::info!(
        %experiment,
        passed = report.passed(),
        failed = report.failed(),
        skipped = report.skipped(),
        duration_ms = report.duration_ms,
        "Experiment finished"
    );

    Ok(report)
}

/// Chain status captured by the network check phases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct NetworkInfo {
    pub(crate) chain_id: u64,
    pub(crate) block_number: u64,
    pub(crate) account: alloy_primitives::Address,
    pub(crate) balance_wei: U256,
    pub(crate) balance_eth: String,
    pub(crate) gas_price_gwei: f64,
}

impl NetworkInfo {
    /// Reads the chain head, the account balance and the gas price.
    pub(crate) async fn fetch(client: &ChainClient) -> Result<Self> {
        let block_number = client.block_number().await?;
        let balance_wei = client.balance(client.address()).await?;
        let gas_price = client.gas_price().await?;

        let info = Self {
            chain_id: client.chain_id(),
            block_number,
            account: client.address(),
            balance_wei,
            balance_eth: format_ether(balance_wei),
            gas_price_gwei: gas_price as f64 / 1e9,
        };

        tracing::info!(
            chain_id = info.chain_id,
            block_number,
            account = %info.account,
            balance_eth = %info.balance_eth,
            gas_price_gwei = info.gas_price_gwei,
            "Network reachable"
        );

        Ok(info)
    }
}
