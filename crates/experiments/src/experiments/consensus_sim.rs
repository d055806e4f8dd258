//! Offline stream consensus benchmarks on a simulated validator set.

use std::path::PathBuf;

use eyre::{Result, ensure};
use serde::Serialize;

use super::{ExperimentOutcome, RunContext};
use crate::{
    ConsensusComparison, Phase, PhaseLog, PhasePlan, PhaseState, ResultsWriter,
    SyntheticBaselines,
    simulation::{ProcessedTransaction, SimulationConfig, StreamEngine},
    stats::{mean, median, round2, throughput},
};

const SCALING_BATCHES: [usize; 4] = [100, 500, 1_000, 2_000];
const BYZANTINE_RATIOS: [f64; 4] = [0.1, 0.2, 0.33, 0.49];
const BYZANTINE_VALIDATORS: usize = 100;
const BYZANTINE_TRANSACTIONS: usize = 500;
/// Finalized transactions out of [`BYZANTINE_TRANSACTIONS`] for a stable network.
const STABILITY_THRESHOLD: usize = 450;
const FINALITY_TRANSACTIONS: usize = 500;
const FAST_FINALITY_MS: f64 = 1_000.0;
const MEDIUM_FINALITY_MS: f64 = 5_000.0;
const PARTITION_DURATION_MS: f64 = 5_000.0;
const PARTITION_TRANSACTIONS: usize = 100;
const PARTITION_TOLERANCE: f64 = 0.7;
const STRESS_LOADS: [usize; 3] = [1_000, 2_500, 5_000];
const BENCHMARKS: usize = 5;

#[derive(Debug, Clone, Copy, Serialize)]
struct ScalingResult {
    transactions: usize,
    elapsed_ms: f64,
    tps: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct ByzantineResult {
    byzantine_ratio: f64,
    byzantine_validators: usize,
    finalized: usize,
    consensus_success_rate: f64,
    stable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
struct FinalityDistribution {
    fast: usize,
    medium: usize,
    slow: usize,
}

impl FinalityDistribution {
    fn from_times(times: &[f64]) -> Self {
        times.iter().fold(Self::default(), |mut d, &t| {
            if t < FAST_FINALITY_MS {
                d.fast += 1;
            } else if t < MEDIUM_FINALITY_MS {
                d.medium += 1;
            } else {
                d.slow += 1;
            }
            d
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct FinalityResult {
    transactions: usize,
    finalized: usize,
    average_ms: f64,
    median_ms: f64,
    distribution: FinalityDistribution,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct PartitionResult {
    duration_ms: f64,
    affected_validators: usize,
    transactions: usize,
    success_rate: f64,
    tolerant: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct StressResult {
    load: usize,
    elapsed_ms: f64,
    tps: f64,
    success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
struct SimSummary {
    benchmarks_completed: usize,
    overall_score: f64,
    peak_tps: f64,
    comparison: ConsensusComparison,
    rolling_hash: String,
    virtual_time_ms: f64,
}

#[derive(Debug)]
struct SimContext {
    engine: StreamEngine,
    writer: ResultsWriter,
    baselines: SyntheticBaselines,
    finality_transactions: usize,
}

/// Experiment state, snapshotted after every phase.
#[derive(Debug, Serialize)]
pub(crate) struct ConsensusSimState {
    #[serde(flatten)]
    log: PhaseLog,
    config: SimulationConfig,
    throughput_scaling: Vec<ScalingResult>,
    byzantine_resilience: Vec<ByzantineResult>,
    finality: Option<FinalityResult>,
    partition: Option<PartitionResult>,
    load_stress: Vec<StressResult>,
    summary: Option<SimSummary>,
    #[serde(skip)]
    results_file: Option<PathBuf>,
    #[serde(skip)]
    ctx: SimContext,
}

impl PhaseState for ConsensusSimState {
    fn phase_log(&mut self) -> &mut PhaseLog {
        &mut self.log
    }
}

impl ConsensusSimState {
    fn benchmarks_completed(&self) -> usize {
        [
            !self.throughput_scaling.is_empty(),
            !self.byzantine_resilience.is_empty(),
            self.finality.is_some(),
            self.partition.is_some(),
            !self.load_stress.is_empty(),
        ]
        .into_iter()
        .filter(|done| *done)
        .count()
    }

    fn peak_tps(&self) -> f64 {
        self.throughput_scaling
            .iter()
            .map(|r| r.tps)
            .chain(self.load_stress.iter().map(|r| r.tps))
            .fold(0.0, f64::max)
    }
}

pub(crate) fn plan() -> PhasePlan<ConsensusSimState> {
    PhasePlan {
        experiment: "consensus-sim".to_string(),
        phases: vec![
            Phase {
                name: "throughput_scaling".to_string(),
                description: Some("Concurrent batches of growing size".into()),
                run: Box::new(|state| Box::pin(throughput_scaling(state))),
            },
            Phase {
                name: "byzantine_resilience".to_string(),
                description: Some("Finality under growing byzantine ratios".into()),
                run: Box::new(|state| Box::pin(byzantine_resilience(state))),
            },
            Phase {
                name: "finality_performance".to_string(),
                description: Some("Time to finality of sequential transactions".into()),
                run: Box::new(|state| Box::pin(finality_performance(state))),
            },
            Phase {
                name: "partition_tolerance".to_string(),
                description: Some("Finality while half the validators are cut off".into()),
                run: Box::new(|state| Box::pin(partition_tolerance(state))),
            },
            Phase {
                name: "load_stress".to_string(),
                description: Some("Large concurrent loads".into()),
                run: Box::new(|state| Box::pin(load_stress(state))),
            },
            Phase {
                name: "summary".to_string(),
                description: Some("Score the run and compare with classic consensus".into()),
                run: Box::new(|state| Box::pin(summary(state))),
            },
        ],
    }
}

pub(crate) async fn run(mut ctx: RunContext<'_>) -> Result<ExperimentOutcome> {
    let mut config = SimulationConfig { seed: ctx.baselines.child_seed(), ..Default::default() };
    if let Some(validators) = ctx.options.validators {
        config.validator_count = validators;
    }
    tracing::info!(
        validators = config.validator_count,
        byzantine_ratio = config.byzantine_ratio,
        seed = config.seed,
        "Building simulated validator set"
    );

    let runner = ctx.runner.with_snapshot(ctx.writer.snapshot("consensus_sim_state.json"));
    let mut state = ConsensusSimState {
        log: PhaseLog::default(),
        config,
        throughput_scaling: Vec::new(),
        byzantine_resilience: Vec::new(),
        finality: None,
        partition: None,
        load_stress: Vec::new(),
        summary: None,
        results_file: None,
        ctx: SimContext {
            engine: StreamEngine::new(config),
            writer: ctx.writer,
            baselines: ctx.baselines,
            finality_transactions: ctx.options.transactions.unwrap_or(FINALITY_TRANSACTIONS),
        },
    };

    let phases = runner.run(&plan(), &mut state).await;
    let summary = serde_json::to_value(&state)?;

    Ok(ExperimentOutcome { phases, summary, results_file: state.results_file })
}

fn count_final(processed: &[ProcessedTransaction]) -> usize {
    processed.iter().filter(|p| p.is_final()).count()
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { round2(count as f64 / total as f64) }
}

async fn throughput_scaling(state: &mut ConsensusSimState) -> Result<()> {
    let engine = &mut state.ctx.engine;

    for transactions in SCALING_BATCHES {
        let txs = engine.generate_transactions(transactions);
        let (_, elapsed_ms) = engine.process_concurrent(&txs);
        let tps = round2(throughput(transactions, elapsed_ms));

        tracing::info!(transactions, elapsed_ms, tps, "Throughput batch");
        state.throughput_scaling.push(ScalingResult { transactions, elapsed_ms, tps });
    }

    Ok(())
}

async fn byzantine_resilience(state: &mut ConsensusSimState) -> Result<()> {
    for (i, byzantine_ratio) in BYZANTINE_RATIOS.into_iter().enumerate() {
        let mut engine = StreamEngine::new(SimulationConfig {
            validator_count: BYZANTINE_VALIDATORS,
            byzantine_ratio,
            seed: state.config.seed.wrapping_add(i as u64 + 1),
            ..state.config
        });
        let byzantine_validators = engine.validators().iter().filter(|v| v.byzantine).count();

        let txs = engine.generate_transactions(BYZANTINE_TRANSACTIONS);
        let processed = engine.process_sequential(&txs);
        let finalized = count_final(&processed);
        let result = ByzantineResult {
            byzantine_ratio,
            byzantine_validators,
            finalized,
            consensus_success_rate: share(finalized, BYZANTINE_TRANSACTIONS),
            stable: finalized > STABILITY_THRESHOLD,
        };

        tracing::info!(
            byzantine_ratio,
            finalized,
            stable = result.stable,
            "Byzantine resilience"
        );
        state.byzantine_resilience.push(result);
    }

    Ok(())
}

async fn finality_performance(state: &mut ConsensusSimState) -> Result<()> {
    let transactions = state.ctx.finality_transactions;
    ensure!(transactions > 0, "At least one transaction is required");

    let engine = &mut state.ctx.engine;
    let txs = engine.generate_transactions(transactions);
    let times: Vec<f64> =
        engine.process_sequential(&txs).iter().filter_map(|p| p.finalized_after_ms).collect();

    let result = FinalityResult {
        transactions,
        finalized: times.len(),
        average_ms: round2(mean(&times)),
        median_ms: round2(median(&times)),
        distribution: FinalityDistribution::from_times(&times),
    };

    tracing::info!(
        finalized = result.finalized,
        average_ms = result.average_ms,
        median_ms = result.median_ms,
        "Finality performance"
    );
    state.finality = Some(result);
    Ok(())
}

async fn partition_tolerance(state: &mut ConsensusSimState) -> Result<()> {
    let engine = &mut state.ctx.engine;
    let affected_validators = engine.validators().len() / 2;

    engine.partition(PARTITION_DURATION_MS, affected_validators);
    let txs = engine.generate_transactions(PARTITION_TRANSACTIONS);
    let processed = engine.process_sequential(&txs);

    let success_rate = share(count_final(&processed), processed.len());
    let result = PartitionResult {
        duration_ms: PARTITION_DURATION_MS,
        affected_validators,
        transactions: processed.len(),
        success_rate,
        tolerant: success_rate > PARTITION_TOLERANCE,
    };

    tracing::info!(affected_validators, success_rate, tolerant = result.tolerant, "Partition");
    state.partition = Some(result);
    Ok(())
}

async fn load_stress(state: &mut ConsensusSimState) -> Result<()> {
    let engine = &mut state.ctx.engine;

    for load in STRESS_LOADS {
        let txs = engine.generate_transactions(load);
        let (processed, elapsed_ms) = engine.process_concurrent(&txs);
        let result = StressResult {
            load,
            elapsed_ms,
            tps: round2(throughput(load, elapsed_ms)),
            success_rate: share(count_final(&processed), load),
        };

        tracing::info!(load, tps = result.tps, success_rate = result.success_rate, "Load stress");
        state.load_stress.push(result);
    }

    Ok(())
}

async fn summary(state: &mut ConsensusSimState) -> Result<()> {
    let benchmarks_completed = state.benchmarks_completed();
    let peak_tps = state.peak_tps();
    let finality_ms = state.finality.as_ref().map_or(0.0, |f| f.average_ms);
    let comparison = state.ctx.baselines.traditional_consensus().compare(finality_ms, peak_tps);

    let summary = SimSummary {
        benchmarks_completed,
        overall_score: (benchmarks_completed as f64 / BENCHMARKS as f64 * 100.0).round(),
        peak_tps,
        comparison,
        rolling_hash: state.ctx.engine.rolling_hash(),
        virtual_time_ms: state.ctx.engine.clock_ms(),
    };

    tracing::info!(
        benchmarks_completed,
        overall_score = summary.overall_score,
        peak_tps,
        finality_ms,
        rolling_hash = %summary.rolling_hash,
        "Consensus simulation summary"
    );
    state.summary = Some(summary);

    let path = state.ctx.writer.write_timestamped("consensus_sim_results", &*state)?;
    state.results_file = Some(path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty(&[], FinalityDistribution::default())]
    #[case::boundaries(
        &[999.9, 1_000.0, 4_999.9, 5_000.0],
        FinalityDistribution { fast: 1, medium: 2, slow: 1 }
    )]
    #[case::all_fast(&[10.0, 20.0], FinalityDistribution { fast: 2, medium: 0, slow: 0 })]
    fn finality_buckets(#[case] times: &[f64], #[case] expected: FinalityDistribution) {
        assert_eq!(FinalityDistribution::from_times(times), expected);
    }

    #[rstest]
    #[case::none(0, 0, 0.0)]
    #[case::most(451, 500, 0.9)]
    #[case::third(1, 3, 0.33)]
    fn share_is_rounded(#[case] count: usize, #[case] total: usize, #[case] expected: f64) {
        assert!((share(count, total) - expected).abs() < 1e-9);
    }
}
