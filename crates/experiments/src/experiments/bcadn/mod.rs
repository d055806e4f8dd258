//! BCADN anomaly detection experiment.
//!
//! The detection network runs in memory against a synthetic "traditional" detector. Delays are
//! drawn and accumulated in virtual time; only the infrastructure phase touches the chain.

use std::{ops::Range, path::PathBuf};

use alloy_primitives::{Address, address};
use eyre::{Result, WrapErr, ensure};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use strebacom_chain::{ChainClient, ChainConfig};

use super::{ExperimentOutcome, NetworkInfo, RunContext};
use crate::{
    Phase, PhaseLog, PhasePlan, PhaseState, ResultsWriter,
    stats::{LatencySeries, mean, percent_gain, percent_improvement, round2, throughput},
};

mod network;
use network::{Anomaly, BcadnNetwork, NetworkStats, NodeStats, NodeStatus, Shard};

const CONTRACTS: [(&str, Address); 4] = [
    ("BCADN", address!("6ad3e5e5a741a1e88602d229aa547e5e013324cf")),
    ("AnomalyDetector", address!("ea2b8197b9c1fb936cdfcf6633c1837fc9726e5c")),
    ("NodeManager", address!("e75bfd5ba206ed5c059efeb0dd1c603f03c6553c")),
    ("ShardCoordinator", address!("9eaac685f82cfd9e9966a1819bc8206a6fe602ca")),
];

const BASELINE_SCENARIOS: usize = 10;
const TIMING_VARIATION: f64 = 0.2;

const NODE_PROFILES: [(&str, u32, u32); 12] = [
    ("node_hp_1", 95, 98),
    ("node_hp_2", 93, 97),
    ("node_hp_3", 91, 96),
    ("node_mp_1", 82, 85),
    ("node_mp_2", 80, 87),
    ("node_mp_3", 78, 83),
    ("node_lp_1", 65, 70),
    ("node_lp_2", 62, 68),
    ("node_lp_3", 60, 65),
    ("node_edge_1", 98, 60),
    ("node_edge_2", 55, 95),
    ("node_edge_3", 75, 75),
];
const SHARD_PROFILES: [(u32, u32); 4] = [(1, 2_000), (2, 1_500), (3, 1_000), (4, 500)];
const SHARD_ASSIGNMENTS: [(u32, &str); 12] = [
    (1, "node_hp_1"),
    (1, "node_hp_2"),
    (1, "node_hp_3"),
    (2, "node_mp_1"),
    (2, "node_mp_2"),
    (3, "node_mp_3"),
    (3, "node_lp_1"),
    (4, "node_lp_2"),
    (4, "node_lp_3"),
    (1, "node_edge_1"),
    (3, "node_edge_2"),
    (2, "node_edge_3"),
];
/// Metric changes followed by the shard moves they trigger: node, performance,
/// reliability, source shard, target shard.
const REBALANCING: [(&str, u32, u32, u32, u32); 2] =
    [("node_hp_1", 75, 80, 1, 2), ("node_lp_1", 88, 90, 3, 1)];
const LOAD_TRANSACTIONS: usize = 100;
const PROCESSED_SHARE: f64 = 0.7;
const SUBMIT_PAUSE_MS: u64 = 100;
const PROCESS_PAUSE_MS: u64 = 20;

const DETECTOR_NODES: usize = 10;
const ANOMALY_KINDS: [(&str, Range<u32>); 5] = [
    ("Malicious Activity", 75..95),
    ("Network Disruption", 60..85),
    ("Data Manipulation", 70..90),
    ("Resource Exhaustion", 50..75),
    ("Protocol Violation", 65..80),
];

/// Name, load in percent and transaction count.
const LOAD_SCENARIOS: [(&str, f64, usize); 4] = [
    ("Light Load", 15.0, 50),
    ("Moderate Load", 40.0, 150),
    ("Heavy Load", 75.0, 350),
    ("Extreme Load", 95.0, 600),
];

const ATTACKS: [(&str, Severity); 8] = [
    ("Sybil Attack", Severity::High),
    ("51% Attack", Severity::Critical),
    ("Eclipse Attack", Severity::High),
    ("Double Spending", Severity::Medium),
    ("Smart Contract Exploit", Severity::High),
    ("DDoS Attack", Severity::Medium),
    ("Selfish Mining", Severity::Medium),
    ("Man-in-the-Middle", Severity::Medium),
];

const PERFORMANCE_WEIGHT: f64 = 0.35;
const SECURITY_WEIGHT: f64 = 0.30;
const RELIABILITY_WEIGHT: f64 = 0.20;
const COST_WEIGHT: f64 = 0.15;

/// Detection system under comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum System {
    Bcadn,
    Traditional,
}

/// Fixed characteristics of a detection system.
#[derive(Debug, Clone, PartialEq)]
struct DetectorProfile {
    detection_ms: Range<f64>,
    response_ms: Range<f64>,
    registration_cost_wei: u64,
    processing_secs: f64,
    anomaly_threshold_low: u32,
    accuracy: Range<u32>,
    /// Security score used when no security evaluation ran.
    reference_security: f64,
    reliability: f64,
    cost_efficiency: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
struct Timing {
    detection_ms: f64,
    response_ms: f64,
    processing_secs: f64,
}

/// Probabilities of handling an attack.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Odds {
    detect: f64,
    prevent: f64,
    mitigate: f64,
}

impl System {
    const ALL: [Self; 2] = [Self::Bcadn, Self::Traditional];

    fn profile(self) -> DetectorProfile {
        match self {
            Self::Bcadn => DetectorProfile {
                detection_ms: 8.0..12.0,
                response_ms: 10.0..18.0,
                registration_cost_wei: 850_000,
                processing_secs: 14.0,
                anomaly_threshold_low: 20,
                accuracy: 85..100,
                reference_security: 92.5,
                reliability: 94.2,
                cost_efficiency: 95.0,
            },
            Self::Traditional => DetectorProfile {
                detection_ms: 22.0..35.0,
                response_ms: 25.0..45.0,
                registration_cost_wei: 1_250_000,
                processing_secs: 28.0,
                anomaly_threshold_low: 35,
                accuracy: 60..80,
                reference_security: 78.3,
                reliability: 82.7,
                cost_efficiency: 85.0,
            },
        }
    }

    /// Share of transactions that still succeed at `load_pct`.
    fn success_probability(self, load_pct: f64) -> f64 {
        match self {
            Self::Bcadn => (1.0 - load_pct / 200.0).max(0.7),
            Self::Traditional => (1.0 - load_pct / 125.0).max(0.4),
        }
    }

    /// Multiplier on the per-transaction processing delay at `load_pct`.
    fn load_factor(self, load_pct: f64) -> f64 {
        let impact = match self {
            Self::Bcadn => 0.5,
            Self::Traditional => 1.5,
        };
        1.0 + load_pct / 100.0 * impact
    }

    fn odds(self, severity: Severity) -> Odds {
        let w = severity.weight();
        match self {
            Self::Bcadn => Odds {
                detect: (0.75 + w * 0.25).min(0.98),
                prevent: (0.9 - w * 0.5).max(0.3),
                mitigate: (0.95 - w * 0.25).max(0.5),
            },
            Self::Traditional => Odds {
                detect: (0.5 + w * 0.25).min(0.8),
                prevent: (0.7 - w * 0.6).max(0.2),
                mitigate: (0.8 - w * 0.4).max(0.3),
            },
        }
    }
}

impl DetectorProfile {
    /// Draws one detection, response and processing time under a shared `±10 %` variance.
    fn timing<R: Rng>(&self, rng: &mut R) -> Timing {
        let variance = 1.0 + (rng.random::<f64>() - 0.5) * TIMING_VARIATION;
        Timing {
            detection_ms: (rng.random_range(self.detection_ms.clone()) * variance).floor(),
            response_ms: (rng.random_range(self.response_ms.clone()) * variance).floor(),
            processing_secs: (self.processing_secs * variance).floor(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    const fn weight(self) -> f64 {
        match self {
            Self::Medium => 0.5,
            Self::High => 0.8,
            Self::Critical => 0.95,
        }
    }
}

/// One value per compared system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
struct Paired<T> {
    bcadn: T,
    traditional: T,
}

impl<T> Paired<T> {
    fn from_fn(mut f: impl FnMut(System) -> T) -> Self {
        Self { bcadn: f(System::Bcadn), traditional: f(System::Traditional) }
    }

    fn get_mut(&mut self, system: System) -> &mut T {
        match system {
            System::Bcadn => &mut self.bcadn,
            System::Traditional => &mut self.traditional,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
struct DetectionSamples {
    detection: LatencySeries,
    response: LatencySeries,
    processing_secs: Vec<f64>,
    accuracy: Vec<f64>,
    registration_costs_wei: Vec<u64>,
    flagged: usize,
}

impl DetectionSamples {
    fn record(&mut self, timing: Timing, accuracy: u32, flagged: bool, cost_wei: u64) {
        self.detection.push(timing.detection_ms);
        self.response.push(timing.response_ms);
        self.processing_secs.push(timing.processing_secs);
        self.accuracy.push(f64::from(accuracy));
        self.registration_costs_wei.push(cost_wei);
        self.flagged += usize::from(flagged);
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct BaselineResult {
    scenarios: usize,
    average_detection_ms: Paired<f64>,
    average_accuracy: Paired<f64>,
    detection_improvement_pct: f64,
    accuracy_improvement_pct: f64,
    cost_improvement_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
struct ShardAllocation {
    shard: u32,
    capacity: u32,
    load: u32,
    utilization_pct: f64,
    nodes: Vec<String>,
    average_performance: f64,
}

#[derive(Debug, Clone, Serialize)]
struct NodeInteractions {
    nodes_registered: usize,
    initial_allocation: Vec<ShardAllocation>,
    final_allocation: Vec<ShardAllocation>,
    network: NetworkStats,
    nodes: NodeStats,
}

#[derive(Debug, Clone, Serialize)]
struct AnomalyCase {
    attack_type: String,
    node: String,
    score: u32,
    anomaly_id: usize,
    detection_ms: Paired<f64>,
    speedup_pct: f64,
    status_after: NodeStatus,
    weight_after: i64,
}

#[derive(Debug, Clone, Serialize)]
struct AnomalyReport {
    cases: Vec<AnomalyCase>,
    ledger: Vec<Anomaly>,
    anomalies_recorded: usize,
    nodes_on_probation: usize,
    average_detection_ms: Paired<f64>,
    detection_improvement_pct: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
struct LoadOutcome {
    elapsed_ms: f64,
    successes: usize,
    throughput_tps: f64,
    success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
struct LoadScenarioResult {
    scenario: String,
    load_pct: f64,
    transactions: usize,
    outcome: Paired<LoadOutcome>,
    response_improvement_pct: f64,
    throughput_improvement_pct: f64,
    success_rate_delta: f64,
}

#[derive(Debug, Clone, Serialize)]
struct CongestionReport {
    scenarios: Vec<LoadScenarioResult>,
    average_response_improvement_pct: f64,
    average_throughput_improvement_pct: f64,
    average_success_rate_delta: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
struct AttackResponse {
    detected: bool,
    prevented: bool,
    mitigated: bool,
}

impl AttackResponse {
    fn draw<R: Rng>(rng: &mut R, odds: Odds) -> Self {
        let detected = rng.random_bool(odds.detect);
        let prevented = detected && rng.random_bool(odds.prevent);
        let mitigated = detected && !prevented && rng.random_bool(odds.mitigate);
        Self { detected, prevented, mitigated }
    }

    const fn label(self) -> &'static str {
        match (self.detected, self.prevented, self.mitigated) {
            (false, ..) => "UNDETECTED",
            (true, true, _) => "PREVENTED",
            (true, false, true) => "MITIGATED",
            (true, false, false) => "DETECTED_ONLY",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct AttackResult {
    attack: String,
    severity: Severity,
    response: Paired<AttackResponse>,
    label: Paired<&'static str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
struct SecurityRates {
    detection_rate: f64,
    prevention_rate: f64,
    mitigation_rate: f64,
    effectiveness: f64,
}

impl SecurityRates {
    /// Detection over all attacks, prevention over detected ones and mitigation over those
    /// detected but not prevented, in percent.
    fn from_responses(responses: &[AttackResponse]) -> Self {
        let pct = |count: usize, total: usize| {
            if total == 0 { 0.0 } else { count as f64 / total as f64 * 100.0 }
        };
        let detected = responses.iter().filter(|r| r.detected).count();
        let prevented = responses.iter().filter(|r| r.prevented).count();
        let mitigated = responses.iter().filter(|r| r.mitigated).count();

        let detection_rate = pct(detected, responses.len());
        let prevention_rate = pct(prevented, detected);
        let mitigation_rate = pct(mitigated, detected.saturating_sub(prevented));
        Self {
            detection_rate,
            prevention_rate,
            mitigation_rate,
            effectiveness: detection_rate * 0.4 + prevention_rate * 0.4 + mitigation_rate * 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct SecurityReport {
    attacks: Vec<AttackResult>,
    rates: Paired<SecurityRates>,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct SystemScores {
    accuracy: f64,
    security: f64,
    reliability: f64,
    cost_efficiency: f64,
    overall: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct ResultsAnalysis {
    average_detection_ms: Paired<f64>,
    average_response_ms: Paired<f64>,
    average_processing_secs: Paired<f64>,
    average_accuracy: Paired<f64>,
    detection_improvement_pct: f64,
    response_improvement_pct: f64,
    processing_improvement_pct: f64,
    accuracy_improvement_pct: f64,
    /// Whether the security score was measured rather than taken from the reference values.
    security_measured: bool,
    /// Reliability and cost efficiency are reference values.
    synthetic: bool,
    scores: Paired<SystemScores>,
}

#[derive(Debug, Clone, Serialize)]
struct Finding {
    metric: &'static str,
    bcadn: f64,
    traditional: f64,
    bcadn_better: bool,
}

#[derive(Debug, Clone, Serialize)]
struct Conclusions {
    findings: Vec<Finding>,
    bcadn_better_everywhere: bool,
}

#[derive(Debug)]
struct BcadnContext {
    client: ChainClient,
    writer: ResultsWriter,
    model: BcadnNetwork,
    rng: StdRng,
}

/// Experiment state, snapshotted after every phase.
#[derive(Debug, Serialize)]
pub(crate) struct BcadnState {
    #[serde(flatten)]
    log: PhaseLog,
    seed: u64,
    network: Option<NetworkInfo>,
    contracts: Vec<(&'static str, Address)>,
    samples: Paired<DetectionSamples>,
    baseline: Option<BaselineResult>,
    node_interactions: Option<NodeInteractions>,
    anomaly_detection: Option<AnomalyReport>,
    congestion: Option<CongestionReport>,
    security: Option<SecurityReport>,
    results: Option<ResultsAnalysis>,
    conclusions: Option<Conclusions>,
    results_file: Option<PathBuf>,
    #[serde(skip)]
    ctx: BcadnContext,
}

impl PhaseState for BcadnState {
    fn phase_log(&mut self) -> &mut PhaseLog {
        &mut self.log
    }
}

impl BcadnState {
    fn new(client: ChainClient, writer: ResultsWriter, seed: u64) -> Self {
        Self {
            log: PhaseLog::default(),
            seed,
            network: None,
            contracts: Vec::new(),
            samples: Paired::default(),
            baseline: None,
            node_interactions: None,
            anomaly_detection: None,
            congestion: None,
            security: None,
            results: None,
            conclusions: None,
            results_file: None,
            ctx: BcadnContext {
                client,
                writer,
                model: BcadnNetwork::new(seed),
                rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
            },
        }
    }
}

pub(crate) fn plan() -> PhasePlan<BcadnState> {
    PhasePlan {
        experiment: "bcadn".to_string(),
        phases: vec![
            Phase {
                name: "infrastructure".to_string(),
                description: Some("Chain reachable, BCADN contract set recorded".into()),
                run: Box::new(|state| Box::pin(infrastructure(state))),
            },
            Phase {
                name: "baseline_performance".to_string(),
                description: Some("Detection time and accuracy against a traditional detector".into()),
                run: Box::new(|state| Box::pin(baseline_performance(state))),
            },
            Phase {
                name: "node_interactions".to_string(),
                description: Some("Node registration, shard allocation, load and rebalancing".into()),
                run: Box::new(|state| Box::pin(node_interactions(state))),
            },
            Phase {
                name: "anomaly_detection".to_string(),
                description: Some("Record anomalies and track probation".into()),
                run: Box::new(|state| Box::pin(anomaly_detection(state))),
            },
            Phase {
                name: "congestion_resilience".to_string(),
                description: Some("Throughput and success rate under growing load".into()),
                run: Box::new(|state| Box::pin(congestion_resilience(state))),
            },
            Phase {
                name: "security_evaluation".to_string(),
                description: Some("Detection, prevention and mitigation of attack vectors".into()),
                run: Box::new(|state| Box::pin(security_evaluation(state))),
            },
            Phase {
                name: "results_analysis".to_string(),
                description: Some("Average metrics and weighted overall scores".into()),
                run: Box::new(|state| Box::pin(results_analysis(state))),
            },
            Phase {
                name: "conclusions".to_string(),
                description: Some("Compare every measured metric and write the results file".into()),
                run: Box::new(|state| Box::pin(conclusions(state))),
            },
        ],
    }
}

pub(crate) async fn run(mut ctx: RunContext<'_>) -> Result<ExperimentOutcome> {
    let config = ChainConfig::from_env().wrap_err("Invalid chain configuration")?;
    let client = ChainClient::connect(&config).await.wrap_err("Failed to connect to RPC")?;

    let mut state = BcadnState::new(client, ctx.writer, ctx.baselines.child_seed());
    let runner = ctx.runner.with_snapshot(state.ctx.writer.snapshot("bcadn_state.json"));

    let phases = runner.run(&plan(), &mut state).await;
    let summary = serde_json::to_value(&state.results)?;

    Ok(ExperimentOutcome { phases, summary, results_file: state.results_file })
}

async fn infrastructure(state: &mut BcadnState) -> Result<()> {
    state.network = Some(NetworkInfo::fetch(&state.ctx.client).await?);
    state.contracts = CONTRACTS.to_vec();

    for (name, address) in CONTRACTS {
        tracing::info!(contract = name, %address, "BCADN contract");
    }
    let bcadn = System::Bcadn.profile();
    tracing::info!(
        anomaly_threshold_low = bcadn.anomaly_threshold_low,
        probation_threshold = network::PROBATION_THRESHOLD,
        detection_ms = ?bcadn.detection_ms,
        "BCADN configuration"
    );
    Ok(())
}

async fn baseline_performance(state: &mut BcadnState) -> Result<()> {
    let rng = &mut state.ctx.rng;

    for scenario in 0..BASELINE_SCENARIOS {
        for system in System::ALL {
            let profile = system.profile();
            let timing = profile.timing(rng);
            let score = rng.random_range(0..100);
            let accuracy = rng.random_range(profile.accuracy.clone());
            state.samples.get_mut(system).record(
                timing,
                accuracy,
                score > profile.anomaly_threshold_low,
                profile.registration_cost_wei,
            );
            tracing::debug!(scenario, ?system, detection_ms = timing.detection_ms, accuracy, "Baseline");
        }
    }

    let average_detection_ms = Paired {
        bcadn: state.samples.bcadn.detection.mean(),
        traditional: state.samples.traditional.detection.mean(),
    };
    let average_accuracy = Paired {
        bcadn: mean(&state.samples.bcadn.accuracy),
        traditional: mean(&state.samples.traditional.accuracy),
    };
    let result = BaselineResult {
        scenarios: BASELINE_SCENARIOS,
        average_detection_ms,
        average_accuracy,
        detection_improvement_pct: round2(percent_improvement(
            average_detection_ms.traditional,
            average_detection_ms.bcadn,
        )),
        accuracy_improvement_pct: round2(percent_gain(
            average_accuracy.traditional,
            average_accuracy.bcadn,
        )),
        cost_improvement_pct: round2(percent_improvement(
            System::Traditional.profile().registration_cost_wei as f64,
            System::Bcadn.profile().registration_cost_wei as f64,
        )),
    };

    tracing::info!(
        detection_improvement_pct = result.detection_improvement_pct,
        accuracy_improvement_pct = result.accuracy_improvement_pct,
        cost_improvement_pct = result.cost_improvement_pct,
        "Baseline performance"
    );
    state.baseline = Some(result);
    Ok(())
}

fn allocation(model: &BcadnNetwork) -> Vec<ShardAllocation> {
    model
        .shards()
        .map(|shard: &Shard| {
            let performance: Vec<f64> = shard
                .nodes
                .iter()
                .filter_map(|id| model.node(id))
                .map(|node| f64::from(node.performance))
                .collect();
            ShardAllocation {
                shard: shard.id,
                capacity: shard.capacity,
                load: shard.current_load,
                utilization_pct: round2(shard.utilization()),
                nodes: shard.nodes.clone(),
                average_performance: round2(mean(&performance)),
            }
        })
        .collect()
}

async fn node_interactions(state: &mut BcadnState) -> Result<()> {
    let ctx = &mut state.ctx;
    let model = &mut ctx.model;

    for (id, performance, reliability) in NODE_PROFILES {
        model.register_node(id, performance, reliability);
    }
    for (id, capacity) in SHARD_PROFILES {
        model.create_shard(id, capacity);
    }
    for (shard, node) in SHARD_ASSIGNMENTS {
        model.add_node_to_shard(shard, node)?;
    }
    let initial_allocation = allocation(model);

    let mut hashes = Vec::with_capacity(LOAD_TRANSACTIONS);
    for i in 0..LOAD_TRANSACTIONS {
        let sender = format!("account_{}", ctx.rng.random_range(0..1_000));
        let receiver = format!("account_{}", ctx.rng.random_range(0..1_000));
        hashes.push(model.submit_transaction(&sender, &receiver, ctx.rng.random_range(0..10_000)));
        if i % 20 == 0 {
            model.advance(SUBMIT_PAUSE_MS);
        }
    }

    let processed = (LOAD_TRANSACTIONS as f64 * PROCESSED_SHARE).floor() as usize;
    for hash in &hashes[..processed] {
        model.process_transaction(*hash)?;
        model.advance(PROCESS_PAUSE_MS);
    }

    for (node, performance, reliability, from, to) in REBALANCING {
        model.update_node_metrics(node, performance, reliability, 0)?;
        model.move_node(node, from, to)?;
        tracing::info!(node, performance, from, to, "Rebalanced node");
    }

    let network = model.network_stats();
    ensure!(
        network.completed_transactions == processed,
        "Expected {processed} processed transactions, found {}",
        network.completed_transactions
    );
    tracing::info!(
        shards = network.total_shards,
        transactions = model.transactions().len(),
        virtual_ms = model.clock_ms(),
        load_pct = network.load_percentage,
        average_fee = network.average_fee,
        "Node interactions"
    );

    state.node_interactions = Some(NodeInteractions {
        nodes_registered: NODE_PROFILES.len(),
        initial_allocation,
        final_allocation: allocation(model),
        network,
        nodes: model.node_stats(),
    });
    Ok(())
}

/// Draws a detection time for `system` without variance.
fn detection_ms<R: Rng>(rng: &mut R, system: System) -> f64 {
    rng.random_range(system.profile().detection_ms).floor()
}

async fn anomaly_detection(state: &mut BcadnState) -> Result<()> {
    let ctx = &mut state.ctx;

    if ctx.model.nodes().next().is_none() {
        for i in 1..=DETECTOR_NODES {
            let performance = ctx.rng.random_range(80..95);
            let reliability = ctx.rng.random_range(85..95);
            ctx.model.register_node(&format!("detector_{i}"), performance, reliability);
        }
    }

    let mut cases = Vec::with_capacity(ANOMALY_KINDS.len());
    for (attack_type, scores) in ANOMALY_KINDS {
        let node = ctx.model.random_node().ok_or_else(|| eyre::eyre!("No nodes registered"))?;
        let score = ctx.rng.random_range(scores);

        let times = Paired::from_fn(|system| detection_ms(&mut ctx.rng, system));
        ctx.model.advance(times.bcadn as u64);
        let anomaly_id = ctx.model.record_anomaly(&node, score, attack_type)?;
        let (status_after, weight_after) = ctx
            .model
            .node(&node)
            .map(|n| (n.status, n.weight))
            .ok_or_else(|| eyre::eyre!("Node {node} disappeared"))?;

        state.samples.bcadn.detection.push(times.bcadn);
        state.samples.traditional.detection.push(times.traditional);

        let speedup_pct = round2(percent_improvement(times.traditional, times.bcadn));
        tracing::info!(attack_type, %node, score, ?status_after, speedup_pct, "Anomaly detected");
        cases.push(AnomalyCase {
            attack_type: attack_type.to_string(),
            node,
            score,
            anomaly_id,
            detection_ms: times,
            speedup_pct,
            status_after,
            weight_after,
        });
    }

    let average_detection_ms = Paired {
        bcadn: mean(&cases.iter().map(|c| c.detection_ms.bcadn).collect::<Vec<_>>()),
        traditional: mean(&cases.iter().map(|c| c.detection_ms.traditional).collect::<Vec<_>>()),
    };
    let nodes_on_probation = ctx.model.node_stats().probation;
    tracing::info!(nodes_on_probation, anomalies = ctx.model.anomalies().len(), "Anomaly detection");

    state.anomaly_detection = Some(AnomalyReport {
        cases,
        ledger: ctx.model.anomalies().to_vec(),
        anomalies_recorded: ctx.model.anomalies().len(),
        nodes_on_probation,
        average_detection_ms,
        detection_improvement_pct: round2(percent_improvement(
            average_detection_ms.traditional,
            average_detection_ms.bcadn,
        )),
    });
    Ok(())
}

fn load_outcome(successes: usize, transactions: usize, elapsed_ms: f64) -> LoadOutcome {
    LoadOutcome {
        elapsed_ms: round2(elapsed_ms),
        successes,
        throughput_tps: round2(throughput(successes, elapsed_ms)),
        success_rate: if transactions == 0 {
            0.0
        } else {
            round2(successes as f64 / transactions as f64 * 100.0)
        },
    }
}

/// Runs one load scenario on the model and a traditional system.
///
/// BCADN pays a submission delay that shrinks with load, then a processing delay scaled
/// by its load factor. The traditional system only pays its steeper processing delay.
fn load_scenario(
    model: &mut BcadnNetwork,
    rng: &mut StdRng,
    (scenario, load_pct, transactions): (&str, f64, usize),
) -> Result<LoadScenarioResult> {
    model.clear_transactions();

    let submit_delay_ms = (1.0 - load_pct / 100.0).max(0.1) * 10.0;
    let mut hashes = Vec::with_capacity(transactions);
    for _ in 0..transactions {
        let sender = format!("account_{}", rng.random_range(0..10_000));
        let receiver = format!("account_{}", rng.random_range(0..10_000));
        hashes.push(model.submit_transaction(&sender, &receiver, rng.random_range(1..=1_000)));
    }
    let submit_ms = submit_delay_ms * transactions as f64;
    model.advance(submit_ms.round() as u64);

    let probability = System::Bcadn.success_probability(load_pct);
    let mut successes = 0;
    for hash in hashes {
        if rng.random_bool(probability) {
            model.process_transaction(hash)?;
            successes += 1;
        }
    }
    let process_ms = System::Bcadn.load_factor(load_pct) * 5.0 * transactions as f64;
    model.advance(process_ms.round() as u64);
    let bcadn = load_outcome(successes, transactions, submit_ms + process_ms);

    let probability = System::Traditional.success_probability(load_pct);
    let successes = (0..transactions).filter(|_| rng.random_bool(probability)).count();
    let elapsed_ms = System::Traditional.load_factor(load_pct) * 5.0 * transactions as f64;
    let traditional = load_outcome(successes, transactions, elapsed_ms);

    Ok(LoadScenarioResult {
        scenario: scenario.to_string(),
        load_pct,
        transactions,
        response_improvement_pct: round2(percent_improvement(
            traditional.elapsed_ms,
            bcadn.elapsed_ms,
        )),
        throughput_improvement_pct: round2(percent_gain(
            traditional.throughput_tps,
            bcadn.throughput_tps,
        )),
        success_rate_delta: round2(bcadn.success_rate - traditional.success_rate),
        outcome: Paired { bcadn, traditional },
    })
}

async fn congestion_resilience(state: &mut BcadnState) -> Result<()> {
    let ctx = &mut state.ctx;

    let mut scenarios = Vec::with_capacity(LOAD_SCENARIOS.len());
    for scenario in LOAD_SCENARIOS {
        let result = load_scenario(&mut ctx.model, &mut ctx.rng, scenario)?;
        tracing::info!(
            scenario = %result.scenario,
            bcadn_tps = result.outcome.bcadn.throughput_tps,
            traditional_tps = result.outcome.traditional.throughput_tps,
            success_rate_delta = result.success_rate_delta,
            "Load scenario"
        );
        scenarios.push(result);
    }

    let average = |f: fn(&LoadScenarioResult) -> f64| {
        round2(mean(&scenarios.iter().map(f).collect::<Vec<_>>()))
    };
    state.congestion = Some(CongestionReport {
        average_response_improvement_pct: average(|r| r.response_improvement_pct),
        average_throughput_improvement_pct: average(|r| r.throughput_improvement_pct),
        average_success_rate_delta: average(|r| r.success_rate_delta),
        scenarios,
    });
    Ok(())
}

async fn security_evaluation(state: &mut BcadnState) -> Result<()> {
    let rng = &mut state.ctx.rng;

    let attacks: Vec<AttackResult> = ATTACKS
        .into_iter()
        .map(|(attack, severity)| {
            let response = Paired::from_fn(|system| AttackResponse::draw(rng, system.odds(severity)));
            let label = Paired { bcadn: response.bcadn.label(), traditional: response.traditional.label() };
            tracing::info!(attack, ?severity, bcadn = label.bcadn, traditional = label.traditional, "Attack");
            AttackResult { attack: attack.to_string(), severity, response, label }
        })
        .collect();

    let rates = Paired::from_fn(|system| {
        let responses: Vec<_> = attacks
            .iter()
            .map(|a| match system {
                System::Bcadn => a.response.bcadn,
                System::Traditional => a.response.traditional,
            })
            .collect();
        SecurityRates::from_responses(&responses)
    });
    tracing::info!(
        bcadn_effectiveness = rates.bcadn.effectiveness,
        traditional_effectiveness = rates.traditional.effectiveness,
        "Security evaluation"
    );

    state.security = Some(SecurityReport { attacks, rates });
    Ok(())
}

async fn results_analysis(state: &mut BcadnState) -> Result<()> {
    ensure!(!state.samples.bcadn.detection.is_empty(), "No detection samples were recorded");

    let samples = &state.samples;
    let average_detection_ms =
        Paired { bcadn: samples.bcadn.detection.mean(), traditional: samples.traditional.detection.mean() };
    let average_response_ms =
        Paired { bcadn: samples.bcadn.response.mean(), traditional: samples.traditional.response.mean() };
    let average_processing_secs = Paired {
        bcadn: mean(&samples.bcadn.processing_secs),
        traditional: mean(&samples.traditional.processing_secs),
    };
    let average_accuracy =
        Paired { bcadn: mean(&samples.bcadn.accuracy), traditional: mean(&samples.traditional.accuracy) };

    let measured = state.security.as_ref().map(|s| s.rates);
    let scores = Paired::from_fn(|system| {
        let profile = system.profile();
        let (accuracy, security) = match system {
            System::Bcadn => {
                (average_accuracy.bcadn, measured.map_or(profile.reference_security, |r| r.bcadn.effectiveness))
            }
            System::Traditional => (
                average_accuracy.traditional,
                measured.map_or(profile.reference_security, |r| r.traditional.effectiveness),
            ),
        };
        SystemScores {
            accuracy,
            security,
            reliability: profile.reliability,
            cost_efficiency: profile.cost_efficiency,
            overall: round2(
                accuracy * PERFORMANCE_WEIGHT
                    + security * SECURITY_WEIGHT
                    + profile.reliability * RELIABILITY_WEIGHT
                    + profile.cost_efficiency * COST_WEIGHT,
            ),
        }
    });

    let analysis = ResultsAnalysis {
        average_detection_ms,
        average_response_ms,
        average_processing_secs,
        average_accuracy,
        detection_improvement_pct: round2(percent_improvement(
            average_detection_ms.traditional,
            average_detection_ms.bcadn,
        )),
        response_improvement_pct: round2(percent_improvement(
            average_response_ms.traditional,
            average_response_ms.bcadn,
        )),
        processing_improvement_pct: round2(percent_improvement(
            average_processing_secs.traditional,
            average_processing_secs.bcadn,
        )),
        accuracy_improvement_pct: round2(percent_gain(
            average_accuracy.traditional,
            average_accuracy.bcadn,
        )),
        security_measured: measured.is_some(),
        synthetic: true,
        scores,
    };

    tracing::info!(
        bcadn_score = scores.bcadn.overall,
        traditional_score = scores.traditional.overall,
        detection_improvement_pct = analysis.detection_improvement_pct,
        "Results analysis"
    );
    state.results = Some(analysis);
    Ok(())
}

impl BcadnState {
    fn findings(&self) -> Vec<Finding> {
        let lower = |metric, values: Paired<f64>| Finding {
            metric,
            bcadn: values.bcadn,
            traditional: values.traditional,
            bcadn_better: values.bcadn < values.traditional,
        };
        let higher = |metric, values: Paired<f64>| Finding {
            metric,
            bcadn: values.bcadn,
            traditional: values.traditional,
            bcadn_better: values.bcadn > values.traditional,
        };

        let mut findings = Vec::new();
        if let Some(results) = &self.results {
            findings.push(lower("detection_ms", results.average_detection_ms));
            findings.push(lower("response_ms", results.average_response_ms));
            findings.push(higher("accuracy", results.average_accuracy));
            findings.push(higher(
                "overall_score",
                Paired { bcadn: results.scores.bcadn.overall, traditional: results.scores.traditional.overall },
            ));
        }
        if let Some(congestion) = &self.congestion {
            let mean_of = |f: fn(&LoadScenarioResult) -> f64| {
                mean(&congestion.scenarios.iter().map(f).collect::<Vec<_>>())
            };
            findings.push(higher(
                "congestion_success_rate",
                Paired {
                    bcadn: mean_of(|r| r.outcome.bcadn.success_rate),
                    traditional: mean_of(|r| r.outcome.traditional.success_rate),
                },
            ));
        }
        if let Some(security) = &self.security {
            findings.push(higher(
                "security_effectiveness",
                Paired {
                    bcadn: security.rates.bcadn.effectiveness,
                    traditional: security.rates.traditional.effectiveness,
                },
            ));
        }
        findings
    }
}

async fn conclusions(state: &mut BcadnState) -> Result<()> {
    let findings = state.findings();
    let bcadn_better_everywhere = !findings.is_empty() && findings.iter().all(|f| f.bcadn_better);

    for finding in &findings {
        tracing::info!(
            metric = finding.metric,
            bcadn = finding.bcadn,
            traditional = finding.traditional,
            bcadn_better = finding.bcadn_better,
            "Finding"
        );
    }
    state.conclusions = Some(Conclusions { findings, bcadn_better_everywhere });

    let path = state.ctx.writer.write_timestamped("bcadn_results", &*state)?;
    state.results_file = Some(path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;
    use strebacom_chain::{
        ReceiptPolicy,
        test_utils::{client_for, mock_rpc, mount_rpc},
    };

    use super::*;

    fn offline_state(dir: &std::path::Path, seed: u64) -> BcadnState {
        let client = client_for("http://127.0.0.1:1", ReceiptPolicy::default());
        BcadnState::new(client, ResultsWriter::new(dir), seed)
    }

    #[test]
    fn plan_order() {
        let names: Vec<_> = plan().phase_names().map(str::to_string).collect();
        assert_eq!(
            names,
            [
                "infrastructure",
                "baseline_performance",
                "node_interactions",
                "anomaly_detection",
                "congestion_resilience",
                "security_evaluation",
                "results_analysis",
                "conclusions"
            ]
        );
    }

    #[rstest]
    #[case::light(15.0, 0.925, 0.88)]
    #[case::heavy(75.0, 0.7, 0.4)]
    #[case::extreme(95.0, 0.7, 0.4)]
    fn success_probability_has_floors(#[case] load: f64, #[case] bcadn: f64, #[case] traditional: f64) {
        assert!((System::Bcadn.success_probability(load) - bcadn).abs() < 1e-9);
        assert!((System::Traditional.success_probability(load) - traditional).abs() < 1e-9);
    }

    #[rstest]
    #[case::medium(Severity::Medium, 0.875, 0.65, 0.825)]
    #[case::critical(Severity::Critical, 0.9875, 0.425, 0.7125)]
    fn bcadn_odds(#[case] severity: Severity, #[case] detect: f64, #[case] prevent: f64, #[case] mitigate: f64) {
        let odds = System::Bcadn.odds(severity);
        assert!((odds.detect - detect.min(0.98)).abs() < 1e-9);
        assert!((odds.prevent - prevent).abs() < 1e-9);
        assert!((odds.mitigate - mitigate).abs() < 1e-9);
    }

    #[test]
    fn traditional_odds_are_capped() {
        let odds = System::Traditional.odds(Severity::Critical);
        assert!((odds.detect - 0.7375).abs() < 1e-9);
        assert!((odds.prevent - 0.2).abs() < 1e-9);
        assert!((odds.mitigate - 0.42).abs() < 1e-9);
    }

    #[test]
    fn timings_stay_within_variance() {
        let mut rng = StdRng::seed_from_u64(3);
        let profile = System::Bcadn.profile();
        for _ in 0..200 {
            let timing = profile.timing(&mut rng);
            assert!((7.0..=13.2).contains(&timing.detection_ms), "{timing:?}");
            assert!((9.0..=19.8).contains(&timing.response_ms), "{timing:?}");
            assert!((12.0..=15.0).contains(&timing.processing_secs), "{timing:?}");
        }
    }

    #[rstest]
    #[case::undetected(AttackResponse::default(), "UNDETECTED")]
    #[case::prevented(AttackResponse { detected: true, prevented: true, mitigated: false }, "PREVENTED")]
    #[case::mitigated(AttackResponse { detected: true, prevented: false, mitigated: true }, "MITIGATED")]
    #[case::detected_only(AttackResponse { detected: true, ..Default::default() }, "DETECTED_ONLY")]
    fn response_labels(#[case] response: AttackResponse, #[case] label: &str) {
        assert_eq!(response.label(), label);
    }

    #[test]
    fn security_rates_use_nested_denominators() {
        let detected = AttackResponse { detected: true, ..Default::default() };
        let responses = [
            AttackResponse { prevented: true, ..detected },
            AttackResponse { mitigated: true, ..detected },
            detected,
            AttackResponse::default(),
        ];
        let rates = SecurityRates::from_responses(&responses);

        assert_eq!(rates.detection_rate, 75.0);
        assert!((rates.prevention_rate - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(rates.mitigation_rate, 50.0);
        assert!((rates.effectiveness - (30.0 + 40.0 / 3.0 + 10.0)).abs() < 1e-9);
    }

    #[test]
    fn nothing_detected_rates_are_zero() {
        let rates = SecurityRates::from_responses(&[AttackResponse::default(); 3]);
        assert_eq!(rates, SecurityRates::default());
        assert_eq!(SecurityRates::from_responses(&[]), SecurityRates::default());
    }

    #[test]
    fn load_scenario_accounts_virtual_time() {
        let mut model = BcadnNetwork::new(9);
        let mut rng = StdRng::seed_from_u64(9);
        let result = load_scenario(&mut model, &mut rng, ("Light Load", 15.0, 50)).unwrap();

        // 50 * 8.5 ms submission plus 50 * 5.375 ms processing.
        assert!((result.outcome.bcadn.elapsed_ms - 693.75).abs() < 0.01);
        assert!((result.outcome.traditional.elapsed_ms - 306.25).abs() < 0.01);
        assert_eq!(model.network_stats().completed_transactions, result.outcome.bcadn.successes);
        assert_eq!(model.network_stats().total_transactions, 50);
    }

    #[tokio::test]
    async fn node_interactions_rebalance_two_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = offline_state(dir.path(), 5);

        node_interactions(&mut state).await.unwrap();

        let report = state.node_interactions.unwrap();
        assert_eq!(report.nodes_registered, 12);
        assert_eq!(report.network.total_transactions, 100);
        assert_eq!(report.network.completed_transactions, 70);
        assert_eq!(report.network.current_load, 100);

        let nodes = |alloc: &[ShardAllocation], shard: u32| {
            alloc.iter().find(|a| a.shard == shard).map(|a| a.nodes.clone()).unwrap()
        };
        assert_eq!(nodes(&report.initial_allocation, 1), ["node_hp_1", "node_hp_2", "node_hp_3", "node_edge_1"]);
        assert_eq!(nodes(&report.final_allocation, 1), ["node_hp_2", "node_hp_3", "node_edge_1", "node_lp_1"]);
        assert_eq!(nodes(&report.final_allocation, 2), ["node_mp_1", "node_mp_2", "node_edge_3", "node_hp_1"]);
        assert_eq!(state.ctx.model.node("node_lp_1").unwrap().weight, 80);
    }

    #[tokio::test]
    async fn anomaly_detection_registers_detectors_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = offline_state(dir.path(), 6);

        anomaly_detection(&mut state).await.unwrap();

        let report = state.anomaly_detection.unwrap();
        assert_eq!(state.ctx.model.nodes().count(), DETECTOR_NODES);
        assert_eq!(report.anomalies_recorded, ANOMALY_KINDS.len());
        // Every anomaly score is at least 50, above the probation threshold.
        assert!(report.cases.iter().all(|c| c.status_after == NodeStatus::Probation));
        assert!(report.nodes_on_probation >= 1);
        assert!(report.average_detection_ms.bcadn < report.average_detection_ms.traditional);
        assert_eq!(state.samples.bcadn.detection.len(), ANOMALY_KINDS.len());
    }

    #[tokio::test]
    async fn results_fall_back_to_reference_security() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = offline_state(dir.path(), 7);
        assert!(results_analysis(&mut state).await.is_err());

        baseline_performance(&mut state).await.unwrap();
        results_analysis(&mut state).await.unwrap();

        let results = state.results.unwrap();
        assert!(!results.security_measured);
        assert_eq!(results.scores.bcadn.security, 92.5);
        assert_eq!(results.scores.traditional.security, 78.3);
        assert!(results.detection_improvement_pct > 0.0);
        assert!(results.scores.bcadn.overall > results.scores.traditional.overall);
    }

    #[tokio::test]
    async fn offline_phases_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = offline_state(dir.path(), 8);

        baseline_performance(&mut state).await.unwrap();
        node_interactions(&mut state).await.unwrap();
        anomaly_detection(&mut state).await.unwrap();
        congestion_resilience(&mut state).await.unwrap();
        security_evaluation(&mut state).await.unwrap();
        results_analysis(&mut state).await.unwrap();
        conclusions(&mut state).await.unwrap();

        assert_eq!(state.baseline.unwrap().cost_improvement_pct, 32.0);
        assert_eq!(state.congestion.as_ref().unwrap().scenarios.len(), LOAD_SCENARIOS.len());
        assert_eq!(state.security.as_ref().unwrap().attacks.len(), ATTACKS.len());
        assert!(state.results.unwrap().security_measured);
        assert_eq!(state.conclusions.as_ref().unwrap().findings.len(), 6);

        let path = state.results_file.unwrap();
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(written["samples"]["bcadn"]["processing_secs"].as_array().unwrap().len(), 10);
        assert!(written["conclusions"]["findings"].is_array());
    }

    #[tokio::test]
    async fn infrastructure_reads_network() {
        let server = mock_rpc("eth_blockNumber", json!("0x10")).await;
        mount_rpc(&server, "eth_getBalance", json!("0xde0b6b3a7640000")).await;
        mount_rpc(&server, "eth_gasPrice", json!("0x3b9aca00")).await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&server.uri(), ReceiptPolicy::default());
        let mut state = BcadnState::new(client, ResultsWriter::new(dir.path()), 1);

        infrastructure(&mut state).await.unwrap();

        let network = state.network.unwrap();
        assert_eq!(network.block_number, 16);
        assert_eq!(network.balance_eth, "1.000000000000000000");
        assert_eq!(network.gas_price_gwei, 1.0);
        assert_eq!(state.contracts.len(), 4);
    }
}
