//! N2N routing over live RIS BGP data.
//!
//! Live BGP updates are tapped from RIS Live, translated into N2N hop sequences and cached
//! as routes. The N2N contracts on chain are only checked for liveness; the route metrics
//! are compared against a synthetic traditional BGP baseline.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr, ensure};
use serde::Serialize;
use strebacom_chain::{
    ChainClient, ChainConfig, ContractStatus, N2nAddresses, N2nContract, contracts::inspect_contract,
};
use strebacom_ris_feed::{
    BgpUpdate, BoundedBuffer, DEFAULT_BUFFER_CAPACITY, FeedCounters, FeedTap, RisLiveStream,
    RisSubscription,
};
use tokio::{
    sync::{Mutex, mpsc},
    time::Instant,
};

use super::{ExperimentOutcome, NetworkInfo, RunContext};
use crate::{
    BgpBaseline, BgpMetrics, Phase, PhaseLog, PhasePlan, PhaseState, ResultsWriter,
    SnapshotStore,
};

mod route;
pub use route::{MAX_SEQUENCE_HOPS, N2nHop, as_path_to_sequence, route_key};
use route::{ProcessingMetrics, RouteTable};

/// Contracts that must be live for the experiment to proceed.
const REQUIRED_CONTRACTS: [N2nContract; 4] = [
    N2nContract::AbatlTranslation,
    N2nContract::NiasRegistry,
    N2nContract::NidRegistry,
    N2nContract::SequencePathRouter,
];

const SNAPSHOT_FILE: &str = "n2n_rislive_state.json";
const INITIAL_DATA_WAIT: Duration = Duration::from_secs(10);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);
const ROUTE_VALIDATION_DELAY: Duration = Duration::from_secs(1);
const ROUTES_TO_VALIDATE: usize = 3;
const FORWARD_CAPACITY: usize = 1024;

/// Sample registrations: kind, identifier, attributes.
const SAMPLE_NODES: [(NodeKind, &str, &str); 4] = [
    (NodeKind::Nid, "NID-65001-0", "ORG123.DEV456.PORT1.SERVER"),
    (NodeKind::Nias, "NIAS-65001", "EDGE.HIGH_SECURITY.1Gbps"),
    (NodeKind::Nid, "NID-65002-0", "ORG456.DEV789.PORT2.CLIENT"),
    (NodeKind::Nias, "NIAS-65002", "CORE.STANDARD.100Mbps"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
enum NodeKind {
    Nid,
    Nias,
}

#[derive(Debug, Clone, Serialize)]
struct RegisteredNode {
    kind: NodeKind,
    attributes: String,
    registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
struct RisConnection {
    url: String,
    initial_messages: usize,
    first_message: Option<BgpUpdate>,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct LiveProcessing {
    duration_secs: f64,
    metrics: ProcessingMetrics,
    route_cache_size: usize,
    /// Updates the tap received but could not forward for translation.
    forward_dropped: u64,
    /// Whether the feed ended before the processing window closed.
    feed_ended: bool,
}

#[derive(Debug, Clone, Serialize)]
struct RouteValidation {
    routes_validated: usize,
    validated_routes: Vec<String>,
    /// Chain head observed while validating each route.
    anchor_blocks: Vec<u64>,
    abatl_mappings: usize,
    abatl_translations: u64,
}

#[derive(Debug, Serialize)]
struct N2nSummary<'a> {
    routes_cached: usize,
    abatl_mappings: usize,
    metrics: &'a ProcessingMetrics,
    live_processing: Option<&'a LiveProcessing>,
    comparison: Option<&'a BgpBaseline>,
    route_validation: Option<&'a RouteValidation>,
}

struct N2nContext {
    client: ChainClient,
    addresses: N2nAddresses,
    writer: ResultsWriter,
    snapshot: SnapshotStore,
    ris_live_url: String,
    initial_wait: Duration,
    feed_duration: Duration,
    tap: Option<FeedTap>,
    updates: Option<mpsc::Receiver<BgpUpdate>>,
}

impl std::fmt::Debug for N2nContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("N2nContext")
            .field("client", &self.client)
            .field("ris_live_url", &self.ris_live_url)
            .field("feed_duration", &self.feed_duration)
            .field("tap", &self.tap)
            .finish_non_exhaustive()
    }
}

/// Experiment state, snapshotted after every phase.
#[derive(Debug, Serialize)]
pub(crate) struct N2nState {
    #[serde(flatten)]
    log: PhaseLog,
    network: Option<NetworkInfo>,
    contracts: Vec<ContractStatus>,
    ris_connection: Option<RisConnection>,
    registered_nodes: BTreeMap<String, RegisteredNode>,
    routes: RouteTable,
    live_processing: Option<LiveProcessing>,
    comparison: Option<BgpBaseline>,
    route_validation: Option<RouteValidation>,
    results_file: Option<PathBuf>,
    #[serde(skip)]
    ctx: N2nContext,
}

impl PhaseState for N2nState {
    fn phase_log(&mut self) -> &mut PhaseLog {
        &mut self.log
    }
}

impl N2nState {
    fn new(
        client: ChainClient,
        addresses: N2nAddresses,
        writer: ResultsWriter,
        ris_live_url: String,
        feed_duration: Duration,
    ) -> Self {
        let snapshot = writer.snapshot(SNAPSHOT_FILE);
        Self {
            log: PhaseLog::default(),
            network: None,
            contracts: Vec::new(),
            ris_connection: None,
            registered_nodes: BTreeMap::new(),
            routes: RouteTable::new(),
            live_processing: None,
            comparison: None,
            route_validation: None,
            results_file: None,
            ctx: N2nContext {
                client,
                addresses,
                writer,
                snapshot,
                ris_live_url,
                initial_wait: INITIAL_DATA_WAIT,
                feed_duration,
                tap: None,
                updates: None,
            },
        }
    }

    fn summary(&self) -> N2nSummary<'_> {
        N2nSummary {
            routes_cached: self.routes.len(),
            abatl_mappings: self.routes.abatl_mappings(),
            metrics: self.routes.metrics(),
            live_processing: self.live_processing.as_ref(),
            comparison: self.comparison.as_ref(),
            route_validation: self.route_validation.as_ref(),
        }
    }

    /// Translates every update waiting in the forwarding channel.
    fn drain_pending(&mut self) -> usize {
        let Some(rx) = self.ctx.updates.as_mut() else { return 0 };

        let mut drained = 0;
        while let Ok(update) = rx.try_recv() {
            self.routes.process(&update);
            drained += 1;
        }
        drained
    }
}

pub(crate) fn plan() -> PhasePlan<N2nState> {
    PhasePlan {
        experiment: "n2n-ris-live".to_string(),
        phases: vec![
            Phase {
                name: "clear_snapshot".to_string(),
                description: Some("Remove the state left by a previous run".into()),
                run: Box::new(|state| Box::pin(clear_snapshot(state))),
            },
            Phase {
                name: "network_check".to_string(),
                description: Some("Chain reachable and N2N contracts deployed".into()),
                run: Box::new(|state| Box::pin(network_check(state))),
            },
            Phase {
                name: "contract_validation".to_string(),
                description: Some("N2N contracts answer owner()".into()),
                run: Box::new(|state| Box::pin(contract_validation(state))),
            },
            Phase {
                name: "ris_connection".to_string(),
                description: Some("Subscribe to RIS Live and wait for initial updates".into()),
                run: Box::new(|state| Box::pin(ris_connection(state))),
            },
            Phase {
                name: "register_nodes".to_string(),
                description: Some("Record sample NID and NIAS registrations".into()),
                run: Box::new(|state| Box::pin(register_nodes(state))),
            },
            Phase {
                name: "live_bgp_processing".to_string(),
                description: Some("Translate live BGP updates into N2N routes".into()),
                run: Box::new(|state| Box::pin(live_bgp_processing(state))),
            },
            Phase {
                name: "performance_comparison".to_string(),
                description: Some("Compare N2N routing against traditional BGP".into()),
                run: Box::new(|state| Box::pin(performance_comparison(state))),
            },
            Phase {
                name: "route_validation".to_string(),
                description: Some("Validate a sample of cached routes".into()),
                run: Box::new(|state| Box::pin(route_validation(state))),
            },
            Phase {
                name: "comprehensive_results".to_string(),
                description: Some("Stop the feed and write the results file".into()),
                run: Box::new(|state| Box::pin(comprehensive_results(state))),
            },
        ],
    }
}

pub(crate) async fn run(ctx: RunContext<'_>) -> Result<ExperimentOutcome> {
    let config = ChainConfig::from_env().wrap_err("Invalid chain configuration")?;
    let client = ChainClient::connect(&config).await.wrap_err("Failed to connect to RPC")?;

    let mut state = N2nState::new(
        client,
        config.n2n,
        ctx.writer,
        ctx.options.ris_live_url.clone(),
        ctx.options.feed_duration,
    );
    let runner = ctx.runner.with_snapshot(state.ctx.snapshot.clone());

    let phases = runner.run(&plan(), &mut state).await;

    if let Some(tap) = state.ctx.tap.take()
        && let Err(e) = tap.stop().await
    {
        tracing::warn!(error = %e, "RIS Live tap exited with an error");
    }

    let summary = serde_json::to_value(state.summary())?;
    Ok(ExperimentOutcome { phases, summary, results_file: state.results_file })
}

async fn clear_snapshot(state: &mut N2nState) -> Result<()> {
    let removed = state.ctx.snapshot.clear()?;
    tracing::info!(path = %state.ctx.snapshot.path().display(), removed, "Cleared previous state");
    Ok(())
}

async fn network_check(state: &mut N2nState) -> Result<()> {
    let client = &state.ctx.client;
    let network = NetworkInfo::fetch(client).await?;

    for contract in REQUIRED_CONTRACTS {
        let address = state.ctx.addresses.get(contract);
        client
            .require_deployed(address)
            .await
            .wrap_err_with(|| format!("{} is not deployed", contract.name()))?;
        tracing::info!(contract = contract.name(), %address, "Contract deployed");
    }

    state.network = Some(network);
    Ok(())
}

async fn contract_validation(state: &mut N2nState) -> Result<()> {
    state.contracts.clear();

    for contract in N2nContract::ALL {
        let address = state.ctx.addresses.get(contract);
        let status = inspect_contract(&state.ctx.client, contract, address).await?;
        tracing::info!(
            contract = contract.name(),
            accessible = status.accessible(),
            owner = ?status.owner,
            "Contract validated"
        );
        state.contracts.push(status);
    }

    let inaccessible: Vec<_> = state
        .contracts
        .iter()
        .filter(|p| REQUIRED_CONTRACTS.contains(&p.contract) && !p.accessible())
        .map(|p| p.contract.name())
        .collect();
    ensure!(inaccessible.is_empty(), "Contracts not accessible: {}", inaccessible.join(", "));

    Ok(())
}

async fn ris_connection(state: &mut N2nState) -> Result<()> {
    let url = state.ctx.ris_live_url.clone();
    let stream = RisLiveStream::connect(&url, &RisSubscription::default())
        .await
        .wrap_err("Failed to connect to RIS Live")?;

    let buffer = Arc::new(Mutex::new(BoundedBuffer::new(DEFAULT_BUFFER_CAPACITY)));
    let counters = Arc::new(FeedCounters::new());
    let (tx, rx) = mpsc::channel(FORWARD_CAPACITY);
    let tap = FeedTap::spawn(stream, buffer, counters, Some(tx));

    tracing::info!(wait_secs = state.ctx.initial_wait.as_secs(), "Waiting for initial BGP data");
    tokio::time::sleep(state.ctx.initial_wait).await;

    let buffered = tap.snapshot().await;
    state.ctx.tap = Some(tap);
    state.ctx.updates = Some(rx);
    let drained = state.drain_pending();

    ensure!(!buffered.is_empty(), "No BGP messages received from RIS Live");
    tracing::info!(initial_messages = buffered.len(), drained, "Receiving BGP updates");

    state.ris_connection = Some(RisConnection {
        url,
        initial_messages: buffered.len(),
        first_message: buffered.into_iter().next(),
    });
    Ok(())
}

async fn register_nodes(state: &mut N2nState) -> Result<()> {
    for (kind, id, attributes) in SAMPLE_NODES {
        state.registered_nodes.insert(
            id.to_string(),
            RegisteredNode { kind, attributes: attributes.to_string(), registered_at: Utc::now() },
        );
        tracing::info!(?kind, id, "Registered node");
    }

    let nids = state.registered_nodes.values().filter(|n| n.kind == NodeKind::Nid).count();
    tracing::info!(
        total = state.registered_nodes.len(),
        nids,
        nias = state.registered_nodes.len() - nids,
        "Node registration finished"
    );
    Ok(())
}

async fn live_bgp_processing(state: &mut N2nState) -> Result<()> {
    let duration = state.ctx.feed_duration;
    let tap = state.ctx.tap.as_ref().ok_or_else(|| eyre::eyre!("RIS Live tap is not running"))?;
    let dropped_before = tap.counters().forward_dropped();
    let mut rx =
        state.ctx.updates.take().ok_or_else(|| eyre::eyre!("BGP update channel is closed"))?;

    state.routes.reset_counters();
    tracing::info!(duration_secs = duration.as_secs(), "Processing live BGP data");

    let started = Instant::now();
    let deadline = started + duration;
    let mut next_progress = started + PROGRESS_INTERVAL;
    let mut feed_ended = false;

    loop {
        match tokio::time::timeout_at(deadline.min(next_progress), rx.recv()).await {
            Ok(Some(update)) => {
                state.routes.process(&update);
            }
            Ok(None) => {
                tracing::warn!("RIS Live feed ended before the processing window closed");
                feed_ended = true;
                break;
            }
            Err(_) if Instant::now() >= deadline => break,
            Err(_) => {}
        }

        if Instant::now() >= next_progress {
            let metrics = state.routes.metrics();
            tracing::info!(
                elapsed_secs = started.elapsed().as_secs(),
                updates = metrics.updates_received,
                routes = metrics.routes_computed,
                cached = state.routes.len(),
                "BGP processing progress"
            );
            next_progress += PROGRESS_INTERVAL;
        }
    }
    state.ctx.updates = Some(rx);

    let forward_dropped = state
        .ctx
        .tap
        .as_ref()
        .map_or(0, |tap| tap.counters().forward_dropped().saturating_sub(dropped_before));
    let live = LiveProcessing {
        duration_secs: started.elapsed().as_secs_f64(),
        metrics: *state.routes.metrics(),
        route_cache_size: state.routes.len(),
        forward_dropped,
        feed_ended,
    };

    tracing::info!(
        updates = live.metrics.updates_received,
        routes = live.metrics.routes_computed,
        cached = live.route_cache_size,
        average_latency_ms = live.metrics.latency.mean(),
        success_rate = live.metrics.success_rate,
        forward_dropped,
        "Live BGP processing finished"
    );

    state.live_processing = Some(live);
    Ok(())
}

async fn performance_comparison(state: &mut N2nState) -> Result<()> {
    let metrics = state.routes.metrics();
    let n2n = BgpMetrics {
        average_latency_ms: metrics.latency.mean(),
        success_rate: metrics.success_rate,
        routes_determined: state.routes.len() as u64,
        failover_capable: true,
        blockchain_verified: true,
    };
    let comparison = BgpBaseline::compare(n2n);

    tracing::info!(
        n2n_latency_ms = comparison.n2n.average_latency_ms,
        traditional_latency_ms = comparison.traditional.average_latency_ms,
        latency_improvement_pct = comparison.latency_improvement_pct,
        route_efficiency_pct = comparison.route_efficiency_pct,
        "Performance comparison"
    );

    state.comparison = Some(comparison);
    Ok(())
}

async fn route_validation(state: &mut N2nState) -> Result<()> {
    let keys: Vec<String> =
        state.routes.routes().iter().take(ROUTES_TO_VALIDATE).map(|r| r.key.clone()).collect();

    let mut validated_routes = Vec::with_capacity(keys.len());
    let mut anchor_blocks = Vec::with_capacity(keys.len());
    for key in keys {
        tracing::info!(route = %key, "Validating route");
        tokio::time::sleep(ROUTE_VALIDATION_DELAY).await;

        match state.ctx.client.block_number().await {
            Ok(block) => {
                anchor_blocks.push(block);
                validated_routes.push(key);
            }
            Err(e) => tracing::warn!(route = %key, error = %e, "Route validation failed"),
        }
    }

    let validation = RouteValidation {
        routes_validated: validated_routes.len(),
        validated_routes,
        anchor_blocks,
        abatl_mappings: state.routes.abatl_mappings(),
        abatl_translations: state.routes.metrics().abatl_translations,
    };
    tracing::info!(routes_validated = validation.routes_validated, "Route validation finished");

    state.route_validation = Some(validation);
    Ok(())
}

async fn comprehensive_results(state: &mut N2nState) -> Result<()> {
    if let Some(tap) = state.ctx.tap.take() {
        let received = tap.counters().updates();
        tap.stop().await.wrap_err("RIS Live tap failed")?;
        tracing::info!(received, "Stopped RIS Live tap");
    }
    state.drain_pending();
    state.ctx.updates = None;

    let metrics = state.routes.metrics();
    tracing::info!(
        updates = metrics.updates_received,
        routes = metrics.routes_computed,
        cached = state.routes.len(),
        abatl_mappings = state.routes.abatl_mappings(),
        average_latency_ms = metrics.latency.mean(),
        success_rate = metrics.success_rate,
        "N2N RIS Live analysis complete"
    );

    let path = state.ctx.writer.write_timestamped("n2n_rislive_results", &*state)?;
    state.results_file = Some(path);
    Ok(())
}
