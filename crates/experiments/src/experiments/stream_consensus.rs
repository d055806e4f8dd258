//! On-chain stream consensus experiment.

use std::{path::PathBuf, time::Duration};

use alloy_primitives::{Address, B256, U256, address, keccak256, utils::format_ether};
use alloy_signer_local::PrivateKeySigner;
use eyre::{Result, WrapErr, ensure};
use serde::Serialize;
use strebacom_chain::{ChainClient, ChainConfig, ReceiptSummary, StreamContracts, SystemStats};

use super::{ExperimentOutcome, NetworkInfo, RunContext};
use crate::{
    ConsensusComparison, Phase, PhaseLog, PhasePlan, PhaseState, ResultsWriter,
    SyntheticBaselines, stats::{LatencySeries, LatencySummary, tps_from_latency_ms},
};

const MAIN_VALIDATOR_STAKE_WEI: u128 = 100_000_000_000_000_000;
const EPHEMERAL_FUNDING_WEI: u128 = 200_000_000_000_000_000;
const EPHEMERAL_STAKE_WEI: u128 = 50_000_000_000_000_000;
const STREAM_TX_VALUE_WEI: u128 = 10_000_000_000_000_000;

const STREAM_RECEIVER: Address = address!("742d35cc6634c0532925a3b8d4aa2bb48c56d1ec");
const ROLLING_HASH_DATA: &[u8] = b"stream_consensus_test_data";

const DEFAULT_TRANSACTIONS: usize = 3;
const SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize)]
struct ValidatorRecord {
    address: Address,
    stake_eth: String,
    ephemeral: bool,
    receipt: ReceiptSummary,
}

#[derive(Debug, Clone, Default, Serialize)]
struct Registration {
    registered: Vec<ValidatorRecord>,
    failed: usize,
    validator_count: Option<U256>,
    total_stake_eth: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
struct Submissions {
    submitted: usize,
    succeeded: usize,
    failed: usize,
    stream_ids: Vec<B256>,
    receipts: Vec<ReceiptSummary>,
    latency: LatencySeries,
}

#[derive(Debug, Clone, Default, Serialize)]
struct Validations {
    attempted: usize,
    succeeded: usize,
    failed: usize,
    finalized: usize,
    receipts: Vec<ReceiptSummary>,
}

#[derive(Debug, Clone, Serialize)]
struct RollingHashUpdate {
    data: B256,
    previous: B256,
    current: B256,
    update_count: U256,
    receipt: ReceiptSummary,
}

#[derive(Debug, Clone, Serialize)]
struct StreamReport {
    system: SystemStats,
    validator_count: U256,
    submission_latency: LatencySummary,
    estimated_tps: f64,
    success_rate: f64,
    comparison: ConsensusComparison,
}

#[derive(Debug)]
struct StreamContext {
    client: ChainClient,
    contracts: StreamContracts,
    writer: ResultsWriter,
    baselines: SyntheticBaselines,
    transactions: usize,
    ephemeral_validators: usize,
}

/// Experiment state, snapshotted after every phase.
#[derive(Debug, Serialize)]
pub(crate) struct StreamConsensusState {
    #[serde(flatten)]
    log: PhaseLog,
    contracts: [Address; 3],
    network: Option<NetworkInfo>,
    registration: Registration,
    submissions: Submissions,
    validations: Validations,
    rolling_hash: Option<RollingHashUpdate>,
    report: Option<StreamReport>,
    results_file: Option<PathBuf>,
    #[serde(skip)]
    ctx: StreamContext,
}

impl PhaseState for StreamConsensusState {
    fn phase_log(&mut self) -> &mut PhaseLog {
        &mut self.log
    }
}

pub(crate) fn plan() -> PhasePlan<StreamConsensusState> {
    PhasePlan {
        experiment: "stream-consensus".to_string(),
        phases: vec![
            Phase {
                name: "network_check".to_string(),
                description: Some("Chain reachable, account funded, contracts deployed".into()),
                run: Box::new(|state| Box::pin(network_check(state))),
            },
            Phase {
                name: "register_validators".to_string(),
                description: Some("Register the main and ephemeral validators".into()),
                run: Box::new(|state| Box::pin(register_validators(state))),
            },
            Phase {
                name: "submit_transactions".to_string(),
                description: Some("Submit stream transactions and decode their ids".into()),
                run: Box::new(|state| Box::pin(submit_transactions(state))),
            },
            Phase {
                name: "validate_transactions".to_string(),
                description: Some("Vote on every submitted transaction".into()),
                run: Box::new(|state| Box::pin(validate_transactions(state))),
            },
            Phase {
                name: "rolling_hash".to_string(),
                description: Some("Fold test data into the rolling hash".into()),
                run: Box::new(|state| Box::pin(rolling_hash(state))),
            },
            Phase {
                name: "report".to_string(),
                description: Some("Collect system stats and write the results file".into()),
                run: Box::new(|state| Box::pin(report(state))),
            },
        ],
    }
}

pub(crate) async fn run(ctx: RunContext<'_>) -> Result<ExperimentOutcome> {
    let config = ChainConfig::from_env().wrap_err("Invalid chain configuration")?;
    let client = ChainClient::connect(&config).await.wrap_err("Failed to connect to RPC")?;
    let contracts = StreamContracts::bind(&client, &config.stream)
        .wrap_err("Stream consensus contracts are not configured")?;

    let runner = ctx.runner.with_snapshot(ctx.writer.snapshot("stream_consensus_state.json"));
    let mut state = StreamConsensusState {
        log: PhaseLog::default(),
        contracts: contracts.addresses(),
        network: None,
        registration: Registration::default(),
        submissions: Submissions::default(),
        validations: Validations::default(),
        rolling_hash: None,
        report: None,
        results_file: None,
        ctx: StreamContext {
            client,
            contracts,
            writer: ctx.writer,
            baselines: ctx.baselines,
            transactions: ctx.options.transactions.unwrap_or(DEFAULT_TRANSACTIONS),
            ephemeral_validators: ctx.options.validators.unwrap_or(0),
        },
    };

    let phases = runner.run(&plan(), &mut state).await;
    let summary = serde_json::to_value(&state.report)?;

    Ok(ExperimentOutcome { phases, summary, results_file: state.results_file })
}

async fn network_check(state: &mut StreamConsensusState) -> Result<()> {
    let client = &state.ctx.client;
    let network = NetworkInfo::fetch(client).await?;
    ensure!(!network.balance_wei.is_zero(), "Account {} has no balance", network.account);

    for address in state.ctx.contracts.addresses() {
        client.require_deployed(address).await?;
    }
    tracing::info!(contracts = ?state.contracts, "Stream contracts deployed");

    state.network = Some(network);
    Ok(())
}

async fn register_validators(state: &mut StreamConsensusState) -> Result<()> {
    let ctx = &state.ctx;
    let registration = &mut state.registration;

    let stake = U256::from(MAIN_VALIDATOR_STAKE_WEI);
    match ctx.contracts.register_validator(&ctx.client, stake).await {
        Ok(receipt) => {
            tracing::info!(
                validator = %ctx.client.address(),
                block_number = ?receipt.receipt.block_number,
                gas_used = receipt.gas_used(),
                "Registered main validator"
            );
            registration.registered.push(ValidatorRecord {
                address: ctx.client.address(),
                stake_eth: format_ether(stake),
                ephemeral: false,
                receipt: receipt.summary(),
            });
        }
        Err(e) => {
            tracing::warn!(
                validator = %ctx.client.address(),
                error = %e,
                "Main validator registration failed"
            );
            registration.failed += 1;
        }
    }

    for index in 0..ctx.ephemeral_validators {
        match register_ephemeral(ctx).await {
            Ok(record) => {
                tracing::info!(index, validator = %record.address, "Registered ephemeral validator");
                registration.registered.push(record);
            }
            Err(e) => {
                tracing::warn!(
                    index,
                    error = %format!("{e:#}"),
                    "Ephemeral validator registration failed"
                );
                registration.failed += 1;
            }
        }
    }

    registration.validator_count = Some(ctx.contracts.validator_count().await?);
    registration.total_stake_eth = Some(format_ether(ctx.contracts.total_stake().await?));

    tracing::info!(
        registered = registration.registered.len(),
        failed = registration.failed,
        validator_count = ?registration.validator_count,
        "Validator registration finished"
    );
    Ok(())
}

async fn register_ephemeral(ctx: &StreamContext) -> Result<ValidatorRecord> {
    let signer = PrivateKeySigner::random();
    let address = signer.address();

    ctx.client
        .transfer(address, U256::from(EPHEMERAL_FUNDING_WEI))
        .await
        .wrap_err("Failed to fund ephemeral validator")?;

    let validator = ctx.client.with_signer(signer).await?;
    let stake = U256::from(EPHEMERAL_STAKE_WEI);
    let receipt = ctx
        .contracts
        .register_validator(&validator, stake)
        .await
        .wrap_err("Failed to register ephemeral validator")?;

    Ok(ValidatorRecord {
        address,
        stake_eth: format_ether(stake),
        ephemeral: true,
        receipt: receipt.summary(),
    })
}

async fn submit_transactions(state: &mut StreamConsensusState) -> Result<()> {
    let ctx = &state.ctx;
    let submissions = &mut state.submissions;
    let value = U256::from(STREAM_TX_VALUE_WEI);

    for index in 0..ctx.transactions {
        submissions.submitted += 1;
        match ctx.contracts.submit_transaction(&ctx.client, STREAM_RECEIVER, value).await {
            Ok((receipt, stream_id)) => {
                tracing::info!(
                    index,
                    %stream_id,
                    hash = %receipt.hash(),
                    latency_ms = receipt.latency_ms(),
                    "Stream transaction submitted"
                );
                submissions.succeeded += 1;
                submissions.stream_ids.push(stream_id);
                submissions.latency.push(receipt.latency.as_secs_f64() * 1_000.0);
                submissions.receipts.push(receipt.summary());
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "Stream transaction failed");
                submissions.failed += 1;
            }
        }
    }

    ensure!(submissions.succeeded > 0, "No stream transaction was accepted");
    Ok(())
}

async fn validate_transactions(state: &mut StreamConsensusState) -> Result<()> {
    tokio::time::sleep(SETTLE_DELAY).await;

    let ctx = &state.ctx;
    let validations = &mut state.validations;

    for stream_id in &state.submissions.stream_ids {
        validations.attempted += 1;
        match ctx.contracts.validate_transaction(&ctx.client, *stream_id, true).await {
            Ok(receipt) => {
                validations.succeeded += 1;
                validations.receipts.push(receipt.summary());
            }
            Err(e) => {
                tracing::warn!(%stream_id, error = %e, "Validation failed");
                validations.failed += 1;
                continue;
            }
        }

        let (confidence, finalized) = ctx.contracts.transaction_confidence(*stream_id).await?;
        if finalized {
            validations.finalized += 1;
        }
        tracing::info!(%stream_id, %confidence, finalized, "Transaction validated");
    }

    Ok(())
}

async fn rolling_hash(state: &mut StreamConsensusState) -> Result<()> {
    let ctx = &state.ctx;
    let data = keccak256(ROLLING_HASH_DATA);

    let previous = ctx.contracts.current_hash().await?;
    let receipt = ctx.contracts.update_rolling_hash(&ctx.client, data).await?;
    let current = ctx.contracts.current_hash().await?;
    let update_count = ctx.contracts.update_count().await?;

    ensure!(current != previous, "Rolling hash did not change after update");
    tracing::info!(%previous, %current, %update_count, "Rolling hash updated");

    state.rolling_hash =
        Some(RollingHashUpdate { data, previous, current, update_count, receipt: receipt.summary() });
    Ok(())
}

async fn report(state: &mut StreamConsensusState) -> Result<()> {
    let system = state.ctx.contracts.system_stats().await?;
    let validator_count = state.ctx.contracts.validator_count().await?;

    let submission_latency = state.submissions.latency.summary();
    let estimated_tps = tps_from_latency_ms(submission_latency.mean_ms);
    let success_rate = if state.submissions.submitted == 0 {
        0.0
    } else {
        state.submissions.succeeded as f64 / state.submissions.submitted as f64 * 100.0
    };
    let comparison = state
        .ctx
        .baselines
        .traditional_consensus()
        .compare(submission_latency.mean_ms, estimated_tps);

    tracing::info!(
        total_transactions = %system.total_transactions,
        total_validators = %system.total_validators,
        average_latency_ms = submission_latency.mean_ms,
        estimated_tps,
        success_rate,
        "Stream consensus report"
    );

    state.report = Some(StreamReport {
        system,
        validator_count,
        submission_latency,
        estimated_tps,
        success_rate,
        comparison,
    });

    let path = state.ctx.writer.write_timestamped("stream_consensus_results", &*state)?;
    state.results_file = Some(path);
    Ok(())
}
