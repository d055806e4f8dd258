//! The single-contract Strebacom core: stream intake, quorum signals and rolling hash.

use alloy_primitives::{Address, B256, U256};
use alloy_provider::DynProvider;
use alloy_sol_types::sol;
use serde::Serialize;

use crate::{ChainClient, ChainError, ChainResult, TimedReceipt};

sol! {
    /// Stream consensus with quorum sensing and probabilistic finality in one contract.
    #[sol(rpc)]
    interface StrebacomCore {
        /// Emitted when a transfer enters the stream.
        event StreamTransactionReceived(bytes32 indexed txId, address sender, uint256 value);
        /// Emitted for every quorum signal.
        event QuorumSignalBroadcast(address indexed validator, bytes32 indexed txId, uint256 signalStrength);
        /// Emitted when a transaction's confidence changes.
        event ConfidenceUpdated(bytes32 indexed txId, uint256 confidence, uint8 state);
        /// Emitted when a transaction crosses the finality threshold.
        event ProbabilisticFinalityReached(bytes32 indexed txId, uint256 finalConfidence);
        /// Emitted on every rolling hash update.
        event RollingHashUpdated(bytes32 newHash, uint256 updateCount);

        function BASE_REPUTATION() external view returns (uint256);
        function FINALITY_THRESHOLD() external view returns (uint256);
        function QUORUM_THRESHOLD() external view returns (uint256);
        function averageConfidenceTime() external view returns (uint256);
        function broadcastQuorumSignal(bytes32 txId, bool support, uint256 strength) external;
        function calculateStreamConfidence(bytes32 txId) external view returns (uint256);
        function finalizedTransactions() external view returns (uint256);
        function getComparisonMetrics()
            external
            view
            returns (
                string consensusType,
                string architecture,
                uint256 byzantineThreshold,
                string finalityType,
                string processingModel
            );
        function getStrebacomMetrics()
            external
            view
            returns (
                uint256 totalTransactions,
                uint256 finalizedTransactions,
                uint256 activeValidators,
                uint256 averageFinality,
                uint256 hashUpdates,
                uint256 consensusEfficiency
            );
        function getTransactionStatus(bytes32 txId)
            external
            view
            returns (
                uint256 confidence,
                uint8 state,
                bool isFinalized,
                uint256 validatorCount,
                uint256 timeToFinality
            );
        function getTransactionStreamLength() external view returns (uint256);
        function getValidatorMetrics(address validator)
            external
            view
            returns (
                uint256 reputation,
                uint256 totalValidations,
                uint256 accuracy,
                uint256 stake,
                bool isActive
            );
        function globalRollingHash() external view returns (bytes32);
        function hashUpdateCount() external view returns (uint256);
        function registerStreamValidator() external payable;
        function submitStreamTransaction(address receiver) external payable returns (bytes32);
        function totalTransactions() external view returns (uint256);
    }
}

/// Gas limit for `submitStreamTransaction`.
pub const CORE_SUBMIT_GAS: u64 = 250_000;

/// Gas limit for `broadcastQuorumSignal`.
pub const CORE_SIGNAL_GAS: u64 = 280_000;

const CORE_REGISTER_GAS: u64 = 300_000;

/// Aggregate counters from `getStrebacomMetrics()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoreMetrics {
    /// Transactions ever submitted.
    pub total_transactions: U256,
    /// Transactions past the finality threshold.
    pub finalized_transactions: U256,
    /// Validators currently active.
    pub active_validators: U256,
    /// Average time to finality in seconds.
    pub average_finality: U256,
    /// Rolling hash updates.
    pub hash_updates: U256,
    /// Finalized share in percent.
    pub consensus_efficiency: U256,
}

/// Self-description returned by `getComparisonMetrics()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonMetrics {
    /// Consensus family, e.g. "Stream".
    pub consensus_type: String,
    /// Block or blockless layout.
    pub architecture: String,
    /// Tolerated byzantine share in percent.
    pub byzantine_threshold: U256,
    /// How finality is reached.
    pub finality_type: String,
    /// Sequential or parallel intake.
    pub processing_model: String,
}

/// Confidence record of one stream transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransactionStatus {
    /// Confidence in percent.
    pub confidence: U256,
    /// Lifecycle state index: received, validated, consensus, finalized.
    pub state: u8,
    /// Whether the finality threshold was crossed.
    pub finalized: bool,
    /// Validators that signalled on the transaction.
    pub validator_count: U256,
    /// Seconds from submission to finality, zero while pending.
    pub time_to_finality: U256,
}

impl TransactionStatus {
    /// Name of the lifecycle state.
    pub const fn state_name(&self) -> &'static str {
        match self.state {
            0 => "RECEIVED",
            1 => "VALIDATED",
            2 => "CONSENSUS",
            3 => "FINALIZED",
            _ => "UNKNOWN",
        }
    }
}

/// A validator as seen by `getValidatorMetrics()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoreValidator {
    /// Reputation score.
    pub reputation: U256,
    /// Signals cast so far.
    pub total_validations: U256,
    /// Accuracy in percent.
    pub accuracy: U256,
    /// Stake in wei.
    pub stake: U256,
    /// Whether the validator may signal.
    pub active: bool,
}

/// [`StrebacomCore`] bound to one provider.
#[derive(Debug, Clone)]
pub struct CoreContract {
    core: StrebacomCore::StrebacomCoreInstance<DynProvider>,
}

impl CoreContract {
    /// Binds the core contract at `address` to the client's provider.
    pub fn bind(client: &ChainClient, address: Address) -> Self {
        Self { core: StrebacomCore::new(address, client.provider().clone()) }
    }

    /// Contract address.
    pub fn address(&self) -> Address {
        *self.core.address()
    }

    /// Finality and quorum thresholds in percent.
    pub async fn thresholds(&self) -> ChainResult<(U256, U256)> {
        let finality = self.core.FINALITY_THRESHOLD().call().await?;
        let quorum = self.core.QUORUM_THRESHOLD().call().await?;
        Ok((finality, quorum))
    }

    /// Reads the contract's self-description.
    pub async fn comparison_metrics(&self) -> ChainResult<ComparisonMetrics> {
        let m = self.core.getComparisonMetrics().call().await?;
        Ok(ComparisonMetrics {
            consensus_type: m.consensusType,
            architecture: m.architecture,
            byzantine_threshold: m.byzantineThreshold,
            finality_type: m.finalityType,
            processing_model: m.processingModel,
        })
    }

    /// Reads the aggregate counters.
    pub async fn metrics(&self) -> ChainResult<CoreMetrics> {
        let m = self.core.getStrebacomMetrics().call().await?;
        Ok(CoreMetrics {
            total_transactions: m.totalTransactions,
            finalized_transactions: m.finalizedTransactions,
            active_validators: m.activeValidators,
            average_finality: m.averageFinality,
            hash_updates: m.hashUpdates,
            consensus_efficiency: m.consensusEfficiency,
        })
    }

    /// Head of the rolling hash and the number of updates folded into it.
    pub async fn rolling_hash(&self) -> ChainResult<(B256, U256)> {
        let hash = self.core.globalRollingHash().call().await?;
        let count = self.core.hashUpdateCount().call().await?;
        Ok((hash, count))
    }

    /// Number of transactions in the stream.
    pub async fn stream_length(&self) -> ChainResult<U256> {
        Ok(self.core.getTransactionStreamLength().call().await?)
    }

    /// Registers the sender of `client` as a stream validator with `stake` wei.
    pub async fn register_validator(
        &self,
        client: &ChainClient,
        stake: U256,
    ) -> ChainResult<TimedReceipt> {
        let tx = self
            .core
            .registerStreamValidator()
            .value(stake)
            .gas(CORE_REGISTER_GAS)
            .into_transaction_request();
        client.send(tx).await
    }

    /// Reads the validator record of `validator`.
    pub async fn validator(&self, validator: Address) -> ChainResult<CoreValidator> {
        let v = self.core.getValidatorMetrics(validator).call().await?;
        Ok(CoreValidator {
            reputation: v.reputation,
            total_validations: v.totalValidations,
            accuracy: v.accuracy,
            stake: v.stake,
            active: v.isActive,
        })
    }

    /// Submits `value` wei to `receiver` with a `gas` limit and returns the stream id.
    pub async fn submit(
        &self,
        client: &ChainClient,
        receiver: Address,
        value: U256,
        gas: u64,
    ) -> ChainResult<(TimedReceipt, B256)> {
        let tx = self
            .core
            .submitStreamTransaction(receiver)
            .value(value)
            .gas(gas)
            .into_transaction_request();
        let receipt = client.send(tx).await?;

        let received = receipt
            .event_from::<StrebacomCore::StreamTransactionReceived>(self.address())
            .ok_or(ChainError::MissingEvent {
                event: "StreamTransactionReceived",
                hash: receipt.hash(),
            })?;

        Ok((receipt, received.txId))
    }

    /// Broadcasts a supporting quorum signal of `strength` percent on `tx_id`.
    pub async fn broadcast_signal(
        &self,
        client: &ChainClient,
        tx_id: B256,
        strength: u64,
        gas: u64,
    ) -> ChainResult<TimedReceipt> {
        let tx = self
            .core
            .broadcastQuorumSignal(tx_id, true, U256::from(strength))
            .gas(gas)
            .into_transaction_request();
        client.send(tx).await
    }

    /// Reads the confidence record of `tx_id`.
    pub async fn transaction_status(&self, tx_id: B256) -> ChainResult<TransactionStatus> {
        let s = self.core.getTransactionStatus(tx_id).call().await?;
        Ok(TransactionStatus {
            confidence: s.confidence,
            state: s.state,
            finalized: s.isFinalized,
            validator_count: s.validatorCount,
            time_to_finality: s.timeToFinality,
        })
    }

    /// Recomputes the confidence of `tx_id` from its signals.
    pub async fn stream_confidence(&self, tx_id: B256) -> ChainResult<U256> {
        Ok(self.core.calculateStreamConfidence(tx_id).call().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy_primitives::{address, keccak256};
    use alloy_sol_types::{SolEvent, SolType, SolValue, sol_data};
    use serde_json::json;
    use wiremock::MockServer;

    use super::*;
    use crate::{
        ReceiptPolicy,
        test_utils::{SENDER, client_for, mock_rpc, mount_rpc, receipt_json, rpc_log},
    };

    const CORE: Address = address!("313e42204c1423c40db24ce8447518d9f7b3a2e0");
    const RECEIVER: Address = address!("9429bc1efdbeb339b815fdbe20f93f56812f655a");

    fn fast() -> ReceiptPolicy {
        ReceiptPolicy { timeout: Duration::from_secs(2), poll_interval: Duration::from_millis(10) }
    }

    fn received(tx_id: B256) -> StrebacomCore::StreamTransactionReceived {
        StrebacomCore::StreamTransactionReceived {
            txId: tx_id,
            sender: SENDER,
            value: U256::from(1_000_000_000_000_000u64),
        }
    }

    async fn core_answering_call(result: Vec<u8>) -> (MockServer, CoreContract) {
        let server = mock_rpc("eth_call", json!(alloy_primitives::Bytes::from(result))).await;
        let core = CoreContract::bind(&client_for(&server.uri(), fast()), CORE);
        (server, core)
    }

    #[test]
    fn event_signatures_match_abi() {
        assert_eq!(
            StrebacomCore::StreamTransactionReceived::SIGNATURE_HASH,
            keccak256("StreamTransactionReceived(bytes32,address,uint256)")
        );
        assert_eq!(
            StrebacomCore::QuorumSignalBroadcast::SIGNATURE_HASH,
            keccak256("QuorumSignalBroadcast(address,bytes32,uint256)")
        );
        assert_eq!(
            StrebacomCore::RollingHashUpdated::SIGNATURE_HASH,
            keccak256("RollingHashUpdated(bytes32,uint256)")
        );
    }

    #[tokio::test]
    async fn submit_returns_id_emitted_by_core() {
        let tx_id = B256::repeat_byte(0x51);
        let hash = B256::repeat_byte(0x52);
        let foreign = rpc_log(
            address!("00000000000000000000000000000000000000ff"),
            received(B256::repeat_byte(0x99)).encode_log_data(),
        );
        let ours = rpc_log(CORE, received(tx_id).encode_log_data());

        let server = mock_rpc("eth_sendTransaction", json!(hash)).await;
        mount_rpc(&server, "eth_getTransactionReceipt", receipt_json(hash, true, &[foreign, ours]))
            .await;
        let client = client_for(&server.uri(), fast());
        let core = CoreContract::bind(&client, CORE);

        let (receipt, id) =
            core.submit(&client, RECEIVER, U256::from(1), CORE_SUBMIT_GAS).await.unwrap();
        assert_eq!(id, tx_id);
        assert_eq!(receipt.hash(), hash);
    }

    #[tokio::test]
    async fn submit_without_core_event_fails() {
        let hash = B256::repeat_byte(0x53);
        let server = mock_rpc("eth_sendTransaction", json!(hash)).await;
        mount_rpc(&server, "eth_getTransactionReceipt", receipt_json(hash, true, &[])).await;
        let client = client_for(&server.uri(), fast());

        let err = CoreContract::bind(&client, CORE)
            .submit(&client, RECEIVER, U256::from(1), CORE_SUBMIT_GAS)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::MissingEvent { event: "StreamTransactionReceived", .. }));
    }

    #[tokio::test]
    async fn transaction_status_decodes_tuple() {
        let encoded = <(
            sol_data::Uint<256>,
            sol_data::Uint<8>,
            sol_data::Bool,
            sol_data::Uint<256>,
            sol_data::Uint<256>,
        ) as SolType>::abi_encode_params(&(
            U256::from(92),
            3u8,
            true,
            U256::from(4),
            U256::from(12),
        ));
        let (_server, core) = core_answering_call(encoded).await;

        let status = core.transaction_status(B256::repeat_byte(1)).await.unwrap();
        assert_eq!(status.confidence, U256::from(92));
        assert!(status.finalized);
        assert_eq!(status.state_name(), "FINALIZED");
        assert_eq!(status.validator_count, U256::from(4));
    }

    #[tokio::test]
    async fn stream_length_reads_single_word() {
        let (_server, core) = core_answering_call(U256::from(7).abi_encode()).await;
        assert_eq!(core.stream_length().await.unwrap(), U256::from(7));
    }

    #[test]
    fn unknown_state_index_is_named() {
        let status = TransactionStatus {
            confidence: U256::ZERO,
            state: 9,
            finalized: false,
            validator_count: U256::ZERO,
            time_to_finality: U256::ZERO,
        };
        assert_eq!(status.state_name(), "UNKNOWN");
    }
}
