//! Stream consensus contracts: validator registry, stream processor and rolling hash.

use alloy_primitives::{Address, B256, U256};
use alloy_provider::DynProvider;
use alloy_sol_types::sol;
use serde::Serialize;

use crate::{ChainClient, ChainError, ChainResult, StreamAddresses, TimedReceipt};

sol! {
    /// Stake-weighted validator set.
    #[sol(rpc)]
    interface ValidatorRegistry {
        /// Emitted when a validator joins with its stake.
        event ValidatorRegistered(address indexed validator, uint256 stake);

        function getValidatorCount() external view returns (uint256);
        function getValidatorInfo(address validator)
            external
            view
            returns (uint256 stake, uint256 reputation, uint256 joinTime, bool active);
        function registerValidator() external payable;
        function totalStake() external view returns (uint256);
        function updateReputation(address validator, uint256 newReputation) external;
    }

    /// Blockless transaction stream with confidence-based finality.
    #[sol(rpc)]
    interface StreamProcessor {
        /// Emitted when a value transfer enters the stream.
        event TransactionSubmitted(bytes32 indexed txId, address sender, uint256 value);
        /// Emitted when a transaction crosses the finality threshold.
        event TransactionFinalized(bytes32 indexed txId, uint256 confidence);

        function getSystemStats()
            external
            view
            returns (uint256 totalTransactions, uint256 totalValidators, uint256 totalStake);
        function getTransactionDetails(bytes32 txId)
            external
            view
            returns (
                address sender,
                address receiver,
                uint256 value,
                uint256 confidence,
                uint256 validatorCount,
                bool finalized
            );
        function submitTransaction(address receiver) external payable returns (bytes32);
        function validateTransaction(bytes32 txId, bool decision) external;
    }

    /// Append-only hash chain commitment.
    #[sol(rpc)]
    interface RollingHash {
        function currentHash() external view returns (bytes32);
        function updateHash(bytes32 newData) external;
        function updateCount() external view returns (uint256);
    }
}

/// Gas limit for `registerValidator`.
pub const VALIDATOR_REGISTER_GAS: u64 = 300_000;

/// Gas limit for `submitTransaction`.
pub const STREAM_SUBMIT_GAS: u64 = 200_000;

/// Gas limit for `validateTransaction`.
pub const STREAM_VALIDATE_GAS: u64 = 150_000;

const ROLLING_HASH_GAS: u64 = 100_000;

/// Aggregate counters reported by `StreamProcessor.getSystemStats()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    /// Transactions ever submitted.
    pub total_transactions: U256,
    /// Validators known to the processor.
    pub total_validators: U256,
    /// Stake in wei.
    pub total_stake: U256,
}

/// The three stream consensus contracts bound to one provider.
#[derive(Debug, Clone)]
pub struct StreamContracts {
    registry: ValidatorRegistry::ValidatorRegistryInstance<DynProvider>,
    processor: StreamProcessor::StreamProcessorInstance<DynProvider>,
    rolling_hash: RollingHash::RollingHashInstance<DynProvider>,
}

impl StreamContracts {
    /// Binds the contracts at `addresses` to the client's provider.
    ///
    /// Every address must be configured.
    pub fn bind(client: &ChainClient, addresses: &StreamAddresses) -> ChainResult<Self> {
        let require = |addr: Option<Address>, var: &str| {
            addr.ok_or_else(|| ChainError::Config(format!("{var} is required")))
        };
        let provider = client.provider().clone();

        Ok(Self {
            registry: ValidatorRegistry::new(
                require(addresses.validator_registry, "VALIDATOR_REGISTRY_ADDRESS")?,
                provider.clone(),
            ),
            processor: StreamProcessor::new(
                require(addresses.stream_processor, "STREAM_PROCESSOR_ADDRESS")?,
                provider.clone(),
            ),
            rolling_hash: RollingHash::new(
                require(addresses.rolling_hash, "ROLLING_HASH_ADDRESS")?,
                provider,
            ),
        })
    }

    /// Addresses in registry, processor, rolling hash order.
    pub fn addresses(&self) -> [Address; 3] {
        [*self.registry.address(), *self.processor.address(), *self.rolling_hash.address()]
    }

    /// Registers the sender of `client` as a validator with `stake` wei.
    pub async fn register_validator(
        &self,
        client: &ChainClient,
        stake: U256,
    ) -> ChainResult<TimedReceipt> {
        let tx = self
            .registry
            .registerValidator()
            .value(stake)
            .gas(VALIDATOR_REGISTER_GAS)
            .into_transaction_request();
        client.send(tx).await
    }

    /// Submits a stream transaction of `value` wei to `receiver` and returns its stream id.
    pub async fn submit_transaction(
        &self,
        client: &ChainClient,
        receiver: Address,
        value: U256,
    ) -> ChainResult<(TimedReceipt, B256)> {
        let tx = self
            .processor
            .submitTransaction(receiver)
            .value(value)
            .gas(STREAM_SUBMIT_GAS)
            .into_transaction_request();
        let receipt = client.send(tx).await?;

        let submitted = receipt
            .event_from::<StreamProcessor::TransactionSubmitted>(*self.processor.address())
            .ok_or(ChainError::MissingEvent { event: "TransactionSubmitted", hash: receipt.hash() })?;

        Ok((receipt, submitted.txId))
    }

    /// Casts a validation vote on stream transaction `tx_id`.
    pub async fn validate_transaction(
        &self,
        client: &ChainClient,
        tx_id: B256,
        decision: bool,
    ) -> ChainResult<TimedReceipt> {
        let tx = self
            .processor
            .validateTransaction(tx_id, decision)
            .gas(STREAM_VALIDATE_GAS)
            .into_transaction_request();
        client.send(tx).await
    }

    /// Folds `data` into the rolling hash commitment.
    pub async fn update_rolling_hash(
        &self,
        client: &ChainClient,
        data: B256,
    ) -> ChainResult<TimedReceipt> {
        let tx = self.rolling_hash.updateHash(data).gas(ROLLING_HASH_GAS).into_transaction_request();
        client.send(tx).await
    }

    /// Reads the processor's aggregate counters.
    pub async fn system_stats(&self) -> ChainResult<SystemStats> {
        let stats = self.processor.getSystemStats().call().await?;
        Ok(SystemStats {
            total_transactions: stats.totalTransactions,
            total_validators: stats.totalValidators,
            total_stake: stats.totalStake,
        })
    }

    /// Number of registered validators.
    pub async fn validator_count(&self) -> ChainResult<U256> {
        Ok(self.registry.getValidatorCount().call().await?)
    }

    /// Sum of validator stakes in wei.
    pub async fn total_stake(&self) -> ChainResult<U256> {
        Ok(self.registry.totalStake().call().await?)
    }

    /// Confidence of stream transaction `tx_id` and whether it is finalized.
    pub async fn transaction_confidence(&self, tx_id: B256) -> ChainResult<(U256, bool)> {
        let details = self.processor.getTransactionDetails(tx_id).call().await?;
        Ok((details.confidence, details.finalized))
    }

    /// Head of the rolling hash chain.
    pub async fn current_hash(&self) -> ChainResult<B256> {
        Ok(self.rolling_hash.currentHash().call().await?)
    }

    /// Number of rolling hash updates so far.
    pub async fn update_count(&self) -> ChainResult<U256> {
        Ok(self.rolling_hash.updateCount().call().await?)
    }
}
