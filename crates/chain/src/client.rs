//! Signing JSON-RPC client.

use std::{fmt, time::Duration};

use alloy_network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{TransactionReceipt, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use tokio::time::Instant;
use url::Url;

use crate::{
    ChainConfig, ChainError, ChainResult, DEFAULT_POLL_INTERVAL, DEFAULT_RECEIPT_TIMEOUT,
    TimedReceipt,
};

/// Gas limit of a plain value transfer.
const TRANSFER_GAS: u64 = 21_000;

/// How long to wait for receipts and how often to ask for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptPolicy {
    /// Deadline measured from submission.
    pub timeout: Duration,
    /// Delay between `eth_getTransactionReceipt` polls.
    pub poll_interval: Duration,
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self { timeout: DEFAULT_RECEIPT_TIMEOUT, poll_interval: DEFAULT_POLL_INTERVAL }
    }
}

/// A JSON-RPC client bound to one signing account.
///
/// Every state-changing call goes through [`ChainClient::send`], which submits the
/// transaction, polls for its receipt and reports the observed latency.
#[derive(Clone)]
pub struct ChainClient {
    provider: DynProvider,
    rpc_url: Option<Url>,
    address: Address,
    chain_id: u64,
    receipts: ReceiptPolicy,
}

impl fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainClient")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("receipts", &self.receipts)
            .finish_non_exhaustive()
    }
}

impl ChainClient {
    /// Connects to the configured endpoint and fetches the chain id.
    pub async fn connect(config: &ChainConfig) -> ChainResult<Self> {
        let receipts =
            ReceiptPolicy { timeout: config.receipt_timeout, poll_interval: config.poll_interval };
        let client =
            Self::connect_with_signer(config.rpc_url.clone(), config.signer.clone(), receipts)
                .await?;

        tracing::info!(
            address = %client.address,
            chain_id = client.chain_id,
            "Connected chain client"
        );

        Ok(client)
    }

    async fn connect_with_signer(
        rpc_url: Url,
        signer: PrivateKeySigner,
        receipts: ReceiptPolicy,
    ) -> ChainResult<Self> {
        let address = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(rpc_url.clone())
            .erased();
        let chain_id = provider.get_chain_id().await?;

        Ok(Self { provider, rpc_url: Some(rpc_url), address, chain_id, receipts })
    }

    /// Wraps an existing provider.
    ///
    /// The provider is responsible for signing; `address` is only used as the `from` field.
    pub const fn from_provider(
        provider: DynProvider,
        address: Address,
        chain_id: u64,
        receipts: ReceiptPolicy,
    ) -> Self {
        Self { provider, rpc_url: None, address, chain_id, receipts }
    }

    /// Builds a client for another account on the same endpoint.
    pub async fn with_signer(&self, signer: PrivateKeySigner) -> ChainResult<Self> {
        let rpc_url = self.rpc_url.clone().ok_or_else(|| {
            ChainError::Config("client was not built from an rpc url".to_string())
        })?;
        Self::connect_with_signer(rpc_url, signer, self.receipts).await
    }

    /// The underlying provider, for binding contract instances.
    pub const fn provider(&self) -> &DynProvider {
        &self.provider
    }

    /// The signing account.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Chain id reported by the endpoint at connect time.
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Receipt wait settings.
    pub const fn receipt_policy(&self) -> ReceiptPolicy {
        self.receipts
    }

    /// Latest block number.
    pub async fn block_number(&self) -> ChainResult<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    /// Balance of `address` in wei.
    pub async fn balance(&self, address: Address) -> ChainResult<U256> {
        Ok(self.provider.get_balance(address).await?)
    }

    /// Current gas price in wei.
    pub async fn gas_price(&self) -> ChainResult<u128> {
        Ok(self.provider.get_gas_price().await?)
    }

    /// Bytecode deployed at `address`.
    pub async fn code_at(&self, address: Address) -> ChainResult<Bytes> {
        Ok(self.provider.get_code_at(address).await?)
    }

    /// Whether any bytecode is deployed at `address`.
    pub async fn is_deployed(&self, address: Address) -> ChainResult<bool> {
        Ok(!self.code_at(address).await?.is_empty())
    }

    /// Fails with [`ChainError::NotDeployed`] if `address` has no code.
    pub async fn require_deployed(&self, address: Address) -> ChainResult<()> {
        if self.is_deployed(address).await? { Ok(()) } else { Err(ChainError::NotDeployed(address)) }
    }

    /// Executes a read-only call against the latest block.
    pub async fn call(&self, tx: TransactionRequest) -> ChainResult<Bytes> {
        Ok(self.provider.call(tx.with_from(self.address)).await?)
    }

    /// Submits `tx` from the signing account and waits for a successful receipt.
    pub async fn send(&self, tx: TransactionRequest) -> ChainResult<TimedReceipt> {
        let started = Instant::now();
        let pending = self.provider.send_transaction(tx.with_from(self.address)).await?;
        let hash = *pending.tx_hash();
        tracing::debug!(%hash, "Transaction submitted");

        let receipt = self.wait_for_receipt(hash).await?;
        let latency = started.elapsed();

        if !receipt.status() {
            tracing::warn!(%hash, "Transaction reverted");
            return Err(ChainError::Reverted(hash));
        }

        tracing::debug!(
            %hash,
            block_number = ?receipt.block_number,
            gas_used = receipt.gas_used,
            latency_ms = latency.as_millis() as u64,
            "Transaction confirmed"
        );

        Ok(TimedReceipt::new(receipt, latency))
    }

    /// Sends `value` wei to `to`.
    pub async fn transfer(&self, to: Address, value: U256) -> ChainResult<TimedReceipt> {
        let tx = TransactionRequest::default()
            .with_to(to)
            .with_value(value)
            .with_gas_limit(TRANSFER_GAS);
        self.send(tx).await
    }

    /// Fetches the receipt of `hash` if it has been mined.
    pub async fn receipt(&self, hash: TxHash) -> ChainResult<Option<TransactionReceipt>> {
        Ok(self.provider.get_transaction_receipt(hash).await?)
    }

    /// Polls for the receipt of `hash` using the client's [`ReceiptPolicy`].
    pub async fn wait_for_receipt(&self, hash: TxHash) -> ChainResult<TransactionReceipt> {
        self.wait_for_receipt_with(hash, self.receipts).await
    }

    /// Polls for the receipt of `hash` until it appears or `policy.timeout` elapses.
    pub async fn wait_for_receipt_with(
        &self,
        hash: TxHash,
        policy: ReceiptPolicy,
    ) -> ChainResult<TransactionReceipt> {
        let deadline = Instant::now() + policy.timeout;

        loop {
            if let Some(receipt) = self.receipt(hash).await? {
                return Ok(receipt);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ChainError::ReceiptTimeout { hash, timeout: policy.timeout });
            }

            tracing::trace!(%hash, "Receipt not yet available");
            tokio::time::sleep(policy.poll_interval.min(remaining)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{B256, address};
    use serde_json::json;
    use wiremock::MockServer;

    use super::*;
    use crate::test_utils::{mock_rpc, mount_rpc, receipt_json};

    fn client_for(server: &MockServer, receipts: ReceiptPolicy) -> ChainClient {
        crate::test_utils::client_for(&server.uri(), receipts)
    }

    fn fast_receipts() -> ReceiptPolicy {
        ReceiptPolicy { timeout: Duration::from_secs(2), poll_interval: Duration::from_millis(10) }
    }

    #[tokio::test]
    async fn block_number_decodes_hex_quantity() {
        let server = mock_rpc("eth_blockNumber", json!("0x10")).await;
        let client = client_for(&server, ReceiptPolicy::default());

        assert_eq!(client.block_number().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn empty_code_is_not_deployed() {
        let server = mock_rpc("eth_getCode", json!("0x")).await;
        let client = client_for(&server, ReceiptPolicy::default());
        let target = address!("3e8d9276a878b418b5169726ffa3de21d7376770");

        assert!(!client.is_deployed(target).await.unwrap());
        assert!(matches!(
            client.require_deployed(target).await,
            Err(ChainError::NotDeployed(addr)) if addr == target
        ));
    }

    #[tokio::test]
    async fn missing_receipt_times_out() {
        let server = mock_rpc("eth_getTransactionReceipt", serde_json::Value::Null).await;
        let policy = ReceiptPolicy {
            timeout: Duration::from_millis(120),
            poll_interval: Duration::from_millis(20),
        };
        let client = client_for(&server, policy);

        let err = client.wait_for_receipt(B256::repeat_byte(0x11)).await.unwrap_err();
        assert!(matches!(err, ChainError::ReceiptTimeout { timeout, .. } if timeout == policy.timeout));
        assert!(server.received_requests().await.unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn with_signer_requires_url() {
        let server = mock_rpc("eth_chainId", json!("0xaa36a7")).await;
        let client = client_for(&server, ReceiptPolicy::default());

        let err = client.with_signer(PrivateKeySigner::random()).await.unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
    }

    #[tokio::test]
    async fn reverted_receipt_is_an_error() {
        let hash = B256::repeat_byte(0x22);
        let server = mock_rpc("eth_sendTransaction", json!(hash)).await;
        mount_rpc(&server, "eth_getTransactionReceipt", receipt_json(hash, false, &[])).await;
        let client = client_for(&server, fast_receipts());

        let err = client
            .transfer(address!("742d35cc6634c0532925a3b8d4aa2bb48c56d1ec"), U256::from(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Reverted(reverted) if reverted == hash));
    }

    #[tokio::test]
    async fn send_returns_mined_receipt() {
        let hash = B256::repeat_byte(0x33);
        let server = mock_rpc("eth_sendTransaction", json!(hash)).await;
        mount_rpc(&server, "eth_getTransactionReceipt", receipt_json(hash, true, &[])).await;
        let client = client_for(&server, fast_receipts());

        let receipt = client.transfer(Address::ZERO, U256::from(1)).await.unwrap();
        assert_eq!(receipt.hash(), hash);
        assert_eq!(receipt.gas_used(), TRANSFER_GAS);
        assert_eq!(receipt.receipt.block_number, Some(16));
    }
}
