//! Mock JSON-RPC endpoints for tests.

use alloy_primitives::{Address, B256, address};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types_eth::Log;
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method},
};

use crate::{ChainClient, ReceiptPolicy};

/// Account used as `from` by [`client_for`].
pub const SENDER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

/// Sepolia chain id.
pub const CHAIN_ID: u64 = 11155111;

/// Answers every `rpc_method` request on `server` with `result`.
pub async fn mount_rpc(server: &MockServer, rpc_method: &str, result: Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 0,
            "result": result
        })))
        .mount(server)
        .await;
}

/// Starts a server answering `rpc_method` with `result`.
pub async fn mock_rpc(rpc_method: &str, result: Value) -> MockServer {
    let server = MockServer::start().await;
    mount_rpc(&server, rpc_method, result).await;
    server
}

/// A client sending as [`SENDER`] to `url` without a signer.
///
/// # Panics
///
/// Panics if `url` is not a valid url.
pub fn client_for(url: &str, receipts: ReceiptPolicy) -> ChainClient {
    let provider = RootProvider::new_http(url.parse().unwrap()).erased();
    ChainClient::from_provider(provider, SENDER, CHAIN_ID, receipts)
}

/// A mined EIP-1559 receipt of `hash` as returned by `eth_getTransactionReceipt`.
pub fn receipt_json(hash: B256, success: bool, logs: &[Log]) -> Value {
    json!({
        "type": "0x2",
        "status": if success { "0x1" } else { "0x0" },
        "cumulativeGasUsed": "0x5208",
        "logs": logs,
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "transactionHash": hash,
        "transactionIndex": "0x0",
        "blockHash": B256::repeat_byte(0xbb),
        "blockNumber": "0x10",
        "gasUsed": "0x5208",
        "effectiveGasPrice": "0x3b9aca00",
        "from": SENDER,
        "to": Address::ZERO,
        "contractAddress": null
    })
}

/// An RPC log emitted by `emitter`.
pub fn rpc_log(emitter: Address, data: alloy_primitives::LogData) -> Log {
    Log { inner: alloy_primitives::Log { address: emitter, data }, ..Default::default() }
}
