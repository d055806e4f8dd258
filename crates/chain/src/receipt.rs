//! Receipts annotated with submission latency.

use std::time::Duration;

use alloy_primitives::{Address, TxHash};
use alloy_rpc_types_eth::{Log, TransactionReceipt};
use alloy_sol_types::SolEvent;
use serde::Serialize;

/// A mined receipt together with the time between submission and confirmation.
#[derive(Debug, Clone)]
pub struct TimedReceipt {
    /// The receipt as returned by the node.
    pub receipt: TransactionReceipt,
    /// Wall-clock time from `eth_sendTransaction` to receipt availability.
    pub latency: Duration,
}

impl TimedReceipt {
    /// Pairs a receipt with its latency.
    pub const fn new(receipt: TransactionReceipt, latency: Duration) -> Self {
        Self { receipt, latency }
    }

    /// Transaction hash.
    pub const fn hash(&self) -> TxHash {
        self.receipt.transaction_hash
    }

    /// Gas consumed by the transaction.
    pub const fn gas_used(&self) -> u64 {
        self.receipt.gas_used
    }

    /// Latency in whole milliseconds.
    pub fn latency_ms(&self) -> u64 {
        u64::try_from(self.latency.as_millis()).unwrap_or(u64::MAX)
    }

    /// Logs emitted by the transaction.
    pub fn logs(&self) -> &[Log] {
        self.receipt.inner.logs()
    }

    /// Decodes the first log matching `E`.
    pub fn first_event<E: SolEvent>(&self) -> Option<E> {
        decode_logs::<E>(self.logs()).into_iter().next()
    }

    /// Decodes the first log matching `E` that was emitted by `emitter`.
    pub fn event_from<E: SolEvent>(&self, emitter: Address) -> Option<E> {
        self.logs()
            .iter()
            .filter(|log| log.address() == emitter)
            .find_map(|log| log.log_decode::<E>().ok())
            .map(|log| log.inner.data)
    }

    /// A serializable digest of this receipt.
    pub fn summary(&self) -> ReceiptSummary {
        ReceiptSummary {
            hash: self.hash(),
            block_number: self.receipt.block_number,
            gas_used: self.gas_used(),
            latency_ms: self.latency_ms(),
        }
    }
}

/// The fields of a receipt worth keeping in experiment snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceiptSummary {
    /// Transaction hash.
    pub hash: TxHash,
    /// Block the transaction was mined in.
    pub block_number: Option<u64>,
    /// Gas consumed.
    pub gas_used: u64,
    /// Submission to confirmation latency.
    pub latency_ms: u64,
}

/// Decodes every log in `logs` whose signature matches `E`, skipping the rest.
pub fn decode_logs<E: SolEvent>(logs: &[Log]) -> Vec<E> {
    logs.iter().filter_map(|log| log.log_decode::<E>().ok()).map(|log| log.inner.data).collect()
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{B256, U256, address};
    use alloy_sol_types::sol;

    use super::*;
    use crate::test_utils::{receipt_json, rpc_log};

    sol! {
        event Ping(uint256 indexed round);
    }

    const EMITTER: Address = address!("00000000000000000000000000000000000000e1");
    const OTHER: Address = address!("00000000000000000000000000000000000000e2");

    fn timed(logs: &[Log]) -> TimedReceipt {
        let receipt = serde_json::from_value(receipt_json(B256::repeat_byte(1), true, logs)).unwrap();
        TimedReceipt::new(receipt, Duration::from_millis(1_500))
    }

    #[test]
    fn event_from_ignores_other_emitters() {
        let logs = [
            rpc_log(OTHER, Ping { round: U256::from(1) }.encode_log_data()),
            rpc_log(EMITTER, Ping { round: U256::from(2) }.encode_log_data()),
        ];
        let receipt = timed(&logs);

        assert_eq!(receipt.first_event::<Ping>().unwrap().round, 1);
        assert_eq!(receipt.event_from::<Ping>(EMITTER).unwrap().round, 2);
        assert!(receipt.event_from::<Ping>(Address::ZERO).is_none());
    }

    #[test]
    fn summary_keeps_block_gas_and_latency() {
        let summary = timed(&[]).summary();

        assert_eq!(summary.hash, B256::repeat_byte(1));
        assert_eq!(summary.block_number, Some(16));
        assert_eq!(summary.gas_used, 21_000);
        assert_eq!(summary.latency_ms, 1_500);
    }
}
