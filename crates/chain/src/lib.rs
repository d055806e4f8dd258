#![doc(issue_tracker_base_url = "https://github.com/strebacom/strebacom/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

//! Signing JSON-RPC client and typed contract bindings used by the strebacom experiments.

mod client;
pub use client::{ChainClient, ReceiptPolicy};

mod config;
pub use config::{
    ChainConfig, DEFAULT_CORE_ADDRESS, DEFAULT_POLL_INTERVAL, DEFAULT_RECEIPT_TIMEOUT,
    N2nAddresses, StreamAddresses,
};

pub mod contracts;
pub use contracts::{
    ContractStatus, CoreContract, CoreMetrics, N2nContract, StreamContracts, SystemStats,
};

mod error;
pub use error::{ChainError, ChainResult};

mod receipt;
pub use receipt::{ReceiptSummary, TimedReceipt, decode_logs};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
