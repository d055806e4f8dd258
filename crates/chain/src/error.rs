//! Error types for chain access.

use std::time::Duration;

use alloy_primitives::{Address, TxHash};
use alloy_transport::TransportError;
use thiserror::Error;

/// Errors returned by [`ChainClient`](crate::ChainClient) and the contract bindings.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A required setting is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The JSON-RPC transport or node returned an error.
    #[error("rpc error: {0}")]
    Transport(#[from] TransportError),

    /// A contract call failed or its return data could not be decoded.
    #[error("contract error: {0}")]
    Contract(#[from] alloy_contract::Error),

    /// The transaction was mined but reverted.
    #[error("transaction {0} reverted")]
    Reverted(TxHash),

    /// No receipt appeared before the deadline.
    #[error("timed out after {timeout:?} waiting for receipt of {hash}")]
    ReceiptTimeout {
        /// Hash of the submitted transaction.
        hash: TxHash,
        /// How long the client waited.
        timeout: Duration,
    },

    /// There is no bytecode at the address.
    #[error("no contract code deployed at {0}")]
    NotDeployed(Address),

    /// The receipt did not contain the expected event.
    #[error("receipt of {hash} has no {event} event")]
    MissingEvent {
        /// Name of the event.
        event: &'static str,
        /// Hash of the transaction whose receipt was inspected.
        hash: TxHash,
    },
}

/// Result alias for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
