//! Typed bindings for the remote contracts the experiments drive.
//!
//! Only interfaces live here. The contracts themselves are deployed separately and
//! addressed through [`ChainConfig`](crate::ChainConfig).

mod core;
pub use core::{
    CORE_SIGNAL_GAS, CORE_SUBMIT_GAS, ComparisonMetrics, CoreContract, CoreMetrics,
    CoreValidator, StrebacomCore, TransactionStatus,
};

mod n2n;
pub use n2n::{ContractStatus, N2nContract, Ownable, inspect_contract};

mod stream;
pub use stream::{
    RollingHash, STREAM_SUBMIT_GAS, STREAM_VALIDATE_GAS, StreamContracts, StreamProcessor,
    SystemStats, VALIDATOR_REGISTER_GAS, ValidatorRegistry,
};
