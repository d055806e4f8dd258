//! Offline stream-consensus simulation.
//!
//! Validators answer in virtual time: each validation arrives after the validator's
//! latency (with ±10 % jitter) and nothing actually sleeps. All randomness comes from one
//! seeded [`StdRng`](rand::rngs::StdRng), so a seed fully determines a run.

mod engine;
pub use engine::{
    FINALITY_THRESHOLD, ProcessedTransaction, SimulationConfig, StreamEngine, TxState,
    stream_confidence,
};

mod transaction;
pub use transaction::SimTransaction;

mod validator;
pub use validator::{Decision, Validation, Validator};
