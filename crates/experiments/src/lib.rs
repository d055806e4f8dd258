#![doc(issue_tracker_base_url = "https://github.com/strebacom/strebacom/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

//! Experiment definitions for strebacom.
//!
//! An experiment is a [`PhasePlan`] over a serializable state. The [`PhaseRunner`] executes
//! the phases in order, applies the [`OnFailure`] policy and snapshots the state after each
//! phase. Metrics helpers live in [`stats`], synthetic comparison systems in
//! [`SyntheticBaselines`].

mod baseline;
pub use baseline::{
    BITCOIN_TPS, BgpBaseline, BgpMetrics, ConsensusBaseline, ConsensusComparison, ETHEREUM_TPS,
    SyntheticBaselines,
};

mod error;
pub use error::{SnapshotError, SnapshotResult};

pub mod experiments;
pub use experiments::{Experiment, ExperimentOptions, run_experiment};

mod phase;
pub use phase::{
    OnFailure, Phase, PhaseError, PhaseFn, PhaseFuture, PhaseLog, PhaseOutcome, PhasePlan,
    PhaseResult, PhaseRunner, PhaseState, matches_filter,
};

mod report;
pub use report::{ExperimentReport, print_report_json, print_report_text};

pub mod simulation;

mod snapshot;
pub use snapshot::{ResultsWriter, SnapshotStore};

pub mod stats;
