//! End-to-end runs of the offline consensus simulation.

use std::path::Path;

use strebacom_experiments::{
    Experiment, ExperimentOptions, ExperimentReport, PhaseOutcome, run_experiment,
};

fn options(dir: &Path, seed: u64) -> ExperimentOptions {
    ExperimentOptions {
        results_dir: dir.to_path_buf(),
        seed: Some(seed),
        transactions: Some(50),
        validators: Some(20),
        ..Default::default()
    }
}

async fn run(options: &ExperimentOptions) -> ExperimentReport {
    run_experiment(Experiment::ConsensusSim, options).await.unwrap()
}

#[tokio::test]
async fn runs_every_phase_and_writes_results() {
    let dir = tempfile::tempdir().unwrap();
    let report = run(&options(dir.path(), 7)).await;

    assert!(report.success(), "{:#?}", report.phases);
    assert_eq!(report.passed(), Experiment::ConsensusSim.phase_names().len());
    assert_eq!(report.seed, 7);

    let results = report.results_file.as_deref().expect("results file");
    assert!(results.starts_with(dir.path()));
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(results).unwrap()).unwrap();
    assert_eq!(written["summary"]["benchmarks_completed"], 5);
    assert_eq!(written["summary"]["overall_score"], 100.0);
    assert_eq!(written["byzantine_resilience"].as_array().unwrap().len(), 4);

    assert!(dir.path().join("consensus_sim_state.json").exists());
}

#[tokio::test]
async fn same_seed_same_summary() {
    let (a, b) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());

    let first = run(&options(a.path(), 42)).await;
    let second = run(&options(b.path(), 42)).await;
    let other = run(&options(b.path(), 43)).await;

    assert_eq!(first.summary, second.summary);
    assert_ne!(first.summary["summary"]["rolling_hash"], other.summary["summary"]["rolling_hash"]);
}

#[tokio::test]
async fn filter_skips_other_phases() {
    let dir = tempfile::tempdir().unwrap();
    let options =
        ExperimentOptions { filter: Some("throughput*".to_string()), ..options(dir.path(), 1) };
    let report = run(&options).await;

    assert_eq!(report.passed(), 1);
    assert_eq!(report.skipped(), report.phases.len() - 1);
    assert!(report.results_file.is_none());
    assert!(report.phases.iter().skip(1).all(|p| matches!(
        &p.outcome,
        PhaseOutcome::Skipped { reason } if reason == "filtered"
    )));
    assert_eq!(report.summary["throughput_scaling"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn rerun_discards_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("consensus_sim_state.json");

    run(&options(dir.path(), 3)).await;
    assert!(snapshot.exists());

    let filtered =
        ExperimentOptions { filter: Some("nothing_matches".to_string()), ..options(dir.path(), 3) };
    let report = run(&filtered).await;

    assert_eq!(report.skipped(), report.phases.len());
    assert!(!snapshot.exists());
}

#[test]
fn phase_names_are_listed_in_order() {
    assert_eq!(
        Experiment::ConsensusSim.phase_names(),
        [
            "throughput_scaling",
            "byzantine_resilience",
            "finality_performance",
            "partition_tolerance",
            "load_stress",
            "summary"
        ]
    );
    assert!(Experiment::ALL.iter().all(|e| !e.phase_names().is_empty()));
    assert!(!Experiment::ConsensusSim.requires_chain());
}

#[test]
fn catalogue_lists_every_experiment() {
    let names: Vec<_> = Experiment::ALL.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        ["stream-consensus", "n2n-ris-live", "consensus-sim", "bcadn", "stream-charge"]
    );
    assert!(Experiment::Bcadn.requires_chain());
    assert!(Experiment::StreamCharge.requires_chain());
    assert_eq!(Experiment::Bcadn.phase_names().len(), 8);
}
