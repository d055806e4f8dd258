//! Ordered experiment phases and the runner that executes them.

use std::{future::Future, pin::Pin, time::Instant};

use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};

use crate::SnapshotStore;

/// Future returned by a phase function, borrowing the experiment state.
pub type PhaseFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A phase function: mutates the experiment state, failing with an error.
pub type PhaseFn<S> = Box<dyn for<'a> Fn(&'a mut S) -> PhaseFuture<'a> + Send + Sync>;

/// One named step of an experiment.
pub struct Phase<S> {
    /// Phase name (used for filtering and in snapshots).
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// The phase function.
    pub run: PhaseFn<S>,
}

impl<S> std::fmt::Debug for Phase<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// The phases of one experiment, in execution order.
#[derive(Debug)]
pub struct PhasePlan<S> {
    /// Experiment name.
    pub experiment: String,
    /// Phases to run.
    pub phases: Vec<Phase<S>>,
}

impl<S> PhasePlan<S> {
    /// Phase names in order.
    pub fn phase_names(&self) -> impl Iterator<Item = &str> {
        self.phases.iter().map(|p| p.name.as_str())
    }
}

/// What the runner does after a phase fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Record the failure and skip every remaining phase.
    #[default]
    Abort,
    /// Record the failure and continue with the next phase.
    Record,
}

/// A failure recorded in the experiment state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseError {
    /// Phase that failed.
    pub phase: String,
    /// Rendered error chain.
    pub error: String,
    /// When the failure happened.
    pub timestamp: DateTime<Utc>,
}

/// Progress bookkeeping embedded in every experiment state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseLog {
    /// Phase currently executing, or the last one executed.
    pub current: Option<String>,
    /// Phases that finished successfully.
    pub completed: Vec<String>,
    /// Failures in the order they happened.
    pub errors: Vec<PhaseError>,
}

impl PhaseLog {
    /// Records a failure of `phase`.
    pub fn record_error(&mut self, phase: &str, error: String) {
        self.errors.push(PhaseError { phase: phase.to_string(), error, timestamp: Utc::now() });
    }
}

/// State that a [`PhaseRunner`] can drive.
pub trait PhaseState: Serialize + Send {
    /// The embedded progress log.
    fn phase_log(&mut self) -> &mut PhaseLog;
}

/// How a phase ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PhaseOutcome {
    /// The phase returned `Ok`.
    Passed,
    /// The phase returned an error.
    Failed {
        /// Rendered error chain.
        error: String,
    },
    /// The phase was not executed.
    Skipped {
        /// Why it was not executed.
        reason: String,
    },
}

/// Result of a single phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseResult {
    /// Phase name.
    pub name: String,
    /// How it ended.
    #[serde(flatten)]
    pub outcome: PhaseOutcome,
    /// Wall-clock duration, zero for skipped phases.
    pub duration_ms: u64,
}

impl PhaseResult {
    fn skipped(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            outcome: PhaseOutcome::Skipped { reason: reason.into() },
            duration_ms: 0,
        }
    }

    /// Whether the phase passed.
    pub const fn is_passed(&self) -> bool {
        matches!(self.outcome, PhaseOutcome::Passed)
    }

    /// Whether the phase failed.
    pub const fn is_failed(&self) -> bool {
        matches!(self.outcome, PhaseOutcome::Failed { .. })
    }

    /// Whether the phase was skipped.
    pub const fn is_skipped(&self) -> bool {
        matches!(self.outcome, PhaseOutcome::Skipped { .. })
    }
}

/// Matches `name` against a glob pattern where `*` matches any run of characters.
pub fn matches_filter(name: &str, pattern: &str) -> bool {
    let name = name.as_bytes();
    let pattern = pattern.as_bytes();
    let (mut n, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, n));
            p += 1;
        } else if p < pattern.len() && pattern[p] == name[n] {
            p += 1;
            n += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            n = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Executes a [`PhasePlan`] against a state.
#[derive(Debug, Clone, Default)]
pub struct PhaseRunner {
    filter: Option<String>,
    on_failure: OnFailure,
    snapshot: Option<SnapshotStore>,
}

impl PhaseRunner {
    /// Creates a runner that aborts on failure and keeps no snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only run phases whose name matches `filter`.
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the failure policy.
    pub const fn with_on_failure(mut self, on_failure: OnFailure) -> Self {
        self.on_failure = on_failure;
        self
    }

    /// Saves the state to `store` after every executed phase.
    pub fn with_snapshot(mut self, store: SnapshotStore) -> Self {
        self.snapshot = Some(store);
        self
    }

    /// The configured snapshot store, if any.
    pub const fn snapshot(&self) -> Option<&SnapshotStore> {
        self.snapshot.as_ref()
    }

    /// Runs every phase of `plan` in order and returns one result per phase.
    ///
    /// A snapshot left by a previous run is deleted before the first phase.
    pub async fn run<S: PhaseState>(&self, plan: &PhasePlan<S>, state: &mut S) -> Vec<PhaseResult> {
        self.clear_snapshot();

        let mut results = Vec::with_capacity(plan.phases.len());
        let mut aborted_at: Option<&str> = None;
        let total = plan.phases.len();

        for (index, phase) in plan.phases.iter().enumerate() {
            if let Some(failed) = aborted_at {
                results.push(PhaseResult::skipped(&phase.name, format!("aborted after {failed}")));
                continue;
            }

            if let Some(filter) = &self.filter
                && !matches_filter(&phase.name, filter)
            {
                tracing::debug!(phase = %phase.name, filter, "Skipping filtered phase");
                results.push(PhaseResult::skipped(&phase.name, "filtered"));
                continue;
            }

            tracing::info!(
                experiment = %plan.experiment,
                phase = %phase.name,
                step = index + 1,
                total,
                description = phase.description.as_deref().unwrap_or_default(),
                "Executing phase"
            );
            state.phase_log().current = Some(phase.name.clone());

            let started = Instant::now();
            let outcome = (phase.run)(state).await;
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let outcome = match outcome {
                Ok(()) => {
                    state.phase_log().completed.push(phase.name.clone());
                    tracing::info!(phase = %phase.name, duration_ms, "Phase completed");
                    PhaseOutcome::Passed
                }
                Err(e) => {
                    let error = format!("{e:#}");
                    state.phase_log().record_error(&phase.name, error.clone());
                    tracing::error!(phase = %phase.name, duration_ms, error = %error, "Phase failed");
                    if self.on_failure == OnFailure::Abort {
                        aborted_at = Some(&phase.name);
                    }
                    PhaseOutcome::Failed { error }
                }
            };

            self.save(state);
            results.push(PhaseResult { name: phase.name.clone(), outcome, duration_ms });
        }

        results
    }

    fn clear_snapshot(&self) {
        let Some(store) = &self.snapshot else { return };
        match store.clear() {
            Ok(true) => tracing::debug!(path = %store.path().display(), "Removed previous snapshot"),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(path = %store.path().display(), error = %e, "Failed to remove snapshot")
            }
        }
    }

    fn save<S: PhaseState>(&self, state: &S) {
        if let Some(store) = &self.snapshot
            && let Err(e) = store.save(state)
        {
            tracing::warn!(path = %store.path().display(), error = %e, "Failed to save snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[derive(Debug, Default, Serialize)]
    struct Counter {
        log: PhaseLog,
        ran: Vec<&'static str>,
    }

    impl PhaseState for Counter {
        fn phase_log(&mut self) -> &mut PhaseLog {
            &mut self.log
        }
    }

    async fn first(state: &mut Counter) -> Result<()> {
        state.ran.push("first");
        Ok(())
    }

    async fn broken(state: &mut Counter) -> Result<()> {
        state.ran.push("broken");
        eyre::bail!("rpc unavailable")
    }

    async fn last(state: &mut Counter) -> Result<()> {
        state.ran.push("last");
        Ok(())
    }

    fn phase(name: &str, run: PhaseFn<Counter>) -> Phase<Counter> {
        Phase { name: name.to_string(), description: None, run }
    }

    fn plan() -> PhasePlan<Counter> {
        PhasePlan {
            experiment: "test".to_string(),
            phases: vec![
                phase("first", Box::new(|s| Box::pin(first(s)))),
                phase("broken", Box::new(|s| Box::pin(broken(s)))),
                phase("last", Box::new(|s| Box::pin(last(s)))),
            ],
        }
    }

    #[rstest]
    #[case::exact("connect", "connect", true)]
    #[case::prefix("connect", "con*", true)]
    #[case::suffix("register_validators", "*validators", true)]
    #[case::middle("live_bgp_processing", "live*processing", true)]
    #[case::star("anything", "*", true)]
    #[case::mismatch("connect", "report", false)]
    #[case::too_long("con", "connect", false)]
    #[case::backtrack("abcbd", "a*bd", true)]
    fn filter_matching(#[case] name: &str, #[case] pattern: &str, #[case] expected: bool) {
        assert_eq!(matches_filter(name, pattern), expected);
    }

    #[tokio::test]
    async fn abort_stops_after_first_failure() {
        let mut state = Counter::default();
        let results = PhaseRunner::new().run(&plan(), &mut state).await;

        assert_eq!(state.ran, vec!["first", "broken"]);
        assert!(results[0].is_passed());
        assert!(matches!(
            &results[1].outcome,
            PhaseOutcome::Failed { error } if error == "rpc unavailable"
        ));
        assert!(results[2].is_skipped());
        assert_eq!(state.log.completed, vec!["first"]);
        assert_eq!(state.log.errors.len(), 1);
        assert_eq!(state.log.errors[0].phase, "broken");
    }

    #[tokio::test]
    async fn record_continues_after_failure() {
        let mut state = Counter::default();
        let results =
            PhaseRunner::new().with_on_failure(OnFailure::Record).run(&plan(), &mut state).await;

        assert_eq!(state.ran, vec!["first", "broken", "last"]);
        assert_eq!(results.iter().filter(|r| r.is_failed()).count(), 1);
        assert_eq!(state.log.completed, vec!["first", "last"]);
        assert_eq!(state.log.current.as_deref(), Some("last"));
    }

    #[tokio::test]
    async fn filtered_phases_are_skipped() {
        let mut state = Counter::default();
        let results =
            PhaseRunner::new().with_filter(Some("l*".into())).run(&plan(), &mut state).await;

        assert_eq!(state.ran, vec!["last"]);
        assert!(results[0].is_skipped() && results[1].is_skipped());
        assert!(results[2].is_passed());
    }

    #[tokio::test]
    async fn snapshot_saved_after_each_phase() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));
        let mut state = Counter::default();

        PhaseRunner::new().with_snapshot(store.clone()).run(&plan(), &mut state).await;

        let saved: serde_json::Value = store.load().unwrap().unwrap();
        assert_eq!(saved["log"]["current"], "broken");
        assert_eq!(saved["log"]["errors"][0]["error"], "rpc unavailable");
        assert_eq!(saved["ran"], serde_json::json!(["first", "broken"]));
    }

    #[tokio::test]
    async fn previous_snapshot_removed_when_nothing_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));
        let runner = PhaseRunner::new().with_snapshot(store.clone());

        runner.run(&plan(), &mut Counter::default()).await;
        assert!(store.path().exists());

        let results = runner
            .with_filter(Some("nothing_matches".into()))
            .run(&plan(), &mut Counter::default())
            .await;

        assert!(results.iter().all(PhaseResult::is_skipped));
        assert!(!store.path().exists());
    }
}
