use alloy_primitives::hex;
use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::{
    SimTransaction,
    validator::{Decision, Validation, Validator},
};

/// Confidence at which a transaction is final.
pub const FINALITY_THRESHOLD: f64 = 0.90;

const CONSENSUS_THRESHOLD: f64 = 0.60;
const VALIDATED_THRESHOLD: f64 = 0.25;

/// Lifecycle state implied by a confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxState {
    /// Below 0.25.
    Received,
    /// At least 0.25.
    Validated,
    /// At least 0.60.
    Consensus,
    /// At least 0.90.
    Finalized,
}

impl TxState {
    /// Classifies a confidence in `[0, 1]`.
    pub fn classify(confidence: f64) -> Self {
        if confidence >= FINALITY_THRESHOLD {
            Self::Finalized
        } else if confidence >= CONSENSUS_THRESHOLD {
            Self::Consensus
        } else if confidence >= VALIDATED_THRESHOLD {
            Self::Validated
        } else {
            Self::Received
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Validated => "VALIDATED",
            Self::Consensus => "CONSENSUS",
            Self::Finalized => "FINALIZED",
        }
    }
}

/// Parameters of a [`StreamEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulationConfig {
    /// Number of validators.
    pub validator_count: usize,
    /// Fraction of validators that answer randomly.
    pub byzantine_ratio: f64,
    /// Confidence at which validation stops early.
    pub finality_threshold: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            validator_count: 50,
            byzantine_ratio: 0.2,
            finality_threshold: FINALITY_THRESHOLD,
            seed: 0,
        }
    }
}

/// Outcome of processing one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedTransaction {
    /// Hex SHA-256 transaction id.
    pub id: String,
    /// Final weighted confidence.
    pub confidence: f64,
    /// State implied by `confidence`.
    pub state: TxState,
    /// Virtual time from broadcast to the last validation consumed.
    pub processing_ms: f64,
    /// Virtual time to early finality, if reached.
    pub finalized_after_ms: Option<f64>,
    /// Validations consumed.
    pub validations: usize,
}

impl ProcessedTransaction {
    /// Whether the confidence reached the finality threshold.
    pub fn is_final(&self) -> bool {
        self.state == TxState::Finalized
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Partition {
    until_ms: f64,
    affected: usize,
}

/// Weighted confidence of `validations` cast by `validators`.
///
/// Every validation adds its validator's weight to the total; `VALID` ones also add
/// `weight * confidence / 100` to the positive side. The result is in `[0, 1]`.
pub fn stream_confidence(validators: &[Validator], validations: &[Validation]) -> f64 {
    let (total, positive) = validations.iter().fold((0.0, 0.0), |(total, positive), v| {
        let weight = validators.get(v.validator).map_or(1.0, Validator::weight);
        let gained = if v.decision == Decision::Valid {
            weight * f64::from(v.confidence) / 100.0
        } else {
            0.0
        };
        (total + weight, positive + gained)
    });
    if total > 0.0 { positive / total } else { 0.0 }
}

/// A validator set processing transactions in virtual time.
#[derive(Debug, Clone)]
pub struct StreamEngine {
    config: SimulationConfig,
    validators: Vec<Validator>,
    rng: StdRng,
    rolling_hash: [u8; 32],
    clock_ms: f64,
    partition: Option<Partition>,
    generated: usize,
}

impl StreamEngine {
    /// Builds the validator set. The first `byzantine_ratio * validator_count`
    /// validators are byzantine.
    pub fn new(config: SimulationConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let byzantine = (config.validator_count as f64 * config.byzantine_ratio).floor() as usize;
        let validators = (0..config.validator_count)
            .map(|i| Validator::random(&mut rng, i, i < byzantine))
            .collect();

        Self {
            config,
            validators,
            rng,
            rolling_hash: [0; 32],
            clock_ms: 0.0,
            partition: None,
            generated: 0,
        }
    }

    /// Engine parameters.
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The validator set.
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Virtual time elapsed so far.
    pub const fn clock_ms(&self) -> f64 {
        self.clock_ms
    }

    /// Head of the rolling hash, hex encoded.
    pub fn rolling_hash(&self) -> String {
        hex::encode(self.rolling_hash)
    }

    /// Draws `count` random transfers.
    pub fn generate_transactions(&mut self, count: usize) -> Vec<SimTransaction> {
        let start = self.generated;
        self.generated += count;
        (start..start + count).map(|i| SimTransaction::random(&mut self.rng, i)).collect()
    }

    /// Makes the first `affected` validators unreachable for the next `duration_ms` of
    /// virtual time.
    pub fn partition(&mut self, duration_ms: f64, affected: usize) {
        self.partition = Some(Partition { until_ms: self.clock_ms + duration_ms, affected });
    }

    fn reachable(&self, index: usize) -> bool {
        match self.partition {
            Some(p) if self.clock_ms < p.until_ms => index >= p.affected,
            _ => true,
        }
    }

    /// Processes `tx` starting at the current virtual time without advancing the clock.
    ///
    /// Validations are consumed in arrival order until the confidence reaches the
    /// finality threshold or every reachable validator has answered.
    pub fn process(&mut self, tx: &SimTransaction) -> ProcessedTransaction {
        let mut arrivals: Vec<Validation> = Vec::with_capacity(self.validators.len());
        for (index, validator) in self.validators.iter().enumerate() {
            if self.reachable(index) {
                arrivals.push(validator.validate(&mut self.rng, index, tx));
            }
        }
        arrivals.sort_by(|a, b| a.latency_ms.total_cmp(&b.latency_ms));

        let mut consumed = 0;
        let mut confidence = 0.0;
        let mut finalized_after_ms = None;
        for (i, arrival) in arrivals.iter().enumerate() {
            consumed = i + 1;
            confidence = stream_confidence(&self.validators, &arrivals[..consumed]);
            if confidence >= self.config.finality_threshold {
                finalized_after_ms = Some(arrival.latency_ms);
                break;
            }
        }

        let processing_ms = if consumed > 0 { arrivals[consumed - 1].latency_ms } else { 0.0 };
        let processed = ProcessedTransaction {
            id: tx.id(),
            confidence,
            state: TxState::classify(confidence),
            processing_ms,
            finalized_after_ms,
            validations: consumed,
        };

        self.update_rolling_hash(&processed);
        processed
    }

    /// Processes `txs` one after another, advancing the clock by each processing time.
    pub fn process_sequential(&mut self, txs: &[SimTransaction]) -> Vec<ProcessedTransaction> {
        txs.iter()
            .map(|tx| {
                let processed = self.process(tx);
                self.clock_ms += processed.processing_ms;
                processed
            })
            .collect()
    }

    /// Processes `txs` concurrently: all start at the current time and the clock advances
    /// by the slowest one. Returns the results and the elapsed virtual time.
    pub fn process_concurrent(
        &mut self,
        txs: &[SimTransaction],
    ) -> (Vec<ProcessedTransaction>, f64) {
        let processed: Vec<_> = txs.iter().map(|tx| self.process(tx)).collect();
        let elapsed_ms = processed.iter().map(|p| p.processing_ms).fold(0.0, f64::max);
        self.clock_ms += elapsed_ms;
        (processed, elapsed_ms)
    }

    fn update_rolling_hash(&mut self, processed: &ProcessedTransaction) {
        self.rolling_hash = Sha256::new()
            .chain_update(self.rolling_hash)
            .chain_update(processed.id.as_bytes())
            .chain_update(processed.state.as_str().as_bytes())
            .chain_update(processed.confidence.to_be_bytes())
            .chain_update(self.clock_ms.to_be_bytes())
            .finalize()
            .into();
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn engine(validators: usize, byzantine_ratio: f64, seed: u64) -> StreamEngine {
        StreamEngine::new(SimulationConfig {
            validator_count: validators,
            byzantine_ratio,
            seed,
            ..Default::default()
        })
    }

    #[rstest]
    #[case::finalized(0.95, TxState::Finalized)]
    #[case::finality_boundary(0.90, TxState::Finalized)]
    #[case::consensus(0.60, TxState::Consensus)]
    #[case::validated(0.25, TxState::Validated)]
    #[case::just_below(0.2499, TxState::Received)]
    #[case::zero(0.0, TxState::Received)]
    fn state_thresholds(#[case] confidence: f64, #[case] expected: TxState) {
        assert_eq!(TxState::classify(confidence), expected);
    }

    #[test]
    fn honest_network_finalizes_on_first_arrival() {
        let mut engine = engine(10, 0.0, 1);
        let txs = engine.generate_transactions(20);
        for p in engine.process_sequential(&txs) {
            assert_eq!(p.validations, 1);
            assert!((p.confidence - 1.0).abs() < 1e-12);
            assert!(p.is_final());
            assert_eq!(p.finalized_after_ms, Some(p.processing_ms));
        }
    }

    #[test]
    fn same_seed_same_run() {
        let run = |seed| {
            let mut engine = engine(30, 0.33, seed);
            let txs = engine.generate_transactions(50);
            let processed = engine.process_sequential(&txs);
            (processed, engine.rolling_hash(), engine.clock_ms())
        };

        assert_eq!(run(9), run(9));
        assert_ne!(run(9).1, run(10).1);
    }

    #[test]
    fn rolling_hash_starts_at_zero_and_advances() {
        let mut engine = engine(5, 0.0, 11);
        assert_eq!(engine.rolling_hash(), "0".repeat(64));

        let txs = engine.generate_transactions(1);
        engine.process(&txs[0]);
        let head = engine.rolling_hash();
        assert_eq!(head.len(), 64);
        assert!(head.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        assert_ne!(head, "0".repeat(64));
    }

    #[test]
    fn confidence_is_bounded() {
        let mut engine = engine(40, 0.49, 2);
        let txs = engine.generate_transactions(200);
        let (processed, elapsed) = engine.process_concurrent(&txs);

        assert!(processed.iter().all(|p| (0.0..=1.0).contains(&p.confidence)));
        assert!(processed.iter().all(|p| p.processing_ms <= elapsed));
        assert_eq!(engine.clock_ms(), elapsed);
    }

    #[test]
    fn byzantine_validators_come_first() {
        let engine = engine(10, 0.3, 3);
        let flags: Vec<_> = engine.validators().iter().map(|v| v.byzantine).collect();
        assert_eq!(flags, [true, true, true, false, false, false, false, false, false, false]);
    }

    #[test]
    fn partition_hides_affected_validators_until_it_heals() {
        let mut engine = engine(10, 1.0, 4);
        engine.partition(1_000.0, 10);

        let txs = engine.generate_transactions(1);
        let cut_off = engine.process(&txs[0]);
        assert_eq!(cut_off.validations, 0);
        assert_eq!(cut_off.confidence, 0.0);
        assert_eq!(cut_off.state, TxState::Received);

        engine.clock_ms = 1_000.0;
        assert!(engine.process(&txs[0]).validations > 0);
    }

    #[test]
    fn empty_validations_have_zero_confidence() {
        assert_eq!(stream_confidence(&[], &[]), 0.0);
    }
}
