use rand::Rng;
use serde::Serialize;

use super::transaction::{ACCOUNT_BALANCE, MIN_FEE, SimTransaction};

const REGIONS: [&str; 5] = ["US-East", "US-West", "EU-Central", "Asia-Pacific", "South-America"];

/// A validator's verdict on a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// The transaction is acceptable.
    Valid,
    /// The transaction is rejected.
    Invalid,
}

/// One validator's answer, as it arrives at the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Validation {
    /// Index of the validator in the engine's set.
    pub validator: usize,
    /// Verdict.
    pub decision: Decision,
    /// Self-reported confidence in `0..=100`.
    pub confidence: u8,
    /// Virtual time from broadcast to arrival.
    pub latency_ms: f64,
}

/// A simulated validator node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validator {
    /// Stable identifier.
    pub id: String,
    /// Reputation in `80..120`.
    pub reputation: f64,
    /// Stake in `1..11`.
    pub stake: f64,
    /// Geographic region label.
    pub region: &'static str,
    /// Mean response latency in `50..250` ms.
    pub latency_ms: f64,
    /// Whether this validator answers randomly.
    pub byzantine: bool,
}

impl Validator {
    /// Draws the `index`-th validator.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, index: usize, byzantine: bool) -> Self {
        Self {
            id: format!("validator-{index}"),
            reputation: rng.random_range(80.0..120.0),
            stake: rng.random_range(1.0..11.0),
            region: REGIONS[rng.random_range(0..REGIONS.len())],
            latency_ms: rng.random_range(50.0..250.0),
            byzantine,
        }
    }

    /// Voting weight: reputation times stake.
    pub fn weight(&self) -> f64 {
        self.reputation * self.stake
    }

    /// Validates `tx`. `index` is this validator's position in the engine's set.
    pub fn validate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        index: usize,
        tx: &SimTransaction,
    ) -> Validation {
        let jitter = (rng.random::<f64>() - 0.5) * 0.2;
        let latency_ms = self.latency_ms * (1.0 + jitter);

        let (decision, confidence) = if self.byzantine {
            let decision = if rng.random_bool(0.5) { Decision::Valid } else { Decision::Invalid };
            (decision, rng.random_range(0..100u8))
        } else {
            Self::check(tx)
        };

        Validation { validator: index, decision, confidence, latency_ms }
    }

    fn check(tx: &SimTransaction) -> (Decision, u8) {
        let signature_valid = !tx.signature.is_empty() && !tx.from.is_empty();
        let state_consistent = ACCOUNT_BALANCE >= tx.value;
        let economically_valid = tx.fee >= MIN_FEE && tx.value > 0.0;

        let passed = [signature_valid, state_consistent, economically_valid]
            .into_iter()
            .filter(|ok| *ok)
            .count();
        let confidence = passed as f64 / 3.0;
        let decision = if confidence > 0.7 { Decision::Valid } else { Decision::Invalid };

        (decision, (confidence * 100.0).floor() as u8)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn tx(value: f64, fee: f64) -> SimTransaction {
        SimTransaction {
            from: "address-1".into(),
            to: "address-2".into(),
            value,
            fee,
            data: "transaction-0".into(),
            signature: vec![1; 64],
        }
    }

    #[test]
    fn honest_validator_accepts_well_formed_transfer() {
        let mut rng = StdRng::seed_from_u64(3);
        let validator = Validator::random(&mut rng, 0, false);
        let v = validator.validate(&mut rng, 0, &tx(10.0, 0.002));

        assert_eq!(v.decision, Decision::Valid);
        assert_eq!(v.confidence, 100);
        assert!(v.latency_ms >= validator.latency_ms * 0.9);
        assert!(v.latency_ms <= validator.latency_ms * 1.1);
    }

    #[test]
    fn honest_validator_rejects_underpaid_transfer() {
        let mut rng = StdRng::seed_from_u64(4);
        let validator = Validator::random(&mut rng, 0, false);
        let v = validator.validate(&mut rng, 0, &tx(10.0, 0.0));

        assert_eq!(v.decision, Decision::Invalid);
        assert_eq!(v.confidence, 66);
    }

    #[test]
    fn random_validator_ranges() {
        let mut rng = StdRng::seed_from_u64(5);
        for i in 0..200 {
            let v = Validator::random(&mut rng, i, i % 2 == 0);
            assert!((80.0..120.0).contains(&v.reputation));
            assert!((1.0..11.0).contains(&v.stake));
            assert!((50.0..250.0).contains(&v.latency_ms));
            assert!(REGIONS.contains(&v.region));
        }
    }
}
