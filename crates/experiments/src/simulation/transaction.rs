use alloy_primitives::hex;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Minimum fee an honest validator accepts.
pub(crate) const MIN_FEE: f64 = 0.001;

/// Balance every simulated account starts with.
pub(crate) const ACCOUNT_BALANCE: f64 = 100.0;

/// A synthetic value transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimTransaction {
    /// Sender account.
    pub from: String,
    /// Receiver account.
    pub to: String,
    /// Transferred amount.
    pub value: f64,
    /// Offered fee.
    pub fee: f64,
    /// Opaque payload.
    pub data: String,
    /// Sender signature.
    #[serde(skip)]
    pub signature: Vec<u8>,
}

impl SimTransaction {
    /// Draws the `index`-th random transfer.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, index: usize) -> Self {
        let mut signature = vec![0u8; 64];
        rng.fill(signature.as_mut_slice());

        Self {
            from: format!("address-{}", rng.random_range(0..1_000)),
            to: format!("address-{}", rng.random_range(0..1_000)),
            value: rng.random_range(0.0..ACCOUNT_BALANCE),
            fee: MIN_FEE + rng.random_range(0.0..0.01),
            data: format!("transaction-{index}"),
            signature,
        }
    }

    /// SHA-256 over every field, hex encoded.
    pub fn id(&self) -> String {
        let digest = Sha256::new()
            .chain_update(self.from.as_bytes())
            .chain_update(self.to.as_bytes())
            .chain_update(self.value.to_be_bytes())
            .chain_update(self.fee.to_be_bytes())
            .chain_update(self.data.as_bytes())
            .chain_update(&self.signature)
            .finalize();
        hex::encode(digest)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn random_transfers_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(1);
        for i in 0..100 {
            let tx = SimTransaction::random(&mut rng, i);
            assert!(tx.value >= 0.0 && tx.value < ACCOUNT_BALANCE);
            assert!(tx.fee >= MIN_FEE);
            assert_eq!(tx.signature.len(), 64);
            assert_eq!(tx.data, format!("transaction-{i}"));
        }
    }

    #[test]
    fn id_is_stable_and_field_sensitive() {
        let mut rng = StdRng::seed_from_u64(2);
        let tx = SimTransaction::random(&mut rng, 0);
        let id = tx.id();

        assert_eq!(id.len(), 64);
        assert_eq!(id, tx.clone().id());

        let mut other = tx;
        other.data.push('!');
        assert_ne!(other.id(), id);
    }
}
