//! Synthetic comparison systems.
//!
//! None of these numbers are measured. They are reference points with fixed ratios or
//! ranges, drawn from a seedable RNG so a run can be reproduced with `--seed`. Every
//! serialized baseline carries `"synthetic": true`.

use std::ops::Range;

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;

use crate::stats::{percent_gain, percent_improvement};

/// Reference Bitcoin throughput.
pub const BITCOIN_TPS: f64 = 7.0;

/// Reference Ethereum throughput.
pub const ETHEREUM_TPS: f64 = 15.0;

const BGP_LATENCY_FACTOR: f64 = 2.5;
const BGP_SUCCESS_RATE: f64 = 85.0;
const BGP_ROUTE_FACTOR: f64 = 0.7;

const PBFT_FINALITY_MS: Range<f64> = 1_000.0..6_000.0;
const POLKADOT_FINALITY_MS: Range<f64> = 12_000.0..60_000.0;

/// Routing metrics of one system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BgpMetrics {
    /// Mean processing latency per update.
    pub average_latency_ms: f64,
    /// Share of updates that produced a route, in percent.
    pub success_rate: f64,
    /// Distinct routes determined.
    pub routes_determined: u64,
    /// Whether precomputed failover paths exist.
    pub failover_capable: bool,
    /// Whether routes are verified on chain.
    pub blockchain_verified: bool,
}

/// N2N routing compared with a synthetic traditional BGP.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BgpBaseline {
    /// Always `true`.
    pub synthetic: bool,
    /// Measured N2N metrics.
    pub n2n: BgpMetrics,
    /// Derived traditional BGP metrics.
    pub traditional: BgpMetrics,
    /// Latency improvement in percent.
    pub latency_improvement_pct: f64,
    /// Success rate difference in percentage points.
    pub success_rate_delta: f64,
    /// Additional routes determined, in percent.
    pub route_efficiency_pct: f64,
}

impl BgpBaseline {
    /// Derives traditional BGP from `n2n`: 2.5x latency, 85 % success, 70 % of the routes.
    pub fn compare(n2n: BgpMetrics) -> Self {
        let traditional = BgpMetrics {
            average_latency_ms: n2n.average_latency_ms * BGP_LATENCY_FACTOR,
            success_rate: BGP_SUCCESS_RATE,
            routes_determined: (n2n.routes_determined as f64 * BGP_ROUTE_FACTOR).floor() as u64,
            failover_capable: false,
            blockchain_verified: false,
        };

        Self {
            synthetic: true,
            n2n,
            traditional,
            latency_improvement_pct: percent_improvement(
                traditional.average_latency_ms,
                n2n.average_latency_ms,
            ),
            success_rate_delta: n2n.success_rate - traditional.success_rate,
            route_efficiency_pct: percent_gain(
                traditional.routes_determined as f64,
                n2n.routes_determined as f64,
            ),
        }
    }
}

/// Synthetic finality and throughput references for classic consensus protocols.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConsensusBaseline {
    /// Always `true`.
    pub synthetic: bool,
    /// PBFT-style finality sample.
    pub pbft_finality_ms: f64,
    /// Polkadot-style (GRANDPA) finality sample.
    pub polkadot_finality_ms: f64,
    /// Bitcoin throughput reference.
    pub bitcoin_tps: f64,
    /// Ethereum throughput reference.
    pub ethereum_tps: f64,
}

/// A measured system set against a [`ConsensusBaseline`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConsensusComparison {
    /// Measured finality or confirmation latency.
    pub finality_ms: f64,
    /// Measured throughput.
    pub tps: f64,
    /// Latency improvement over PBFT, in percent.
    pub vs_pbft_pct: f64,
    /// Latency improvement over Polkadot, in percent.
    pub vs_polkadot_pct: f64,
    /// Throughput as a multiple of Bitcoin.
    pub vs_bitcoin_x: f64,
    /// Throughput as a multiple of Ethereum.
    pub vs_ethereum_x: f64,
    /// The references used.
    pub baseline: ConsensusBaseline,
}

impl ConsensusBaseline {
    /// Compares a measured latency and throughput with this baseline.
    pub fn compare(&self, finality_ms: f64, tps: f64) -> ConsensusComparison {
        ConsensusComparison {
            finality_ms,
            tps,
            vs_pbft_pct: percent_improvement(self.pbft_finality_ms, finality_ms),
            vs_polkadot_pct: percent_improvement(self.polkadot_finality_ms, finality_ms),
            vs_bitcoin_x: tps / self.bitcoin_tps,
            vs_ethereum_x: tps / self.ethereum_tps,
            baseline: *self,
        }
    }
}

/// Seeded source of synthetic baselines.
#[derive(Debug, Clone)]
pub struct SyntheticBaselines {
    seed: u64,
    rng: StdRng,
}

impl SyntheticBaselines {
    /// Creates a source from `seed`, or from a random seed when `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self { seed, rng: StdRng::seed_from_u64(seed) }
    }

    /// Seed in use, for reproducing the run.
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Draws classic consensus references.
    pub fn traditional_consensus(&mut self) -> ConsensusBaseline {
        ConsensusBaseline {
            synthetic: true,
            pbft_finality_ms: self.rng.random_range(PBFT_FINALITY_MS),
            polkadot_finality_ms: self.rng.random_range(POLKADOT_FINALITY_MS),
            bitcoin_tps: BITCOIN_TPS,
            ethereum_tps: ETHEREUM_TPS,
        }
    }

    /// Derives a seed for an independent generator, e.g. a simulation engine.
    pub fn child_seed(&mut self) -> u64 {
        self.rng.random()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgp_baseline_ratios() {
        let n2n = BgpMetrics {
            average_latency_ms: 4.0,
            success_rate: 95.0,
            routes_determined: 100,
            failover_capable: true,
            blockchain_verified: true,
        };
        let cmp = BgpBaseline::compare(n2n);

        assert!(cmp.synthetic);
        assert_eq!(cmp.traditional.average_latency_ms, 10.0);
        assert_eq!(cmp.traditional.success_rate, 85.0);
        assert_eq!(cmp.traditional.routes_determined, 70);
        assert!((cmp.latency_improvement_pct - 60.0).abs() < 1e-9);
        assert_eq!(cmp.success_rate_delta, 10.0);
        assert!((cmp.route_efficiency_pct - 42.857142857).abs() < 1e-6);
    }

    #[test]
    fn empty_bgp_run_compares_to_zero() {
        let cmp = BgpBaseline::compare(BgpMetrics::default());
        assert_eq!(cmp.latency_improvement_pct, 0.0);
        assert_eq!(cmp.route_efficiency_pct, 0.0);
    }

    #[test]
    fn seeded_consensus_baseline_is_reproducible() {
        let a = SyntheticBaselines::new(Some(42)).traditional_consensus();
        let b = SyntheticBaselines::new(Some(42)).traditional_consensus();
        assert_eq!(a, b);
        assert!(PBFT_FINALITY_MS.contains(&a.pbft_finality_ms));
        assert!(POLKADOT_FINALITY_MS.contains(&a.polkadot_finality_ms));
    }

    #[test]
    fn consensus_comparison() {
        let baseline = ConsensusBaseline {
            synthetic: true,
            pbft_finality_ms: 2_000.0,
            polkadot_finality_ms: 20_000.0,
            bitcoin_tps: BITCOIN_TPS,
            ethereum_tps: ETHEREUM_TPS,
        };
        let cmp = baseline.compare(500.0, 150.0);
        assert_eq!(cmp.vs_pbft_pct, 75.0);
        assert!((cmp.vs_polkadot_pct - 97.5).abs() < 1e-9);
        assert_eq!(cmp.vs_ethereum_x, 10.0);
    }
}
