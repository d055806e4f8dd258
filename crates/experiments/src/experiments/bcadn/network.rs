//! In-memory BCADN network: weighted nodes, capacity-bound shards, fee-priced transactions
//! and an anomaly ledger.

use std::collections::BTreeMap;

use alloy_primitives::{B256, keccak256};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;

use crate::stats::mean;

/// Weight of the fee term.
pub(crate) const ALPHA: i64 = 10;
/// Weight of the performance term.
pub(crate) const BETA: i64 = 20;
/// Weight of the anomaly term.
pub(crate) const GAMMA: i64 = 30;

/// Fee term used in every weight computation.
const REFERENCE_FEE: i64 = 100;
/// Anomaly score above which an active node goes on probation.
pub(crate) const PROBATION_THRESHOLD: u32 = 30;
/// Recomputed weights are clamped to this range.
const MIN_WEIGHT: i64 = 20;
const MAX_WEIGHT: i64 = 80;

/// Base fee before congestion pricing.
pub(crate) const BASE_FEE: u64 = 100;
/// Pending transactions at which the fee doubles.
pub(crate) const NETWORK_CAPACITY: u64 = 1_000;
const DEFAULT_SHARD: u32 = 1;

/// Errors of [`BcadnNetwork`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum NetworkError {
    #[error("node {0} does not exist")]
    UnknownNode(String),
    #[error("shard {0} does not exist")]
    UnknownShard(u32),
    #[error("node {node} is not in shard {shard}")]
    NotInShard { node: String, shard: u32 },
    #[error("transaction {0} does not exist")]
    UnknownTransaction(B256),
    #[error("transaction {0} already processed")]
    AlreadyProcessed(B256),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) enum NodeStatus {
    Active,
    Probation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Node {
    pub(crate) id: String,
    pub(crate) performance: u32,
    pub(crate) reliability: u32,
    pub(crate) anomaly_score: u32,
    pub(crate) weight: i64,
    pub(crate) status: NodeStatus,
    /// Virtual time the node went on probation.
    pub(crate) isolated_at_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Shard {
    pub(crate) id: u32,
    pub(crate) nodes: Vec<String>,
    pub(crate) capacity: u32,
    pub(crate) current_load: u32,
    pub(crate) active: bool,
}

impl Shard {
    /// Load as a percentage of capacity.
    pub(crate) fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            f64::from(self.current_load) / f64::from(self.capacity) * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ShardTransaction {
    pub(crate) hash: B256,
    pub(crate) sender: String,
    pub(crate) receiver: String,
    pub(crate) amount: u64,
    pub(crate) fee: u64,
    pub(crate) shard: u32,
    pub(crate) submitted_at_ms: u64,
    /// Virtual time from submission to processing, once processed.
    pub(crate) processing_ms: Option<u64>,
}

impl ShardTransaction {
    pub(crate) const fn completed(&self) -> bool {
        self.processing_ms.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Anomaly {
    pub(crate) id: usize,
    pub(crate) node: String,
    pub(crate) score: u32,
    pub(crate) attack_type: String,
    pub(crate) recorded_at_ms: u64,
    pub(crate) resolved: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub(crate) struct NodeStats {
    pub(crate) total: usize,
    pub(crate) active: usize,
    pub(crate) probation: usize,
    pub(crate) average_performance: f64,
    pub(crate) average_reliability: f64,
    pub(crate) average_anomaly_score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub(crate) struct NetworkStats {
    pub(crate) total_transactions: usize,
    pub(crate) pending_transactions: usize,
    pub(crate) completed_transactions: usize,
    pub(crate) average_fee: f64,
    pub(crate) average_processing_ms: f64,
    pub(crate) total_shards: usize,
    pub(crate) total_capacity: u64,
    pub(crate) current_load: u64,
    pub(crate) load_percentage: f64,
}

/// Nodes, shards, transactions and anomalies of one simulated network.
///
/// Time is virtual: callers move the clock with [`advance`](Self::advance).
#[derive(Debug, Clone)]
pub(crate) struct BcadnNetwork {
    nodes: BTreeMap<String, Node>,
    shards: BTreeMap<u32, Shard>,
    transactions: Vec<ShardTransaction>,
    anomalies: Vec<Anomaly>,
    rng: StdRng,
    clock_ms: u64,
}

impl BcadnNetwork {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            nodes: BTreeMap::new(),
            shards: BTreeMap::new(),
            transactions: Vec::new(),
            anomalies: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            clock_ms: 0,
        }
    }

    pub(crate) const fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    pub(crate) fn advance(&mut self, ms: u64) {
        self.clock_ms += ms;
    }

    pub(crate) fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub(crate) fn shard(&self, id: u32) -> Option<&Shard> {
        self.shards.get(&id)
    }

    pub(crate) fn shards(&self) -> impl Iterator<Item = &Shard> {
        self.shards.values()
    }

    pub(crate) fn transactions(&self) -> &[ShardTransaction] {
        &self.transactions
    }

    pub(crate) fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    /// Registers or replaces a node. The initial weight is `ALPHA * 100 + BETA * performance`.
    pub(crate) fn register_node(&mut self, id: &str, performance: u32, reliability: u32) -> i64 {
        let weight = ALPHA * REFERENCE_FEE + BETA * i64::from(performance);
        self.nodes.insert(
            id.to_string(),
            Node {
                id: id.to_string(),
                performance,
                reliability,
                anomaly_score: 0,
                weight,
                status: NodeStatus::Active,
                isolated_at_ms: None,
            },
        );
        tracing::debug!(node = id, performance, reliability, weight, "Registered node");
        weight
    }

    pub(crate) fn create_shard(&mut self, id: u32, capacity: u32) {
        self.shards
            .insert(id, Shard { id, nodes: Vec::new(), capacity, current_load: 0, active: true });
        tracing::debug!(shard = id, capacity, "Created shard");
    }

    pub(crate) fn add_node_to_shard(&mut self, shard: u32, node: &str) -> Result<(), NetworkError> {
        if !self.nodes.contains_key(node) {
            return Err(NetworkError::UnknownNode(node.to_string()));
        }
        let shard = self.shards.get_mut(&shard).ok_or(NetworkError::UnknownShard(shard))?;
        shard.nodes.push(node.to_string());
        Ok(())
    }

    /// Moves `node` from shard `from` to shard `to`.
    pub(crate) fn move_node(&mut self, node: &str, from: u32, to: u32) -> Result<(), NetworkError> {
        if !self.shards.contains_key(&to) {
            return Err(NetworkError::UnknownShard(to));
        }
        let source = self.shards.get_mut(&from).ok_or(NetworkError::UnknownShard(from))?;
        let position = source
            .nodes
            .iter()
            .position(|n| n == node)
            .ok_or_else(|| NetworkError::NotInShard { node: node.to_string(), shard: from })?;
        let node = source.nodes.remove(position);
        if let Some(target) = self.shards.get_mut(&to) {
            target.nodes.push(node);
        }
        Ok(())
    }

    /// Replaces the metrics of `id` and recomputes its weight.
    ///
    /// An active node whose anomaly score exceeds [`PROBATION_THRESHOLD`] goes on probation.
    /// The weight `ALPHA * 100 + BETA * performance - GAMMA * anomaly` is clamped to `[20, 80]`.
    pub(crate) fn update_node_metrics(
        &mut self,
        id: &str,
        performance: u32,
        reliability: u32,
        anomaly_score: u32,
    ) -> Result<&Node, NetworkError> {
        let clock_ms = self.clock_ms;
        let node = self.nodes.get_mut(id).ok_or_else(|| NetworkError::UnknownNode(id.to_string()))?;
        node.performance = performance;
        node.reliability = reliability;
        node.anomaly_score = anomaly_score;

        if anomaly_score > PROBATION_THRESHOLD && node.status == NodeStatus::Active {
            node.status = NodeStatus::Probation;
            node.isolated_at_ms = Some(clock_ms);
            tracing::info!(node = id, anomaly_score, "Node placed on probation");
        }

        let raw = ALPHA * REFERENCE_FEE + BETA * i64::from(performance)
            - GAMMA * i64::from(anomaly_score);
        node.weight = raw.clamp(MIN_WEIGHT, MAX_WEIGHT);
        Ok(node)
    }

    /// Fee for a new transaction: `BASE_FEE * (1 + pending / NETWORK_CAPACITY)`, floored.
    pub(crate) fn dynamic_fee(&self) -> u64 {
        let pending = self.transactions.iter().filter(|tx| !tx.completed()).count() as u64;
        BASE_FEE * (NETWORK_CAPACITY + pending) / NETWORK_CAPACITY
    }

    /// Prices a transfer, assigns it to a random shard and returns its hash.
    ///
    /// A default shard is created when none exists.
    pub(crate) fn submit_transaction(&mut self, sender: &str, receiver: &str, amount: u64) -> B256 {
        let fee = self.dynamic_fee();
        let hash = keccak256(
            format!("{}:{sender}:{receiver}:{amount}:{}", self.transactions.len(), self.clock_ms)
                .as_bytes(),
        );

        if self.shards.is_empty() {
            self.create_shard(DEFAULT_SHARD, NETWORK_CAPACITY as u32);
        }
        let index = self.rng.random_range(0..self.shards.len());
        let shard = self.shards.values_mut().nth(index).map_or(DEFAULT_SHARD, |shard| {
            shard.current_load += 1;
            shard.id
        });

        self.transactions.push(ShardTransaction {
            hash,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            fee,
            shard,
            submitted_at_ms: self.clock_ms,
            processing_ms: None,
        });
        hash
    }

    /// Marks `hash` processed at the current virtual time.
    pub(crate) fn process_transaction(&mut self, hash: B256) -> Result<u64, NetworkError> {
        let clock_ms = self.clock_ms;
        let tx = self
            .transactions
            .iter_mut()
            .find(|tx| tx.hash == hash)
            .ok_or(NetworkError::UnknownTransaction(hash))?;
        if tx.completed() {
            return Err(NetworkError::AlreadyProcessed(hash));
        }
        let elapsed = clock_ms - tx.submitted_at_ms;
        tx.processing_ms = Some(elapsed);
        Ok(elapsed)
    }

    /// Drops every transaction and resets shard loads.
    pub(crate) fn clear_transactions(&mut self) {
        self.transactions.clear();
        for shard in self.shards.values_mut() {
            shard.current_load = 0;
        }
    }

    /// Appends an anomaly against `node` and feeds its score into the node's metrics.
    pub(crate) fn record_anomaly(
        &mut self,
        node: &str,
        score: u32,
        attack_type: &str,
    ) -> Result<usize, NetworkError> {
        let (performance, reliability) = self
            .nodes
            .get(node)
            .map(|n| (n.performance, n.reliability))
            .ok_or_else(|| NetworkError::UnknownNode(node.to_string()))?;

        let id = self.anomalies.len();
        self.anomalies.push(Anomaly {
            id,
            node: node.to_string(),
            score,
            attack_type: attack_type.to_string(),
            recorded_at_ms: self.clock_ms,
            resolved: false,
        });
        self.update_node_metrics(node, performance, reliability, score)?;
        Ok(id)
    }

    /// Picks a registered node uniformly.
    pub(crate) fn random_node(&mut self) -> Option<String> {
        if self.nodes.is_empty() {
            return None;
        }
        let index = self.rng.random_range(0..self.nodes.len());
        self.nodes.keys().nth(index).cloned()
    }

    pub(crate) fn node_stats(&self) -> NodeStats {
        let count = |status| self.nodes.values().filter(|n| n.status == status).count();
        let average = |f: fn(&Node) -> u32| {
            mean(&self.nodes.values().map(|n| f64::from(f(n))).collect::<Vec<_>>())
        };

        NodeStats {
            total: self.nodes.len(),
            active: count(NodeStatus::Active),
            probation: count(NodeStatus::Probation),
            average_performance: average(|n| n.performance),
            average_reliability: average(|n| n.reliability),
            average_anomaly_score: average(|n| n.anomaly_score),
        }
    }

    pub(crate) fn network_stats(&self) -> NetworkStats {
        let fees: Vec<f64> = self.transactions.iter().map(|tx| tx.fee as f64).collect();
        let processing: Vec<f64> =
            self.transactions.iter().filter_map(|tx| tx.processing_ms).map(|ms| ms as f64).collect();
        let total_capacity = self.shards.values().map(|s| u64::from(s.capacity)).sum::<u64>();
        let current_load = self.shards.values().map(|s| u64::from(s.current_load)).sum::<u64>();

        NetworkStats {
            total_transactions: self.transactions.len(),
            pending_transactions: self.transactions.len() - processing.len(),
            completed_transactions: processing.len(),
            average_fee: mean(&fees),
            average_processing_ms: mean(&processing),
            total_shards: self.shards.len(),
            total_capacity,
            current_load,
            load_percentage: if total_capacity == 0 {
                0.0
            } else {
                current_load as f64 / total_capacity as f64 * 100.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn registration_weight_is_unclamped() {
        let mut network = BcadnNetwork::new(1);
        assert_eq!(network.register_node("hp", 95, 98), 2_900);
        assert_eq!(network.node("hp").unwrap().status, NodeStatus::Active);
    }

    #[rstest]
    #[case::below_threshold(30, NodeStatus::Active)]
    #[case::above_threshold(31, NodeStatus::Probation)]
    fn probation_starts_above_thirty(#[case] anomaly: u32, #[case] expected: NodeStatus) {
        let mut network = BcadnNetwork::new(1);
        network.register_node("n", 80, 80);
        let node = network.update_node_metrics("n", 80, 80, anomaly).unwrap();
        assert_eq!(node.status, expected);
    }

    #[rstest]
    #[case::high(95, 0, 80)]
    #[case::heavy_anomaly(10, 95, 20)]
    fn recomputed_weight_is_clamped(#[case] performance: u32, #[case] anomaly: u32, #[case] weight: i64) {
        let mut network = BcadnNetwork::new(1);
        network.register_node("n", 50, 50);
        assert_eq!(network.update_node_metrics("n", performance, 50, anomaly).unwrap().weight, weight);
    }

    #[test]
    fn probation_is_not_lifted_by_later_updates() {
        let mut network = BcadnNetwork::new(1);
        network.register_node("n", 80, 80);
        network.advance(250);
        network.update_node_metrics("n", 80, 80, 90).unwrap();
        let node = network.update_node_metrics("n", 80, 80, 0).unwrap();
        assert_eq!(node.status, NodeStatus::Probation);
        assert_eq!(node.isolated_at_ms, Some(250));
    }

    #[test]
    fn fee_grows_with_pending_transactions() {
        let mut network = BcadnNetwork::new(2);
        assert_eq!(network.dynamic_fee(), 100);
        for i in 0..20 {
            network.submit_transaction("a", "b", i);
        }
        assert_eq!(network.dynamic_fee(), 102);

        let hashes: Vec<_> = network.transactions().iter().map(|tx| tx.hash).collect();
        for hash in &hashes[..10] {
            network.process_transaction(*hash).unwrap();
        }
        assert_eq!(network.dynamic_fee(), 101);
    }

    #[test]
    fn first_submission_creates_default_shard() {
        let mut network = BcadnNetwork::new(3);
        network.submit_transaction("a", "b", 1);

        let shard = network.shard(1).unwrap();
        assert_eq!(shard.capacity, 1_000);
        assert_eq!(shard.current_load, 1);
        assert_eq!(network.transactions()[0].shard, 1);
    }

    #[test]
    fn load_spreads_over_every_shard() {
        let mut network = BcadnNetwork::new(4);
        for (id, capacity) in [(1, 2_000), (2, 1_500), (3, 1_000), (4, 500)] {
            network.create_shard(id, capacity);
        }
        for i in 0..100 {
            network.submit_transaction("a", "b", i);
        }

        let loads: Vec<_> = network.shards().map(|s| s.current_load).collect();
        assert_eq!(loads.iter().sum::<u32>(), 100);
        assert!(loads.iter().all(|load| *load > 0));
    }

    #[test]
    fn processing_time_is_virtual() {
        let mut network = BcadnNetwork::new(5);
        let hash = network.submit_transaction("a", "b", 1);
        network.advance(1_500);

        assert_eq!(network.process_transaction(hash), Ok(1_500));
        assert_eq!(network.process_transaction(hash), Err(NetworkError::AlreadyProcessed(hash)));
        assert_eq!(
            network.process_transaction(B256::ZERO),
            Err(NetworkError::UnknownTransaction(B256::ZERO))
        );

        let stats = network.network_stats();
        assert_eq!(stats.completed_transactions, 1);
        assert_eq!(stats.pending_transactions, 0);
        assert_eq!(stats.average_processing_ms, 1_500.0);
    }

    #[test]
    fn move_node_between_shards() {
        let mut network = BcadnNetwork::new(6);
        network.register_node("hp_1", 95, 98);
        network.create_shard(1, 2_000);
        network.create_shard(2, 1_500);
        network.add_node_to_shard(1, "hp_1").unwrap();

        network.move_node("hp_1", 1, 2).unwrap();
        assert!(network.shard(1).unwrap().nodes.is_empty());
        assert_eq!(network.shard(2).unwrap().nodes, ["hp_1"]);

        assert_eq!(
            network.move_node("hp_1", 1, 2),
            Err(NetworkError::NotInShard { node: "hp_1".into(), shard: 1 })
        );
        assert_eq!(network.move_node("hp_1", 2, 9), Err(NetworkError::UnknownShard(9)));
        assert_eq!(
            network.add_node_to_shard(1, "ghost"),
            Err(NetworkError::UnknownNode("ghost".into()))
        );
    }

    #[test]
    fn anomaly_updates_node_and_stats() {
        let mut network = BcadnNetwork::new(7);
        network.register_node("a", 90, 90);
        network.register_node("b", 70, 80);

        assert_eq!(network.record_anomaly("a", 80, "Malicious Activity"), Ok(0));
        assert_eq!(network.record_anomaly("b", 25, "Protocol Violation"), Ok(1));
        assert!(network.record_anomaly("c", 50, "DDoS").is_err());
        assert_eq!(network.anomalies().len(), 2);

        let stats = network.node_stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.probation, 1);
        assert_eq!(stats.average_performance, 80.0);
        assert_eq!(stats.average_anomaly_score, 52.5);
    }

    #[test]
    fn clearing_transactions_resets_load() {
        let mut network = BcadnNetwork::new(8);
        network.create_shard(1, 100);
        network.submit_transaction("a", "b", 1);
        network.clear_transactions();

        let stats = network.network_stats();
        assert_eq!(stats.total_transactions, 0);
        assert_eq!(stats.current_load, 0);
        assert_eq!(stats.total_capacity, 100);
        assert_eq!(network.shard(1).unwrap().utilization(), 0.0);
    }
}
