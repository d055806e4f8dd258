//! Translation of BGP AS paths into N2N hop sequences.

use std::{
    collections::{BTreeMap, HashSet},
    time::Instant,
};

use serde::Serialize;
use strebacom_ris_feed::{BgpUpdate, PathSegment};

use crate::stats::RunningMean;

/// Longest N2N sequence derived from one AS path.
pub const MAX_SEQUENCE_HOPS: usize = 5;

/// Every this many computed routes, a new route also gets an ABATL mapping.
const ABATL_MAPPING_INTERVAL: u64 = 50;

/// One hop of an N2N sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct N2nHop {
    /// Autonomous-system identifier, `NIAS-<asn>`.
    pub nias: String,
    /// Device identifier, `NID-<asn>-<position>`.
    pub nid: String,
    /// The AS number (or comma-joined `AS_SET`) the hop came from.
    pub as_number: String,
    /// Zero-based position in the path.
    pub position: usize,
}

/// Maps the first [`MAX_SEQUENCE_HOPS`] segments of `path` to N2N hops.
pub fn as_path_to_sequence(path: &[PathSegment]) -> Vec<N2nHop> {
    path.iter()
        .take(MAX_SEQUENCE_HOPS)
        .enumerate()
        .map(|(position, segment)| {
            let as_number = segment.to_string();
            N2nHop {
                nias: format!("NIAS-{as_number}"),
                nid: format!("NID-{as_number}-{position}"),
                as_number,
                position,
            }
        })
        .collect()
}

/// Cache key of the route from `source`'s device to `destination`'s AS.
pub fn route_key(source: &N2nHop, destination: &N2nHop) -> String {
    format!("{}_to_{}", source.nid, destination.nias)
}

/// A route first seen in a BGP update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct CachedRoute {
    pub(crate) key: String,
    pub(crate) sequence: Vec<N2nHop>,
    pub(crate) bgp_path: Vec<PathSegment>,
    /// Collector timestamp of the update that produced the route.
    pub(crate) observed_at: f64,
}

/// Translation-layer attributes attached to an ABATL mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct AbatlAttributes {
    latency: &'static str,
    bandwidth: &'static str,
    security: &'static str,
    qos: &'static str,
}

impl Default for AbatlAttributes {
    fn default() -> Self {
        Self { latency: "15ms", bandwidth: "1Gbps", security: "HIGH", qos: "PRIORITY" }
    }
}

/// An application-to-control-plane mapping for one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct AbatlMapping {
    pub(crate) source_nid: String,
    pub(crate) dest_nias: String,
    pub(crate) attributes: AbatlAttributes,
}

/// Counters of the BGP to N2N translation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub(crate) struct ProcessingMetrics {
    pub(crate) updates_received: u64,
    pub(crate) routes_computed: u64,
    /// Updates without an AS path.
    pub(crate) empty_paths: u64,
    pub(crate) abatl_translations: u64,
    pub(crate) latency: RunningMean,
    /// Routes computed per update received, in percent.
    pub(crate) success_rate: f64,
}

/// Route cache, ABATL mappings and metrics fed by BGP updates.
#[derive(Debug, Default, Serialize)]
pub(crate) struct RouteTable {
    routes: Vec<CachedRoute>,
    abatl_mappings: BTreeMap<String, AbatlMapping>,
    metrics: ProcessingMetrics,
    #[serde(skip)]
    keys: HashSet<String>,
}

impl RouteTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Translates `update`, returning the route if it was not cached yet.
    pub(crate) fn process(&mut self, update: &BgpUpdate) -> Option<&CachedRoute> {
        let started = Instant::now();
        self.metrics.updates_received += 1;

        if update.path.is_empty() {
            self.metrics.empty_paths += 1;
            self.refresh_success_rate();
            return None;
        }

        let sequence = as_path_to_sequence(&update.path);
        self.metrics.routes_computed += 1;

        let mut added = false;
        if let [source, .., destination] = sequence.as_slice() {
            let key = route_key(source, destination);
            if self.keys.insert(key.clone()) {
                tracing::debug!(route = %key, hops = sequence.len(), "New N2N route");

                if self.metrics.routes_computed % ABATL_MAPPING_INTERVAL == 0 {
                    self.map_abatl(source, destination);
                }

                self.routes.push(CachedRoute {
                    key,
                    bgp_path: update.path.clone(),
                    sequence,
                    observed_at: update.timestamp,
                });
                added = true;
            }
        }

        self.metrics.latency.push(started.elapsed().as_secs_f64() * 1_000.0);
        self.refresh_success_rate();

        if added { self.routes.last() } else { None }
    }

    fn map_abatl(&mut self, source: &N2nHop, destination: &N2nHop) {
        let key = format!("{}_{}", source.nid, destination.nias);
        tracing::info!(mapping = %key, "Created ABATL mapping");

        self.abatl_mappings.insert(
            key,
            AbatlMapping {
                source_nid: source.nid.clone(),
                dest_nias: destination.nias.clone(),
                attributes: AbatlAttributes::default(),
            },
        );
        self.metrics.abatl_translations += 1;
    }

    fn refresh_success_rate(&mut self) {
        let m = &mut self.metrics;
        m.success_rate = if m.updates_received == 0 {
            0.0
        } else {
            m.routes_computed as f64 / m.updates_received as f64 * 100.0
        };
    }

    /// Zeroes the update and route counters; cached routes and mappings are kept.
    pub(crate) fn reset_counters(&mut self) {
        self.metrics.updates_received = 0;
        self.metrics.routes_computed = 0;
        self.metrics.empty_paths = 0;
        self.metrics.success_rate = 0.0;
    }

    pub(crate) fn routes(&self) -> &[CachedRoute] {
        &self.routes
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.len()
    }

    pub(crate) fn abatl_mappings(&self) -> usize {
        self.abatl_mappings.len()
    }

    pub(crate) const fn metrics(&self) -> &ProcessingMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn update(path: Vec<PathSegment>) -> BgpUpdate {
        BgpUpdate {
            timestamp: 1.0,
            peer: "192.0.2.1".to_string(),
            peer_asn: None,
            host: None,
            path,
            announcements: Vec::new(),
            withdrawals: Vec::new(),
        }
    }

    fn asns(path: &[u32]) -> Vec<PathSegment> {
        path.iter().copied().map(PathSegment::Asn).collect()
    }

    #[rstest]
    #[case::empty(&[], 0)]
    #[case::single(&[64500], 1)]
    #[case::exact(&[1, 2, 3, 4, 5], 5)]
    #[case::truncated(&[1, 2, 3, 4, 5, 6, 7], 5)]
    fn sequence_length(#[case] path: &[u32], #[case] expected: usize) {
        assert_eq!(as_path_to_sequence(&asns(path)).len(), expected);
    }

    #[test]
    fn hop_identifiers() {
        let path = vec![PathSegment::Asn(3356), PathSegment::Set(vec![64500, 64501])];
        let sequence = as_path_to_sequence(&path);

        assert_eq!(sequence[0].nias, "NIAS-3356");
        assert_eq!(sequence[0].nid, "NID-3356-0");
        assert_eq!(sequence[1].nias, "NIAS-64500,64501");
        assert_eq!(sequence[1].nid, "NID-64500,64501-1");
        assert_eq!(route_key(&sequence[0], &sequence[1]), "NID-3356-0_to_NIAS-64500,64501");
    }

    #[test]
    fn caches_each_route_once() {
        let mut table = RouteTable::new();

        assert!(table.process(&update(asns(&[1, 2, 3]))).is_some());
        assert!(table.process(&update(asns(&[1, 9, 3]))).is_none());
        assert!(table.process(&update(asns(&[7]))).is_none());
        assert!(table.process(&update(Vec::new())).is_none());

        let metrics = table.metrics();
        assert_eq!(table.len(), 1);
        assert_eq!(metrics.updates_received, 4);
        assert_eq!(metrics.routes_computed, 3);
        assert_eq!(metrics.empty_paths, 1);
        assert!((metrics.success_rate - 75.0).abs() < 1e-9);
        assert_eq!(table.routes()[0].key, "NID-1-0_to_NIAS-3");
    }

    #[test]
    fn abatl_mapping_every_fiftieth_route() {
        let mut table = RouteTable::new();
        for dst in 0..100 {
            table.process(&update(asns(&[1, 1000 + dst])));
        }

        assert_eq!(table.len(), 100);
        assert_eq!(table.abatl_mappings(), 2);
        assert_eq!(table.metrics().abatl_translations, 2);
    }

    #[test]
    fn reset_keeps_routes() {
        let mut table = RouteTable::new();
        table.process(&update(asns(&[1, 2])));
        table.reset_counters();

        assert_eq!(table.len(), 1);
        assert_eq!(table.metrics().updates_received, 0);
        assert_eq!(table.metrics().success_rate, 0.0);
    }
}
