//! Read-only views over a snapshot of the graph.
//!
//! Each view clones the state under the read lock and builds its output from
//! that copy, so a concurrent mutation is either fully visible or not at all.

use std::collections::BTreeMap;
use std::sync::Arc;

use nettopo_types::{
    current_timestamp_ms, EdgeKind, NodeId, NodeKind, TimestampMs, TraceroutePath,
};
use serde::Serialize;

use crate::engine::EngineConfig;
use crate::ingest::{IngestCounters, IngestStats};
use crate::publisher::Publisher;
use crate::store::GraphStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleGraph {
    pub nodes: Vec<SimpleNode>,
    pub edges: Vec<SimpleEdge>,
    pub stats: SimpleStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub is_local: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub traceroute_paths: usize,
    pub local_id: NodeId,
}

/// Graph with every stored attribute plus ages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedGraph {
    pub nodes: Vec<DetailedNode>,
    pub edges: Vec<DetailedEdge>,
    pub paths: BTreeMap<NodeId, PathSummary>,
    pub stats: DetailedStats,
    pub config: ConfigView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub packet_count: u64,
    pub first_seen: TimestampMs,
    pub last_seen: TimestampMs,
    pub age_seconds: f64,
    pub is_local: bool,
    pub protocols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub packet_count: u64,
    pub protocols: Vec<String>,
    pub first_seen: TimestampMs,
    pub last_seen: TimestampMs,
    pub age_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_rtt: Option<f64>,
}

/// A stored traceroute reduced to its route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSummary {
    pub hop_count: usize,
    pub last_traced: TimestampMs,
    pub path: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub direct_connections: usize,
    pub traceroute_hops: usize,
    pub local_id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub node_timeout_seconds: u64,
    pub sweep_interval_seconds: u64,
}

/// Routes from the local host and nodes grouped by tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    pub local_id: NodeId,
    pub paths_from_local: BTreeMap<NodeId, PathSummary>,
    pub network_layers: NetworkLayers,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkLayers {
    pub local: Vec<NodeId>,
    pub routers: Vec<NodeId>,
    /// Nodes of kind remote or destination.
    pub destinations: Vec<NodeId>,
}

/// Aggregate counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub nodes: NodeCounts,
    pub edges: EdgeCounts,
    pub traceroute_paths: usize,
    pub connected_subscribers: usize,
    pub local_id: NodeId,
    pub ingest: IngestStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NodeCounts {
    pub total: usize,
    pub local: usize,
    pub routers: usize,
    /// Every node that is not local.
    pub remote: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EdgeCounts {
    pub total: usize,
    pub direct: usize,
    pub traceroute: usize,
}

/// Query entry point. Cheap to clone.
#[derive(Debug, Clone)]
pub struct QueryService {
    store: Arc<GraphStore>,
    publisher: Arc<Publisher>,
    counters: Arc<IngestCounters>,
    config: Arc<EngineConfig>,
}

impl QueryService {
    pub fn new(
        store: Arc<GraphStore>,
        publisher: Arc<Publisher>,
        counters: Arc<IngestCounters>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            publisher,
            counters,
            config,
        }
    }

    fn local_id(&self) -> NodeId {
        self.config.local_identity.clone()
    }

    pub fn simple_graph(&self) -> SimpleGraph {
        let state = self.store.snapshot();

        SimpleGraph {
            nodes: state
                .nodes
                .values()
                .map(|node| SimpleNode {
                    id: node.id.clone(),
                    kind: node.kind,
                    is_local: node.is_local,
                })
                .collect(),
            edges: state
                .edges
                .values()
                .map(|edge| SimpleEdge {
                    source: edge.key.source.clone(),
                    target: edge.key.target.clone(),
                    kind: edge.kind,
                })
                .collect(),
            stats: SimpleStats {
                total_nodes: state.nodes.len(),
                total_edges: state.edges.len(),
                traceroute_paths: state.paths.len(),
                local_id: self.local_id(),
            },
        }
    }

    pub fn detailed_graph(&self) -> DetailedGraph {
        self.detailed_graph_at(current_timestamp_ms())
    }

    /// Detailed graph with ages measured against `now`.
    pub fn detailed_graph_at(&self, now: TimestampMs) -> DetailedGraph {
        let state = self.store.snapshot();
        let age = |first_seen: TimestampMs| now.saturating_sub(first_seen) as f64 / 1000.0;

        let nodes = state
            .nodes
            .values()
            .map(|node| DetailedNode {
                id: node.id.clone(),
                kind: node.kind,
                packet_count: node.packet_count,
                first_seen: node.first_seen,
                last_seen: node.last_seen,
                age_seconds: age(node.first_seen),
                is_local: node.is_local,
                protocols: node.protocols.iter().cloned().collect(),
            })
            .collect();

        let edges = state
            .edges
            .values()
            .map(|edge| {
                let traceroute = edge.kind == EdgeKind::Traceroute;
                DetailedEdge {
                    source: edge.key.source.clone(),
                    target: edge.key.target.clone(),
                    kind: edge.kind,
                    packet_count: edge.packet_count,
                    protocols: edge.protocols.iter().cloned().collect(),
                    first_seen: edge.first_seen,
                    last_seen: edge.last_seen,
                    age_seconds: age(edge.first_seen),
                    ttl: edge.ttl.filter(|_| traceroute),
                    avg_rtt: edge.avg_rtt.filter(|_| traceroute),
                }
            })
            .collect();

        let local = self.local_id();
        let paths = state
            .paths
            .iter()
            .map(|(dst, path)| {
                let summary = PathSummary {
                    hop_count: path.hop_count(),
                    last_traced: path.last_seen,
                    path: path.route(&local),
                };
                (dst.clone(), summary)
            })
            .collect();

        let direct = state
            .edges
            .values()
            .filter(|edge| edge.kind == EdgeKind::Direct)
            .count();

        DetailedGraph {
            nodes,
            edges,
            paths,
            stats: DetailedStats {
                total_nodes: state.nodes.len(),
                total_edges: state.edges.len(),
                direct_connections: direct,
                traceroute_hops: state.edges.len() - direct,
                local_id: local,
            },
            config: ConfigView {
                node_timeout_seconds: self.config.node_timeout.as_secs(),
                sweep_interval_seconds: self.config.sweep_interval.as_secs(),
            },
        }
    }

    /// Routes to destinations still in the graph, and nodes by tier.
    pub fn topology(&self) -> Topology {
        let state = self.store.snapshot();
        let local = self.local_id();

        let paths_from_local = state
            .paths
            .iter()
            .filter(|(dst, _)| state.nodes.contains_key(*dst))
            .filter_map(|(dst, path)| route_summary(&local, path).map(|s| (dst.clone(), s)))
            .collect();

        let mut layers = NetworkLayers::default();
        for node in state.nodes.values() {
            if node.is_local {
                layers.local.push(node.id.clone());
            }
            match node.kind {
                NodeKind::Router => layers.routers.push(node.id.clone()),
                NodeKind::Remote | NodeKind::Destination => layers.destinations.push(node.id.clone()),
                NodeKind::Local => {}
            }
        }

        Topology {
            local_id: local,
            paths_from_local,
            network_layers: layers,
        }
    }

    pub fn stats(&self) -> Stats {
        let (nodes, edges, paths) = self.store.read(|state| {
            let mut nodes = NodeCounts {
                total: state.nodes.len(),
                ..NodeCounts::default()
            };
            for node in state.nodes.values() {
                if node.is_local {
                    nodes.local += 1;
                } else {
                    nodes.remote += 1;
                }
                if node.kind == NodeKind::Router {
                    nodes.routers += 1;
                }
            }

            let direct = state
                .edges
                .values()
                .filter(|edge| edge.kind == EdgeKind::Direct)
                .count();
            let edges = EdgeCounts {
                total: state.edges.len(),
                direct,
                traceroute: state.edges.len() - direct,
            };

            (nodes, edges, state.paths.len())
        });

        Stats {
            nodes,
            edges,
            traceroute_paths: paths,
            connected_subscribers: self.publisher.subscriber_count(),
            local_id: self.local_id(),
            ingest: self.counters.stats(self.publisher.dropped()),
        }
    }
}

/// Route summary counting answered hops, or `None` if nothing answered.
fn route_summary(local: &str, path: &TraceroutePath) -> Option<PathSummary> {
    let route = path.route(local);
    if route.len() < 2 {
        return None;
    }
    Some(PathSummary {
        hop_count: route.len() - 1,
        last_traced: path.last_seen,
        path: route,
    })
}
