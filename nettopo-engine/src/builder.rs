//! Applies decoded events to the graph state.

use nettopo_types::{
    route, Edge, EdgeKey, EdgeKind, Hop, Node, NodeId, NodeKind, TimestampMs, TraceroutePath,
    TRACEROUTE_PROTOCOL,
};

use crate::decoder::{Endpoint, Event, PacketEvent, TracerouteEvent};
use crate::store::GraphState;

/// What an event changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    Packet {
        new_nodes: Vec<NodeId>,
        edge: EdgeKey,
        edge_created: bool,
    },
    Traceroute {
        destination: NodeId,
        new_nodes: Vec<NodeId>,
        new_edges: Vec<EdgeKey>,
        /// Local identity followed by one anchor per answered hop.
        route: Vec<NodeId>,
    },
}

impl Diff {
    pub fn new_nodes(&self) -> &[NodeId] {
        match self {
            Diff::Packet { new_nodes, .. } | Diff::Traceroute { new_nodes, .. } => new_nodes,
        }
    }

    /// Whether the event created any node or edge.
    pub fn created_anything(&self) -> bool {
        match self {
            Diff::Packet {
                new_nodes,
                edge_created,
                ..
            } => !new_nodes.is_empty() || *edge_created,
            Diff::Traceroute {
                new_nodes,
                new_edges,
                ..
            } => !new_nodes.is_empty() || !new_edges.is_empty(),
        }
    }
}

/// Turns events into graph mutations.
///
/// The caller owns the exclusive-access boundary: every `apply*` call must
/// run against state that no other `apply*` call or sweep is touching.
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    local: NodeId,
    port_identity: bool,
}

impl TopologyBuilder {
    /// Create a builder anchored on the local host identity.
    pub fn new(local: impl Into<NodeId>) -> Self {
        Self {
            local: local.into(),
            port_identity: false,
        }
    }

    /// Identify packet endpoints by `ip:port` instead of plain IP.
    pub fn port_identity(mut self, enabled: bool) -> Self {
        self.port_identity = enabled;
        self
    }

    /// The local host identity.
    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn apply(&self, state: &mut GraphState, event: &Event, now: TimestampMs) -> Diff {
        match event {
            Event::Packet(packet) => self.apply_packet(state, packet, now),
            Event::Traceroute(trace) => self.apply_trace(state, trace, now),
        }
    }

    /// Record one packet from `src` to `dst`.
    pub fn apply_regular(
        &self,
        state: &mut GraphState,
        src: &str,
        dst: &str,
        protocol: &str,
        now: TimestampMs,
    ) -> Diff {
        self.regular(
            state,
            (src.to_string(), src == self.local),
            (dst.to_string(), dst == self.local),
            protocol,
            now,
        )
    }

    fn apply_packet(&self, state: &mut GraphState, packet: &PacketEvent, now: TimestampMs) -> Diff {
        let src = self.endpoint(&packet.src);
        let dst = self.endpoint(&packet.dst);
        self.regular(state, src, dst, &packet.protocol, now)
    }

    fn endpoint(&self, endpoint: &Endpoint) -> (NodeId, bool) {
        (
            endpoint.identity(self.port_identity),
            endpoint.ip == self.local,
        )
    }

    fn regular(
        &self,
        state: &mut GraphState,
        (src, src_local): (NodeId, bool),
        (dst, dst_local): (NodeId, bool),
        protocol: &str,
        now: TimestampMs,
    ) -> Diff {
        let mut new_nodes = Vec::new();
        for (id, local) in [(&src, src_local), (&dst, dst_local)] {
            let kind = if local {
                NodeKind::Local
            } else {
                NodeKind::Remote
            };
            if state.upsert_node(Node::new(id.as_str(), kind, protocol, now)) {
                new_nodes.push(id.clone());
            }
        }

        let edge = EdgeKey::new(src.as_str(), dst.as_str());
        let edge_created = state.upsert_edge(Edge::new(src, dst, EdgeKind::Direct, protocol, now));

        Diff::Packet {
            new_nodes,
            edge,
            edge_created,
        }
    }

    fn apply_trace(
        &self,
        state: &mut GraphState,
        trace: &TracerouteEvent,
        now: TimestampMs,
    ) -> Diff {
        self.apply_traceroute(state, &trace.destination, &trace.hops, now)
    }

    /// Replace the path to `destination` and rebuild its edges hop by hop.
    ///
    /// Every responder of a hop gets a node and an edge from the current
    /// anchor; the anchor then moves to the last responder of that hop in
    /// input order. When the walk ends somewhere other than the destination
    /// or the local host, one closing edge to the destination is added.
    pub fn apply_traceroute(
        &self,
        state: &mut GraphState,
        destination: &str,
        hops: &[Hop],
        now: TimestampMs,
    ) -> Diff {
        state.replace_path(TraceroutePath::new(destination, hops.to_vec(), now));

        let mut new_nodes = Vec::new();
        let mut new_edges = Vec::new();
        let mut anchor = self.local.clone();

        for hop in hops {
            for (ip, response) in hop.responders() {
                let kind = if ip == destination {
                    NodeKind::Destination
                } else {
                    NodeKind::Router
                };
                if state.upsert_node(Node::new(ip, kind, TRACEROUTE_PROTOCOL, now)) {
                    new_nodes.push(ip.to_string());
                }

                let edge = Edge::new(
                    anchor.as_str(),
                    ip,
                    EdgeKind::Traceroute,
                    TRACEROUTE_PROTOCOL,
                    now,
                )
                .with_hop(hop.ttl, response.average_rtt());
                let key = edge.key.clone();
                if state.upsert_edge(edge) {
                    new_edges.push(key);
                }

                anchor = ip.to_string();
            }
        }

        if anchor != destination && anchor != self.local {
            let node = Node::new(destination, NodeKind::Destination, TRACEROUTE_PROTOCOL, now);
            if state.upsert_node(node) {
                new_nodes.push(destination.to_string());
            }

            let edge = Edge::new(
                anchor.as_str(),
                destination,
                EdgeKind::Traceroute,
                TRACEROUTE_PROTOCOL,
                now,
            );
            let key = edge.key.clone();
            if state.upsert_edge(edge) {
                new_edges.push(key);
            }
        }

        Diff::Traceroute {
            destination: destination.to_string(),
            new_nodes,
            new_edges,
            route: route(&self.local, hops),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nettopo_types::{HopResponse, RttSample};
    use std::collections::BTreeSet;

    fn ms(v: f64) -> RttSample {
        RttSample::Millis(v)
    }

    fn sample_hops() -> Vec<Hop> {
        vec![
            Hop::new(
                1,
                vec![HopResponse::new(
                    "10.0.0.1",
                    vec![ms(10.0), ms(12.0), RttSample::Timeout],
                )],
            ),
            Hop::new(
                2,
                vec![HopResponse::new("8.8.8.8", vec![ms(20.0), ms(22.0), ms(21.0)])],
            ),
        ]
    }

    #[test]
    fn counts_distinct_addresses_and_ordered_pairs() {
        let builder = TopologyBuilder::new("L");
        let mut state = GraphState::new();
        let pairs = [("a", "b"), ("b", "a"), ("a", "c"), ("c", "d")];

        for (src, dst) in pairs {
            builder.apply_regular(&mut state, src, dst, "TCP", 1);
        }

        let addresses: BTreeSet<_> = pairs.iter().flat_map(|(s, d)| [*s, *d]).collect();
        assert_eq!(state.nodes.len(), addresses.len());
        assert_eq!(state.edges.len(), pairs.len());
    }

    #[test]
    fn regular_diff_reports_new_nodes_then_updates() {
        let builder = TopologyBuilder::new("L");
        let mut state = GraphState::new();

        let first = builder.apply_regular(&mut state, "L", "10.0.0.7", "TCP", 1);
        assert_eq!(
            first,
            Diff::Packet {
                new_nodes: vec!["L".to_string(), "10.0.0.7".to_string()],
                edge: EdgeKey::new("L", "10.0.0.7"),
                edge_created: true,
            }
        );
        assert_eq!(state.node("L").unwrap().kind, NodeKind::Local);
        assert_eq!(state.node("10.0.0.7").unwrap().kind, NodeKind::Remote);

        let second = builder.apply_regular(&mut state, "L", "10.0.0.7", "UDP", 2);
        assert!(!second.created_anything());
        let edge = state.edge("L", "10.0.0.7").unwrap();
        assert_eq!(edge.packet_count, 2);
        assert_eq!(edge.kind, EdgeKind::Direct);
    }

    #[test]
    fn traceroute_builds_router_and_destination() {
        let builder = TopologyBuilder::new("L");
        let mut state = GraphState::new();

        let diff = builder.apply_traceroute(&mut state, "8.8.8.8", &sample_hops(), 1);

        assert_eq!(diff.new_nodes(), ["10.0.0.1".to_string(), "8.8.8.8".to_string()]);
        assert_eq!(state.node("10.0.0.1").unwrap().kind, NodeKind::Router);
        assert_eq!(state.node("8.8.8.8").unwrap().kind, NodeKind::Destination);
        assert!(state.node("L").is_none());

        let first = state.edge("L", "10.0.0.1").unwrap();
        assert_eq!(first.avg_rtt, Some(11.0));
        assert_eq!(first.ttl, Some(1));
        assert_eq!(first.kind, EdgeKind::Traceroute);

        let second = state.edge("10.0.0.1", "8.8.8.8").unwrap();
        assert_eq!(second.avg_rtt, Some(21.0));
        assert_eq!(state.edges.len(), 2);
    }

    #[test]
    fn same_traceroute_twice_stores_identical_path() {
        let builder = TopologyBuilder::new("L");
        let mut state = GraphState::new();

        builder.apply_traceroute(&mut state, "8.8.8.8", &sample_hops(), 5);
        let first = state.path("8.8.8.8").cloned().unwrap();
        let diff = builder.apply_traceroute(&mut state, "8.8.8.8", &sample_hops(), 5);

        assert_eq!(state.path("8.8.8.8"), Some(&first));
        assert!(!diff.created_anything());
        assert_eq!(
            diff,
            Diff::Traceroute {
                destination: "8.8.8.8".to_string(),
                new_nodes: vec![],
                new_edges: vec![],
                route: vec!["L".to_string(), "10.0.0.1".to_string(), "8.8.8.8".to_string()],
            }
        );
    }

    #[test]
    fn new_traceroute_replaces_hops_without_merging() {
        let builder = TopologyBuilder::new("L");
        let mut state = GraphState::new();
        builder.apply_traceroute(&mut state, "8.8.8.8", &sample_hops(), 1);

        let shorter = vec![Hop::new(
            1,
            vec![HopResponse::new("8.8.8.8", vec![ms(3.0)])],
        )];
        builder.apply_traceroute(&mut state, "8.8.8.8", &shorter, 2);

        let path = state.path("8.8.8.8").unwrap();
        assert_eq!(path.hops, shorter);
        assert_eq!(path.last_seen, 2);
    }

    #[test]
    fn load_balanced_hop_anchors_on_last_responder() {
        let builder = TopologyBuilder::new("L");
        let mut state = GraphState::new();
        let hops = vec![
            Hop::new(
                1,
                vec![
                    HopResponse::new("10.1.0.1", vec![ms(1.0)]),
                    HopResponse::new("10.1.0.2", vec![ms(2.0)]),
                ],
            ),
            Hop::new(2, vec![HopResponse::new("10.2.0.1", vec![ms(3.0)])]),
        ];

        builder.apply_traceroute(&mut state, "10.2.0.1", &hops, 1);

        assert!(state.edge("L", "10.1.0.1").is_some());
        assert!(state.edge("10.1.0.1", "10.1.0.2").is_some());
        assert!(state.edge("10.1.0.2", "10.2.0.1").is_some());
        assert!(state.edge("10.1.0.1", "10.2.0.1").is_none());
        assert_eq!(state.nodes.len(), 3);
    }

    #[test]
    fn unreached_destination_gets_closing_edge() {
        let builder = TopologyBuilder::new("L");
        let mut state = GraphState::new();
        let hops = vec![
            Hop::new(1, vec![HopResponse::new("10.0.0.1", vec![ms(1.0)])]),
            Hop::new(2, vec![HopResponse::new("*", vec![RttSample::Timeout])]),
        ];

        let diff = builder.apply_traceroute(&mut state, "1.1.1.1", &hops, 1);

        assert_eq!(state.node("1.1.1.1").unwrap().kind, NodeKind::Destination);
        let closing = state.edge("10.0.0.1", "1.1.1.1").unwrap();
        assert_eq!(closing.ttl, None);
        assert_eq!(closing.avg_rtt, None);
        match diff {
            Diff::Traceroute { new_edges, route, .. } => {
                assert_eq!(new_edges.len(), 2);
                assert_eq!(route, vec!["L".to_string(), "10.0.0.1".to_string()]);
            }
            other => panic!("unexpected diff {other:?}"),
        }
    }

    #[test]
    fn all_timeouts_add_no_edges() {
        let builder = TopologyBuilder::new("L");
        let mut state = GraphState::new();
        let hops = vec![Hop::new(1, vec![HopResponse::new("*", vec![RttSample::Timeout])])];

        let diff = builder.apply_traceroute(&mut state, "1.1.1.1", &hops, 1);

        assert!(!diff.created_anything());
        assert!(state.nodes.is_empty());
        assert!(state.edges.is_empty());
        assert_eq!(state.paths.len(), 1);
    }

    #[test]
    fn responder_matching_local_identity_is_a_router() {
        let builder = TopologyBuilder::new("10.0.0.1");
        let mut state = GraphState::new();

        builder.apply_traceroute(&mut state, "8.8.8.8", &sample_hops(), 1);

        let node = state.node("10.0.0.1").unwrap();
        assert_eq!(node.kind, NodeKind::Router);
        assert!(!node.is_local);
        assert_eq!(state.node("8.8.8.8").unwrap().kind, NodeKind::Destination);
    }

    #[test]
    fn port_identity_splits_nodes_by_port() {
        let builder = TopologyBuilder::new("192.168.1.10").port_identity(true);
        let mut state = GraphState::new();
        let packet = |src_port, dst_port| {
            Event::Packet(PacketEvent {
                src: Endpoint {
                    ip: "192.168.1.10".to_string(),
                    port: Some(src_port),
                },
                dst: Endpoint {
                    ip: "10.0.0.7".to_string(),
                    port: Some(dst_port),
                },
                protocol: "TCP".to_string(),
                timestamp: None,
                extra: Default::default(),
            })
        };

        builder.apply(&mut state, &packet(50000, 443), 1);
        builder.apply(&mut state, &packet(50001, 443), 2);

        assert_eq!(state.nodes.len(), 3);
        assert!(state.node("192.168.1.10:50000").unwrap().is_local);
        assert!(!state.node("10.0.0.7:443").unwrap().is_local);
    }
}
