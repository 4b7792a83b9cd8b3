//! Nodes - the hosts and routers seen on the wire.

use std::collections::BTreeSet;
use std::fmt;

use crate::TimestampMs;

/// Host identity: an IP address, or `ip:port` when port-level identity is on.
pub type NodeId = String;

/// What role a node plays in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NodeKind {
    /// The host running the capture.
    Local,
    /// Any other endpoint seen in captured packets.
    Remote,
    /// An intermediate hop that answered a traceroute probe.
    Router,
    /// The target of a traceroute.
    Destination,
}

impl NodeKind {
    /// Lowercase name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Local => "local",
            NodeKind::Remote => "remote",
            NodeKind::Router => "router",
            NodeKind::Destination => "destination",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked host or router.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub first_seen: TimestampMs,
    pub last_seen: TimestampMs,
    /// Number of accepted events that referenced this node. Always >= 1.
    pub packet_count: u64,
    pub protocols: BTreeSet<String>,
    pub is_local: bool,
}

impl Node {
    /// Create a node on its first reference.
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, protocol: &str, now: TimestampMs) -> Self {
        Self {
            id: id.into(),
            kind,
            first_seen: now,
            last_seen: now,
            packet_count: 1,
            protocols: BTreeSet::from([protocol.to_string()]),
            is_local: kind == NodeKind::Local,
        }
    }

    /// Record another reference to this node.
    ///
    /// The kind is fixed at creation; later references never reclassify.
    pub fn touch(&mut self, protocol: &str, now: TimestampMs) {
        self.last_seen = self.last_seen.max(now);
        self.packet_count += 1;
        if !self.protocols.contains(protocol) {
            self.protocols.insert(protocol.to_string());
        }
    }

    /// Milliseconds since this node was last referenced.
    pub fn idle_for(&self, now: TimestampMs) -> u64 {
        now.saturating_sub(self.last_seen)
    }
}
