//! Edges - directed connection records between two node identities.

use std::collections::BTreeSet;
use std::fmt;

use crate::{NodeId, TimestampMs};

/// How an edge was learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EdgeKind {
    /// Observed directly in a captured packet.
    Direct,
    /// Reconstructed from a traceroute hop sequence.
    Traceroute,
}

impl EdgeKind {
    /// Lowercase name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Direct => "direct",
            EdgeKind::Traceroute => "traceroute",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an edge. Direction matters: `(a, b)` and `(b, a)` are distinct.
///
/// Either endpoint may name a node that is no longer stored; edges and
/// nodes are evicted independently.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeKey {
    pub source: NodeId,
    pub target: NodeId,
}

impl EdgeKey {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// A directed, timestamped connection between two nodes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Edge {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub key: EdgeKey,
    pub kind: EdgeKind,
    pub first_seen: TimestampMs,
    pub last_seen: TimestampMs,
    pub packet_count: u64,
    pub protocols: BTreeSet<String>,

    /// TTL of the hop that produced this edge (traceroute edges only).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub ttl: Option<u32>,

    /// Mean round-trip time in milliseconds, fixed when the edge is created
    /// (traceroute edges only).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub avg_rtt: Option<f64>,
}

impl Edge {
    /// Create an edge on its first reference.
    pub fn new(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        kind: EdgeKind,
        protocol: &str,
        now: TimestampMs,
    ) -> Self {
        Self {
            key: EdgeKey::new(source, target),
            kind,
            first_seen: now,
            last_seen: now,
            packet_count: 1,
            protocols: BTreeSet::from([protocol.to_string()]),
            ttl: None,
            avg_rtt: None,
        }
    }

    /// Attach traceroute hop details.
    pub fn with_hop(mut self, ttl: u32, avg_rtt: f64) -> Self {
        self.ttl = Some(ttl);
        self.avg_rtt = Some(avg_rtt);
        self
    }

    /// Record another reference to this edge.
    ///
    /// Kind, TTL and average RTT keep the values from creation.
    pub fn touch(&mut self, protocol: &str, now: TimestampMs) {
        self.last_seen = self.last_seen.max(now);
        self.packet_count += 1;
        if !self.protocols.contains(protocol) {
            self.protocols.insert(protocol.to_string());
        }
    }

    /// Milliseconds since this edge was last referenced.
    pub fn idle_for(&self, now: TimestampMs) -> u64 {
        now.saturating_sub(self.last_seen)
    }
}
