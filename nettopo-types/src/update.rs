//! Update messages pushed to subscribers.
//!
//! Every message is one JSON object tagged by `type`:
//!
//! - `full`: the whole graph, sent whenever the node set changes and after
//!   every sweep that evicted something
//! - `edge`: a single new or updated edge
//! - `path_update`: a re-traced route that added no node or edge

use std::collections::BTreeMap;

use crate::{Edge, EdgeKind, Hop, Node, NodeId, NodeKind, TimestampMs, TraceroutePath};

/// A message for subscribers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum UpdateMessage {
    Full(FullUpdate),
    Edge(EdgeUpdate),
    PathUpdate(PathUpdate),
}

impl UpdateMessage {
    /// The `type` tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateMessage::Full(_) => "full",
            UpdateMessage::Edge(_) => "edge",
            UpdateMessage::PathUpdate(_) => "path_update",
        }
    }

    pub fn as_full(&self) -> Option<&FullUpdate> {
        match self {
            UpdateMessage::Full(full) => Some(full),
            _ => None,
        }
    }
}

/// Complete graph snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FullUpdate {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    /// Stored paths keyed by destination ID.
    pub paths: BTreeMap<NodeId, PathRecord>,
    pub stats: GraphTotals,
}

/// Entity counts carried by a full update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct GraphTotals {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub total_paths: usize,
}

/// Node as carried in a full update.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct NodeRecord {
    pub id: NodeId,
    pub kind: NodeKind,
    pub packet_count: u64,
    pub first_seen: TimestampMs,
    pub last_seen: TimestampMs,
    pub is_local: bool,
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            kind: node.kind,
            packet_count: node.packet_count,
            first_seen: node.first_seen,
            last_seen: node.last_seen,
            is_local: node.is_local,
        }
    }
}

/// Edge as carried in updates.
///
/// Incremental edge updates leave out the timestamps.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct EdgeRecord {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub packet_count: u64,
    pub protocols: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub first_seen: Option<TimestampMs>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub last_seen: Option<TimestampMs>,
}

impl EdgeRecord {
    /// Full-update form, timestamps included.
    pub fn full(edge: &Edge) -> Self {
        Self {
            first_seen: Some(edge.first_seen),
            last_seen: Some(edge.last_seen),
            ..Self::counters(edge)
        }
    }

    /// Incremental form: identity, kind and counters only.
    pub fn counters(edge: &Edge) -> Self {
        Self {
            source: edge.key.source.clone(),
            target: edge.key.target.clone(),
            kind: edge.kind,
            packet_count: edge.packet_count,
            protocols: edge.protocols.iter().cloned().collect(),
            first_seen: None,
            last_seen: None,
        }
    }
}

/// Stored traceroute as carried in a full update.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PathRecord {
    pub hops: Vec<Hop>,
    pub hop_count: usize,
    pub last_seen: TimestampMs,
}

impl From<&TraceroutePath> for PathRecord {
    fn from(path: &TraceroutePath) -> Self {
        Self {
            hops: path.hops.clone(),
            hop_count: path.hop_count(),
            last_seen: path.last_seen,
        }
    }
}

/// Incremental update for a single edge.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeUpdate {
    pub edge: EdgeRecord,
}

/// Incremental update for a re-traced route.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathUpdate {
    #[cfg_attr(feature = "serde", serde(rename = "destinationID"))]
    pub destination_id: NodeId,
    /// Host identities from the local host to the last answered hop.
    pub path: Vec<NodeId>,
}
