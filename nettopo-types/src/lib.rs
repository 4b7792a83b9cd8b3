//! # nettopo-types
//!
//! Core types for live network topology graphs. This crate defines the
//! entities tracked by the topology engine (hosts, routers, the directed
//! connections between them, and the latest traceroute route per
//! destination) and the update messages pushed to viewers.
//!
//! ## Features
//!
//! - `serde`: JSON serialization of entities and update messages
//!
//! ## Example
//!
//! ```rust
//! use nettopo_types::{Edge, EdgeKind, Node, NodeKind};
//!
//! let now = 1_703_160_000_000;
//! let node = Node::new("10.0.0.7", NodeKind::Remote, "TCP", now);
//! let edge = Edge::new("192.168.1.10", "10.0.0.7", EdgeKind::Direct, "TCP", now);
//!
//! assert_eq!(node.packet_count, 1);
//! assert_eq!(edge.key.source, "192.168.1.10");
//! ```

mod edge;
mod node;
mod path;
mod update;

pub use edge::*;
pub use node::*;
pub use path::*;
pub use update::*;

/// Milliseconds since the Unix epoch.
pub type TimestampMs = u64;

/// Protocol tag recorded on everything learned from a traceroute.
pub const TRACEROUTE_PROTOCOL: &str = "ICMP";

/// Get current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_ms() -> TimestampMs {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
