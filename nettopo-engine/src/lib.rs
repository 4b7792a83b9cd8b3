//! # nettopo-engine
//!
//! Builds a live network topology graph from captured packet and traceroute
//! events and keeps subscribers in sync with it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nettopo_engine::{Engine, Output};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Engine::builder()
//!         .local_identity("192.168.1.10")
//!         .node_timeout(Duration::from_secs(300))
//!         .build();
//!
//!     // Print every update as a JSON line
//!     engine.attach(Output::Stdout);
//!
//!     // Evict idle hosts in the background
//!     let sweeper = engine.start_sweeper();
//!
//!     // Feed events from stdin until it closes
//!     let report = engine.ingest(tokio::io::stdin()).await;
//!     println!("applied {} events", report.applied);
//!
//!     sweeper.shutdown().await;
//! }
//! ```
//!
//! ## Pieces
//!
//! - [`EventDecoder`]: raw lines to typed events, with discard counters
//! - [`GraphStore`] and [`TopologyBuilder`]: the graph and how events change it
//! - [`Publisher`]: subscriber registry with bounded per-subscriber queues
//! - [`QueryService`]: read-only views for an API layer
//! - [`Engine`]: all of the above behind one handle

mod builder;
mod decoder;
mod engine;
mod error;
mod ingest;
mod output;
mod publisher;
mod query;
mod store;
mod sweeper;

pub use builder::{Diff, TopologyBuilder};
pub use decoder::{
    decode_line, DecodeCounts, Endpoint, Event, EventDecoder, PacketEvent, TracerouteEvent,
    TRACEROUTE,
};
pub use engine::{Engine, EngineBuilder, EngineConfig};
pub use error::{DecodeError, DiscardReason, OutputError};
pub use ingest::{apply_isolated, run_ingest, IngestCounters, IngestReport, IngestStats};
pub use output::Output;
pub use publisher::{
    full_update, render, Emission, Publisher, SubscriberId, Subscription,
    DEFAULT_SUBSCRIBER_BUFFER,
};
pub use query::{
    ConfigView, DetailedEdge, DetailedGraph, DetailedNode, DetailedStats, EdgeCounts,
    NetworkLayers, NodeCounts, PathSummary, QueryService, SimpleEdge, SimpleGraph, SimpleNode,
    SimpleStats, Stats, Topology,
};
pub use store::{Evicted, GraphState, GraphStore};
pub use sweeper::{spawn_sweeper, SweepReport, SweeperHandle, MIN_SWEEP_PERIOD};

// Re-export types for convenience
pub use nettopo_types::{
    Edge, EdgeKey, EdgeKind, Hop, HopResponse, Node, NodeId, NodeKind, RttSample, TimestampMs,
    TraceroutePath, UpdateMessage,
};
