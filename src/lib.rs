//! # nettopo
//!
//! Live network topology from a packet-capture event stream.
//!
//! The capture agent emits one JSON object per line: per-packet
//! observations and completed traceroutes. `nettopo` feeds that stream into
//! the topology engine, forwards every graph update to the configured
//! outputs, and evicts hosts that go quiet.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   lines   ┌───────────────────────────────┐   updates   ┌──────────┐
//! │ InputSource  │──────────▶│            Engine             │────────────▶│  Output  │
//! │ stdin | file │           │ decoder ─▶ builder ─▶ store   │             │ stdout   │
//! │ | tcp        │           │ sweeper ─▶ store ─▶ publisher │             │ file|tcp │
//! └──────────────┘           └───────────────────────────────┘             └──────────┘
//! ```
//!
//! - **[`config`]**: layered [`Settings`] (defaults, TOML file, environment)
//! - **[`source`]**: where the event lines come from ([`InputSource`])
//! - **[`logging`]**: `tracing` subscriber setup
//! - **[`duration`]**: human-friendly duration flags
//! - **[`export`]**: write the detailed graph to a file
//!
//! ## Usage
//!
//! ```bash
//! # Live: pipe the capture agent in, print updates as JSON lines
//! capture-agent | nettopo --stdout
//!
//! # Replay a capture file and export the resulting graph
//! nettopo --input capture.ndjson --export graph.json
//!
//! # Read from a TCP capture feed, append updates to a file
//! nettopo --connect 10.0.0.5:9000 --output-file updates.ndjson
//! ```
//!
//! ### As a library
//!
//! ```
//! use std::io::Cursor;
//! use nettopo::Engine;
//!
//! # tokio_test::block_on(async {
//! let engine = Engine::builder().local_identity("192.168.1.10").build();
//! let lines = b"{\"src_ip\": \"192.168.1.10\", \"dst_ip\": \"1.1.1.1\", \"protocol\": \"UDP\"}\n";
//! let report = engine.ingest(Cursor::new(lines.to_vec())).await;
//!
//! assert_eq!(report.applied, 1);
//! assert_eq!(engine.query().simple_graph().nodes.len(), 2);
//! # });
//! ```

pub mod config;
pub mod duration;
pub mod export;
pub mod logging;
pub mod source;

pub use config::{detect_local_ip, LogFormat, Overrides, Settings};
pub use export::export_graph;
pub use source::{EventReader, InputSource};

// Re-export the engine for convenience
pub use nettopo_engine::{Engine, EngineConfig, Output};
