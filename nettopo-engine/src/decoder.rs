//! Turns raw ingest lines into typed events.
//!
//! The capture agent writes one JSON object per line, interleaved with
//! human-readable status output. Status lines are recognized by framing and
//! marker text and dropped without parsing.

use std::sync::atomic::{AtomicU64, Ordering};

use nettopo_types::Hop;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::{DecodeError, DiscardReason};

/// Protocol value that marks a traceroute record.
pub const TRACEROUTE: &str = "TRACEROUTE";

/// Marker text the capture agent uses on its status lines.
const BANNER_MARKERS: &[&str] = &[
    "🔍",
    "🚀",
    "📁",
    "🛑",
    "❌",
    "Press Ctrl+C",
    "Listening on",
];

/// Addresses the capture agent emits when it could not resolve an endpoint.
const SENTINEL_ADDRESSES: &[&str] = &["", "unknown", "0.0.0.0"];

/// A decoded ingest event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Packet(PacketEvent),
    Traceroute(TracerouteEvent),
}

/// One side of a captured packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub ip: String,
    pub port: Option<u16>,
}

impl Endpoint {
    /// Node identity for this endpoint.
    ///
    /// With port-level identity the port is appended when the packet had one.
    pub fn identity(&self, port_identity: bool) -> String {
        match (port_identity, self.port) {
            (true, Some(port)) => format!("{}:{}", self.ip, port),
            _ => self.ip.clone(),
        }
    }
}

/// A per-packet observation.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketEvent {
    pub src: Endpoint,
    pub dst: Endpoint,
    pub protocol: String,
    /// Capture time reported by the agent, seconds since the epoch.
    pub timestamp: Option<f64>,
    /// Fields the engine does not interpret (length, flags, ...).
    pub extra: Map<String, Value>,
}

/// A completed traceroute.
#[derive(Debug, Clone, PartialEq)]
pub struct TracerouteEvent {
    pub destination: String,
    pub hops: Vec<Hop>,
}

#[derive(Deserialize)]
struct RawPacket {
    src_ip: Option<String>,
    dst_ip: Option<String>,
    protocol: Option<String>,
    src_port: Option<u16>,
    dst_port: Option<u16>,
    timestamp: Option<f64>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawTraceroute {
    dst_ip: Option<String>,
    #[serde(default)]
    hops: Vec<Hop>,
}

/// Decode a single line.
pub fn decode_line(line: &str) -> Result<Event, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DecodeError::Blank);
    }
    if is_banner(line) {
        return Err(DecodeError::Banner);
    }

    let value: Value = serde_json::from_str(line)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }

    if value.get("protocol").and_then(Value::as_str) == Some(TRACEROUTE) {
        decode_traceroute(value).map(Event::Traceroute)
    } else {
        decode_packet(value).map(Event::Packet)
    }
}

fn is_banner(line: &str) -> bool {
    !line.starts_with('{')
        || !line.ends_with('}')
        || BANNER_MARKERS.iter().any(|marker| line.contains(marker))
}

fn decode_traceroute(value: Value) -> Result<TracerouteEvent, DecodeError> {
    let raw: RawTraceroute = serde_json::from_value(value)?;

    let destination = raw
        .dst_ip
        .filter(|ip| !ip.trim().is_empty())
        .ok_or(DecodeError::MissingDestination)?;
    if raw.hops.is_empty() {
        return Err(DecodeError::EmptyHops(destination));
    }

    Ok(TracerouteEvent {
        destination,
        hops: raw.hops,
    })
}

fn decode_packet(value: Value) -> Result<PacketEvent, DecodeError> {
    let raw: RawPacket = serde_json::from_value(value)?;

    let src = endpoint("src_ip", raw.src_ip, raw.src_port)?;
    let dst = endpoint("dst_ip", raw.dst_ip, raw.dst_port)?;

    Ok(PacketEvent {
        src,
        dst,
        protocol: raw.protocol.unwrap_or_else(|| "UNKNOWN".to_string()),
        timestamp: raw.timestamp,
        extra: raw.extra,
    })
}

fn endpoint(
    field: &'static str,
    ip: Option<String>,
    port: Option<u16>,
) -> Result<Endpoint, DecodeError> {
    let ip = ip.ok_or(DecodeError::MissingAddress(field))?;
    if SENTINEL_ADDRESSES.contains(&ip.trim()) {
        return Err(DecodeError::SentinelAddress { field, value: ip });
    }
    Ok(Endpoint { ip, port })
}

/// Line decoder with discard accounting.
#[derive(Debug, Default)]
pub struct EventDecoder {
    lines: AtomicU64,
    packets: AtomicU64,
    traceroutes: AtomicU64,
    blank: AtomicU64,
    banner: AtomicU64,
    malformed: AtomicU64,
    invalid: AtomicU64,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a line, counting and logging anything that gets discarded.
    pub fn decode(&self, line: &str) -> Option<Event> {
        self.lines.fetch_add(1, Ordering::Relaxed);

        match decode_line(line) {
            Ok(event) => {
                match &event {
                    Event::Packet(_) => self.packets.fetch_add(1, Ordering::Relaxed),
                    Event::Traceroute(_) => self.traceroutes.fetch_add(1, Ordering::Relaxed),
                };
                Some(event)
            }
            Err(err) => {
                let counter = match err.reason() {
                    DiscardReason::Blank => &self.blank,
                    DiscardReason::Banner => &self.banner,
                    DiscardReason::Malformed => &self.malformed,
                    DiscardReason::Invalid => &self.invalid,
                };
                counter.fetch_add(1, Ordering::Relaxed);

                match err {
                    DecodeError::Blank => trace!("skipping blank line"),
                    DecodeError::Banner => debug!("skipping status line: {}", preview(line)),
                    err => debug!(error = %err, "discarding line: {}", preview(line)),
                }
                None
            }
        }
    }

    /// Current counter values.
    pub fn counts(&self) -> DecodeCounts {
        DecodeCounts {
            lines: self.lines.load(Ordering::Relaxed),
            packets: self.packets.load(Ordering::Relaxed),
            traceroutes: self.traceroutes.load(Ordering::Relaxed),
            blank: self.blank.load(Ordering::Relaxed),
            banner: self.banner.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of decoder counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeCounts {
    pub lines: u64,
    pub packets: u64,
    pub traceroutes: u64,
    pub blank: u64,
    pub banner: u64,
    pub malformed: u64,
    pub invalid: u64,
}

impl DecodeCounts {
    /// Lines that did not produce an event.
    pub fn discarded(&self) -> u64 {
        self.blank + self.banner + self.malformed + self.invalid
    }
}

fn preview(line: &str) -> &str {
    let line = line.trim();
    match line.char_indices().nth(50) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
