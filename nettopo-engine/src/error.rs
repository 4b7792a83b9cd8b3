//! Error types for the engine.

use thiserror::Error;

/// Why an ingest line was discarded.
///
/// None of these are fatal: the ingest worker counts the discard and moves
/// on to the next line.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Empty or whitespace-only line.
    #[error("blank line")]
    Blank,

    /// Status output from the capture agent, recognized without parsing.
    #[error("capture agent status line")]
    Banner,

    /// Framed like an object but not valid JSON, or fields of the wrong shape.
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid JSON that is not an object.
    #[error("event is not a JSON object")]
    NotAnObject,

    /// A packet without one of its endpoint addresses.
    #[error("packet is missing {0}")]
    MissingAddress(&'static str),

    /// A packet endpoint holding a placeholder address.
    #[error("packet {field} is the placeholder address {value:?}")]
    SentinelAddress { field: &'static str, value: String },

    /// A traceroute without a destination address.
    #[error("traceroute has no destination")]
    MissingDestination,

    /// A traceroute without any hop records.
    #[error("traceroute to {0} has no hops")]
    EmptyHops(String),
}

impl DecodeError {
    /// Coarse bucket used for discard counters.
    pub fn reason(&self) -> DiscardReason {
        match self {
            DecodeError::Blank => DiscardReason::Blank,
            DecodeError::Banner => DiscardReason::Banner,
            DecodeError::Malformed(_) | DecodeError::NotAnObject => DiscardReason::Malformed,
            DecodeError::MissingAddress(_)
            | DecodeError::SentinelAddress { .. }
            | DecodeError::MissingDestination
            | DecodeError::EmptyHops(_) => DiscardReason::Invalid,
        }
    }
}

/// Discard buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Blank,
    Banner,
    /// Not parseable as an event object.
    Malformed,
    /// Parsed, but semantically unusable.
    Invalid,
}

/// Errors raised while delivering updates to an output sink.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode update: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("output channel full")]
    Full,

    #[error("output channel closed")]
    Closed,
}
