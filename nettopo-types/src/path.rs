//! Traceroute paths - the latest hop-by-hop route to a destination.

use crate::{NodeId, TimestampMs};

/// Marker used by the capture agent for a probe or responder that timed out.
pub const TIMEOUT_MARKER: &str = "*";

/// One round-trip sample from a traceroute probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RttSample {
    /// Round-trip time in milliseconds.
    Millis(f64),
    /// The probe timed out (`"*"` on the wire).
    Timeout,
}

impl RttSample {
    /// The sample in milliseconds, if the probe got an answer.
    pub fn millis(&self) -> Option<f64> {
        match self {
            RttSample::Millis(ms) => Some(*ms),
            RttSample::Timeout => None,
        }
    }
}

/// A single responder within a hop.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HopResponse {
    /// Responder address; absent or `"*"` when nobody answered.
    #[cfg_attr(feature = "serde", serde(default))]
    pub ip: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub rtts: Vec<RttSample>,
}

impl HopResponse {
    pub fn new(ip: impl Into<String>, rtts: Vec<RttSample>) -> Self {
        Self {
            ip: Some(ip.into()),
            rtts,
        }
    }

    /// The responder address, unless this response is a timeout.
    pub fn responder(&self) -> Option<&str> {
        self.ip
            .as_deref()
            .filter(|ip| !ip.is_empty() && *ip != TIMEOUT_MARKER)
    }

    /// Mean of the answered samples, `0.0` when every sample timed out.
    pub fn average_rtt(&self) -> f64 {
        let (sum, count) = self
            .rtts
            .iter()
            .filter_map(RttSample::millis)
            .fold((0.0, 0u32), |(sum, count), ms| (sum + ms, count + 1));
        if count == 0 {
            0.0
        } else {
            sum / f64::from(count)
        }
    }
}

/// All responses received for one TTL.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Hop {
    pub ttl: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub responses: Vec<HopResponse>,
}

impl Hop {
    pub fn new(ttl: u32, responses: Vec<HopResponse>) -> Self {
        Self { ttl, responses }
    }

    /// Responders that actually answered, in input order.
    pub fn responders(&self) -> impl Iterator<Item = (&str, &HopResponse)> {
        self.responses
            .iter()
            .filter_map(|response| response.responder().map(|ip| (ip, response)))
    }

    /// The responder the next hop is anchored on.
    ///
    /// With load-balanced hops this is the last responder in input order,
    /// not an aggregate.
    pub fn anchor(&self) -> Option<&str> {
        self.responders().last().map(|(ip, _)| ip)
    }
}

/// The latest traceroute to a destination.
///
/// Each accepted traceroute replaces the stored path for its destination
/// wholesale. Old and new hop sequences are never merged.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TraceroutePath {
    pub destination: NodeId,
    pub last_seen: TimestampMs,
    pub hops: Vec<Hop>,
}

impl TraceroutePath {
    pub fn new(destination: impl Into<NodeId>, hops: Vec<Hop>, now: TimestampMs) -> Self {
        Self {
            destination: destination.into(),
            last_seen: now,
            hops,
        }
    }

    /// Number of hops as reported by the probe, timeouts included.
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// The route starting at `local`, one anchor per answered hop.
    pub fn route(&self, local: &str) -> Vec<NodeId> {
        route(local, &self.hops)
    }

    /// Milliseconds since this path was last replaced.
    pub fn idle_for(&self, now: TimestampMs) -> u64 {
        now.saturating_sub(self.last_seen)
    }
}

/// Reconstruct the anchor sequence for a hop list, timeout hops omitted.
pub fn route(local: &str, hops: &[Hop]) -> Vec<NodeId> {
    std::iter::once(local)
        .chain(hops.iter().filter_map(Hop::anchor))
        .map(str::to_string)
        .collect()
}

#[cfg(feature = "serde")]
mod rtt_serde {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{RttSample, TIMEOUT_MARKER};

    impl Serialize for RttSample {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                RttSample::Millis(ms) => serializer.serialize_f64(*ms),
                RttSample::Timeout => serializer.serialize_str(TIMEOUT_MARKER),
            }
        }
    }

    struct RttVisitor;

    impl<'de> Visitor<'de> for RttVisitor {
        type Value = RttSample;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "a round-trip time in milliseconds or \"{}\"", TIMEOUT_MARKER)
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<RttSample, E> {
            Ok(RttSample::Millis(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<RttSample, E> {
            Ok(RttSample::Millis(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<RttSample, E> {
            Ok(RttSample::Millis(v as f64))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<RttSample, E> {
            if v == TIMEOUT_MARKER {
                Ok(RttSample::Timeout)
            } else {
                Err(E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }
    }

    impl<'de> Deserialize<'de> for RttSample {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(RttVisitor)
        }
    }
}
