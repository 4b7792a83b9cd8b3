//! The ingest worker: reads event lines and applies them one at a time.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, error, info, warn};

use crate::decoder::{DecodeCounts, Event, EventDecoder};
use crate::engine::Engine;

/// Counters shared by the ingest worker and the statistics view.
#[derive(Debug, Default)]
pub struct IngestCounters {
    decoder: EventDecoder,
    apply_failures: AtomicU64,
}

impl IngestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decoder(&self) -> &EventDecoder {
        &self.decoder
    }

    pub fn record_failure(&self) {
        self.apply_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn apply_failures(&self) -> u64 {
        self.apply_failures.load(Ordering::Relaxed)
    }

    /// Current values, with `dropped_updates` taken from the publisher.
    pub fn stats(&self, dropped_updates: u64) -> IngestStats {
        IngestStats {
            decode: self.decoder.counts(),
            apply_failures: self.apply_failures(),
            dropped_updates,
        }
    }
}

/// Ingest counters as reported by the statistics view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStats {
    #[serde(flatten)]
    pub decode: DecodeCounts,
    /// Accepted events whose application failed.
    pub apply_failures: u64,
    /// Updates not delivered because a subscriber queue was full.
    pub dropped_updates: u64,
}

/// Summary of one finished ingest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    pub lines: u64,
    pub applied: u64,
    pub discarded: u64,
    pub failed: u64,
}

/// Apply one event, isolating any panic raised while doing so.
///
/// Returns `false` if the event could not be applied.
pub fn apply_isolated(engine: &Engine, event: &Event) -> bool {
    match isolate(|| engine.apply(event)) {
        Ok(_) => true,
        Err(reason) => {
            engine.ingest_counters().record_failure();
            error!(%reason, event = ?event, "failed to apply event, skipping");
            false
        }
    }
}

fn isolate<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic| {
        panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}

/// Read newline-delimited events from `reader` until it ends.
///
/// Bad lines and failed events are counted and skipped; only the end of the
/// stream or a read error stops the loop. Non-UTF-8 bytes are replaced
/// rather than rejected.
pub async fn run_ingest<R>(engine: &Engine, reader: R) -> IngestReport
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut report = IngestReport::default();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("ingest stream reached end of input");
                break;
            }
            Ok(_) => {
                report.lines += 1;
                let line = String::from_utf8_lossy(&buf);
                match engine.ingest_counters().decoder().decode(&line) {
                    Some(event) => {
                        if apply_isolated(engine, &event) {
                            report.applied += 1;
                        } else {
                            report.failed += 1;
                        }
                    }
                    None => report.discarded += 1,
                }
            }
            Err(err) => {
                warn!(error = %err, "ingest stream read failed, stopping");
                break;
            }
        }
    }

    info!(
        lines = report.lines,
        applied = report.applied,
        discarded = report.discarded,
        failed = report.failed,
        "ingest finished"
    );
    report
}
