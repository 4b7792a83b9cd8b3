//! The Engine facade: store, builder, publisher and workers wired together.

use std::sync::Arc;
use std::time::Duration;

use nettopo_types::{current_timestamp_ms, TimestampMs, UpdateMessage};
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::builder::{Diff, TopologyBuilder};
use crate::decoder::Event;
use crate::ingest::{run_ingest, IngestCounters, IngestReport};
use crate::output::Output;
use crate::publisher::{
    full_update, render, Emission, Publisher, SubscriberId, Subscription,
    DEFAULT_SUBSCRIBER_BUFFER,
};
use crate::query::QueryService;
use crate::store::GraphStore;
use crate::sweeper::{spawn_sweeper, SweepReport, SweeperHandle};

/// Settings the engine runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Entities idle for longer than this are evicted.
    pub node_timeout: Duration,
    pub sweep_interval: Duration,
    /// Identity of the capturing host.
    pub local_identity: String,
    /// Identify packet endpoints by `ip:port`.
    pub port_identity: bool,
    /// Queue length for each subscriber.
    pub subscriber_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            local_identity: "127.0.0.1".to_string(),
            port_identity: false,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

/// The topology graph engine.
///
/// Cloning is cheap and every clone shares the same graph.
///
/// # Example
///
/// ```rust
/// use nettopo_engine::Engine;
///
/// let engine = Engine::builder().local_identity("192.168.1.10").build();
/// let mut updates = engine.subscribe();
///
/// engine.ingest_line(r#"{"src_ip": "192.168.1.10", "dst_ip": "10.0.0.7", "protocol": "TCP"}"#);
///
/// // The initial snapshot, then the update for the new nodes.
/// assert_eq!(updates.try_recv().unwrap().kind(), "full");
/// assert_eq!(updates.try_recv().unwrap().kind(), "full");
/// assert_eq!(engine.query().stats().nodes.total, 2);
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    store: Arc<GraphStore>,
    publisher: Arc<Publisher>,
    counters: Arc<IngestCounters>,
    builder: Arc<TopologyBuilder>,
    config: Arc<EngineConfig>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let builder = TopologyBuilder::new(config.local_identity.clone())
            .port_identity(config.port_identity);
        Self {
            store: Arc::new(GraphStore::new()),
            publisher: Arc::new(Publisher::new(config.subscriber_buffer)),
            counters: Arc::new(IngestCounters::new()),
            builder: Arc::new(builder),
            config: Arc::new(config),
        }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn ingest_counters(&self) -> &IngestCounters {
        &self.counters
    }

    /// Apply an event at the current wall-clock time.
    pub fn apply(&self, event: &Event) -> Diff {
        self.apply_at(event, current_timestamp_ms())
    }

    /// Apply an event as if it arrived at `now`.
    ///
    /// The resulting update is rendered and queued before the store lock is
    /// released.
    pub fn apply_at(&self, event: &Event, now: TimestampMs) -> Diff {
        self.store.mutate(|state| {
            let diff = self.builder.apply(state, event, now);
            let emission = Emission::for_diff(&diff);
            self.publisher.publish_with(|| render(state, &emission));
            diff
        })
    }

    /// Decode one raw line and apply it. Returns `None` if it was discarded.
    pub fn ingest_line(&self, line: &str) -> Option<Diff> {
        let event = self.counters.decoder().decode(line)?;
        Some(self.apply(&event))
    }

    /// Read and apply events until `reader` ends.
    pub async fn ingest<R>(&self, reader: R) -> IngestReport
    where
        R: AsyncRead + Unpin,
    {
        run_ingest(self, reader).await
    }

    /// Run the ingest worker on its own task.
    pub fn spawn_ingest<R>(&self, reader: R) -> JoinHandle<IngestReport>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let engine = self.clone();
        tokio::spawn(async move { run_ingest(&engine, reader).await })
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(current_timestamp_ms())
    }

    /// Evict everything idle at `now` and resend the graph if anything went.
    pub fn sweep_at(&self, now: TimestampMs) -> SweepReport {
        let timeout_ms = self.config.node_timeout.as_millis() as u64;
        let report = self.store.mutate(|state| {
            let evicted = state.evict_idle(now, timeout_ms);
            let delivered = if evicted.is_empty() {
                0
            } else {
                self.publisher
                    .publish_with(|| UpdateMessage::Full(full_update(state)))
            };
            SweepReport { evicted, delivered }
        });

        if report.removed_anything() {
            for id in &report.evicted.nodes {
                debug!(node = %id, "evicted idle node");
            }
            for key in &report.evicted.edges {
                debug!(edge = %key, "evicted idle edge");
            }
            for destination in &report.evicted.paths {
                debug!(%destination, "evicted idle traceroute path");
            }
            info!(
                nodes = report.evicted.nodes.len(),
                edges = report.evicted.edges.len(),
                paths = report.evicted.paths.len(),
                "sweep removed idle entities"
            );
        }
        report
    }

    /// Start sweeping every `sweep_interval` in the background.
    pub fn start_sweeper(&self) -> SweeperHandle {
        let engine = self.clone();
        info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            timeout_secs = self.config.node_timeout.as_secs(),
            "starting sweeper"
        );
        spawn_sweeper(self.config.sweep_interval, move || {
            engine.sweep();
        })
    }

    /// Register a subscriber. Its first message is a full snapshot.
    pub fn subscribe(&self) -> Subscription {
        self.store.read(|state| {
            self.publisher
                .subscribe_with(UpdateMessage::Full(full_update(state)))
        })
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.publisher.unsubscribe(id)
    }

    /// Forward every update to `output` on a background task.
    ///
    /// The task ends when the subscription is removed.
    pub fn attach(&self, output: Output) -> JoinHandle<()> {
        let mut subscription = self.subscribe();
        info!(output = %output.describe(), subscriber = subscription.id, "attached output");

        tokio::spawn(async move {
            while let Some(update) = subscription.recv().await {
                if let Err(err) = output.emit(&update).await {
                    warn!(output = %output.describe(), error = %err, "failed to emit update");
                }
            }
        })
    }

    pub fn query(&self) -> QueryService {
        QueryService::new(
            self.store.clone(),
            self.publisher.clone(),
            self.counters.clone(),
            self.config.clone(),
        )
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Builder for configuring an Engine.
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle-eviction timeout. Defaults to 300 seconds.
    pub fn node_timeout(mut self, timeout: Duration) -> Self {
        self.config.node_timeout = timeout;
        self
    }

    /// Set the sweep period. Defaults to 60 seconds.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn local_identity(mut self, local: impl Into<String>) -> Self {
        self.config.local_identity = local.into();
        self
    }

    pub fn port_identity(mut self, enabled: bool) -> Self {
        self.config.port_identity = enabled;
        self
    }

    pub fn subscriber_buffer(mut self, capacity: usize) -> Self {
        self.config.subscriber_buffer = capacity;
        self
    }

    pub fn build(self) -> Engine {
        Engine::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_line;
    use nettopo_types::NodeKind;

    const SECOND: u64 = 1_000;

    fn engine() -> Engine {
        Engine::builder().local_identity("L").build()
    }

    fn packet(src: &str, dst: &str) -> Event {
        decode_line(&format!(
            r#"{{"src_ip": "{src}", "dst_ip": "{dst}", "protocol": "TCP"}}"#
        ))
        .unwrap()
    }

    fn worked_traceroute() -> Event {
        decode_line(concat!(
            r#"{"protocol": "TRACEROUTE", "dst_ip": "8.8.8.8", "hops": ["#,
            r#"{"ttl": 1, "responses": [{"ip": "10.0.0.1", "rtts": [10, 12, "*"]}]},"#,
            r#"{"ttl": 2, "responses": [{"ip": "8.8.8.8", "rtts": [20, 22, 21]}]}]}"#,
        ))
        .unwrap()
    }

    #[test]
    fn builder_sets_config() {
        let engine = Engine::builder()
            .node_timeout(Duration::from_secs(90))
            .sweep_interval(Duration::from_secs(5))
            .local_identity("10.1.1.1")
            .port_identity(true)
            .subscriber_buffer(8)
            .build();

        assert_eq!(
            engine.config(),
            &EngineConfig {
                node_timeout: Duration::from_secs(90),
                sweep_interval: Duration::from_secs(5),
                local_identity: "10.1.1.1".to_string(),
                port_identity: true,
                subscriber_buffer: 8,
            }
        );
    }

    #[test]
    fn worked_traceroute_example() {
        let engine = engine();
        engine.apply_at(&worked_traceroute(), 1_000);

        let state = engine.store().snapshot();
        assert_eq!(state.node("10.0.0.1").unwrap().kind, NodeKind::Router);
        assert_eq!(state.node("8.8.8.8").unwrap().kind, NodeKind::Destination);
        assert_eq!(state.edge("L", "10.0.0.1").unwrap().avg_rtt, Some(11.0));
        assert_eq!(state.edge("10.0.0.1", "8.8.8.8").unwrap().avg_rtt, Some(21.0));
    }

    #[test]
    fn emission_sequence_follows_policy() {
        let engine = engine();
        let mut sub = engine.subscribe();
        assert_eq!(sub.try_recv().unwrap().kind(), "full");

        engine.apply_at(&packet("L", "10.0.0.7"), 1);
        assert_eq!(sub.try_recv().unwrap().kind(), "full");

        engine.apply_at(&packet("L", "10.0.0.7"), 2);
        let update = sub.try_recv().unwrap();
        match update.as_ref() {
            UpdateMessage::Edge(edge) => assert_eq!(edge.edge.packet_count, 2),
            other => panic!("expected edge update, got {other:?}"),
        }

        engine.apply_at(&packet("10.0.0.7", "L"), 3);
        assert_eq!(sub.try_recv().unwrap().kind(), "edge");

        engine.apply_at(&worked_traceroute(), 4);
        assert_eq!(sub.try_recv().unwrap().kind(), "full");

        engine.apply_at(&worked_traceroute(), 5);
        match sub.try_recv().unwrap().as_ref() {
            UpdateMessage::PathUpdate(path) => {
                assert_eq!(path.destination_id, "8.8.8.8");
                assert_eq!(path.path, vec!["L", "10.0.0.1", "8.8.8.8"]);
            }
            other => panic!("expected path update, got {other:?}"),
        }
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn sentinel_packet_changes_nothing() {
        let engine = engine();
        let mut sub = engine.subscribe();
        sub.try_recv().unwrap();

        let diff = engine.ingest_line(r#"{"src_ip": "L", "dst_ip": "0.0.0.0", "protocol": "UDP"}"#);

        assert!(diff.is_none());
        assert!(engine.store().snapshot().is_empty());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn sweep_full_update_matches_store() {
        let engine = Engine::builder()
            .local_identity("L")
            .node_timeout(Duration::from_secs(300))
            .build();
        engine.apply_at(&packet("172.16.0.1", "172.16.0.2"), 0);
        engine.apply_at(&packet("10.0.0.3", "10.0.0.4"), 200 * SECOND);
        engine.apply_at(&worked_traceroute(), 250 * SECOND);

        let mut sub = engine.subscribe();
        sub.try_recv().unwrap();

        let report = engine.sweep_at(300 * SECOND + 1);
        assert_eq!(report.evicted.nodes, vec!["172.16.0.1", "172.16.0.2"]);
        assert_eq!(report.evicted.edges.len(), 1);
        assert_eq!(report.delivered, 1);

        let update = sub.try_recv().unwrap();
        let full = update.as_full().unwrap();
        let state = engine.store().snapshot();
        let ids: Vec<_> = full.nodes.iter().map(|n| n.id.as_str()).collect();
        let stored: Vec<_> = state.nodes.keys().map(String::as_str).collect();
        assert_eq!(ids, stored);
        assert_eq!(full.edges.len(), state.edges.len());
        assert_eq!(full.paths.len(), state.paths.len());
        assert_eq!(full.stats.total_nodes, 4);
    }

    #[test]
    fn quiet_sweep_publishes_nothing() {
        let engine = engine();
        engine.apply_at(&packet("a", "b"), 1_000);
        let mut sub = engine.subscribe();
        sub.try_recv().unwrap();

        let report = engine.sweep_at(2_000);

        assert!(!report.removed_anything());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn store_stays_usable_after_panic_under_lock() {
        let engine = engine();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            engine.store().mutate(|_| panic!("boom"));
        }));
        assert!(result.is_err());

        engine.apply_at(&packet("a", "b"), 1);
        assert_eq!(engine.store().counts(), (2, 1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_evicts_idle_entities() {
        let engine = Engine::builder()
            .local_identity("L")
            .node_timeout(Duration::from_secs(1))
            .sweep_interval(Duration::from_secs(2))
            .build();
        engine.apply_at(&packet("a", "b"), 0);

        let handle = engine.start_sweeper();
        tokio::time::sleep(Duration::from_secs(3)).await;
        handle.shutdown().await;

        assert!(engine.store().snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_sweep_interval_keeps_sweeping() {
        let engine = Engine::builder()
            .local_identity("L")
            .node_timeout(Duration::ZERO)
            .sweep_interval(Duration::ZERO)
            .build();
        engine.apply_at(&packet("a", "b"), 0);

        let handle = engine.start_sweeper();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(engine.store().snapshot().is_empty());

        engine.apply_at(&packet("c", "d"), 0);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(engine.store().snapshot().is_empty());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn attached_channel_output_receives_updates() {
        let engine = engine();
        let (output, mut rx) = Output::channel(16);
        let task = engine.attach(output);

        engine.apply_at(&packet("a", "b"), 1);

        assert_eq!(rx.recv().await.unwrap().kind(), "full");
        let update = rx.recv().await.unwrap();
        assert_eq!(update.as_full().unwrap().stats.total_nodes, 2);

        task.abort();
    }
}
