//! Subscriber registry and update rendering.
//!
//! Messages are rendered and enqueued while the caller still holds the store
//! lock, so every subscriber sees them in mutation order. Enqueueing uses
//! `try_send` and never waits on a slow subscriber.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nettopo_types::{
    EdgeKey, EdgeRecord, EdgeUpdate, FullUpdate, GraphTotals, NodeId, NodeRecord, PathRecord,
    PathUpdate, UpdateMessage,
};
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::builder::Diff;
use crate::store::GraphState;

/// Default per-subscriber queue length.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Identifies a registered subscriber.
pub type SubscriberId = u64;

/// Which message a diff calls for.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Full,
    Edge(EdgeKey),
    Path { destination: NodeId, route: Vec<NodeId> },
}

impl Emission {
    /// Pick the message for an applied event.
    ///
    /// New nodes always resend the whole graph. A traceroute that only added
    /// edges does too, since the incremental edge message carries one edge.
    pub fn for_diff(diff: &Diff) -> Self {
        match diff {
            Diff::Packet { new_nodes, .. } if !new_nodes.is_empty() => Emission::Full,
            Diff::Packet { edge, .. } => Emission::Edge(edge.clone()),
            Diff::Traceroute {
                new_nodes,
                new_edges,
                ..
            } if !new_nodes.is_empty() || !new_edges.is_empty() => Emission::Full,
            Diff::Traceroute {
                destination, route, ..
            } => Emission::Path {
                destination: destination.clone(),
                route: route.clone(),
            },
        }
    }
}

/// Build a full snapshot message from `state`.
pub fn full_update(state: &GraphState) -> FullUpdate {
    FullUpdate {
        nodes: state.nodes.values().map(NodeRecord::from).collect(),
        edges: state.edges.values().map(EdgeRecord::full).collect(),
        paths: state
            .paths
            .iter()
            .map(|(dst, path)| (dst.clone(), PathRecord::from(path)))
            .collect(),
        stats: GraphTotals {
            total_nodes: state.nodes.len(),
            total_edges: state.edges.len(),
            total_paths: state.paths.len(),
        },
    }
}

/// Render `emission` against the state it was computed from.
pub fn render(state: &GraphState, emission: &Emission) -> UpdateMessage {
    match emission {
        Emission::Full => UpdateMessage::Full(full_update(state)),
        Emission::Edge(key) => match state.edges.get(key) {
            Some(edge) => UpdateMessage::Edge(EdgeUpdate {
                edge: EdgeRecord::counters(edge),
            }),
            None => UpdateMessage::Full(full_update(state)),
        },
        Emission::Path { destination, route } => UpdateMessage::PathUpdate(PathUpdate {
            destination_id: destination.clone(),
            path: route.clone(),
        }),
    }
}

/// A registered subscriber's end of the queue.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<Arc<UpdateMessage>>,
}

impl Subscription {
    /// Wait for the next message. `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<Arc<UpdateMessage>> {
        self.receiver.recv().await
    }

    /// Take a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<UpdateMessage>> {
        self.receiver.try_recv().ok()
    }
}

/// Explicit publish/subscribe registry.
#[derive(Debug)]
pub struct Publisher {
    subscribers: RwLock<BTreeMap<SubscriberId, mpsc::Sender<Arc<UpdateMessage>>>>,
    next_id: AtomicU64,
    capacity: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl Publisher {
    /// Create a registry whose subscriber queues hold `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.register(None)
    }

    /// Register a subscriber whose queue starts with `initial`.
    pub fn subscribe_with(&self, initial: UpdateMessage) -> Subscription {
        self.register(Some(initial))
    }

    fn register(&self, initial: Option<UpdateMessage>) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.capacity);
        if let Some(message) = initial {
            // The queue is empty and its capacity is at least one.
            let _ = tx.try_send(Arc::new(message));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().insert(id, tx);
        debug!(subscriber = id, "subscriber registered");

        Subscription { id, receiver }
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.write().remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver `message` to every subscriber. Returns how many accepted it.
    pub fn publish(&self, message: UpdateMessage) -> usize {
        self.publish_with(|| message)
    }

    /// Like [`publish`](Self::publish), but only renders the message when
    /// someone is subscribed.
    pub fn publish_with(&self, render: impl FnOnce() -> UpdateMessage) -> usize {
        let mut closed = Vec::new();
        let delivered = {
            let subscribers = self.subscribers.read();
            if subscribers.is_empty() {
                return 0;
            }

            let message = Arc::new(render());
            trace!(kind = message.kind(), subscribers = subscribers.len(), "publishing update");
            self.published.fetch_add(1, Ordering::Relaxed);

            let mut delivered = 0;
            for (id, tx) in subscribers.iter() {
                match tx.try_send(message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        debug!(subscriber = id, "subscriber queue full, update dropped");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
            delivered
        };

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in closed {
                subscribers.remove(&id);
                debug!(subscriber = id, "pruned closed subscriber");
            }
        }

        delivered
    }

    /// Messages rendered and offered to at least one subscriber.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Deliveries skipped because a subscriber queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}
