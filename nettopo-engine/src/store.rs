//! The graph store: nodes, edges and traceroute paths behind one lock.
//!
//! Every mutation runs under a single write lock for its whole
//! read-modify-write, so the ingest worker and the sweeper never interleave
//! on the same entity and readers never see a half-applied event. Readers
//! take a cloned snapshot under the read lock and work on that copy.

use std::collections::{BTreeMap, BTreeSet};

use nettopo_types::{Edge, EdgeKey, Node, NodeId, TimestampMs, TraceroutePath};
use parking_lot::RwLock;

/// The three entity collections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphState {
    pub nodes: BTreeMap<NodeId, Node>,
    pub edges: BTreeMap<EdgeKey, Edge>,
    pub paths: BTreeMap<NodeId, TraceroutePath>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `fresh` if its identity is new, otherwise touch the stored node.
    ///
    /// Returns `true` when the node was created.
    pub fn upsert_node(&mut self, fresh: Node) -> bool {
        match self.nodes.get_mut(&fresh.id) {
            Some(node) => {
                node.touch(first_protocol(&fresh.protocols), fresh.last_seen);
                node.protocols.extend(fresh.protocols);
                false
            }
            None => {
                self.nodes.insert(fresh.id.clone(), fresh);
                true
            }
        }
    }

    /// Insert `fresh` if its key is new, otherwise touch the stored edge.
    ///
    /// Returns `true` when the edge was created.
    pub fn upsert_edge(&mut self, fresh: Edge) -> bool {
        match self.edges.get_mut(&fresh.key) {
            Some(edge) => {
                edge.touch(first_protocol(&fresh.protocols), fresh.last_seen);
                edge.protocols.extend(fresh.protocols);
                false
            }
            None => {
                self.edges.insert(fresh.key.clone(), fresh);
                true
            }
        }
    }

    /// Store `path`, discarding whatever was stored for its destination.
    pub fn replace_path(&mut self, path: TraceroutePath) -> Option<TraceroutePath> {
        self.paths.insert(path.destination.clone(), path)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&Edge> {
        self.edges.get(&EdgeKey::new(source, target))
    }

    pub fn path(&self, destination: &str) -> Option<&TraceroutePath> {
        self.paths.get(destination)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty() && self.paths.is_empty()
    }

    /// Drop every entity idle for strictly longer than `timeout_ms`.
    ///
    /// Nodes, edges and paths are judged independently; removing a node
    /// never removes the edges that reference it.
    pub fn evict_idle(&mut self, now: TimestampMs, timeout_ms: u64) -> Evicted {
        let mut evicted = Evicted::default();

        self.nodes.retain(|id, node| {
            let keep = node.idle_for(now) <= timeout_ms;
            if !keep {
                evicted.nodes.push(id.clone());
            }
            keep
        });
        self.edges.retain(|key, edge| {
            let keep = edge.idle_for(now) <= timeout_ms;
            if !keep {
                evicted.edges.push(key.clone());
            }
            keep
        });
        self.paths.retain(|destination, path| {
            let keep = path.idle_for(now) <= timeout_ms;
            if !keep {
                evicted.paths.push(destination.clone());
            }
            keep
        });

        evicted
    }
}

fn first_protocol(protocols: &BTreeSet<String>) -> &str {
    protocols.first().map(String::as_str).unwrap_or("UNKNOWN")
}

/// Identities removed by one eviction pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evicted {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeKey>,
    pub paths: Vec<NodeId>,
}

impl Evicted {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty() && self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len() + self.paths.len()
    }
}

/// Shared owner of the graph state.
#[derive(Debug, Default)]
pub struct GraphStore {
    state: RwLock<GraphState>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the state.
    ///
    /// `f` must not block on external I/O.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut GraphState) -> T) -> T {
        let mut state = self.state.write();
        f(&mut state)
    }

    /// Run `f` against the current state while holding the read lock.
    ///
    /// Mutations wait until `f` returns, so keep it short.
    pub fn read<T>(&self, f: impl FnOnce(&GraphState) -> T) -> T {
        let state = self.state.read();
        f(&state)
    }

    /// A consistent copy of the state.
    pub fn snapshot(&self) -> GraphState {
        self.state.read().clone()
    }

    /// Entity counts: (nodes, edges, paths).
    pub fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.read();
        (state.nodes.len(), state.edges.len(), state.paths.len())
    }
}
