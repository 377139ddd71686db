//! Per-stream priority state and the arena that owns it.

use std::collections::BTreeMap;

use braid_core::{StreamId, Weight};

use crate::heap::{HeapKind, IndexedHeap, NOT_IN_HEAP};

/// Depth reported by a node that currently has no parent (detached,
/// non-root). Treated as infinitely far from the root by the retention
/// ordering.
pub(crate) const DEPTH_PARENTLESS: u32 = u32::MAX;

/// Stable handle to a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey(u32);

impl NodeKey {
    const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Scheduling state for one stream, live or priority-only.
///
/// One node exists per stream id the distributor has observed, subject to
/// the state-only retention limit. The connection root is a node like any
/// other except that it is never active and never enqueued anywhere.
#[derive(Debug)]
pub(crate) struct Node {
    /// Stream this node schedules; the connection root uses id 0.
    pub(crate) stream_id: StreamId,
    /// Whether a live stream object is currently attached.
    pub(crate) has_stream: bool,
    /// Sticky: set once the stream was ever reserved or activated.
    pub(crate) stream_activated_or_reserved: bool,
    /// Eligible to receive bytes: pending frame plus non-negative window.
    pub(crate) active: bool,
    /// Set while the budget walk has popped this node and not yet re-seated
    /// it; blocks re-enqueue from nested state changes.
    pub(crate) distributing: bool,
    /// Proportional share of the parent's bandwidth.
    pub(crate) weight: Weight,
    /// Distance from the connection root; the root is 0.
    pub(crate) depth: u32,
    pub(crate) parent: Option<NodeKey>,
    /// Children keyed by stream id.
    pub(crate) children: BTreeMap<StreamId, NodeKey>,
    /// Bytes the upstream currently has ready for this stream.
    pub(crate) streamable_bytes: u32,
    /// Number of active nodes in this subtree, including self.
    pub(crate) active_count_for_tree: u32,
    /// Virtual clock, advanced as this node's subtree is serviced.
    pub(crate) pseudo_time: u64,
    /// This node's deadline within its parent's queue.
    pub(crate) pseudo_time_to_write: u64,
    /// Sum of the weights of children currently in `queue`.
    pub(crate) total_queued_weights: u64,
    /// Children ordered by `pseudo_time_to_write`.
    pub(crate) queue: IndexedHeap,
    /// Position in the parent's queue; -1 when not enqueued.
    queue_slot: i32,
    /// Position in the distributor's retention heap; -1 when not retained.
    retain_slot: i32,
}

impl Node {
    pub(crate) fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            has_stream: false,
            stream_activated_or_reserved: false,
            active: false,
            distributing: false,
            weight: Weight::DEFAULT,
            depth: DEPTH_PARENTLESS,
            parent: None,
            children: BTreeMap::new(),
            streamable_bytes: 0,
            active_count_for_tree: 0,
            pseudo_time: 0,
            pseudo_time_to_write: 0,
            total_queued_weights: 0,
            queue: IndexedHeap::new(HeapKind::PseudoTime),
            queue_slot: NOT_IN_HEAP,
            retain_slot: NOT_IN_HEAP,
        }
    }

    pub(crate) const fn heap_slot(&self, kind: HeapKind) -> i32 {
        match kind {
            HeapKind::PseudoTime => self.queue_slot,
            HeapKind::Retention => self.retain_slot,
        }
    }

    pub(crate) fn set_heap_slot(&mut self, kind: HeapKind, slot: i32) {
        match kind {
            HeapKind::PseudoTime => self.queue_slot = slot,
            HeapKind::Retention => self.retain_slot = slot,
        }
    }

    /// Whether this node sits in its parent's pseudo-time queue.
    pub(crate) const fn in_parent_queue(&self) -> bool {
        self.queue_slot != NOT_IN_HEAP
    }

    /// Whether this node sits in the state-only retention heap.
    pub(crate) const fn is_retained(&self) -> bool {
        self.retain_slot != NOT_IN_HEAP
    }
}

/// Free-list arena owning every node for the distributor's lifetime.
///
/// Keys stay stable across unrelated removals; a freed slot is only reused
/// by a later insert. All cross-node links (parent pointers, child maps,
/// heap contents) hold `NodeKey`s into this arena, so tree mutation never
/// fights the borrow checker over ownership.
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    entries: Vec<Option<Node>>,
    free: Vec<u32>,
}

impl NodeArena {
    pub(crate) fn insert(&mut self, node: Node) -> NodeKey {
        if let Some(index) = self.free.pop() {
            self.entries[index as usize] = Some(node);
            NodeKey(index)
        } else {
            let index = u32::try_from(self.entries.len()).expect("node arena overflow");
            self.entries.push(Some(node));
            NodeKey(index)
        }
    }

    pub(crate) fn remove(&mut self, key: NodeKey) -> Node {
        let node = self.entries[key.index()]
            .take()
            .expect("removing vacant node slot");
        self.free.push(key.0);
        node
    }

    pub(crate) fn node(&self, key: NodeKey) -> &Node {
        self.entries[key.index()].as_ref().expect("vacant node slot")
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> &mut Node {
        self.entries[key.index()].as_mut().expect("vacant node slot")
    }

    /// Number of live nodes.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_reuses_freed_slots() {
        let mut arena = NodeArena::default();
        let a = arena.insert(Node::new(StreamId::new(1)));
        let b = arena.insert(Node::new(StreamId::new(3)));
        assert_eq!(arena.len(), 2);

        let removed = arena.remove(a);
        assert_eq!(removed.stream_id, StreamId::new(1));
        assert_eq!(arena.len(), 1);

        let c = arena.insert(Node::new(StreamId::new(5)));
        assert_eq!(c, a); // Slot reused.
        assert_eq!(arena.node(c).stream_id, StreamId::new(5));
        assert_eq!(arena.node(b).stream_id, StreamId::new(3));
    }

    #[test]
    fn test_new_node_defaults() {
        let node = Node::new(StreamId::new(7));
        assert_eq!(node.weight, Weight::DEFAULT);
        assert_eq!(node.depth, DEPTH_PARENTLESS);
        assert!(!node.active);
        assert!(!node.in_parent_queue());
        assert!(!node.is_retained());
        assert_eq!(node.active_count_for_tree, 0);
    }
}
