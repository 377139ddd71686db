//! The HTTP/2 priority dependency tree.
//!
//! A rooted tree of per-stream nodes (RFC 7540 §5.3). Mutations keep three
//! interlocked facts true for every node:
//!
//! - it sits in its parent's pseudo-time queue exactly when its subtree
//!   holds at least one active node and it is not mid-distribution;
//! - its parent's `total_queued_weights` is the weight sum of that queue;
//! - `active_count_for_tree` equals its own activity plus its children's
//!   counts.
//!
//! Re-parenting detaches the moved node's activity from the old ancestor
//! chain immediately and re-attaches it when the caller delivers the
//! [`ParentChanged`] events, so a batch of moves settles in one pass.

use std::collections::HashMap;

use braid_core::StreamId;

use crate::node::{Node, NodeArena, NodeKey, DEPTH_PARENTLESS};

/// Records that `node`'s parent link changed during a tree mutation.
///
/// The distributor replays these to re-sort retention priorities and to
/// seat moved subtrees in their new parents' queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ParentChanged {
    pub(crate) node: NodeKey,
    pub(crate) old_parent: Option<NodeKey>,
}

/// The dependency tree: an arena of priority nodes rooted at the connection
/// node, indexed by stream id.
#[derive(Debug)]
pub(crate) struct PriorityTree {
    arena: NodeArena,
    root: NodeKey,
    index: HashMap<StreamId, NodeKey>,
}

impl PriorityTree {
    pub(crate) fn new() -> Self {
        let mut arena = NodeArena::default();
        let mut root_node = Node::new(StreamId::CONNECTION);
        root_node.has_stream = true;
        root_node.depth = 0;
        let root = arena.insert(root_node);
        let mut index = HashMap::new();
        index.insert(StreamId::CONNECTION, root);
        Self { arena, root, index }
    }

    pub(crate) const fn root(&self) -> NodeKey {
        self.root
    }

    pub(crate) fn lookup(&self, id: StreamId) -> Option<NodeKey> {
        self.index.get(&id).copied()
    }

    pub(crate) fn node(&self, key: NodeKey) -> &Node {
        self.arena.node(key)
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> &mut Node {
        self.arena.node_mut(key)
    }

    pub(crate) fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub(crate) fn arena_mut(&mut self) -> &mut NodeArena {
        &mut self.arena
    }

    /// Number of indexed nodes, the connection root included.
    pub(crate) fn node_count(&self) -> usize {
        self.index.len()
    }

    /// Creates a detached node for `id` and registers it in the index.
    pub(crate) fn create_node(&mut self, id: StreamId) -> NodeKey {
        debug_assert!(!self.index.contains_key(&id), "duplicate node for {id}");
        let key = self.arena.insert(Node::new(id));
        self.index.insert(id, key);
        key
    }

    /// Frees a node that is no longer linked anywhere.
    pub(crate) fn release_node(&mut self, key: NodeKey) {
        let node = self.arena.remove(key);
        debug_assert!(node.parent.is_none(), "releasing a linked node");
        debug_assert!(
            !node.in_parent_queue() && !node.is_retained(),
            "releasing a queued node"
        );
        self.index.remove(&node.stream_id);
    }

    /// Walks parent links from `node`; true if `ancestor` is on the path.
    pub(crate) fn is_descendant_of(&self, node: NodeKey, ancestor: NodeKey) -> bool {
        let mut next = self.arena.node(node).parent;
        while let Some(key) = next {
            if key == ancestor {
                return true;
            }
            next = self.arena.node(key).parent;
        }
        false
    }

    /// Moves `child` under `parent`, appending one event per re-parented
    /// node. With `exclusive`, every previous child of `parent` is adopted
    /// by `child` afterward.
    pub(crate) fn take_child(
        &mut self,
        parent: NodeKey,
        child: NodeKey,
        exclusive: bool,
        events: &mut Vec<ParentChanged>,
    ) {
        let old_parent = self.arena.node(child).parent;
        if old_parent != Some(parent) {
            events.push(ParentChanged {
                node: child,
                old_parent,
            });
            self.set_parent(child, Some(parent));
            let child_id = self.arena.node(child).stream_id;
            if let Some(old) = old_parent {
                self.arena.node_mut(old).children.remove(&child_id);
            }
            self.arena.node_mut(parent).children.insert(child_id, child);
        }
        if exclusive {
            let adopted: Vec<NodeKey> = self
                .arena
                .node(parent)
                .children
                .values()
                .copied()
                .filter(|&key| key != child)
                .collect();
            for sibling in adopted {
                self.take_child(child, sibling, false, events);
            }
        }
    }

    /// Unlinks `child` from `parent`; grandchildren move up onto `parent`.
    pub(crate) fn remove_child(&mut self, parent: NodeKey, child: NodeKey) -> Vec<ParentChanged> {
        let child_id = self.arena.node(child).stream_id;
        let mut events = Vec::new();
        if self.arena.node_mut(parent).children.remove(&child_id).is_some() {
            events.push(ParentChanged {
                node: child,
                old_parent: Some(parent),
            });
            self.set_parent(child, None);
            let grandchildren: Vec<NodeKey> =
                self.arena.node(child).children.values().copied().collect();
            for grandchild in grandchildren {
                self.take_child(parent, grandchild, false, &mut events);
            }
        }
        events
    }

    /// Rebinds `node` to `new_parent`, detaching its subtree's activity
    /// from the old ancestor chain. The caller re-attaches via event
    /// delivery once the whole mutation is done.
    fn set_parent(&mut self, node: NodeKey, new_parent: Option<NodeKey>) {
        let count = self.arena.node(node).active_count_for_tree;
        if count != 0 {
            if let Some(old) = self.arena.node(node).parent {
                self.remove_from_queue(old, node);
                self.active_count_change_for_tree(old, -i64::from(count));
            }
        }
        let depth = match new_parent {
            Some(parent) => self.arena.node(parent).depth.saturating_add(1),
            None => DEPTH_PARENTLESS,
        };
        let entry = self.arena.node_mut(node);
        entry.parent = new_parent;
        entry.depth = depth;
    }

    /// Adds `delta` to the subtree counts from `start` up to the root,
    /// seating and unseating nodes in their parents' queues as counts
    /// cross zero.
    pub(crate) fn active_count_change_for_tree(&mut self, start: NodeKey, delta: i64) {
        debug_assert_ne!(delta, 0);
        let mut key = start;
        loop {
            let node = self.arena.node_mut(key);
            let updated = i64::from(node.active_count_for_tree) + delta;
            debug_assert!(updated >= 0, "active subtree count underflow");
            node.active_count_for_tree = u32::try_from(updated.max(0)).expect("active count overflow");
            let Some(parent) = node.parent else { break };
            if updated == 0 {
                self.remove_from_queue(parent, key);
            } else if updated == delta && !self.arena.node(key).distributing {
                // First active descendant appeared; join the parent's queue
                // unless the budget walk holds this node popped right now.
                self.offer_and_initialize(parent, key);
            }
            key = parent;
        }
    }

    /// Seats `child` in `parent`'s queue at the parent's current virtual
    /// clock, so a new arrival does not jump ahead of waiting siblings.
    pub(crate) fn offer_and_initialize(&mut self, parent: NodeKey, child: NodeKey) {
        let now = self.arena.node(parent).pseudo_time;
        self.arena.node_mut(child).pseudo_time_to_write = now;
        self.offer(parent, child);
    }

    /// Re-seats `child` in `parent`'s queue, keeping its current deadline.
    pub(crate) fn offer(&mut self, parent: NodeKey, child: NodeKey) {
        let mut queue = std::mem::take(&mut self.arena.node_mut(parent).queue);
        let offered = queue.push(&mut self.arena, child);
        self.arena.node_mut(parent).queue = queue;
        if offered {
            let weight = u64::from(self.arena.node(child).weight.get());
            self.arena.node_mut(parent).total_queued_weights += weight;
        }
    }

    pub(crate) fn remove_from_queue(&mut self, parent: NodeKey, child: NodeKey) {
        let mut queue = std::mem::take(&mut self.arena.node_mut(parent).queue);
        let removed = queue.remove(&mut self.arena, child);
        self.arena.node_mut(parent).queue = queue;
        if removed {
            let weight = u64::from(self.arena.node(child).weight.get());
            self.arena.node_mut(parent).total_queued_weights -= weight;
        }
    }

    /// Pops the child with the earliest deadline from `parent`'s queue.
    pub(crate) fn poll_child(&mut self, parent: NodeKey) -> Option<NodeKey> {
        let mut queue = std::mem::take(&mut self.arena.node_mut(parent).queue);
        let polled = queue.poll(&mut self.arena);
        self.arena.node_mut(parent).queue = queue;
        if let Some(child) = polled {
            let weight = u64::from(self.arena.node(child).weight.get());
            self.arena.node_mut(parent).total_queued_weights -= weight;
        }
        polled
    }

    pub(crate) fn peek_child(&self, parent: NodeKey) -> Option<NodeKey> {
        self.arena.node(parent).queue.peek()
    }
}
