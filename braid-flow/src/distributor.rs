//! Weighted fair byte distribution over the priority tree.
//!
//! The distributor turns a byte budget into per-stream write calls. Each
//! pass descends from the connection root along the child with the earliest
//! pseudo-time deadline until it reaches an active stream, writes there, and
//! advances virtual clocks on the way back up so that siblings are serviced
//! in proportion to their weights over time. The scheme follows CFS-style
//! virtual-time scheduling, allocating bytes instead of CPU time.
//!
//! Priority state for streams the connection no longer tracks is retained in
//! a bounded heap so late PRIORITY frames still land; the lowest-value state
//! is evicted first when the bound is exceeded.

use std::cmp::Ordering;

use braid_core::{ErrorCode, StreamEventListener, StreamId, StreamState, Weight};
use tracing::{debug, trace};

use crate::config::DistributorConfig;
use crate::error::{FlowError, FlowResult};
use crate::heap::{self, HeapKind, IndexedHeap};
use crate::node::NodeKey;
use crate::tree::{ParentChanged, PriorityTree};

/// Sink for the per-stream write calls emitted by
/// [`WeightedFairDistributor::distribute`].
pub trait FrameWriter {
    /// Writes `num_bytes` for `stream_id`.
    ///
    /// The implementation should consume exactly `num_bytes` of the stream's
    /// pending data and emit at least one frame; a zero-byte call asks for
    /// an empty frame so a stalled stream can still make protocol progress.
    ///
    /// # Errors
    /// Any error aborts the distribution pass and surfaces as an
    /// INTERNAL_ERROR connection error.
    fn write(
        &mut self,
        stream_id: StreamId,
        num_bytes: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A per-stream write-readiness report from the codec's flow controller.
#[derive(Debug, Clone, Copy)]
pub struct StreamReadiness {
    /// Stream the report is about.
    pub stream_id: StreamId,
    /// Bytes queued for the stream, before flow-control clamping.
    pub pending_bytes: u32,
    /// Whether any frame is queued for the stream (possibly empty).
    pub has_frame: bool,
    /// Current flow-control window. May be negative after a SETTINGS
    /// decrease of the initial window size.
    pub window_size: i32,
}

impl StreamReadiness {
    /// Bytes the stream could write right now.
    #[must_use]
    pub const fn streamable_bytes(&self) -> u32 {
        if self.window_size <= 0 {
            return 0;
        }
        #[allow(clippy::cast_sign_loss)] // Checked positive above.
        let window = self.window_size as u32;
        if self.pending_bytes < window {
            self.pending_bytes
        } else {
            window
        }
    }

    /// Whether the stream is eligible to be allocated bytes at all.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.has_frame && self.window_size >= 0
    }
}

/// Point-in-time counters describing the distributor.
#[derive(Debug, Clone, Copy)]
pub struct DistributorStats {
    /// Streams with priority state, live or retained (the connection root
    /// is not counted).
    pub stream_count: usize,
    /// Priority-only nodes currently held in the retention set.
    pub retained_count: usize,
    /// Streams currently eligible to receive bytes.
    pub active_streams: u32,
    /// Total bytes handed to the writer across all passes.
    pub total_bytes_distributed: u64,
    /// Total writer invocations, empty frames included.
    pub total_writes: u64,
}

/// One level of the budget walk: `child` was popped from `parent`'s queue
/// under the queued-weight sum saved before the pop.
struct WalkFrame {
    parent: NodeKey,
    child: NodeKey,
    queued_weights: u64,
}

/// Distributes byte budgets across streams in proportion to their priority
/// weights, honoring the RFC 7540 dependency tree.
///
/// All methods are synchronous and must be called from the connection's
/// executor; the distributor holds no locks and shares no state.
pub struct WeightedFairDistributor {
    tree: PriorityTree,
    /// Priority-only nodes, minimum first to evict.
    retention: IndexedHeap,
    allocation_quantum: u32,
    max_state_only_size: u32,
    total_bytes_distributed: u64,
    total_writes: u64,
}

impl WeightedFairDistributor {
    /// Creates a distributor for one connection.
    ///
    /// # Errors
    /// Returns [`FlowError::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: DistributorConfig) -> FlowResult<Self> {
        config.validate()?;
        Ok(Self {
            tree: PriorityTree::new(),
            retention: IndexedHeap::new(HeapKind::Retention),
            allocation_quantum: config.allocation_quantum,
            max_state_only_size: config.max_state_only_size,
            total_bytes_distributed: 0,
            total_writes: 0,
        })
    }

    /// Replaces the per-step minimum allotment.
    ///
    /// # Errors
    /// Returns [`FlowError::InvalidConfig`] for a zero quantum.
    pub fn set_allocation_quantum(&mut self, quantum: u32) -> FlowResult<()> {
        if quantum == 0 {
            return Err(FlowError::InvalidConfig {
                name: "allocation_quantum",
                reason: "must be positive",
            });
        }
        self.allocation_quantum = quantum;
        Ok(())
    }

    /// Folds a write-readiness report into the stream's scheduling state.
    pub fn update_streamable_bytes(&mut self, readiness: StreamReadiness) {
        let Some(key) = self.tree.lookup(readiness.stream_id) else {
            debug_assert!(false, "readiness report for unknown {}", readiness.stream_id);
            return;
        };
        self.set_activity(key, readiness.streamable_bytes(), readiness.is_active());
    }

    /// Applies a PRIORITY frame: `child` depends on `parent` with `weight`,
    /// exclusively if requested.
    ///
    /// Unknown stream ids are not errors; they instantiate retained
    /// priority-only nodes, or are ignored when retention is disabled.
    pub fn update_dependency_tree(
        &mut self,
        child_id: StreamId,
        parent_id: StreamId,
        weight: Weight,
        exclusive: bool,
    ) {
        if child_id.is_connection() || child_id == parent_id {
            // RFC 7540 §5.3.1: the codec rejects these as PROTOCOL_ERROR
            // before they reach the scheduler.
            debug_assert!(false, "self-dependent or connection-stream PRIORITY");
            return;
        }
        trace!(
            child = child_id.get(),
            parent = parent_id.get(),
            weight = weight.get(),
            exclusive,
            "updating dependency tree"
        );
        let Some(child) = self.resolve_or_create_child(child_id) else {
            return;
        };
        let Some(parent) = self.resolve_or_create_parent(parent_id) else {
            return;
        };

        // Correct the queued-weight sum before the weight itself changes.
        // Outside a distribution pass, a positive subtree count means the
        // child is seated in its parent's queue under the old weight.
        let (active_count, seated_under, old_weight) = {
            let node = self.tree.node(child);
            (node.active_count_for_tree, node.parent, node.weight)
        };
        if active_count != 0 {
            if let Some(seated_under) = seated_under {
                let delta = i64::from(weight.get()) - i64::from(old_weight.get());
                if delta != 0 {
                    let parent_node = self.tree.node_mut(seated_under);
                    let total = i64::try_from(parent_node.total_queued_weights)
                        .expect("queued weight sum overflow")
                        + delta;
                    debug_assert!(total >= 0, "queued weight sum underflow");
                    parent_node.total_queued_weights =
                        u64::try_from(total.max(0)).expect("queued weight sum underflow");
                }
            }
        }
        self.tree.node_mut(child).weight = weight;

        let parent_changed = self.tree.node(child).parent != Some(parent);
        if parent_changed || (exclusive && self.tree.node(parent).children.len() != 1) {
            let mut events = Vec::new();
            if self.tree.is_descendant_of(parent, child) {
                // The new parent sits below the child; lift it up beside the
                // child first so the move cannot create a cycle.
                if let Some(child_parent) = self.tree.node(child).parent {
                    self.tree.take_child(child_parent, parent, false, &mut events);
                } else {
                    debug_assert!(false, "descendant of a detached node");
                }
            }
            self.tree.take_child(parent, child, exclusive, &mut events);
            self.notify_parent_changed(&events);
        }
        self.trim_state_only();
    }

    /// Writes up to `max_bytes` across active streams in priority order.
    /// Returns whether any stream is still active afterwards.
    ///
    /// With a zero budget and at least one active stream, a single
    /// zero-byte write is still issued so the selected stream can emit an
    /// empty frame.
    ///
    /// # Errors
    /// [`FlowError::Connection`] when the writer fails (the scheduling state
    /// stays consistent and later calls may proceed), or
    /// [`FlowError::CorruptedState`] if internal invariants are broken.
    pub fn distribute<W: FrameWriter>(
        &mut self,
        max_bytes: u32,
        writer: &mut W,
    ) -> FlowResult<bool> {
        if self.active_streams() == 0 {
            return Ok(false);
        }
        let mut budget = max_bytes;
        loop {
            let before = self.active_streams();
            let sent = self.distribute_pass(budget, writer)?;
            self.total_bytes_distributed += u64::from(sent);
            budget = budget.saturating_sub(sent);
            let after = self.active_streams();
            // Stop once nothing is active, or once the budget is gone and
            // the pass no longer changes the active set.
            if after == 0 || (budget == 0 && after == before) {
                break;
            }
        }
        Ok(self.active_streams() != 0)
    }

    /// Point-in-time counters.
    #[must_use]
    pub fn stats(&self) -> DistributorStats {
        DistributorStats {
            stream_count: self.tree.node_count() - 1,
            retained_count: self.retention.len(),
            active_streams: self.active_streams(),
            total_bytes_distributed: self.total_bytes_distributed,
            total_writes: self.total_writes,
        }
    }

    fn active_streams(&self) -> u32 {
        self.tree.node(self.tree.root()).active_count_for_tree
    }

    /// One walk from the root to a single stream write: descend along
    /// earliest-deadline children, write at the first active node, then
    /// unwind, re-seating every popped node. The unwind also runs when the
    /// writer fails, so flags and queue membership survive the error.
    fn distribute_pass<W: FrameWriter>(
        &mut self,
        max_bytes: u32,
        writer: &mut W,
    ) -> FlowResult<u32> {
        let mut frames: Vec<WalkFrame> = Vec::new();
        let mut node = self.tree.root();
        let mut budget = max_bytes;

        let outcome = loop {
            let queued_weights = self.tree.node(node).total_queued_weights;
            let Some(child) = self.tree.poll_child(node) else {
                debug_assert!(false, "active subtree with an empty pseudo-time queue");
                break Err(FlowError::CorruptedState {
                    details: "active subtree with an empty pseudo-time queue",
                });
            };
            self.tree.node_mut(child).distributing = true;
            let quota = match self.tree.peek_child(node) {
                None => budget,
                Some(next) => {
                    let child_deadline = self.tree.node(child).pseudo_time_to_write;
                    let next_deadline = self.tree.node(next).pseudo_time_to_write;
                    debug_assert!(
                        !heap::pseudo_time_before(next_deadline, child_deadline),
                        "pseudo-time queue yielded a later deadline first"
                    );
                    let lead = next_deadline.wrapping_sub(child_deadline);
                    let weight = u64::from(self.tree.node(child).weight.get());
                    // Bytes that bring this child's deadline level with the
                    // runner-up, plus a quantum to amortize per-write cost.
                    let catch_up = u128::from(lead) * u128::from(weight)
                        / u128::from(queued_weights)
                        + u128::from(self.allocation_quantum);
                    #[allow(clippy::cast_possible_truncation)] // Clamped to the u32 budget.
                    let quota = u128::from(budget).min(catch_up) as u32;
                    quota
                }
            };
            frames.push(WalkFrame {
                parent: node,
                child,
                queued_weights,
            });

            if self.tree.node(child).active {
                let num_bytes = quota.min(self.tree.node(child).streamable_bytes);
                let stream_id = self.tree.node(child).stream_id;
                break match writer.write(stream_id, num_bytes) {
                    Ok(()) => {
                        self.total_writes += 1;
                        if num_bytes == 0 && quota != 0 {
                            // The stream had its chance and produced
                            // nothing; deactivate it so it stops blocking
                            // siblings until the flow controller reports
                            // again.
                            let streamable = self.tree.node(child).streamable_bytes;
                            self.set_activity(child, streamable, false);
                        }
                        Ok(num_bytes)
                    }
                    Err(source) => Err(FlowError::Connection {
                        code: ErrorCode::InternalError,
                        message: format!("byte distribution write error: {source}"),
                    }),
                };
            }
            node = child;
            budget = quota;
        };

        for frame in frames.iter().rev() {
            if let Ok(sent) = &outcome {
                let sent = u64::from(*sent);
                let parent_time = {
                    let parent = self.tree.node_mut(frame.parent);
                    parent.pseudo_time = parent.pseudo_time.wrapping_add(sent);
                    parent.pseudo_time
                };
                let child = self.tree.node_mut(frame.child);
                // A deadline ahead of the parent's clock means an earlier
                // quota was not fully used; clamp before charging.
                let base = heap::pseudo_time_min(child.pseudo_time_to_write, parent_time);
                #[allow(clippy::cast_possible_truncation)] // Modular pseudo-time.
                let advance = (u128::from(sent) * u128::from(frame.queued_weights)
                    / u128::from(child.weight.get())) as u64;
                child.pseudo_time_to_write = base.wrapping_add(advance);
            }
            self.tree.node_mut(frame.child).distributing = false;
            if self.tree.node(frame.child).active_count_for_tree != 0 {
                self.tree.offer(frame.parent, frame.child);
            }
        }
        outcome
    }

    /// Applies an activity flip and the new streamable byte count.
    fn set_activity(&mut self, key: NodeKey, streamable_bytes: u32, is_active: bool) {
        if self.tree.node(key).active != is_active {
            if is_active {
                self.tree.active_count_change_for_tree(key, 1);
                self.tree.node_mut(key).active = true;
            } else {
                self.tree.active_count_change_for_tree(key, -1);
                self.tree.node_mut(key).active = false;
            }
        }
        self.tree.node_mut(key).streamable_bytes = streamable_bytes;
    }

    fn resolve_or_create_child(&mut self, id: StreamId) -> Option<NodeKey> {
        if let Some(key) = self.tree.lookup(id) {
            return Some(key);
        }
        if self.max_state_only_size == 0 {
            return None;
        }
        let key = self.tree.create_node(id);
        self.retention.push(self.tree.arena_mut(), key);
        Some(key)
    }

    fn resolve_or_create_parent(&mut self, id: StreamId) -> Option<NodeKey> {
        if let Some(key) = self.tree.lookup(id) {
            return Some(key);
        }
        if self.max_state_only_size == 0 {
            return None;
        }
        let key = self.tree.create_node(id);
        self.retention.push(self.tree.arena_mut(), key);
        // A synthetic parent hangs off the connection root until a later
        // PRIORITY frame places it.
        let mut events = Vec::with_capacity(1);
        let root = self.tree.root();
        self.tree.take_child(root, key, false, &mut events);
        self.notify_parent_changed(&events);
        Some(key)
    }

    /// Replays a batch of parent changes: retention priorities re-sort on
    /// the new depths, and moved subtrees that carry activity are seated in
    /// their new parents' queues.
    fn notify_parent_changed(&mut self, events: &[ParentChanged]) {
        for event in events {
            self.retention.update(self.tree.arena_mut(), event.node);
            let node = self.tree.node(event.node);
            let count = node.active_count_for_tree;
            if let Some(parent) = node.parent {
                if count != 0 {
                    self.tree.offer_and_initialize(parent, event.node);
                    self.tree.active_count_change_for_tree(parent, i64::from(count));
                }
            }
        }
    }

    /// Evicts lowest-value retained state until the bound holds again.
    fn trim_state_only(&mut self) {
        while self.retention.len() > self.max_state_only_size as usize {
            let Some(evicted) = self.retention.poll(self.tree.arena_mut()) else {
                break;
            };
            debug!(
                stream = self.tree.node(evicted).stream_id.get(),
                "evicting state-only priority node"
            );
            self.drop_from_tree(evicted);
        }
    }

    /// Unlinks a node (grandchildren move up) and frees it.
    fn drop_from_tree(&mut self, key: NodeKey) {
        if let Some(parent) = self.tree.node(key).parent {
            let events = self.tree.remove_child(parent, key);
            self.notify_parent_changed(&events);
        } else {
            debug_assert!(false, "dropping a detached node");
        }
        self.tree.release_node(key);
    }
}

impl StreamEventListener for WeightedFairDistributor {
    fn on_stream_added(&mut self, id: StreamId, state: StreamState) {
        debug_assert!(!id.is_connection(), "connection stream cannot be added");
        let key = if let Some(key) = self.tree.lookup(id) {
            // The stream arrived with priority state retained from before it
            // existed; attach the live stream to it.
            debug_assert!(!self.tree.node(key).has_stream, "stream {id} added twice");
            self.retention.remove(self.tree.arena_mut(), key);
            key
        } else {
            let key = self.tree.create_node(id);
            let mut events = Vec::with_capacity(1);
            let root = self.tree.root();
            self.tree.take_child(root, key, false, &mut events);
            self.notify_parent_changed(&events);
            key
        };
        let node = self.tree.node_mut(key);
        node.has_stream = true;
        if state.is_reserved() {
            node.stream_activated_or_reserved = true;
        }
    }

    fn on_stream_active(&mut self, id: StreamId) {
        let Some(key) = self.tree.lookup(id) else {
            debug_assert!(false, "activation for unknown {id}");
            return;
        };
        self.tree.node_mut(key).stream_activated_or_reserved = true;
    }

    fn on_stream_closed(&mut self, id: StreamId) {
        let Some(key) = self.tree.lookup(id) else {
            debug_assert!(false, "close for unknown {id}");
            return;
        };
        self.set_activity(key, 0, false);
        self.tree.node_mut(key).has_stream = false;
    }

    fn on_stream_removed(&mut self, id: StreamId) {
        let Some(key) = self.tree.lookup(id) else {
            debug_assert!(false, "removal for unknown {id}");
            return;
        };
        self.tree.node_mut(key).has_stream = false;
        if self.max_state_only_size == 0 {
            self.drop_from_tree(key);
            return;
        }
        if self.retention.len() == self.max_state_only_size as usize {
            let lowest = self.retention.peek().expect("retention heap is non-empty");
            let arena = self.tree.arena();
            if heap::compare(HeapKind::Retention, arena.node(lowest), arena.node(key))
                != Ordering::Less
            {
                // Everything retained outranks the departing stream; its
                // priority state is not worth keeping.
                self.drop_from_tree(key);
                return;
            }
            let evicted = self
                .retention
                .poll(self.tree.arena_mut())
                .expect("retention heap is non-empty");
            self.drop_from_tree(evicted);
        }
        self.retention.push(self.tree.arena_mut(), key);
    }
}
