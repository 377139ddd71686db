//! Weighted fair queueing byte distribution for HTTP/2 stream multiplexing.
//!
//! This crate decides, on each flush opportunity, how many bytes every
//! stream on a connection may write, so that streams receive bandwidth in
//! proportion to their priority weights while the RFC 7540 dependency tree
//! is respected. It includes:
//!
//! - **The priority dependency tree**: per-stream nodes with re-parenting,
//!   exclusive dependencies, and bounded retention of priority-only state.
//! - **The byte distributor**: a virtual-time (pseudo-time) walk over the
//!   tree that converts a byte budget plus a writer callback into
//!   per-stream write calls.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   WeightedFairDistributor                       │
//! │                                                                 │
//! │  ┌──────────────┐    ┌──────────────────┐    ┌──────────────┐  │
//! │  │ PriorityTree │    │  Pseudo-time     │    │  State-only  │  │
//! │  │ (dependency  │───▶│  queues          │───▶│  retention   │  │
//! │  │  tree)       │    │  (WFQ schedule)  │    │  heap        │  │
//! │  └──────────────┘    └──────────────────┘    └──────────────┘  │
//! │         ▲                     │                                 │
//! │   PRIORITY frames,      distribute(max_bytes, writer)           │
//! │   stream lifecycle,           │                                 │
//! │   readiness reports           ▼                                 │
//! │                        writer.write(stream, n)                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Scheduling model
//!
//! Every node keeps a virtual clock (`pseudo_time`) and every child a
//! deadline within its parent's queue. Writing `n` bytes through a child of
//! weight `w` under a queued-weight sum `W` advances the child's deadline by
//! `n * W / w`, so heavier children revisit the front of the queue more
//! often. Fairness is proportional over time, not per call, and the walk is
//! not preemptive: one stream is written per pass, repeated until the budget
//! is spent.
//!
//! # Concurrency
//!
//! None. Every public call is synchronous, runs to completion, and must be
//! made from the connection's executor.
//!
//! # Example
//!
//! ```rust
//! use braid_core::{StreamEventListener, StreamId, StreamState};
//! use braid_flow::{DistributorConfig, FrameWriter, StreamReadiness, WeightedFairDistributor};
//!
//! struct Collect(Vec<(u32, u32)>);
//! impl FrameWriter for Collect {
//!     fn write(
//!         &mut self,
//!         stream_id: StreamId,
//!         num_bytes: u32,
//!     ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!         self.0.push((stream_id.get(), num_bytes));
//!         Ok(())
//!     }
//! }
//!
//! let mut distributor =
//!     WeightedFairDistributor::new(DistributorConfig::default()).unwrap();
//! distributor.on_stream_added(StreamId::new(1), StreamState::Open);
//! distributor.update_streamable_bytes(StreamReadiness {
//!     stream_id: StreamId::new(1),
//!     pending_bytes: 4096,
//!     has_frame: true,
//!     window_size: 65_535,
//! });
//!
//! let mut writer = Collect(Vec::new());
//! let still_active = distributor.distribute(1024, &mut writer).unwrap();
//! assert!(still_active);
//! assert_eq!(writer.0, vec![(1, 1024)]);
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod distributor;
pub mod error;
mod heap;
mod node;
mod tree;

// Re-export main types for convenience.
pub use config::DistributorConfig;
pub use distributor::{
    DistributorStats, FrameWriter, StreamReadiness, WeightedFairDistributor,
};
pub use error::{FlowError, FlowResult};
