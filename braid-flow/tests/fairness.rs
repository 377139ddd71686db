//! Black-box fairness tests for the weighted fair distributor.
//!
//! These tests drive the public API the way a codec would: stream lifecycle
//! events, readiness reports, PRIORITY frames, and repeated `distribute`
//! calls, then check how the byte totals split across streams.

use std::collections::HashMap;

use braid_core::{StreamEventListener, StreamId, StreamState, Weight};
use braid_flow::{
    DistributorConfig, FrameWriter, StreamReadiness, WeightedFairDistributor,
};

/// Writer that records every call and tracks totals per stream.
#[derive(Default)]
struct CountingWriter {
    writes: Vec<(u32, u32)>,
    totals: HashMap<u32, u64>,
}

impl FrameWriter for CountingWriter {
    fn write(
        &mut self,
        stream_id: StreamId,
        num_bytes: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.writes.push((stream_id.get(), num_bytes));
        *self.totals.entry(stream_id.get()).or_insert(0) += u64::from(num_bytes);
        Ok(())
    }
}

fn distributor() -> WeightedFairDistributor {
    WeightedFairDistributor::new(DistributorConfig::new(100, 5)).unwrap()
}

fn open_stream(d: &mut WeightedFairDistributor, id: u32) {
    d.on_stream_added(StreamId::new(id), StreamState::Open);
    d.on_stream_active(StreamId::new(id));
}

fn report_ready(d: &mut WeightedFairDistributor, id: u32, pending: u32) {
    d.update_streamable_bytes(StreamReadiness {
        stream_id: StreamId::new(id),
        pending_bytes: pending,
        has_frame: true,
        window_size: i32::MAX,
    });
}

fn report_drained(d: &mut WeightedFairDistributor, id: u32) {
    d.update_streamable_bytes(StreamReadiness {
        stream_id: StreamId::new(id),
        pending_bytes: 0,
        has_frame: false,
        window_size: i32::MAX,
    });
}

#[test]
fn equal_weights_split_evenly() {
    let mut d = distributor();
    for id in [1, 3, 5, 7] {
        open_stream(&mut d, id);
        report_ready(&mut d, id, 100_000);
    }

    let mut writer = CountingWriter::default();
    for _ in 0..400 {
        assert!(d.distribute(100, &mut writer).unwrap());
    }

    for id in [1, 3, 5, 7] {
        assert_eq!(writer.totals[&id], 10_000, "stream {id} shorted");
    }
}

#[test]
fn bandwidth_tracks_weight_ratio() {
    let mut d = distributor();
    open_stream(&mut d, 1);
    open_stream(&mut d, 3);
    d.update_dependency_tree(StreamId::new(1), StreamId::CONNECTION, Weight::new(24), false);
    d.update_dependency_tree(StreamId::new(3), StreamId::CONNECTION, Weight::new(8), false);
    report_ready(&mut d, 1, 1_000_000);
    report_ready(&mut d, 3, 1_000_000);

    let mut writer = CountingWriter::default();
    for _ in 0..600 {
        d.distribute(100, &mut writer).unwrap();
    }

    #[allow(clippy::cast_precision_loss)]
    let ratio = writer.totals[&1] as f64 / writer.totals[&3] as f64;
    assert!((2.7..=3.3).contains(&ratio), "ratio {ratio}");
}

#[test]
fn parent_bandwidth_is_shared_by_its_children() {
    let mut d = distributor();
    // stream 1 and stream 3 split the connection; 5 and 7 split stream 3's
    // share between them.
    for id in [1, 3, 5, 7] {
        open_stream(&mut d, id);
    }
    d.update_dependency_tree(StreamId::new(5), StreamId::new(3), Weight::new(16), false);
    d.update_dependency_tree(StreamId::new(7), StreamId::new(3), Weight::new(16), false);
    report_ready(&mut d, 1, 1_000_000);
    report_ready(&mut d, 5, 1_000_000);
    report_ready(&mut d, 7, 1_000_000);

    let mut writer = CountingWriter::default();
    for _ in 0..400 {
        d.distribute(100, &mut writer).unwrap();
    }

    let top = writer.totals[&1];
    let nested = writer.totals[&5] + writer.totals[&7];
    #[allow(clippy::cast_precision_loss)]
    let split = top as f64 / nested as f64;
    assert!((0.9..=1.1).contains(&split), "split {split}");

    #[allow(clippy::cast_precision_loss)]
    let sibling = writer.totals[&5] as f64 / writer.totals[&7] as f64;
    assert!((0.9..=1.1).contains(&sibling), "sibling split {sibling}");
}

#[test]
fn consuming_codec_drains_both_streams() {
    let mut d = distributor();
    open_stream(&mut d, 1);
    open_stream(&mut d, 3);
    report_ready(&mut d, 1, 150);
    report_ready(&mut d, 3, 150);

    // Model a consuming codec: the budget matches one write, and after
    // every distribute call the remaining pending bytes are reported back.
    let mut pending: HashMap<u32, u32> = [(1, 150), (3, 150)].into();
    let mut writer = CountingWriter::default();
    for _ in 0..32 {
        let seen = writer.writes.len();
        let still_active = d.distribute(50, &mut writer).unwrap();
        for &(id, bytes) in &writer.writes[seen..] {
            let left = pending.get_mut(&id).unwrap();
            *left -= bytes;
            if *left == 0 {
                report_drained(&mut d, id);
            } else {
                report_ready(&mut d, id, *left);
            }
        }
        if !still_active {
            break;
        }
    }

    assert_eq!(writer.totals[&1], 150);
    assert_eq!(writer.totals[&3], 150);
    assert!(pending.values().all(|&left| left == 0));
}

#[test]
fn zero_budget_still_offers_an_empty_frame() {
    let mut d = distributor();
    open_stream(&mut d, 1);
    report_ready(&mut d, 1, 500);

    let mut writer = CountingWriter::default();
    assert!(d.distribute(0, &mut writer).unwrap());
    assert_eq!(writer.writes, vec![(1, 0)]);
}

#[test]
fn distribute_reports_idle_connection() {
    let mut d = distributor();
    let mut writer = CountingWriter::default();
    assert!(!d.distribute(4096, &mut writer).unwrap());

    open_stream(&mut d, 1);
    report_ready(&mut d, 1, 64);
    assert!(d.distribute(0, &mut writer).unwrap());

    report_drained(&mut d, 1);
    assert!(!d.distribute(4096, &mut writer).unwrap());
    assert_eq!(writer.writes, vec![(1, 0)]);
}

#[test]
fn blocked_ancestors_do_not_trap_descendants() {
    let mut d = distributor();
    open_stream(&mut d, 1);
    open_stream(&mut d, 3);
    d.update_dependency_tree(StreamId::new(3), StreamId::new(1), Weight::new(16), false);
    // Only the leaf has bytes; its parent never becomes active.
    report_ready(&mut d, 3, 800);

    let mut writer = CountingWriter::default();
    assert!(d.distribute(800, &mut writer).unwrap());
    assert_eq!(writer.writes, vec![(3, 800)]);
}
