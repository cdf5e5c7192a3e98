//! Criterion benchmarks for seqlock publication and reads.
//!
//! Run with:
//! ```bash
//! cargo bench --package keysync-core --bench publish_bench
//! ```

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use keysync_core::protocol::{EventCursor, HeapSegment, SnapshotFrame, StateReader, StateWriter};

fn sample_frame() -> SnapshotFrame {
    let mut frame = SnapshotFrame::zeroed();
    frame.active_pid = 4242;
    frame.profile_id = 0xDEAD_BEEF;
    frame.last_tick_ms = 123_456;
    for vk in 0x41..=0x5A {
        frame.key_state[vk] = 0x80;
        frame.edges[vk] = vk as u32;
        frame.target_mask[vk] = 1;
    }
    frame
}

fn bench_publish(c: &mut Criterion) {
    let segment = Arc::new(HeapSegment::for_protocol());
    let mut writer = StateWriter::new(Arc::clone(&segment)).expect("protocol-sized segment");
    let frame = sample_frame();

    c.bench_function("seqlock_publish", |b| b.iter(|| black_box(writer.publish(black_box(&frame)))));
}

fn bench_read(c: &mut Criterion) {
    let segment = Arc::new(HeapSegment::for_protocol());
    let mut writer = StateWriter::new(Arc::clone(&segment)).expect("protocol-sized segment");
    writer.publish(&sample_frame());
    let reader = StateReader::open(segment).expect("protocol-sized segment");

    c.bench_function("seqlock_read", |b| b.iter(|| black_box(reader.read())));
}

fn bench_event_ring(c: &mut Criterion) {
    let segment = Arc::new(HeapSegment::for_protocol());
    let mut writer = StateWriter::new(Arc::clone(&segment)).expect("protocol-sized segment");
    let reader = StateReader::open(segment).expect("protocol-sized segment");
    let mut cursor = EventCursor::default();
    let mut tick = 0u64;

    c.bench_function("event_push_and_drain_16", |b| {
        b.iter(|| {
            for i in 0..16u8 {
                tick += 1;
                writer.push_event(0x41 + i, i % 2 == 0, tick);
            }
            black_box(reader.read_events(&mut cursor))
        })
    });
}

criterion_group!(benches, bench_publish, bench_read, bench_event_ring);
criterion_main!(benches);
