//! # Command Buffer Benchmark
//!
//! Measures the per-command cost of the two queues:
//! 1. Raw push + drain on a single `CommandBuffer`
//! 2. Event→Update round trip (enqueue, flush, process)
//! 3. Update→Render round trip (enqueue, flip, process_pending)
//! 4. Arena allocate/free churn

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vesper_core::{
    message_queue, BufferConfig, BufferIndex, CommandBuffer, FixedSizePool, PoolConfig,
    RenderQueue, Vec3,
};

fn bench_push_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_buffer_push_drain");

    for count in [1_000usize, 10_000, 100_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut buffer: CommandBuffer<f32> = CommandBuffer::new(BufferConfig::MESSAGE_QUEUE);
            b.iter(|| {
                for i in 0..count {
                    let delta = Vec3::new(i as f32, 0.0, 0.0);
                    buffer.push(move |sum: &mut f32, _| *sum += delta.x);
                }
                let mut sum = 0.0f32;
                buffer.process(&mut sum, BufferIndex::ZERO);
                black_box(sum)
            });
        });
    }

    group.finish();
}

fn bench_message_queue_round_trip(c: &mut Criterion) {
    let (mut sender, mut receiver) = message_queue::<u64>(BufferConfig::MESSAGE_QUEUE);

    c.bench_function("message_queue_round_trip_1k", |b| {
        let mut index = BufferIndex::ZERO;
        b.iter(|| {
            for i in 0..1_000u64 {
                sender.enqueue(move |total: &mut u64, _| *total += i, true);
            }
            sender.flush();
            let mut total = 0u64;
            receiver.process_messages(&mut total, index);
            index = index.other();
            black_box(total)
        });
    });
}

fn bench_render_queue_round_trip(c: &mut Criterion) {
    let queue: RenderQueue<u64> = RenderQueue::new(BufferConfig::RENDER_QUEUE);

    c.bench_function("render_queue_round_trip_1k", |b| {
        b.iter(|| {
            let index = queue.write_index();
            for i in 0..1_000u64 {
                queue.enqueue(index, move |total: &mut u64, _| *total += i);
            }
            queue.flip();
            let mut total = 0u64;
            queue.process_pending(&mut total);
            black_box(total)
        });
    });
}

fn bench_pool_churn(c: &mut Criterion) {
    c.bench_function("pool_allocate_free_10k", |b| {
        let mut pool: FixedSizePool<[f32; 16]> = FixedSizePool::new(PoolConfig::default());
        let mut handles = Vec::with_capacity(10_000);
        b.iter(|| {
            for _ in 0..10_000 {
                handles.push(pool.allocate_zeroed());
            }
            for handle in handles.drain(..) {
                black_box(pool.free(handle));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_push_and_drain,
    bench_message_queue_round_trip,
    bench_render_queue_round_trip,
    bench_pool_churn,
);
criterion_main!(benches);
