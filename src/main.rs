//! Spinring - Quick Latency Report
//!
//! Single-thread push/pop latency untuk ring buffer MPMC.
//! Untuk skenario multi-thread, lihat src/bin/spinring_stress.rs.

use std::time::Instant;

use spinring::RingBuffer;

const ITERATIONS: usize = 1_000_000;
const CAPACITY: usize = 65536;

fn main() -> anyhow::Result<()> {
    println!("🚀 Spinring - Lock-Free MPMC Ring Buffer");
    println!("========================================\n");

    benchmark_ring_buffer()?;
    benchmark_try_ops()?;

    println!("\n✅ All benchmarks complete!");
    println!("\nFor multi-thread stress: cargo run --release --bin spinring_stress -- --help");
    Ok(())
}

fn benchmark_ring_buffer() -> anyhow::Result<()> {
    println!("📊 Ring Buffer Benchmark (push / pop)");
    println!("-------------------------------------");

    let rb: RingBuffer<u64> = RingBuffer::with_capacity(CAPACITY)?;

    // Warm up
    for i in 0..1000 {
        rb.push(Box::new(i));
    }
    for _ in 0..1000 {
        rb.pop();
    }

    // Benchmark push (drain satu kalau penuh supaya push tidak spin selamanya)
    let start = Instant::now();
    for i in 0..ITERATIONS {
        if rb.is_full() {
            rb.pop();
        }
        rb.push(Box::new(i as u64));
    }
    let push_duration = start.elapsed();

    // Drain
    while rb.try_pop().is_some() {}

    for i in 0..CAPACITY {
        rb.push(Box::new(i as u64));
    }

    // Benchmark pop
    let start = Instant::now();
    for _ in 0..CAPACITY {
        rb.pop();
    }
    let pop_duration = start.elapsed();

    let push_ns = push_duration.as_nanos() as f64 / ITERATIONS as f64;
    let pop_ns = pop_duration.as_nanos() as f64 / CAPACITY as f64;

    println!("  Operations: {} push, {} pop", ITERATIONS, CAPACITY);
    println!(
        "  Push latency: {:.2} ns/op ({:.3} μs/op)",
        push_ns,
        push_ns / 1000.0
    );
    println!(
        "  Pop latency:  {:.2} ns/op ({:.3} μs/op)",
        pop_ns,
        pop_ns / 1000.0
    );
    println!(
        "  Throughput:   {:.2} M ops/sec\n",
        ITERATIONS as f64 / push_duration.as_secs_f64() / 1_000_000.0
    );
    Ok(())
}

fn benchmark_try_ops() -> anyhow::Result<()> {
    println!("📊 Non-Spinning Ops (try_push on full / try_pop on empty)");
    println!("---------------------------------------------------------");

    let rb: RingBuffer<u64> = RingBuffer::with_capacity(1)?;

    let start = Instant::now();
    for _ in 0..ITERATIONS {
        let _ = rb.try_pop();
    }
    let empty_ns = start.elapsed().as_nanos() as f64 / ITERATIONS as f64;

    rb.push(Box::new(0));
    let mut rejected = Some(Box::new(1u64));
    let start = Instant::now();
    for _ in 0..ITERATIONS {
        if let Some(item) = rejected.take() {
            rejected = rb.try_push(item).err();
        }
    }
    let full_ns = start.elapsed().as_nanos() as f64 / ITERATIONS as f64;

    println!("  try_pop on empty: {:.2} ns/op", empty_ns);
    println!("  try_push on full: {:.2} ns/op", full_ns);
    Ok(())
}
