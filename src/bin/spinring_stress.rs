//! Spinring Stress - MPMC Contention Test
//!
//! P producer thread push id unik (disjoint per producer), C consumer thread
//! drain sampai semua id keluar. Di akhir diverifikasi:
//! - Tidak ada item yang hilang
//! - Tidak ada item yang keluar dua kali
//! - Urutan per-producer tetap terjaga jika hanya ada 1 consumer
//!
//! Usage:
//!   cargo run --release --bin spinring_stress -- [OPTIONS]
//!   cargo run --release --bin spinring_stress -- --verbose

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use spinring::RingBuffer;

/// Stress test configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "spinring_stress", about = "MPMC stress test for the spinring ring buffer")]
struct StressConfig {
    /// Jumlah producer thread
    #[arg(short, long, default_value_t = 4)]
    producers: usize,

    /// Jumlah consumer thread
    #[arg(short, long, default_value_t = 4)]
    consumers: usize,

    /// Item yang di-push oleh setiap producer
    #[arg(short = 'n', long, default_value_t = 250_000)]
    items_per_producer: u64,

    /// Kapasitas ring buffer (slot)
    #[arg(short = 'k', long, default_value_t = 1024)]
    capacity: usize,

    /// Pin setiap thread ke satu core (Linux only)
    #[arg(long)]
    pin_cores: bool,

    /// Print per-thread stats (default log level jadi debug, RUST_LOG tetap menang)
    #[arg(short, long)]
    verbose: bool,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            producers: 4,
            consumers: 4,
            items_per_producer: 250_000,
            capacity: 1024,
            pin_cores: false,
            verbose: false,
        }
    }
}

impl StressConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.producers == 0 || self.consumers == 0 {
            bail!("need at least one producer and one consumer");
        }
        if self.capacity == 0 {
            bail!("capacity must be non-zero");
        }
        Ok(())
    }

    /// Filter default kalau RUST_LOG tidak di-set
    fn default_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    fn total_items(&self) -> u64 {
        self.producers as u64 * self.items_per_producer
    }
}

/// Payload: id global + asal producer
#[derive(Debug)]
struct Item {
    producer: usize,
    seq: u64,
}

impl Item {
    fn id(&self, items_per_producer: u64) -> u64 {
        self.producer as u64 * items_per_producer + self.seq
    }
}

/// Statistics collector
struct StressStats {
    pushed: AtomicU64,
    popped: AtomicU64,
    order_violations: AtomicU64,
}

impl StressStats {
    fn new() -> Self {
        Self {
            pushed: AtomicU64::new(0),
            popped: AtomicU64::new(0),
            order_violations: AtomicU64::new(0),
        }
    }

    fn print_report(&self, config: &StressConfig, duration: Duration, duplicates: u64, missing: u64) {
        let pushed = self.pushed.load(Ordering::Relaxed);
        let popped = self.popped.load(Ordering::Relaxed);
        let rate = popped as f64 / duration.as_secs_f64();

        println!("\n📊 STRESS TEST RESULTS");
        println!("======================");
        println!("  Producers:     {}", config.producers);
        println!("  Consumers:     {}", config.consumers);
        println!("  Capacity:      {}", config.capacity);
        println!("  Duration:      {:.2}s", duration.as_secs_f64());
        println!("  Pushed:        {}", pushed);
        println!("  Popped:        {}", popped);
        println!("  Duplicates:    {}", duplicates);
        println!("  Missing:       {}", missing);
        if config.consumers == 1 {
            println!(
                "  Order errors:  {}",
                self.order_violations.load(Ordering::Relaxed)
            );
        }
        println!("  Throughput:    {:.2} M items/sec", rate / 1_000_000.0);
    }
}

#[cfg(target_os = "linux")]
fn pin_to_core(core: usize) {
    let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    // SAFETY: cpu_set_t di-zero lalu diisi lewat makro libc, pid 0 = thread ini
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core % cpus, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        warn!(core, error = %std::io::Error::last_os_error(), "failed to pin thread");
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_to_core(_core: usize) {
    debug!("core pinning not supported on this platform");
}

fn run(config: &StressConfig) -> anyhow::Result<()> {
    config.validate()?;

    let rb = Arc::new(
        RingBuffer::<Item>::with_capacity(config.capacity).context("creating ring buffer")?,
    );
    let stats = Arc::new(StressStats::new());
    let total = config.total_items();

    info!(
        producers = config.producers,
        consumers = config.consumers,
        total,
        capacity = config.capacity,
        "starting stress run"
    );

    let start = Instant::now();

    let producers: Vec<_> = (0..config.producers)
        .map(|producer| {
            let rb = Arc::clone(&rb);
            let stats = Arc::clone(&stats);
            let cfg = config.clone();
            thread::spawn(move || {
                if cfg.pin_cores {
                    pin_to_core(producer);
                }
                for seq in 0..cfg.items_per_producer {
                    rb.push(Box::new(Item { producer, seq }));
                }
                stats.pushed.fetch_add(cfg.items_per_producer, Ordering::Relaxed);
                if cfg.verbose {
                    debug!(producer, "producer done");
                }
            })
        })
        .collect();

    // Setiap consumer ambil kuota tetap; total kuota = total item.
    let base = total / config.consumers as u64;
    let extra = total % config.consumers as u64;

    let consumers: Vec<_> = (0..config.consumers)
        .map(|consumer| {
            let rb = Arc::clone(&rb);
            let stats = Arc::clone(&stats);
            let cfg = config.clone();
            let quota = base + u64::from((consumer as u64) < extra);
            thread::spawn(move || {
                if cfg.pin_cores {
                    pin_to_core(cfg.producers + consumer);
                }
                let mut ids = Vec::with_capacity(quota as usize);
                let mut last_seq = vec![None::<u64>; cfg.producers];
                for _ in 0..quota {
                    let item = rb.pop();
                    if let Some(prev) = last_seq[item.producer] {
                        if item.seq <= prev {
                            stats.order_violations.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    last_seq[item.producer] = Some(item.seq);
                    ids.push(item.id(cfg.items_per_producer));
                }
                stats.popped.fetch_add(quota, Ordering::Relaxed);
                if cfg.verbose {
                    debug!(consumer, quota, "consumer done");
                }
                ids
            })
        })
        .collect();

    for handle in producers {
        if handle.join().is_err() {
            bail!("producer thread panicked");
        }
    }

    let mut seen = vec![0u8; total as usize];
    for handle in consumers {
        let ids = match handle.join() {
            Ok(ids) => ids,
            Err(_) => bail!("consumer thread panicked"),
        };
        for id in ids {
            seen[id as usize] = seen[id as usize].saturating_add(1);
        }
    }
    let duration = start.elapsed();

    let duplicates = seen.iter().filter(|&&n| n > 1).count() as u64;
    let missing = seen.iter().filter(|&&n| n == 0).count() as u64;

    stats.print_report(config, duration, duplicates, missing);

    if !rb.is_empty() {
        warn!(remaining = rb.len(), "buffer not empty after drain");
    }

    let order_errors = if config.consumers == 1 {
        stats.order_violations.load(Ordering::Relaxed)
    } else {
        0
    };

    if duplicates == 0 && missing == 0 && order_errors == 0 {
        println!("\n✅ STRESS TEST PASSED - every item popped exactly once");
        Ok(())
    } else {
        bail!(
            "stress test failed: {} duplicates, {} missing, {} order errors",
            duplicates,
            missing,
            order_errors
        )
    }
}

fn main() -> anyhow::Result<()> {
    let config = StressConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.default_filter())),
        )
        .init();

    println!("🔥 SPINRING STRESS TEST");
    println!("=======================\n");

    run(&config)
}
