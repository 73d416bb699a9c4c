//! Randomized multi-threaded workload against a shared LruMap

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use lrumap::{LruMap, StatsSnapshot};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

/// Parameters for one stress run
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Map capacity
    pub capacity: usize,
    /// Worker thread count
    pub threads: usize,
    /// How long each worker runs
    pub duration: Duration,
    /// Keys are drawn from `0..key_space`
    pub key_space: u64,
    /// Fraction of operations that are `get`
    pub read_ratio: f64,
    /// Fraction of operations that are `remove`; the rest are `put`
    pub remove_ratio: f64,
    /// Base RNG seed; `None` seeds every worker from OS entropy
    pub seed: Option<u64>,
}

impl WorkloadConfig {
    /// Reject parameters that cannot describe a workload
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            bail!("capacity must be greater than 0");
        }
        if self.threads == 0 {
            bail!("at least one worker thread is required");
        }
        if self.key_space == 0 {
            bail!("key space must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.read_ratio) || !(0.0..=1.0).contains(&self.remove_ratio) {
            bail!("ratios must lie in [0, 1]");
        }
        if self.read_ratio + self.remove_ratio > 1.0 {
            bail!(
                "read ratio {} plus remove ratio {} exceeds 1",
                self.read_ratio,
                self.remove_ratio
            );
        }
        Ok(())
    }
}

/// Outcome of a stress run
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub capacity: usize,
    pub threads: usize,
    pub gets: u64,
    pub puts: u64,
    pub removes: u64,
    /// Times a worker saw `len() > capacity`
    pub capacity_violations: u64,
    /// Times a `get` returned a value that no `put` wrote for that key
    pub value_mismatches: u64,
    pub final_len: usize,
    pub consistent: bool,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub updates: u64,
    pub removals: u64,
    pub evictions: u64,
    pub hit_ratio: f64,
    pub elapsed_ms: u64,
    pub ops_per_sec: f64,
}

impl StressReport {
    /// True when no invariant was broken during or after the run
    pub fn passed(&self) -> bool {
        self.capacity_violations == 0 && self.value_mismatches == 0 && self.consistent
    }

    fn total_ops(&self) -> u64 {
        self.gets + self.puts + self.removes
    }
}

#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    puts: AtomicU64,
    removes: AtomicU64,
    capacity_violations: AtomicU64,
    value_mismatches: AtomicU64,
}

/// Values encode their key so readers can detect cross-key corruption
fn value_for(key: u64) -> u64 {
    key.wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

/// Run the workload and collect a report
pub fn run(config: &WorkloadConfig) -> Result<StressReport> {
    config.validate()?;

    let map: LruMap<u64, u64> = LruMap::new(config.capacity)?;
    let counters = Counters::default();

    info!(
        capacity = config.capacity,
        threads = config.threads,
        duration_ms = config.duration.as_millis() as u64,
        key_space = config.key_space,
        "starting stress run"
    );

    let started = Instant::now();
    let deadline = started + config.duration;

    thread::scope(|scope| {
        for worker in 0..config.threads {
            let map = &map;
            let counters = &counters;
            let rng = match config.seed {
                Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(worker as u64)),
                None => SmallRng::from_os_rng(),
            };
            scope.spawn(move || work(worker, map, counters, rng, config, deadline));
        }
    });

    let elapsed = started.elapsed();
    let consistent = map.check_invariants().is_ok();
    let stats: StatsSnapshot = map.stats().snapshot();

    let mut report = StressReport {
        capacity: config.capacity,
        threads: config.threads,
        gets: counters.gets.load(Ordering::Relaxed),
        puts: counters.puts.load(Ordering::Relaxed),
        removes: counters.removes.load(Ordering::Relaxed),
        capacity_violations: counters.capacity_violations.load(Ordering::Relaxed),
        value_mismatches: counters.value_mismatches.load(Ordering::Relaxed),
        final_len: map.len(),
        consistent,
        hits: stats.hits,
        misses: stats.misses,
        inserts: stats.inserts,
        updates: stats.updates,
        removals: stats.removals,
        evictions: stats.evictions,
        hit_ratio: stats.hit_ratio(),
        elapsed_ms: elapsed.as_millis() as u64,
        ops_per_sec: 0.0,
    };
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        report.ops_per_sec = report.total_ops() as f64 / secs;
    }

    Ok(report)
}

fn work(
    worker: usize,
    map: &LruMap<u64, u64>,
    counters: &Counters,
    mut rng: SmallRng,
    config: &WorkloadConfig,
    deadline: Instant,
) {
    let mut ops = 0u64;

    while Instant::now() < deadline {
        let key = rng.random_range(0..config.key_space);
        let roll: f64 = rng.random();

        if roll < config.read_ratio {
            if let Some(value) = map.get(&key) {
                if value != value_for(key) {
                    counters.value_mismatches.fetch_add(1, Ordering::Relaxed);
                }
            }
            counters.gets.fetch_add(1, Ordering::Relaxed);
        } else if roll < config.read_ratio + config.remove_ratio {
            map.remove(&key);
            counters.removes.fetch_add(1, Ordering::Relaxed);
        } else {
            map.put(key, value_for(key));
            counters.puts.fetch_add(1, Ordering::Relaxed);
        }

        if map.len() > config.capacity {
            counters.capacity_violations.fetch_add(1, Ordering::Relaxed);
        }
        ops += 1;
    }

    debug!(worker, ops, "worker finished");
}
