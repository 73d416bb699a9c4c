//! lrustress - concurrent stress driver for lrumap

mod workload;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use crate::workload::{StressReport, WorkloadConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cache capacity (number of entries)
    #[arg(short, long, default_value_t = 1024)]
    capacity: usize,

    /// Worker threads sharing the cache
    #[arg(short, long, default_value_t = 8)]
    threads: usize,

    /// Run time in milliseconds
    #[arg(short, long, default_value_t = 2000)]
    duration_ms: u64,

    /// Keys are drawn uniformly from 0..key_space
    #[arg(short, long, default_value_t = 4096)]
    key_space: u64,

    /// Fraction of operations that are reads
    #[arg(long, default_value_t = 0.6)]
    read_ratio: f64,

    /// Fraction of operations that are removals
    #[arg(long, default_value_t = 0.1)]
    remove_ratio: f64,

    /// Base RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn workload(&self) -> WorkloadConfig {
        WorkloadConfig {
            capacity: self.capacity,
            threads: self.threads,
            duration: Duration::from_millis(self.duration_ms),
            key_space: self.key_space,
            read_ratio: self.read_ratio,
            remove_ratio: self.remove_ratio,
            seed: self.seed,
        }
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Starting lrustress v{}", env!("CARGO_PKG_VERSION"));

    let config = args.workload();
    let report = workload::run(&config).context("stress run could not start")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.passed() {
        warn!(
            violations = report.capacity_violations,
            mismatches = report.value_mismatches,
            consistent = report.consistent,
            "stress run broke an invariant"
        );
        bail!("stress run failed");
    }

    info!("Stress run passed");
    Ok(())
}

fn print_report(report: &StressReport) {
    println!("\nlrustress report");
    println!("   Capacity:            {} entries", report.capacity);
    println!("   Threads:             {}", report.threads);
    println!("   Elapsed:             {} ms", report.elapsed_ms);
    println!(
        "   Operations:          {} get / {} put / {} remove",
        report.gets, report.puts, report.removes
    );
    println!("   Throughput:          {:.0} ops/sec", report.ops_per_sec);
    println!(
        "   Cache:               {} hits / {} misses ({:.1}% hit rate)",
        report.hits,
        report.misses,
        report.hit_ratio * 100.0
    );
    println!(
        "   Churn:               {} inserts / {} updates / {} removals / {} evictions",
        report.inserts, report.updates, report.removals, report.evictions
    );
    println!("   Final size:          {}", report.final_len);
    println!("   Capacity violations: {}", report.capacity_violations);
    println!("   Value mismatches:    {}", report.value_mismatches);
    println!(
        "   Consistency check:   {}",
        if report.consistent { "ok" } else { "FAILED" }
    );
}
