use anyhow::{Context, Result};
use clap::Parser;
use sentinel_core::{
    Config, HttpProbeTarget, LoadGenerator, LoadState, LogEntry, MockProbeTarget, ProbeTarget,
    SimulationState,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "playground")]
#[command(about = "Fire synthetic traffic at a rate-limited route and log each outcome")]
struct Args {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Probe mode: mock or http
    #[arg(long, default_value = "http")]
    mode: String,

    /// Stop the simulation after N milliseconds (runs until Ctrl-C when omitted)
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Time to wait for in-flight probes after stopping
    #[arg(long, default_value = "2000")]
    drain_ms: u64,

    /// Directory for the run summary JSON
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    timestamp: String,
    target: String,
    interval_ms: u64,
    duration_ms: u64,
    issued: u64,
    sent: u64,
    allowed: u64,
    blocked: u64,
    other: u64,
    achieved_rps: u64,
    log: Vec<LogEntry>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let (target, target_label): (Arc<dyn ProbeTarget>, String) = match args.mode.as_str() {
        // 10 requests per window, like the limiter's default playground rule.
        "mock" => (Arc::new(MockProbeTarget::limited(10)), "mock".to_string()),
        "http" => {
            let target = HttpProbeTarget::new(&config.probe)
                .context("Failed to create HTTP probe target")?;
            let label = target.url().to_string();
            (Arc::new(target), label)
        }
        _ => anyhow::bail!("Invalid mode: {}, must be 'mock' or 'http'", args.mode),
    };

    info!(
        "Target: {} ({} requests/second)",
        target_label,
        1000 / config.load.interval_ms.max(1)
    );

    let mut generator = LoadGenerator::new(target, &config.load);
    let printer = tokio::spawn(print_new_entries(generator.subscribe()));

    let start = Instant::now();
    if generator.toggle() != SimulationState::Running {
        anyhow::bail!("Simulation failed to start");
    }

    match args.duration_ms {
        Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        None => tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?,
    }

    generator.toggle();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    info!("Waiting for in-flight probes to land...");
    let issued = generator.issued();
    let mut rx = generator.subscribe();
    let _ = tokio::time::timeout(
        Duration::from_millis(args.drain_ms),
        rx.wait_for(|s| s.stats.sent >= issued),
    )
    .await;

    let state = generator.snapshot();
    drop(generator);
    let _ = tokio::time::timeout(Duration::from_millis(args.drain_ms), printer).await;

    let summary = build_summary(&state, target_label, &config, elapsed_ms, issued);
    let output_path = write_summary(&summary, &args.output_dir)?;
    info!("Results written to {:?}", output_path);
    print_summary(&summary);

    Ok(())
}

/// Stream log lines as they land, newest last. Ends when the generator's
/// collector shuts down.
async fn print_new_entries(mut rx: watch::Receiver<LoadState>) {
    let mut last_id = 0u64;
    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        for entry in state.log.iter() {
            if entry.id <= last_id {
                continue;
            }
            println!(
                "[{}] {} {}",
                entry.outcome.timestamp,
                entry.outcome.status(),
                entry.outcome.message()
            );
            last_id = entry.id;
        }
    }
}

fn build_summary(
    state: &LoadState,
    target: String,
    config: &Config,
    duration_ms: u64,
    issued: u64,
) -> RunSummary {
    let stats = state.stats;
    let achieved_rps = if duration_ms > 0 {
        (stats.sent * 1000) / duration_ms
    } else {
        0
    };

    RunSummary {
        timestamp: chrono::Utc::now().to_rfc3339(),
        target,
        interval_ms: config.load.interval_ms,
        duration_ms,
        issued,
        sent: stats.sent,
        allowed: stats.allowed,
        blocked: stats.blocked,
        other: stats.other(),
        achieved_rps,
        log: state.log.to_vec(),
    }
}

fn write_summary(summary: &RunSummary, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {:?}", output_dir))?;
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let output_path = output_dir.join(format!("playground_{}.json", timestamp));
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(&output_path, json)?;
    Ok(output_path)
}

fn print_summary(summary: &RunSummary) {
    println!("\n=== Playground Summary ===");
    println!("Target: {}", summary.target);
    println!("Duration: {}ms", summary.duration_ms);
    println!("Issued: {}", summary.issued);
    println!("Sent: {}", summary.sent);
    println!("Allowed: {}", summary.allowed);
    println!("Blocked: {}", summary.blocked);
    println!("Other: {}", summary.other);
    println!("Achieved RPS: {}", summary.achieved_rps);
    println!();
}
