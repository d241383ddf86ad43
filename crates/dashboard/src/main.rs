use anyhow::{Context, Result};
use clap::Parser;
use sentinel_core::{
    Config, HttpMetricsSource, MetricsSource, MockMetricsSource, Sampler, SamplerState,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

mod chart;

#[derive(Parser, Debug)]
#[command(name = "dashboard")]
#[command(about = "Live view of the rate limiter's allowed/blocked counters")]
struct Args {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Metrics mode: mock or http
    #[arg(long, default_value = "http")]
    mode: String,

    /// Stop after N milliseconds (runs until Ctrl-C when omitted)
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Chart height in rows
    #[arg(long, default_value_t = 8)]
    chart_rows: usize,
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

    let source: Arc<dyn MetricsSource> = match args.mode.as_str() {
        "mock" => Arc::new(MockMetricsSource::ramping(7, 2)),
        "http" => {
            let source = HttpMetricsSource::new(&config.api)
                .context("Failed to create HTTP metrics source")?;
            info!("Polling {}", source.url());
            Arc::new(source)
        }
        _ => anyhow::bail!("Invalid mode: {}, must be 'mock' or 'http'", args.mode),
    };

    let mut sampler = Sampler::new(source, &config.sampler);
    let renderer = tokio::spawn(render_updates(sampler.subscribe(), args.chart_rows));

    sampler.start();
    match args.duration_ms {
        Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        None => tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?,
    }
    sampler.stop();

    let state = sampler.snapshot();
    renderer.abort();
    print_final(&state);

    Ok(())
}

async fn render_updates(mut rx: watch::Receiver<SamplerState>, chart_rows: usize) {
    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        println!("{}", chart::status_line(&state));
        if state.connected {
            println!("{}", chart::render(&state.history, chart_rows));
        }
    }
}

fn print_final(state: &SamplerState) {
    println!("\n=== Dashboard Summary ===");
    println!("Polls: {}", state.polls);
    println!("Failures: {}", state.failures);
    println!("Points kept: {}", state.history.len());
    if let Some(latest) = state.latest {
        println!("Allowed requests: {}", latest.allowed_requests);
        println!("Blocked requests: {}", latest.blocked_requests);
        println!("Redis errors: {}", latest.redis_errors);
    }
    if let Some(err) = &state.last_error {
        println!("Last error: {}", err);
    }
    println!();
}
