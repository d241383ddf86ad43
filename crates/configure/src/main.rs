use anyhow::{Context, Result};
use clap::Parser;
use sentinel_core::{Config, ConfigClient, RuleUpdate};
use std::path::PathBuf;
use tracing::info;

/// Routes the limiter ships rules for. `default` is the catch-all.
const KNOWN_ROUTES: [&str; 4] = ["/playground", "/login", "/search", "default"];

#[derive(Parser, Debug)]
#[command(name = "configure")]
#[command(about = "Update a rate-limit rule on the running limiter without restarting it")]
struct Args {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target route prefix, or `default` for all other routes
    #[arg(long, default_value = "/playground")]
    path: String,

    /// Requests allowed per window
    #[arg(long, default_value_t = 10)]
    limit: u32,

    /// Window length in seconds
    #[arg(long, default_value_t = 60)]
    window: u64,
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

    let update = build_update(&args)?;
    let client = ConfigClient::new(&config.api).context("Failed to create config client")?;
    info!("Posting rule to {}", client.url());

    let message = client.update_rule(&update).await?;
    info!("Server replied: {}", message);
    println!("Updated rule for {}", update.path);

    Ok(())
}

fn build_update(args: &Args) -> Result<RuleUpdate> {
    if args.path.trim().is_empty() {
        anyhow::bail!("--path must not be empty");
    }
    if args.limit == 0 {
        anyhow::bail!("--limit must be at least 1");
    }
    if args.window == 0 {
        anyhow::bail!("--window must be at least 1 second");
    }
    if !KNOWN_ROUTES.contains(&args.path.as_str()) {
        info!(
            "Route {} has no built-in rule; the limiter will match it by prefix",
            args.path
        );
    }

    Ok(RuleUpdate {
        path: args.path.clone(),
        limit: args.limit,
        window: args.window,
    })
}
