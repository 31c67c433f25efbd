//! # Docflow Configuration Tool
//!
//! Validates layered configuration for an environment and previews the lane
//! decisions the scheduling core would make with it.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docflow_core::config::{ConfigManager, DocflowConfig};
use docflow_core::models::{Lane, SubscriptionTier};
use docflow_core::queue::{sample_system_load, InMemoryQueue, PriorityQueueRouter};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "docflow-config")]
#[command(about = "Validate docflow configuration and preview lane decisions")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to load (development, test, production, ...)
    #[arg(short, long, default_value = "development", env = "DOCFLOW_ENV")]
    environment: String,

    /// Configuration directory (default: ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration
    Validate,

    /// Print the merged configuration as JSON
    Show,

    /// Recommended workers per lane
    Lanes {
        /// Normalised system load to plan for; sampled from the host when omitted
        #[arg(short, long)]
        load: Option<f64>,
    },

    /// Lane and priority a submission would receive
    Classify {
        /// Subscription tier name
        #[arg(short, long)]
        tier: String,

        /// Payload size in bytes
        #[arg(short, long)]
        size: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Show) => show(&cli),
        Some(Commands::Lanes { load }) => lanes(&cli, *load),
        Some(Commands::Classify { tier, size }) => classify(&cli, tier, *size),
    };

    match result {
        Ok(()) => {
            info!("docflow-config finished successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("docflow-config failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<Arc<ConfigManager>> {
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .with_context(|| format!("loading configuration for environment '{}'", cli.environment))
}

fn router_for(config: &DocflowConfig) -> PriorityQueueRouter {
    PriorityQueueRouter::new(
        Arc::new(InMemoryQueue::new()),
        config.queue.clone(),
        config.lanes.clone(),
        config.worker.expected_processing_time(),
    )
}

fn validate(cli: &Cli) -> Result<()> {
    println!("🔧 Validating docflow configuration");
    println!("Environment: {}", cli.environment);

    let manager = load(cli)?;
    if let Some(dir) = manager.config_directory() {
        println!("Config Directory: {}", dir.display());
    }

    let config = manager.config();
    println!("✅ Configuration loaded and validated");
    println!();
    println!("Lanes:");
    for lane in Lane::ALL {
        println!("  {:<8} concurrency={}", lane.name(), config.lanes.concurrency(lane));
    }
    println!("Recovery:");
    println!(
        "  max_retries={} backoff={}ms..{}ms jitter={}",
        config.recovery.max_retries,
        config.recovery.base_delay_ms,
        config.recovery.max_delay_ms,
        config.recovery.jitter_factor
    );
    println!(
        "  health_check={}ms heartbeat_timeout={}ms job_timeout={}ms",
        config.recovery.health_check_interval_ms,
        config.recovery.heartbeat_timeout().as_millis(),
        config.recovery.job_timeout_ms
    );
    println!(
        "Circuit breaker: threshold={} timeout={}ms",
        config.circuit_breaker.failure_threshold, config.circuit_breaker.timeout_ms
    );

    println!("\n🎉 All configuration checks passed!");
    Ok(())
}

fn show(cli: &Cli) -> Result<()> {
    let manager = load(cli)?;
    let json = serde_json::to_string_pretty(manager.config())
        .context("serializing configuration")?;
    println!("{json}");
    Ok(())
}

fn lanes(cli: &Cli, planned_load: Option<f64>) -> Result<()> {
    let manager = load(cli)?;
    let system_load = match planned_load {
        Some(value) if value.is_finite() && value >= 0.0 => value,
        Some(value) => bail!("load must be a non-negative number, got {value}"),
        None => sample_system_load(),
    };

    let recommendation = router_for(manager.config()).queue_configuration(system_load);
    println!("📊 Lane plan at system load {:.2}", recommendation.system_load);
    for lane in &recommendation.lanes {
        println!(
            "  {:<8} workers={} priorities={}..{}",
            lane.lane.name(),
            lane.workers,
            lane.priority_band.0,
            lane.priority_band.1
        );
    }
    Ok(())
}

fn classify(cli: &Cli, tier: &str, size: u64) -> Result<()> {
    let manager = load(cli)?;
    let router = router_for(manager.config());
    let tier = SubscriptionTier::from(tier);
    let (lane, priority) = router.classify(&tier, size);

    println!(
        "tier={} size={} -> lane={} priority={} (large file threshold {} bytes)",
        tier,
        size,
        lane,
        priority,
        router.large_file_threshold()
    );
    Ok(())
}
