//! PANDA CLI
//!
//! Passive wireless reconnaissance: fuse nearby devices, score their risk
//! and plot them on a radar.

mod render;
mod server;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use panda_runtime::{LogPolicy, PandaConfig, PlatformSetting, Scanner};
use panda_sensors::{locate, select_sources, SourceKind};

#[derive(Parser)]
#[command(name = "panda")]
#[command(author, version, about = "PANDA: passive wireless device fusion and risk radar", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1", global = true)]
    verbose: u8,

    /// Configuration file (TOML)
    #[arg(short, long, env = "PANDA_CONFIG", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Live terminal radar
    Scan(ScanArgs),

    /// Scan in the background and serve snapshots over HTTP
    Serve {
        #[command(flatten)]
        scan: ScanArgs,

        /// Listen address
        #[arg(long, env = "PANDA_BIND")]
        bind: Option<String>,
    },

    /// Show detected platform, sources and location
    Status(StatusArgs),
}

/// Source selection overrides, all that `status` reports on
#[derive(Args)]
struct StatusArgs {
    /// Platform: auto, termux, ish or generic
    #[arg(long)]
    platform: Option<PlatformSetting>,

    /// Comma separated sources (wifi, ble, lan, mock)
    #[arg(long, value_delimiter = ',')]
    sources: Option<Vec<SourceKind>>,
}

impl StatusArgs {
    fn apply(self, config: &mut PandaConfig) {
        if let Some(platform) = self.platform {
            config.sources.platform = platform;
        }
        if let Some(sources) = self.sources {
            config.sources.enabled = Some(sources);
        }
    }
}

/// Overrides for the scan section of the config file
#[derive(Args)]
struct ScanArgs {
    /// Scan interval in milliseconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// Platform: auto, termux, ish or generic
    #[arg(long)]
    platform: Option<PlatformSetting>,

    /// Comma separated sources (wifi, ble, lan, mock)
    #[arg(long, value_delimiter = ',')]
    sources: Option<Vec<SourceKind>>,

    /// Append device events to this JSONL file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Only log devices with at least this risk score
    #[arg(long)]
    log_threshold: Option<u8>,

    /// Stop after this many seconds (0 = unlimited)
    #[arg(long)]
    max_runtime: Option<u64>,
}

impl ScanArgs {
    fn apply(self, config: &mut PandaConfig) {
        if let Some(interval) = self.interval {
            config.scan.interval_ms = interval;
        }
        if let Some(platform) = self.platform {
            config.sources.platform = platform;
        }
        if let Some(sources) = self.sources {
            config.sources.enabled = Some(sources);
        }
        if let Some(path) = self.log_file {
            config.event_log.path = Some(path);
        }
        if let Some(threshold) = self.log_threshold {
            config.event_log.policy = LogPolicy::RiskAtLeast(threshold);
        }
        if let Some(secs) = self.max_runtime {
            config.scan.max_runtime_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG wins over -v
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let mut config = PandaConfig::load(cli.config.as_deref())
        .with_context(|| "Failed to load configuration")?;

    match cli.command {
        Commands::Scan(args) => {
            args.apply(&mut config);
            config.validate()?;
            run_scan(config).await?;
        }
        Commands::Serve { scan, bind } => {
            scan.apply(&mut config);
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            config.validate()?;
            run_serve(config).await?;
        }
        Commands::Status(args) => {
            args.apply(&mut config);
            check_status(config).await?;
        }
    }

    Ok(())
}

/// Flip the shutdown flag on Ctrl-C
fn spawn_ctrl_c(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown.send(true);
        }
    });
}

async fn run_scan(config: PandaConfig) -> Result<()> {
    let platform = config.sources.platform.resolve();
    println!("🐼 PANDA - passive wireless recon\n");
    println!("🖥️  Platform: {}", platform);

    println!("📍 Locating observer...");
    let location = locate(platform, &config.geo).await;

    let scanner = Scanner::from_config(&config, platform);
    println!("📡 Sources: {}", scanner.source_names().join(", "));

    let (tx, rx) = watch::channel(false);
    spawn_ctrl_c(tx);

    let canvas = config.radar.clone();
    scanner
        .run(rx, |report| {
            let frame = render::render_frame(platform, &location, &canvas, report.snapshot.clone());
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(frame.as_bytes());
            let _ = stdout.flush();
        })
        .await;

    println!("\n👋 Scan stopped");
    Ok(())
}

async fn run_serve(config: PandaConfig) -> Result<()> {
    let platform = config.sources.platform.resolve();
    let location = locate(platform, &config.geo).await;
    let scanner = Scanner::from_config(&config, platform);

    let state = Arc::new(server::AppState {
        registry: scanner.registry(),
        location,
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    println!("🐼 PANDA API on http://{}/api/scan", config.server.bind);
    println!("🖥️  Platform: {} | 📡 Sources: {}", platform, scanner.source_names().join(", "));

    let (tx, rx) = watch::channel(false);
    let scan_task = tokio::spawn(async move {
        scanner
            .run(rx, |report| {
                info!(
                    "Cycle: {} observed, {} devices, {} evicted",
                    report.observed, report.devices, report.evicted
                );
            })
            .await;
    });

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server failed")?;

    let _ = tx.send(true);
    scan_task.await.context("Scan task failed")?;

    println!("\n👋 Server stopped");
    Ok(())
}

async fn check_status(config: PandaConfig) -> Result<()> {
    let platform = config.sources.platform.resolve();
    println!("🖥️  Platform: {}", platform);

    let sources = select_sources(platform, config.sources.enabled.as_deref(), config.source_timeout());
    println!("📡 Sources:");
    for source in &sources {
        println!("   - {}", source.name());
    }

    for warning in config.warnings() {
        println!("⚠️  {}", warning);
    }

    println!("\n📍 Locating observer...");
    let location = locate(platform, &config.geo).await;
    if location.provider == "offline" {
        println!("❌ Location unavailable (offline)");
    } else {
        println!("✅ {:.4}, {:.4} via {}", location.lat, location.lon, location.provider);
    }

    Ok(())
}
