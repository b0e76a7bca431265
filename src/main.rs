//! Binary entrypoint for the meshlogger CLI.
//!
//! Commands:
//! - `start [--port <path>] [--gps-port <path>] ...` - poll the radio and log nodes until stopped
//! - `init` - create a starter `config.toml`
//! - `status` - summarize the history log and snapshot as JSON
//!
//! See the library crate docs for module‑level details: `meshlogger::`.
use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use meshlogger::config::{Config, Overrides};
use meshlogger::meshtastic::MeshtasticCli;
use meshlogger::poller::{PollSettings, Poller};
use meshlogger::position::{ActiveSource, PositionSource};
use meshlogger::storage::{HistoryLog, NodeStore};

#[derive(Parser)]
#[command(name = "meshlogger")]
#[command(about = "Live node logger for Meshtastic mesh networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the device and log every node heard
    Start {
        /// Meshtastic device port (e.g., /dev/ttyACM0)
        #[arg(short, long)]
        port: Option<String>,

        /// GPS receiver serial port (e.g., /dev/ttyUSB0)
        #[arg(short, long)]
        gps_port: Option<String>,

        /// Own node id or short name, used to pick our position from the node table
        #[arg(short = 'n', long)]
        my_node: Option<String>,

        /// Seconds between polls
        #[arg(short, long)]
        interval: Option<u64>,

        /// History log file
        #[arg(short, long)]
        file: Option<String>,

        /// Latest-state snapshot file
        #[arg(short, long)]
        latest_file: Option<String>,

        /// Maximum nodes written to the snapshot
        #[arg(short, long)]
        max_nodes: Option<usize>,

        /// Log to the console instead of drawing the dashboard
        #[arg(long)]
        no_dashboard: bool,
    },
    /// Write a default configuration file
    Init,
    /// Summarize the history log and snapshot
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            port,
            gps_port,
            my_node,
            interval,
            file,
            latest_file,
            max_nodes,
            no_dashboard,
        } => {
            let mut config = Config::load_or_default(&cli.config).await?;
            config.apply_overrides(Overrides {
                port,
                gps_port,
                my_node,
                interval_secs: interval,
                history_file: file,
                snapshot_file: latest_file,
                max_nodes,
                no_dashboard,
            });
            init_logging(&Some(config.clone()), cli.verbose);
            note_missing_config(&cli.config);
            config.validate().context("invalid configuration")?;
            info!("Starting meshlogger v{}", env!("CARGO_PKG_VERSION"));

            let store = NodeStore::from_config(&config.storage)
                .with_context(|| format!("cannot open history log {}", config.storage.history_file))?;
            let position = ActiveSource::from_config(&config);
            info!("Position source: {}", position.name());
            let query = MeshtasticCli::from_config(&config.meshtastic);

            let cancel = CancellationToken::new();
            tokio::spawn(wait_for_stop(cancel.clone()));

            let summary = {
                let mut poller =
                    Poller::new(PollSettings::from_config(&config), query, position, store);
                poller.run(cancel).await
            };
            println!("\n\nStopping logger...");
            println!("Total unique nodes seen: {}", summary.tracked);
        }
        Commands::Init => {
            init_logging(&None, cli.verbose);
            if Path::new(&cli.config).exists() {
                warn!("{} already exists; leaving it untouched", cli.config);
                return Ok(());
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let config = Config::load_or_default(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            note_missing_config(&cli.config);
            let payload = status_summary(&config)?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    Ok(())
}

/// Cancel `cancel` on Ctrl+C or SIGTERM.
async fn wait_for_stop(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Received shutdown signal");
    cancel.cancel();
}

fn status_summary(config: &Config) -> Result<serde_json::Value> {
    let history_path = &config.storage.history_file;
    let snapshot_path = &config.storage.snapshot_file;

    let history = if Path::new(history_path).exists() {
        HistoryLog::read_rows(history_path)
            .with_context(|| format!("cannot read history log {}", history_path))?
    } else {
        Vec::new()
    };
    let unique: HashSet<&str> = history.iter().map(|r| r.node_id.as_str()).collect();
    let snapshot = if Path::new(snapshot_path).exists() {
        HistoryLog::read_rows(snapshot_path)
            .with_context(|| format!("cannot read snapshot {}", snapshot_path))?
    } else {
        Vec::new()
    };

    Ok(serde_json::json!({
        "history_file": history_path,
        "history_rows": history.len(),
        "unique_nodes": unique.len(),
        "first_seen": history.first().map(|r| r.timestamp.as_str()),
        "last_seen": history.last().map(|r| r.timestamp.as_str()),
        "snapshot_file": snapshot_path,
        "snapshot_rows": snapshot.len(),
        "most_recent_node": snapshot.first().map(|r| r.node_id.as_str()),
        "max_nodes": config.storage.max_nodes,
    }))
}

fn note_missing_config(path: &str) {
    if !Path::new(path).exists() {
        info!("No config file at {}, using defaults", path);
    }
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.as_ref().and_then(|cfg| {
        let path = cfg.logging.file.as_ref()?;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // The dashboard owns the terminal; log lines would tear it
        let dashboard = config.as_ref().map_or(false, |c| c.poll.dashboard);
        let to_console = atty::is(atty::Stream::Stdout) && !dashboard;

        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());

            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }

            if to_console {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
