//! # Meshlogger - Live Node Logger for Meshtastic Networks
//!
//! Meshlogger polls a Meshtastic radio for its node table on a fixed cadence,
//! keeps the latest state of every node it hears with a usable link, records each
//! sighting to an append-only CSV history and republishes a "latest" CSV snapshot
//! for map clients, while drawing a live terminal dashboard.
//!
//! ## Features
//!
//! - **Tolerant Parsing**: The CLI's box-drawn table is parsed row by row; garbled rows are dropped, never fatal.
//! - **Dual Sinks**: Append-only `log.csv` history and an atomically replaced `latest.csv` snapshot.
//! - **Own Position**: Serial GPS (NMEA GGA) with fallback to the radio's self-reported position.
//! - **Bounded Cycles**: Every external call is time-limited; a stop signal is honoured mid-query and mid-sleep.
//! - **Adaptive Dashboard**: Full, medium and compact layouts chosen from the terminal width.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshlogger::config::Config;
//! use meshlogger::meshtastic::MeshtasticCli;
//! use meshlogger::poller::{PollSettings, Poller};
//! use meshlogger::position::ActiveSource;
//! use meshlogger::storage::NodeStore;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_or_default("config.toml").await?;
//!     let store = NodeStore::from_config(&config.storage)?;
//!     let mut poller = Poller::new(
//!         PollSettings::from_config(&config),
//!         MeshtasticCli::from_config(&config.meshtastic),
//!         ActiveSource::from_config(&config),
//!         store,
//!     );
//!     let summary = poller.run(CancellationToken::new()).await;
//!     println!("Total unique nodes seen: {}", summary.tracked);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`poller`] - Poll loop and cycle ordering
//! - [`meshtastic`] - Device query adapter and node table parser
//! - [`storage`] - Node state store, history log and snapshot
//! - [`position`] - Own-position providers (GPS, device self-report)
//! - [`display`] - Dashboard rendering
//! - [`config`] - Configuration management and validation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ PositionSrc │   │  NodeQuery   │   │  Dashboard  │
//! └──────┬──────┘   └──────┬───────┘   └──────▲──────┘
//!        │ refresh         │ fetch            │ render
//!        └────────┬────────┘                  │
//!          ┌──────▼──────┐    admit     ┌─────┴──────┐
//!          │   Poller    ├─────────────►│ NodeStore  ├──► log.csv / latest.csv
//!          └─────────────┘              └────────────┘
//! ```

pub mod config;
pub mod display;
pub mod error;
pub mod logutil;
pub mod meshtastic;
pub mod metrics;
pub mod poller;
pub mod position;
pub mod storage;
