//! # Configuration Management Module
//!
//! Typed, TOML-backed configuration for the logger with defaults for every field,
//! validation and CLI overrides.
//!
//! ## Configuration Structure
//!
//! - [`MeshtasticConfig`] - node-listing command, device port, own-node hint
//! - [`GpsConfig`] - optional NMEA receiver on a serial port
//! - [`StorageConfig`] - history log, snapshot file, node caps
//! - [`PollConfig`] - poll cadence and dashboard toggle
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Configuration File Format
//!
//! ```toml
//! [meshtastic]
//! cli_path = "meshtastic"
//! port = "/dev/ttyACM0"
//! query_timeout_secs = 10
//! my_node = "baf0"
//!
//! [gps]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//!
//! [storage]
//! history_file = "log.csv"
//! snapshot_file = "latest.csv"
//! max_nodes = 50
//!
//! [poll]
//! interval_secs = 10
//! ```
//!
//! Precedence: CLI args > config file > defaults.

use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub meshtastic: MeshtasticConfig,
    pub gps: GpsConfig,
    pub storage: StorageConfig,
    pub poll: PollConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshtasticConfig {
    /// Node-listing executable (the Meshtastic Python CLI).
    pub cli_path: String,
    /// Device port passed as `--port`; the CLI auto-detects when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    pub query_timeout_secs: u64,
    /// Substring of our own node's ID or short name, used to find our position in
    /// the node table when no GPS is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_node: Option<String>,
}

impl Default for MeshtasticConfig {
    fn default() -> Self {
        Self {
            cli_path: "meshtastic".to_string(),
            port: None,
            query_timeout_secs: 10,
            my_node: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Per-line serial read timeout.
    pub read_timeout_ms: u64,
    /// Lines read per refresh while looking for a fix.
    pub max_lines: usize,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            read_timeout_ms: 1000,
            max_lines: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Append-only log of every admitted observation.
    pub history_file: String,
    /// Latest-state-per-node table, rewritten every cycle.
    pub snapshot_file: String,
    /// Rows kept in the snapshot.
    pub max_nodes: usize,
    /// Upper bound on nodes kept in memory; 0 keeps every node ever seen.
    pub memory_cap: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_file: "log.csv".to_string(),
            snapshot_file: "latest.csv".to_string(),
            max_nodes: 50,
            memory_cap: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    /// Pause before the first cycle.
    pub startup_delay_secs: u64,
    /// Redraw the terminal dashboard after each cycle.
    pub dashboard: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            startup_delay_secs: 2,
            dashboard: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Values given on the command line; `None` leaves the config value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<String>,
    pub gps_port: Option<String>,
    pub my_node: Option<String>,
    pub interval_secs: Option<u64>,
    pub history_file: Option<String>,
    pub snapshot_file: Option<String>,
    pub max_nodes: Option<usize>,
    pub no_dashboard: bool,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults. Runs before
    /// logging is set up, so callers report the fallback themselves.
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path).await
        } else {
            Ok(Config::default())
        }
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn apply_overrides(&mut self, o: Overrides) {
        if let Some(port) = o.port {
            self.meshtastic.port = Some(port);
        }
        if let Some(port) = o.gps_port {
            self.gps.port = Some(port);
        }
        if let Some(node) = o.my_node {
            self.meshtastic.my_node = Some(node);
        }
        if let Some(secs) = o.interval_secs {
            self.poll.interval_secs = secs;
        }
        if let Some(file) = o.history_file {
            self.storage.history_file = file;
        }
        if let Some(file) = o.snapshot_file {
            self.storage.snapshot_file = file;
        }
        if let Some(n) = o.max_nodes {
            self.storage.max_nodes = n;
        }
        if o.no_dashboard {
            self.poll.dashboard = false;
        }
    }

    /// Reject values the poll loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_secs == 0 {
            return Err(anyhow!("poll.interval_secs must be at least 1"));
        }
        if self.meshtastic.query_timeout_secs == 0 {
            return Err(anyhow!("meshtastic.query_timeout_secs must be at least 1"));
        }
        if self.meshtastic.cli_path.trim().is_empty() {
            return Err(anyhow!("meshtastic.cli_path must not be empty"));
        }
        if self.gps.max_lines == 0 {
            return Err(anyhow!("gps.max_lines must be at least 1"));
        }
        let s = &self.storage;
        if s.max_nodes == 0 {
            return Err(anyhow!("storage.max_nodes must be at least 1"));
        }
        if s.memory_cap != 0 && s.memory_cap < s.max_nodes {
            return Err(anyhow!(
                "storage.memory_cap ({}) must be 0 or at least storage.max_nodes ({})",
                s.memory_cap,
                s.max_nodes
            ));
        }
        if s.history_file.trim().is_empty() || s.snapshot_file.trim().is_empty() {
            return Err(anyhow!("storage file names must not be empty"));
        }
        if Path::new(&s.history_file) == Path::new(&s.snapshot_file) {
            return Err(anyhow!(
                "history and snapshot files must differ (both are {})",
                s.history_file
            ));
        }
        Ok(())
    }
}

impl StorageConfig {
    /// In-memory cap as an option (`None` = unbounded).
    pub fn memory_cap(&self) -> Option<usize> {
        match self.memory_cap {
            0 => None,
            n => Some(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = Config::load_or_default(path.to_str().unwrap()).await.unwrap();
        assert_eq!(config.poll.interval_secs, Config::default().poll.interval_secs);
        assert!(!path.exists());
    }

    #[test]
    fn defaults_match_the_classic_logger() {
        let config = Config::default();
        assert_eq!(config.poll.interval_secs, 10);
        assert_eq!(config.storage.history_file, "log.csv");
        assert_eq!(config.storage.snapshot_file, "latest.csv");
        assert_eq!(config.storage.max_nodes, 50);
        assert_eq!(config.gps.baud_rate, 9600);
        assert_eq!(config.meshtastic.query_timeout_secs, 10);
        assert!(config.storage.memory_cap().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            max_nodes = 5

            [meshtastic]
            port = "/dev/ttyACM0"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.max_nodes, 5);
        assert_eq!(config.storage.history_file, "log.csv");
        assert_eq!(config.meshtastic.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.meshtastic.cli_path, "meshtastic");
        assert_eq!(config.poll.interval_secs, 10);
    }

    #[test]
    fn overrides_take_precedence() {
        let mut config = Config::default();
        config.apply_overrides(Overrides {
            gps_port: Some("/dev/ttyUSB1".into()),
            interval_secs: Some(3),
            max_nodes: Some(7),
            no_dashboard: true,
            ..Default::default()
        });
        assert_eq!(config.gps.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.poll.interval_secs, 3);
        assert_eq!(config.storage.max_nodes, 7);
        assert!(!config.poll.dashboard);
        assert!(config.meshtastic.port.is_none());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = Config::default();
        config.poll.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.max_nodes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.memory_cap = 10;
        assert!(config.validate().is_err());
        config.storage.memory_cap = 50;
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.memory_cap(), Some(50));

        let mut config = Config::default();
        config.storage.snapshot_file = config.storage.history_file.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.storage.max_nodes, 50);
        assert_eq!(back.poll.interval_secs, 10);
        assert!(back.gps.port.is_none());
    }
}
