//! # Meshtastic Device Query Module
//!
//! Node data comes from the Meshtastic Python CLI rather than a direct serial link:
//! each poll runs `meshtastic --nodes [--port <path>]` and hands the printed table to
//! the [`table`] parser.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use meshlogger::meshtastic::{MeshtasticCli, NodeQuery, parse_node_table};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut cli = MeshtasticCli::new("meshtastic", Some("/dev/ttyACM0".into()), Duration::from_secs(10));
//!     let text = cli.fetch_nodes().await?;
//!     for node in parse_node_table(&text) {
//!         println!("{} snr={:?}", node.id, node.snr);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every failure mode of the external command maps to a transient
//! [`LoggerError`](crate::error::LoggerError) variant:
//! - the binary is missing or cannot be spawned (`QueryLaunch`)
//! - the command hangs past the configured timeout (`QueryTimeout`, child is killed)
//! - non-zero exit status (`QueryStatus`)
//! - non UTF-8 output (`QueryOutput`)
//!
//! ## Configuration
//!
//! ```toml
//! [meshtastic]
//! cli_path = "meshtastic"
//! port = "/dev/ttyACM0"    # optional
//! query_timeout_secs = 10
//! ```

pub mod table;

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, trace};
use tokio::process::Command;

use crate::config::MeshtasticConfig;
use crate::error::{LoggerError, Result};
use crate::logutil::{single_line, DEVICE_PREVIEW};

pub use table::{
    clean_value, parse_node_table, HeaderCheck, NodeId, NodeObservation, TableSchema, NODE_TABLE,
};

/// Source of raw node-table text.
pub trait NodeQuery {
    /// Fetch one listing of the device's node table.
    fn fetch_nodes(&mut self) -> impl Future<Output = Result<String>> + Send;
}

/// [`NodeQuery`] backed by the Meshtastic Python CLI.
#[derive(Debug, Clone)]
pub struct MeshtasticCli {
    program: String,
    port: Option<String>,
    timeout: Duration,
}

impl MeshtasticCli {
    pub fn new(program: impl Into<String>, port: Option<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            port,
            timeout,
        }
    }

    pub fn from_config(cfg: &MeshtasticConfig) -> Self {
        Self::new(
            cfg.cli_path.clone(),
            cfg.port.clone().filter(|p| !p.is_empty()),
            Duration::from_secs(cfg.query_timeout_secs),
        )
    }

    /// Arguments passed to the CLI.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["--nodes".to_string()];
        if let Some(port) = &self.port {
            args.push("--port".to_string());
            args.push(port.clone());
        }
        args
    }
}

impl NodeQuery for MeshtasticCli {
    async fn fetch_nodes(&mut self) -> Result<String> {
        let args = self.args();
        trace!("Running {} {}", self.program, args.join(" "));
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LoggerError::QueryLaunch {
                command: self.program.clone(),
                source,
            })?;

        // Dropping the pending future on timeout kills the child.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| LoggerError::QueryTimeout {
                secs: self.timeout.as_secs(),
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LoggerError::QueryStatus {
                code: output.status.code(),
                stderr: single_line(&stderr, DEVICE_PREVIEW),
            });
        }
        let text = String::from_utf8(output.stdout).map_err(|_| LoggerError::QueryOutput)?;
        debug!(
            "Node query returned {} bytes: {}",
            text.len(),
            single_line(&text, DEVICE_PREVIEW)
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_argument_is_optional() {
        let cli = MeshtasticCli::new("meshtastic", None, Duration::from_secs(10));
        assert_eq!(cli.args(), vec!["--nodes"]);
        let cli = MeshtasticCli::new("meshtastic", Some("/dev/ttyACM0".into()), Duration::from_secs(10));
        assert_eq!(cli.args(), vec!["--nodes", "--port", "/dev/ttyACM0"]);
    }

    #[test]
    fn empty_configured_port_is_ignored() {
        let cfg = MeshtasticConfig {
            port: Some(String::new()),
            ..MeshtasticConfig::default()
        };
        assert_eq!(MeshtasticCli::from_config(&cfg).args(), vec!["--nodes"]);
    }

    #[test]
    fn missing_binary_is_a_transient_launch_error() {
        let mut cli = MeshtasticCli::new(
            "/nonexistent/meshtastic-cli-for-tests",
            None,
            Duration::from_secs(1),
        );
        let err = tokio_test::block_on(cli.fetch_nodes()).unwrap_err();
        assert!(matches!(err, LoggerError::QueryLaunch { .. }));
        assert!(err.is_transient());
    }

    #[cfg(unix)]
    fn script(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("fake-meshtastic");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn returns_stdout_and_passes_port() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(&dir, "echo \"args: $*\"");
        let mut cli = MeshtasticCli::new(program, Some("/dev/ttyACM0".into()), Duration::from_secs(5));
        let text = cli.fetch_nodes().await.unwrap();
        assert_eq!(text.trim(), "args: --nodes --port /dev/ttyACM0");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(&dir, "echo 'no device' >&2; exit 1");
        let mut cli = MeshtasticCli::new(program, None, Duration::from_secs(5));
        let err = cli.fetch_nodes().await.unwrap_err();
        match err {
            LoggerError::QueryStatus { code, stderr } => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "no device");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(&dir, "sleep 5");
        let mut cli = MeshtasticCli::new(program, None, Duration::from_millis(200));
        let err = cli.fetch_nodes().await.unwrap_err();
        assert!(matches!(err, LoggerError::QueryTimeout { .. }));
        assert!(err.is_transient());
    }
}
