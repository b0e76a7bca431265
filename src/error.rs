use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the node logging engine.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Wrapper around IO errors (history append, snapshot rewrite, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapper around CSV encoding and decoding errors.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The node-listing command could not be started.
    #[error("failed to launch node query `{command}`: {source}")]
    QueryLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The node-listing command did not finish in time and was killed.
    #[error("node query timed out after {secs}s")]
    QueryTimeout { secs: u64 },

    /// The node-listing command exited unsuccessfully.
    #[error("node query exited with status {code:?}: {stderr}")]
    QueryStatus { code: Option<i32>, stderr: String },

    /// The node-listing command produced output that is not UTF-8.
    #[error("node query output is not valid utf-8")]
    QueryOutput,

    /// Something other than a regular file sits where the history log should be.
    #[error("history log path {path:?} exists but is not a regular file")]
    HistoryPathConflict { path: PathBuf },

    /// Another process already holds the history log.
    #[error("history log {path:?} is locked by another process")]
    HistoryLocked { path: PathBuf },
}

impl LoggerError {
    /// True for failures that only cost the current poll cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LoggerError::QueryLaunch { .. }
                | LoggerError::QueryTimeout { .. }
                | LoggerError::QueryStatus { .. }
                | LoggerError::QueryOutput
        )
    }
}

pub type Result<T> = std::result::Result<T, LoggerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_failures_are_transient() {
        assert!(LoggerError::QueryTimeout { secs: 10 }.is_transient());
        assert!(LoggerError::QueryStatus {
            code: Some(1),
            stderr: String::new()
        }
        .is_transient());
        assert!(LoggerError::QueryOutput.is_transient());
    }

    #[test]
    fn persistence_failures_are_not_transient() {
        let io = LoggerError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(!io.is_transient());
        let conflict = LoggerError::HistoryPathConflict {
            path: PathBuf::from("log.csv"),
        };
        assert!(!conflict.is_transient());
    }
}
