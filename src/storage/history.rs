//! Append-only history log.
//!
//! The file is created with a header the first time and only ever appended to
//! afterwards, so logs from earlier runs (including ones written by other tools
//! with the same column layout) keep growing. The open file carries an exclusive
//! advisory lock for the lifetime of the [`HistoryLog`].

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::{debug, info, warn};

use super::{NodeRow, COLUMNS};
use crate::error::{LoggerError, Result};

pub struct HistoryLog {
    path: PathBuf,
    file: File,
    rows_appended: u64,
}

impl HistoryLog {
    /// Open (or create) the log at `path`.
    ///
    /// Fails with [`LoggerError::HistoryPathConflict`] when something other than a
    /// regular file is in the way and with [`LoggerError::HistoryLocked`] when
    /// another logger already owns the file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Ok(meta) = fs::metadata(&path) {
            if !meta.is_file() {
                return Err(LoggerError::HistoryPathConflict { path });
            }
        }
        let (file, created) = match OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&path)
        {
            Ok(f) => (f, true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                (OpenOptions::new().append(true).open(&path)?, false)
            }
            Err(e) => return Err(e.into()),
        };
        file.try_lock_exclusive()
            .map_err(|_| LoggerError::HistoryLocked { path: path.clone() })?;

        let mut log = HistoryLog {
            path,
            file,
            rows_appended: 0,
        };
        if created || log.file.metadata()?.len() == 0 {
            log.write_header()?;
            info!("Created history log {}", log.path.display());
        } else {
            debug!("Appending to existing history log {}", log.path.display());
        }
        Ok(log)
    }

    fn write_header(&mut self) -> Result<()> {
        let mut w = writer(&mut self.file);
        w.write_record(COLUMNS)?;
        w.flush()?;
        Ok(())
    }

    /// Append one row and flush it to the OS. A failed write leaves the file as
    /// it was before the call.
    pub fn append(&mut self, row: &NodeRow) -> Result<()> {
        let mut w = writer(Vec::with_capacity(128));
        w.serialize(row)?;
        let line = w.into_inner().map_err(|e| e.into_error())?;
        write_or_rollback(&mut self.file, &line, |f, bytes| {
            f.write_all(bytes).and_then(|_| f.flush())
        })?;
        self.rows_appended += 1;
        Ok(())
    }

    /// Push appended rows to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended by this process.
    pub fn rows_appended(&self) -> u64 {
        self.rows_appended
    }

    /// Read every data row of a history (or snapshot) file.
    pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<NodeRow>> {
        let mut reader = csv::Reader::from_path(path)?;
        let rows = reader.deserialize().collect::<std::result::Result<Vec<NodeRow>, _>>()?;
        Ok(rows)
    }
}

impl Drop for HistoryLog {
    fn drop(&mut self) {
        let _ = self.file.flush();
        let _ = FileExt::unlock(&self.file);
    }
}

/// Run `write` and cut the file back to its previous length if it fails, so a
/// torn row never gets joined onto the next one.
fn write_or_rollback<F>(file: &mut File, bytes: &[u8], write: F) -> std::io::Result<()>
where
    F: FnOnce(&mut File, &[u8]) -> std::io::Result<()>,
{
    let len = file.metadata()?.len();
    if let Err(e) = write(file, bytes) {
        if let Err(trunc) = file.set_len(len) {
            warn!("Could not drop partial history row: {}", trunc);
        }
        return Err(e);
    }
    Ok(())
}

/// CSV writer matching the log's existing layout (no implicit header, CRLF).
pub(super) fn writer<W: Write>(w: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::CRLF)
        .from_writer(w)
}
