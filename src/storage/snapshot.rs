//! Latest-state snapshot file.
//!
//! Rewritten in full every cycle. Readers (map clients, `status`) only ever see a
//! complete file: the new content goes to a temp file in the same directory which
//! then replaces the old one with a rename.

use std::fs::{self as sfs, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::trace;

use super::history::writer;
use super::{NodeRow, COLUMNS};
use crate::error::Result;

pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file with a header plus `rows`.
    pub fn write(&self, rows: &[NodeRow]) -> Result<()> {
        let mut w = writer(Vec::with_capacity(256 + rows.len() * 128));
        w.write_record(COLUMNS)?;
        for row in rows {
            w.serialize(row)?;
        }
        let content = w.into_inner().map_err(|e| e.into_error())?;
        replace_file(&self.path, &content)?;
        trace!("Snapshot {} rewritten with {} rows", self.path.display(), rows.len());
        Ok(())
    }
}

/// Write `content` to a unique temp file next to `path`, fsync it, then rename it
/// over `path` and fsync the directory.
fn replace_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    sfs::create_dir_all(dir)?;
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("latest.csv");
    let mut counter = 0u32;
    let tmp_path = loop {
        let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(mut tmp) => {
                let written = tmp
                    .write_all(content)
                    .and_then(|_| tmp.flush())
                    .and_then(|_| tmp.sync_all());
                if let Err(e) = written {
                    let _ = sfs::remove_file(&candidate);
                    return Err(e);
                }
                break candidate;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
                continue;
            }
            Err(e) => return Err(e),
        }
    };

    if let Err(e) = sfs::rename(&tmp_path, path) {
        let _ = sfs::remove_file(&tmp_path);
        return Err(e);
    }
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::history::HistoryLog;
    use crate::storage::tests::row;

    #[test]
    fn empty_snapshot_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let snap = SnapshotFile::new(dir.path().join("latest.csv"));
        snap.write(&[]).unwrap();
        let text = sfs::read_to_string(snap.path()).unwrap();
        assert_eq!(text, format!("{}\r\n", COLUMNS.join(",")));
    }

    #[test]
    fn rewrite_replaces_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let snap = SnapshotFile::new(dir.path().join("latest.csv"));
        snap.write(&[row("!a", "1"), row("!b", "2")]).unwrap();
        snap.write(&[row("!c", "3")]).unwrap();
        let rows = HistoryLog::read_rows(snap.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].node_id, "!c");
        // No temp files left behind.
        let entries = sfs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let snap = SnapshotFile::new(dir.path().join("web").join("latest.csv"));
        snap.write(&[row("!a", "1")]).unwrap();
        assert!(snap.path().exists());
    }

    #[test]
    fn failed_replace_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("latest.csv");
        // A non-empty directory cannot be renamed over.
        sfs::create_dir(&target).unwrap();
        sfs::write(target.join("keep"), b"x").unwrap();

        let err = replace_file(&target, b"content").unwrap_err();
        assert_ne!(err.kind(), ErrorKind::AlreadyExists);
        let names: Vec<String> = sfs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["latest.csv".to_string()]);
    }
}
