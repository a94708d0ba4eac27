//! Timestamped snapshots of the live site file
//!
//! Backups sit next to the live file as `<path>.backup.<YYYYMMDD-HHMMSS>` and
//! are never pruned. Two runs within the same second share a name; the later
//! one overwrites the earlier.

use chrono::{DateTime, Local, TimeZone};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Format of the timestamp suffix; lexicographic order is chronological
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

const BACKUP_INFIX: &str = ".backup.";

/// Backup file name for `live` taken at `timestamp`
pub fn backup_path_for<Tz: TimeZone>(live: &Path, timestamp: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    let mut name = live.as_os_str().to_os_string();
    name.push(BACKUP_INFIX);
    name.push(timestamp.format(TIMESTAMP_FORMAT).to_string());
    PathBuf::from(name)
}

/// Replace `path` with `contents` atomically
///
/// The data goes to a sibling temp file which is synced and then renamed over
/// `path`, so a reader sees either the old file or the new one. An existing
/// file's permission bits are carried over; a new file gets 0644 on unix.
pub fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;

    match std::fs::metadata(path) {
        Ok(meta) => tmp.as_file().set_permissions(meta.permissions())?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tmp.as_file()
                    .set_permissions(std::fs::Permissions::from_mode(0o644))?;
            }
        }
        Err(e) => return Err(e),
    }

    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), bytes = contents.len(), "File replaced");
    Ok(())
}

/// Creates and restores backups of a single live file
#[derive(Debug, Clone)]
pub struct BackupManager {
    live: PathBuf,
}

impl BackupManager {
    pub fn new(live: impl Into<PathBuf>) -> Self {
        Self { live: live.into() }
    }

    pub fn live_path(&self) -> &Path {
        &self.live
    }

    /// Snapshot the live file using the current local time
    ///
    /// Returns `Ok(None)` when there is no live file yet.
    pub fn create(&self) -> io::Result<Option<PathBuf>> {
        self.create_at(&Local::now())
    }

    /// Snapshot the live file under the given timestamp
    pub fn create_at<Tz: TimeZone>(&self, timestamp: &DateTime<Tz>) -> io::Result<Option<PathBuf>>
    where
        Tz::Offset: std::fmt::Display,
    {
        if !self.live.exists() {
            info!(path = %self.live.display(), "No existing site file, skipping backup");
            return Ok(None);
        }

        let backup = backup_path_for(&self.live, timestamp);
        // fs::copy carries the permission bits over
        std::fs::copy(&self.live, &backup)?;
        info!(backup = %backup.display(), "Backup created");
        Ok(Some(backup))
    }

    /// Copy a backup back over the live file
    pub fn restore(&self, backup: &Path) -> io::Result<()> {
        let contents = std::fs::read(backup)?;
        replace_file(&self.live, &contents)?;
        info!(backup = %backup.display(), path = %self.live.display(), "Backup restored");
        Ok(())
    }

    /// Existing backups of the live file, oldest first
    pub fn list(&self) -> io::Result<Vec<PathBuf>> {
        let dir = match self.live.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let Some(file_name) = self.live.file_name() else {
            return Ok(Vec::new());
        };
        let prefix = format!("{}{}", file_name.to_string_lossy(), BACKUP_INFIX);

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && entry.file_type()?.is_file() {
                backups.push(entry.path());
            }
        }
        backups.sort();
        Ok(backups)
    }
}
