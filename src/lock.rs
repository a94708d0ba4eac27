//! Optional single-instance lock
//!
//! Runs are expected not to overlap. When a lock file is configured this is
//! enforced with a non-blocking exclusive `flock`, held until the guard drops.

use crate::error::{Error, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Holds the lock for as long as it is alive
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    _file: File,
}

impl RunLock {
    #[cfg(unix)]
    pub fn acquire(path: &Path) -> Result<Self> {
        use std::io::Write;
        use std::os::unix::io::AsRawFd;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        let fd = file.as_raw_fd();
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };

        if result != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Err(Error::LockHeld(path.to_path_buf()));
            }
            return Err(err.into());
        }

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "Lock acquired");

        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    #[cfg(not(unix))]
    pub fn acquire(path: &Path) -> Result<Self> {
        use std::io::Write;

        let mut file = File::create(path)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
