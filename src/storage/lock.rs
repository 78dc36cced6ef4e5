//! Single-owner lock for the backing directory.
//!
//! The in-memory pool and capacity counter are only correct if no other
//! process writes to the directory, so `serve` takes an exclusive advisory
//! `flock` on a lock file kept outside it. The lock is released when the
//! guard is dropped or the process exits.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::errors::{PasteError, Result};

/// Held exclusive lock on `path`.
pub struct InstanceLock {
    path: PathBuf,
    #[cfg(unix)]
    _guard: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl InstanceLock {
    /// Take the lock without blocking.
    ///
    /// Fails with `InstanceLocked` if another process holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| PasteError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| PasteError::io(path, e))?;

        #[cfg(unix)]
        {
            use nix::fcntl::{Flock, FlockArg};

            let mut guard = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(
                |(_, errno)| {
                    if errno == nix::errno::Errno::EWOULDBLOCK {
                        PasteError::InstanceLocked {
                            path: path.to_path_buf(),
                        }
                    } else {
                        PasteError::io(path, std::io::Error::from(errno))
                    }
                },
            )?;
            write_pid(&mut guard, path)?;
            Ok(Self {
                path: path.to_path_buf(),
                _guard: guard,
            })
        }

        #[cfg(not(unix))]
        {
            let mut file = file;
            write_pid(&mut file, path)?;
            Ok(Self {
                path: path.to_path_buf(),
                _file: file,
            })
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for InstanceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceLock")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn write_pid(file: &mut File, path: &Path) -> Result<()> {
    file.set_len(0).map_err(|e| PasteError::io(path, e))?;
    writeln!(file, "{}", std::process::id()).map_err(|e| PasteError::io(path, e))
}
