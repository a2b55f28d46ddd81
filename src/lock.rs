//! Advisory file locks for object actions and daemon control
//!
//! A lock is an exclusive `flock` on a file; the holder writes its pid and
//! intent into the file so a waiter can report who holds it. Acquisition
//! polls until a deadline. Locks are not reentrant: a second acquisition
//! from the same process on another descriptor waits like any other.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock not acquired: {path} within {timeout:?}{}", holder_suffix(.holder.as_ref()))]
    Timeout {
        path: PathBuf,
        timeout: Duration,
        holder: Option<Holder>,
    },

    #[error("lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn holder_suffix(holder: Option<&Holder>) -> String {
    holder.map_or_else(String::new, |h| {
        format!(" (held by pid {} for {})", h.pid, h.intent)
    })
}

/// Who holds a lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub pid: u32,
    pub intent: String,
    pub since: chrono::DateTime<chrono::Utc>,
}

/// A held lock, released on drop
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        unlock(&self.file);
        log::debug!("lock released: {}", self.path.display());
    }
}

/// Acquire an exclusive lock, waiting up to `timeout`
pub fn acquire(path: &Path, timeout: Duration, intent: &str) -> Result<LockGuard, LockError> {
    let io_err = |source| LockError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(io_err)?;

    let deadline = Instant::now() + timeout;
    loop {
        if try_lock(&file).map_err(io_err)? {
            break;
        }
        if Instant::now() >= deadline {
            return Err(LockError::Timeout {
                path: path.to_path_buf(),
                timeout,
                holder: read_holder(&mut file),
            });
        }
        log::trace!("waiting for lock {}", path.display());
        std::thread::sleep(POLL_INTERVAL);
    }

    let holder = Holder {
        pid: std::process::id(),
        intent: intent.to_string(),
        since: chrono::Utc::now(),
    };
    write_holder(&mut file, &holder).map_err(io_err)?;
    log::debug!("lock acquired: {} ({intent})", path.display());
    Ok(LockGuard {
        file,
        path: path.to_path_buf(),
    })
}

fn write_holder(file: &mut File, holder: &Holder) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    serde_json::to_writer(&mut *file, holder)?;
    file.flush()
}

fn read_holder(file: &mut File) -> Option<Holder> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    serde_json::from_str(&content).ok()
}

#[cfg(unix)]
fn try_lock(file: &File) -> std::io::Result<bool> {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the descriptor is owned by `file` and stays open for the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the descriptor is owned by `file` and stays open for the call.
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> std::io::Result<bool> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "file locks are only supported on unix",
    ))
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/action.lock");
        let guard = acquire(&path, Duration::from_secs(1), "start").unwrap();
        assert_eq!(guard.path(), path);
        drop(guard);
        let again = acquire(&path, Duration::from_millis(50), "stop");
        assert!(again.is_ok());
    }

    #[test]
    fn test_not_reentrant_times_out_with_holder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("action.lock");
        let _held = acquire(&path, Duration::from_secs(1), "start").unwrap();
        let err = acquire(&path, Duration::from_millis(200), "stop").unwrap_err();
        match &err {
            LockError::Timeout { holder, .. } => {
                let holder = holder.as_ref().unwrap();
                assert_eq!(holder.pid, std::process::id());
                assert_eq!(holder.intent, "start");
            }
            LockError::Io { .. } => panic!("unexpected {err}"),
        }
        assert!(err.to_string().starts_with("lock not acquired"));
    }

    #[test]
    fn test_waits_for_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("action.lock");
        let held = acquire(&path, Duration::from_secs(1), "start").unwrap();
        let waiter = {
            let path = path.clone();
            std::thread::spawn(move || acquire(&path, Duration::from_secs(5), "stop").is_ok())
        };
        std::thread::sleep(Duration::from_millis(250));
        drop(held);
        assert!(waiter.join().unwrap());
    }
}
