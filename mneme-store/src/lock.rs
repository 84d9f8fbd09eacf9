//! Writer exclusion for the store.
//!
//! Every mutating operation takes one exclusive file lock for its whole
//! duration. Acquisition never blocks: a held lock surfaces as `Busy`
//! immediately. Reads never touch the lock. The OS releases the lock if
//! the process dies, so a crash cannot wedge the store.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::errors::{StoreError, StoreResult};

/// Diagnostics written into the lock file by the current holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub operation: String,
    pub acquired_at: DateTime<Utc>,
}

/// An exclusive lock over the store's mutable state, released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl StoreLock {
    /// Try to take the lock, failing fast with `Busy` when another process
    /// or task holds it.
    pub fn acquire(path: &Path, operation: &str) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if let Err(err) = file.try_lock_exclusive() {
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Err(StoreError::Busy(describe_holder(path)));
            }
            return Err(StoreError::Io(err));
        }

        let info = LockInfo {
            pid: std::process::id(),
            operation: operation.to_string(),
            acquired_at: Utc::now(),
        };
        let payload =
            serde_json::to_vec(&info).map_err(|e| StoreError::Serialize(e.to_string()))?;
        file.set_len(0)?;
        file.write_all(&payload)?;
        file.flush()?;

        Ok(Self { file })
    }

    /// Probe whether the lock is currently held, without retaining it.
    pub fn is_held(path: &Path) -> bool {
        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file.try_lock_exclusive().is_err(),
            Err(_) => false,
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn describe_holder(path: &Path) -> String {
    let info = std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<LockInfo>(&raw).ok());
    match info {
        Some(info) => format!(
            "another {} has held the lock since {} (pid {})",
            info.operation, info.acquired_at, info.pid
        ),
        None => "the lock is held by another process".to_string(),
    }
}
