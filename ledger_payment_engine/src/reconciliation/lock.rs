//! Cross-process mutual exclusion for reconciliation cycles.
//!
//! Several gateway processes may share one database. Only one of them should reconcile at a time, so each cycle
//! first creates a lock file. The file records who took it and for how long. A lock that has outlived its TTL is
//! considered abandoned and may be taken over. So is a lock whose contents cannot be read, once the file itself is
//! older than the TTL. The record is written to a staging file and hard-linked into place, so a competitor never sees a
//! half-written lock.
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use super::errors::LockError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub acquired_at: DateTime<Utc>,
    /// Seconds
    pub ttl: u64,
    pub holder_id: String,
}

impl LockRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = i64::try_from(self.ttl).unwrap_or(i64::MAX);
        (now - self.acquired_at).num_seconds() > ttl
    }
}

#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    ttl: Duration,
    holder_id: String,
}

impl FileLock {
    pub fn new<P: AsRef<Path>>(path: P, ttl: Duration) -> Self {
        let holder_id = format!("{}-{:08x}", std::process::id(), rand::random::<u32>());
        Self { path: path.as_ref().to_path_buf(), ttl, holder_id }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Tries to take the lock without waiting. `Ok(None)` means somebody else holds a live lock.
    pub fn try_acquire(&self) -> Result<Option<LockGuard>, LockError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let record = LockRecord { acquired_at: Utc::now(), ttl: self.ttl.as_secs(), holder_id: self.holder_id.clone() };
        let json = serde_json::to_vec(&record).map_err(|e| self.io_error(e))?;
        let staging = self.staging_path();
        fs::write(&staging, json).map_err(|e| self.io_error(e))?;
        let result = self.link_staged(&staging);
        if let Err(e) = fs::remove_file(&staging) {
            warn!("🔒️ Could not remove staging file {}: {e}", staging.display());
        }
        result
    }

    fn link_staged(&self, staging: &Path) -> Result<Option<LockGuard>, LockError> {
        // Two rounds: the second one runs after removing an abandoned lock
        for _ in 0..2 {
            // hard_link never replaces an existing file
            match fs::hard_link(staging, &self.path) {
                Ok(()) => {
                    trace!("🔒️ Acquired reconciliation lock {}", self.path.display());
                    return Ok(Some(LockGuard { path: self.path.clone(), holder_id: self.holder_id.clone() }));
                },
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if !self.remove_if_abandoned()? {
                        return Ok(None);
                    }
                },
                Err(e) => return Err(self.io_error(e)),
            }
        }
        Ok(None)
    }

    /// Removes the current lock file if it is abandoned. Returns false when the lock is live.
    fn remove_if_abandoned(&self) -> Result<bool, LockError> {
        match read_record(&self.path) {
            Some(record) if !record.is_expired(Utc::now()) => {
                debug!("🔒️ Reconciliation lock is held by {}", record.holder_id);
                Ok(false)
            },
            Some(stale) => {
                // Another process may have stolen the lock since it was read
                if read_record(&self.path).as_ref() != Some(&stale) {
                    debug!("🔒️ Reconciliation lock changed hands while inspecting it");
                    return Ok(false);
                }
                warn!("🔒️ Removing abandoned reconciliation lock held by {}", stale.holder_id);
                self.remove_lock_file()?;
                Ok(true)
            },
            None => match self.lock_file_age() {
                Some(age) if age > self.ttl => {
                    warn!("🔒️ Removing unreadable reconciliation lock last written {}s ago", age.as_secs());
                    self.remove_lock_file()?;
                    Ok(true)
                },
                Some(_) => {
                    debug!("🔒️ Reconciliation lock {} is unreadable but recent. Leaving it", self.path.display());
                    Ok(false)
                },
                // Vanished in the meantime
                None => Ok(true),
            },
        }
    }

    fn lock_file_age(&self) -> Option<Duration> {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        Some(SystemTime::now().duration_since(modified).unwrap_or_default())
    }

    fn remove_lock_file(&self) -> Result<(), LockError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn staging_path(&self) -> PathBuf {
        let name = self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        self.path.with_file_name(format!("{name}.{}.tmp", self.holder_id))
    }

    fn io_error<E: ToString>(&self, e: E) -> LockError {
        LockError::Io { path: self.path.clone(), reason: e.to_string() }
    }
}

fn read_record(path: &Path) -> Option<LockRecord> {
    let contents = fs::read(path).ok()?;
    serde_json::from_slice(&contents).ok()
}

/// Releases the lock when dropped, unless another process has taken it over in the meantime.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    holder_id: String,
}

impl LockGuard {
    pub fn release(self) {
        // Drop does the work
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match read_record(&self.path) {
            Some(record) if record.holder_id == self.holder_id => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!("🔒️ Could not remove reconciliation lock {}: {e}", self.path.display());
                } else {
                    trace!("🔒️ Released reconciliation lock {}", self.path.display());
                }
            },
            Some(record) => {
                warn!("🔒️ Reconciliation lock was taken over by {} before release", record.holder_id);
            },
            None => trace!("🔒️ Reconciliation lock {} already gone", self.path.display()),
        }
    }
}
