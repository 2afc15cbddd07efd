//! The lock registry (spec §4.C): auxiliary mutual-exclusion markers under
//! `locks/<node-id>.lock`, used by agents that have not yet folded the
//! ledger to observe contention without reading every event.
//!
//! Authoritative claim state always lives in the folded ledger; a lock file
//! is a fast, racy hint, created with the same link-based atomic primitive
//! as ledger appends. The [`crate::service::Service`] orchestrates claim,
//! release, and reap (it is the sole event emitter); this module only
//! provides the filesystem-level primitives.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::NodeId;

/// On-disk contents of a `locks/<node-id>.lock` file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockRecord {
    pub owner: String,
    pub lease_expires: DateTime<Utc>,
    pub seq: u64,
}

impl LockRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires <= now
    }

    /// Whether the lease is expired *and* past the configured reap grace
    /// period — the window during which a just-expired lease is left alone
    /// in case its owner is still mid-release.
    pub fn is_reapable(&self, now: DateTime<Utc>, grace: chrono::Duration) -> bool {
        self.lease_expires + grace <= now
    }
}

/// Handle onto the `locks/` directory of a proof directory.
pub struct LockRegistry {
    dir: PathBuf,
}

impl LockRegistry {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn path_for(&self, node: &NodeId) -> PathBuf {
        self.dir.join(format!("{node}.lock"))
    }

    /// Read the current lock record for `node`, if any.
    pub fn read(&self, node: &NodeId) -> Result<Option<LockRecord>> {
        match fs::read(self.path_for(node)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Attempt to atomically create the lock file for `node`. Returns `true`
    /// if this call created it, `false` if a lock file already existed
    /// (the caller lost the race and must re-fold state to decide Busy vs
    /// a since-expired lease).
    pub fn try_create(&self, node: &NodeId, record: &LockRecord) -> Result<bool> {
        self.ensure_dir()?;
        let tmp_path = self
            .dir
            .join(format!(".tmp-{}-{}", std::process::id(), node));
        let bytes = serde_json::to_vec_pretty(record)?;
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        let target = self.path_for(node);
        match fs::hard_link(&tmp_path, &target) {
            Ok(()) => {
                let _ = fs::remove_file(&tmp_path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let _ = fs::remove_file(&tmp_path);
                Ok(false)
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(e.into())
            }
        }
    }

    /// Remove the lock file for `node`, tolerating its absence (already
    /// released or reaped by a racing process).
    pub fn remove(&self, node: &NodeId) -> Result<()> {
        match fs::remove_file(self.path_for(node)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
