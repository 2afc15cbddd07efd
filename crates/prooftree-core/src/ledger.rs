//! The append-only event ledger (spec §4.B): a directory of one JSON file per
//! event, named by zero-padded `seq`, appended via `link()` (not `rename()`)
//! so that two racing writers can never silently clobber each other's
//! sequence slot — the loser observes `EEXIST` and retries at the next seq.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::Event;

const MIN_SEQ_WIDTH: usize = 4;

/// Handle onto a ledger directory. Cheap to construct; holds no file descriptors.
pub struct Ledger {
    dir: PathBuf,
    retry_limit: u32,
    fsync: bool,
}

impl Ledger {
    /// Open (without creating) the ledger at `dir` using `config`'s retry/fsync policy.
    pub fn open(dir: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            dir: dir.into(),
            retry_limit: config.ledger_append_retry_limit,
            fsync: config.fsync_on_append,
        }
    }

    /// Create the ledger directory (and its parent proof directory structure)
    /// if it does not already exist.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn file_name(seq: u64) -> String {
        format!("{seq:0>width$}.json", width = MIN_SEQ_WIDTH)
    }

    fn path_for(&self, seq: u64) -> PathBuf {
        self.dir.join(Self::file_name(seq))
    }

    /// Scan the directory for the highest existing sequence number. Returns 0
    /// if the ledger is empty. Ignores non-matching file names (e.g. `NEXT`,
    /// stray temp files).
    fn max_existing_seq(&self) -> Result<u64> {
        let mut max_seq = 0u64;
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            if stem.chars().all(|c| c.is_ascii_digit()) && !stem.is_empty() {
                if let Ok(seq) = stem.parse::<u64>() {
                    max_seq = max_seq.max(seq);
                }
            }
        }
        Ok(max_seq)
    }

    /// Sweep orphaned `*.tmp-*` temp files left by a crashed append. Safe to
    /// call at any time; only removes files matching the temp-file naming
    /// scheme used by [`Ledger::append`].
    pub fn sweep_temp_files(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(name) = name.to_str() {
                if name.starts_with(".tmp-") {
                    let _ = fs::remove_file(entry.path());
                }
            }
        }
        Ok(())
    }

    /// Atomically append `event` (its `seq` field is overwritten) and return
    /// the assigned sequence number.
    ///
    /// Protocol (spec §4.B): write the payload to a temp file in the ledger
    /// directory, then `link()` the temp file to the candidate seq's path.
    /// `link()` fails with `AlreadyExists` rather than silently overwriting,
    /// which is exactly the collision signal needed to retry at `seq + 1`.
    pub fn append(&self, mut event: Event) -> Result<u64> {
        self.ensure_dir()?;
        let mut candidate = self.max_existing_seq()? + 1;
        let mut attempts = 0u32;
        loop {
            event.seq = candidate;
            let tmp_path = self.dir.join(format!(
                ".tmp-{}-{}",
                std::process::id(),
                candidate
            ));
            let bytes = serde_json::to_vec_pretty(&event)?;
            {
                let mut tmp = File::create(&tmp_path)?;
                tmp.write_all(&bytes)?;
                tmp.sync_all()?;
            }
            let target = self.path_for(candidate);
            match fs::hard_link(&tmp_path, &target) {
                Ok(()) => {
                    if self.fsync {
                        if let Ok(file) = File::open(&target) {
                            let _ = file.sync_all();
                        }
                        sync_dir(&self.dir);
                    }
                    let _ = fs::remove_file(&tmp_path);
                    tracing::debug!("[ledger] appended seq {candidate} ({})", event.payload.type_name());
                    return Ok(candidate);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let _ = fs::remove_file(&tmp_path);
                    attempts += 1;
                    tracing::debug!("[ledger] seq {candidate} taken by a racing writer, retrying");
                    if attempts > self.retry_limit {
                        tracing::warn!(
                            "[ledger] exceeded {} append retries at seq {candidate}",
                            self.retry_limit
                        );
                        return Err(Error::LedgerCorrupt(format!(
                            "exceeded {} append retries at seq {candidate}",
                            self.retry_limit
                        )));
                    }
                    candidate += 1;
                }
                Err(e) => {
                    let _ = fs::remove_file(&tmp_path);
                    return Err(e.into());
                }
            }
        }
    }

    /// Total number of events currently stored.
    pub fn count(&self) -> Result<u64> {
        self.max_existing_seq()
    }

    /// Read every event in ascending `seq` order. Unparseable files (or a
    /// missing file strictly between two present ones) are `LedgerCorrupt`;
    /// a trailing gap is tolerated (readers stop at the first hole).
    pub fn read_all(&self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        self.scan(0, |event| {
            events.push(event);
            Ok(())
        })?;
        Ok(events)
    }

    /// Iterate events with `seq > cursor` in ascending order, invoking
    /// `visitor` for each. Resumable: pass the last observed `seq` as cursor.
    pub fn scan(&self, cursor: u64, mut visitor: impl FnMut(Event) -> Result<()>) -> Result<()> {
        let max_seq = self.max_existing_seq()?;
        let mut seq = cursor + 1;
        while seq <= max_seq {
            let path = self.path_for(seq);
            match fs::read(&path) {
                Ok(bytes) => {
                    let event: Event = serde_json::from_slice(&bytes).map_err(|e| {
                        Error::LedgerCorrupt(format!("unparseable event at seq {seq}: {e}"))
                    })?;
                    visitor(event)?;
                    seq += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if seq == max_seq {
                        break;
                    }
                    return Err(Error::LedgerCorrupt(format!(
                        "missing event file for seq {seq} (gap before max seq {max_seq})"
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
