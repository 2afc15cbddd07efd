//! Proof-directory layout and atomic auxiliary-file writes.
//!
//! The ledger and lock files use the link-based protocol in [`crate::ledger`]
//! and [`crate::locks`]; externals and definitions are not part of the
//! ordering-critical subsystem, so they are written with the cheaper
//! temp-then-rename idiom instead.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Resolve the ledger subdirectory under a proof directory.
pub fn ledger_dir(proof_dir: &Path) -> PathBuf {
    proof_dir.join("ledger")
}

/// Resolve the locks subdirectory under a proof directory.
pub fn locks_dir(proof_dir: &Path) -> PathBuf {
    proof_dir.join("locks")
}

/// Resolve the externals subdirectory under a proof directory.
pub fn externals_dir(proof_dir: &Path) -> PathBuf {
    proof_dir.join("externals")
}

/// Resolve the definitions subdirectory under a proof directory.
pub fn definitions_dir(proof_dir: &Path) -> PathBuf {
    proof_dir.join("definitions")
}

/// Atomically write a file: create parent dirs, write to a temp file, rename
/// into place. Used for `externals/<id>.json` and `definitions/<name>.json`,
/// which (unlike the ledger and lock files) have no collision-retry needs —
/// each is keyed by a unique, service-assigned name.
pub fn write_file_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn layout_helpers_join_expected_names() {
        let root = Path::new("/tmp/proof");
        assert_eq!(ledger_dir(root), root.join("ledger"));
        assert_eq!(locks_dir(root), root.join("locks"));
        assert_eq!(externals_dir(root), root.join("externals"));
        assert_eq!(definitions_dir(root), root.join("definitions"));
    }

    #[test]
    fn write_file_atomic_creates_parents_and_writes_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("externals").join("ext-1.json");
        write_file_atomic(&path, b"{\"id\":\"ext-1\"}").unwrap();
        let read_back = fs::read(&path).unwrap();
        assert_eq!(read_back, b"{\"id\":\"ext-1\"}");
    }
}
