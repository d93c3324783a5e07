//! Atomic storage primitives.
//!
//! Every persisted document in the engine goes through this module. Writes
//! are write-temp-then-rename: the rename is the only visible state change,
//! so a crash mid-write leaves the previous document (or its absence)
//! intact, never a partial file. Reads validate the on-disk bytes against
//! the expected shape and fail closed on corruption.

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::errors::{Result, StoreError};

/// Create a directory and all missing ancestors. Idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read raw bytes, mapping an absent file to `NotFound`.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Load and structurally validate a JSON document.
///
/// An absent file is `NotFound`; bytes that fail to deserialize into `T`
/// (corruption or schema drift) are `Validation`.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = read_bytes(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::validation(path.display().to_string(), e.to_string()))
}

/// Serialize a value as pretty-printed JSON and write it atomically.
pub fn write_document_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialize {
        path: path.to_path_buf(),
        source: e,
    })?;
    bytes.push(b'\n');
    write_bytes_atomic(path, &bytes)
}

/// Write bytes to a sibling temporary path, then rename over the destination.
///
/// On platforms where rename-over-existing can fail transiently (Windows),
/// the destination is removed and the rename retried once. A write that
/// fails after the temp file exists removes it, so failed writes never
/// accumulate orphaned siblings.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    fs::write(&tmp, bytes).map_err(|e| StoreError::Io {
        path: tmp.clone(),
        source: e,
    })?;

    if let Err(first) = fs::rename(&tmp, path) {
        if !path.exists() {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: first,
            });
        }
        warn!(path = %path.display(), "rename over existing file failed; removing destination and retrying");
        if let Err(e) = fs::remove_file(path) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    }
    Ok(())
}

/// Stable content digest for artifact fingerprinting (not a security control).
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("sha256:");
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Sibling temporary path: `run.json` -> `run.json.tmp`.
///
/// Appends rather than replaces the extension so artifacts with different
/// extensions never collide on the same temp name, and the temp file stays
/// on the same filesystem as the destination.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn read_missing_document_is_not_found() {
        let dir = tempdir().unwrap();
        let err = read_document::<Doc>(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn read_corrupt_document_is_validation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, b"{\"name\": 12").unwrap();
        let err = read_document::<Doc>(&path).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[test]
    fn read_shape_mismatch_is_validation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, b"{\"name\": \"x\"}").unwrap();
        let err = read_document::<Doc>(&path).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let doc = Doc {
            name: "alpha".into(),
            count: 3,
        };
        write_document_atomic(&path, &doc).unwrap();
        assert_eq!(read_document::<Doc>(&path).unwrap(), doc);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn atomic_write_replaces_existing_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_bytes_atomic(&path, b"first").unwrap();
        write_bytes_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn leftover_temp_file_does_not_break_next_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        // Simulate a crash that left a stale temp file behind.
        fs::write(temp_path(&path), b"garbage from a dead writer").unwrap();
        write_bytes_atomic(&path, b"fresh").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"fresh");
    }

    #[test]
    fn interrupted_write_leaves_destination_intact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_bytes_atomic(&path, b"stable").unwrap();
        // A writer that died before rename only produced the temp file.
        fs::write(temp_path(&path), b"half-writ").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"stable");
    }

    #[test]
    fn failed_write_does_not_leave_temp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        // Occupy the destination with a directory so the rename (and the
        // remove-destination retry) both fail.
        fs::create_dir(&path).unwrap();

        let err = write_bytes_atomic(&path, b"payload").unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn content_hash_matches_known_vectors() {
        assert_eq!(
            content_hash(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            content_hash(b"abc"),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn content_hash_is_stable_across_calls() {
        let payload = b"{\"plan\": true}";
        assert_eq!(content_hash(payload), content_hash(payload));
    }
}
