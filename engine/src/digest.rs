//! Streaming SHA-256 file digests.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::cancel::CancelFlag;
use crate::error::EngineError;

/// Compute the lowercase hex SHA-256 digest of a file.
///
/// Cancellation is checked once per read chunk so abort latency stays
/// bounded even on very large files.
pub fn sha256_file(path: &Path, cancel: &CancelFlag) -> Result<String, EngineError> {
    let mut file = File::open(path).map_err(|e| EngineError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 65536]; // 64 KB buffer
    loop {
        cancel.check()?;
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) => {
                return Err(EngineError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_sha256_known_vectors() {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");

        let empty = temp.path().join("empty");
        fs::write(&empty, b"").expect("Failed to write file");
        assert_eq!(
            sha256_file(&empty, &CancelFlag::new()).expect("Failed to hash"),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );

        let hello = temp.path().join("hello");
        fs::write(&hello, b"hello").expect("Failed to write file");
        assert_eq!(
            sha256_file(&hello, &CancelFlag::new()).expect("Failed to hash"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_cancelled_hash_aborts() {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("file");
        fs::write(&path, b"data").expect("Failed to write file");

        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(matches!(
            sha256_file(&path, &cancel),
            Err(EngineError::Aborted)
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("absent");
        assert!(matches!(
            sha256_file(&path, &CancelFlag::new()),
            Err(EngineError::Read { .. })
        ));
    }
}
