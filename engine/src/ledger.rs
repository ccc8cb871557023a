//! Persistent verification ledger.
//!
//! Maps destination-relative paths (forward slashes) to the last-known
//! SHA-256 digest of their content. The backing file is UTF-8 text, one
//! `<digest><TAB><relative-path>` record per line; blank lines and lines
//! starting with `#` are ignored. Normal operation only ever appends;
//! a full rebuild writes a temporary sibling and atomically replaces the
//! file. The engine process is the single writer.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::cancel::CancelFlag;
use crate::digest::sha256_file;
use crate::enumerate::{compile_patterns, matches_any};
use crate::error::EngineError;

/// Counts reported by a full ledger rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildStats {
    /// Records written into the new ledger
    pub entries: usize,
    /// Files that could not be hashed
    pub errors: usize,
}

/// In-memory view of the ledger plus its backing file.
pub struct Ledger {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl Ledger {
    /// Load the ledger file, building a map where the last line wins for
    /// duplicate paths. A missing file yields an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();
        let mut entries = HashMap::new();
        if path.exists() {
            let text = fs::read_to_string(&path).map_err(|e| EngineError::Ledger {
                path: path.clone(),
                source: e,
            })?;
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((digest, relpath)) = line.split_once('\t') {
                    entries.insert(relpath.to_string(), digest.to_string());
                }
            }
        }
        Ok(Ledger { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, relpath: &str) -> bool {
        self.entries.contains_key(relpath)
    }

    pub fn get(&self, relpath: &str) -> Option<&str> {
        self.entries.get(relpath).map(String::as_str)
    }

    /// Append one record and flush immediately, then update the map.
    ///
    /// Safe to call repeatedly across restarts: an interrupted append can
    /// at worst truncate its own line, never a record for another path.
    pub fn record(&mut self, relpath: &str, digest: &str) -> Result<(), EngineError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| EngineError::Ledger {
                path: self.path.clone(),
                source: e,
            })?;
        file.write_all(format!("{}\t{}\n", digest, relpath).as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| EngineError::Ledger {
                path: self.path.clone(),
                source: e,
            })?;
        self.entries
            .insert(relpath.to_string(), digest.to_string());
        Ok(())
    }

    /// Recompute digests for every matching file under `dest_root` and
    /// atomically replace the ledger file with the result.
    ///
    /// Directories named in `exclude_dirs` (the staging directory, for one)
    /// are not descended into, and the ledger file itself is never hashed.
    /// Cancellation discards the temporary file and leaves the prior ledger
    /// untouched. Per-file hash failures are counted, not fatal.
    pub fn rebuild(
        &mut self,
        dest_root: &Path,
        patterns: &[String],
        exclude_dirs: &[&str],
        cancel: &CancelFlag,
    ) -> Result<RebuildStats, EngineError> {
        let patterns = compile_patterns(patterns)?;
        let tmp_path = self.temp_path();

        let mut files = Vec::new();
        let mut errors = 0usize;
        collect_files(dest_root, exclude_dirs, &mut files, &mut errors)?;

        let result = (|| {
            let file = File::create(&tmp_path).map_err(|e| EngineError::Ledger {
                path: tmp_path.clone(),
                source: e,
            })?;
            let mut writer = BufWriter::new(file);
            writeln!(writer, "# rebuilt {}", chrono::Utc::now().to_rfc3339()).map_err(|e| {
                EngineError::Ledger {
                    path: tmp_path.clone(),
                    source: e,
                }
            })?;

            let mut entries = HashMap::new();
            for path in &files {
                cancel.check()?;
                if *path == self.path || *path == tmp_path {
                    continue;
                }
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if !matches_any(&name, &patterns) {
                    continue;
                }
                let relpath = path
                    .strip_prefix(dest_root)
                    .unwrap_or(path)
                    .to_string_lossy()
                    .replace('\\', "/");
                match sha256_file(path, cancel) {
                    Ok(digest) => {
                        writeln!(writer, "{}\t{}", digest, relpath).map_err(|e| {
                            EngineError::Ledger {
                                path: tmp_path.clone(),
                                source: e,
                            }
                        })?;
                        entries.insert(relpath, digest);
                    }
                    Err(EngineError::Aborted) => return Err(EngineError::Aborted),
                    Err(_) => errors += 1,
                }
            }
            writer.flush().map_err(|e| EngineError::Ledger {
                path: tmp_path.clone(),
                source: e,
            })?;
            Ok(entries)
        })();

        match result {
            Ok(entries) => {
                fs::rename(&tmp_path, &self.path).map_err(|e| EngineError::Ledger {
                    path: self.path.clone(),
                    source: e,
                })?;
                let written = entries.len();
                self.entries = entries;
                Ok(RebuildStats {
                    entries: written,
                    errors,
                })
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(e)
            }
        }
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ledger".to_string());
        self.path.with_file_name(format!("{}.tmp", name))
    }
}

fn collect_files(
    dir: &Path,
    exclude_dirs: &[&str],
    files: &mut Vec<PathBuf>,
    errors: &mut usize,
) -> Result<(), EngineError> {
    let entries = fs::read_dir(dir).map_err(|e| EngineError::Read {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => {
                *errors += 1;
                continue;
            }
        };
        let path = entry.path();
        if path.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if exclude_dirs.iter().any(|d| *d == name) {
                continue;
            }
            if collect_files(&path, exclude_dirs, files, errors).is_err() {
                *errors += 1;
            }
        } else {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_skips_blank_and_comment_lines() {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("verified.txt");
        fs::write(
            &path,
            "# header\n\nabc\tPhotos/a.jpg\n\ndef\tPhotos/b.jpg\n",
        )
        .expect("Failed to write ledger");

        let ledger = Ledger::load(&path).expect("Failed to load ledger");
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("Photos/a.jpg"), Some("abc"));
        assert_eq!(ledger.get("Photos/b.jpg"), Some("def"));
    }

    #[test]
    fn test_load_last_duplicate_wins() {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("verified.txt");
        fs::write(&path, "old\ta.jpg\nnew\ta.jpg\n").expect("Failed to write ledger");

        let ledger = Ledger::load(&path).expect("Failed to load ledger");
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("a.jpg"), Some("new"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let ledger =
            Ledger::load(temp.path().join("verified.txt")).expect("Failed to load ledger");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_record_appends_and_survives_reload() {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("verified.txt");

        let mut ledger = Ledger::load(&path).expect("Failed to load ledger");
        ledger.record("a.jpg", "abc").expect("Failed to record");
        ledger.record("b.jpg", "def").expect("Failed to record");
        ledger.record("a.jpg", "xyz").expect("Failed to record");

        let reloaded = Ledger::load(&path).expect("Failed to reload ledger");
        assert_eq!(reloaded.get("a.jpg"), Some("xyz"));
        assert_eq!(reloaded.get("b.jpg"), Some("def"));

        // Append-only during normal operation: three records, three lines.
        let text = fs::read_to_string(&path).expect("Failed to read ledger");
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_rebuild_replaces_stale_entries() {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let dest = temp.path();
        fs::write(dest.join("keep.jpg"), b"hello").expect("Failed to write file");
        fs::create_dir(dest.join(".stage")).expect("Failed to create staging dir");
        fs::write(dest.join(".stage").join("partial.jpg"), b"junk")
            .expect("Failed to write staged file");

        let path = dest.join("verified.txt");
        fs::write(&path, "stale\tgone.jpg\n").expect("Failed to write ledger");

        let mut ledger = Ledger::load(&path).expect("Failed to load ledger");
        let stats = ledger
            .rebuild(dest, &["*.jpg".to_string()], &[".stage"], &CancelFlag::new())
            .expect("Failed to rebuild");

        assert_eq!(stats, RebuildStats { entries: 1, errors: 0 });
        assert!(!ledger.contains("gone.jpg"));
        assert_eq!(
            ledger.get("keep.jpg"),
            Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );

        let text = fs::read_to_string(&path).expect("Failed to read ledger");
        assert!(text.starts_with("# rebuilt "));
        assert!(!text.contains("gone.jpg"));
        assert!(!text.contains("partial.jpg"));
    }

    #[test]
    fn test_rebuild_cancelled_keeps_prior_ledger() {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let dest = temp.path();
        fs::write(dest.join("a.jpg"), b"hello").expect("Failed to write file");

        let path = dest.join("verified.txt");
        fs::write(&path, "prior\ta.jpg\n").expect("Failed to write ledger");

        let mut ledger = Ledger::load(&path).expect("Failed to load ledger");
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = ledger
            .rebuild(dest, &[], &[], &cancel)
            .expect_err("rebuild should abort");
        assert!(matches!(err, EngineError::Aborted));

        // Temp file discarded, prior ledger untouched.
        assert!(!dest.join("verified.txt.tmp").exists());
        assert_eq!(
            fs::read_to_string(&path).expect("Failed to read ledger"),
            "prior\ta.jpg\n"
        );
    }

    #[test]
    fn test_rebuild_never_hashes_the_ledger_itself() {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let dest = temp.path();
        fs::write(dest.join("a.txt"), b"data").expect("Failed to write file");

        let path = dest.join("verified.txt");
        let mut ledger = Ledger::load(&path).expect("Failed to load ledger");
        ledger.record("seed", "0").expect("Failed to record");

        // Empty pattern set matches everything, but the ledger file and its
        // temp sibling must still be skipped.
        let stats = ledger
            .rebuild(dest, &[], &[], &CancelFlag::new())
            .expect("Failed to rebuild");
        assert_eq!(stats.entries, 1);
        assert!(ledger.contains("a.txt"));
        assert!(!ledger.contains("verified.txt"));
    }
}
