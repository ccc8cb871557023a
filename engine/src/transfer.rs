//! Single-item transfer engine.
//!
//! The copy primitive exposed by the device namespace is fire-and-forget:
//! it returns before any data has moved and offers no completion callback.
//! Everything here is built around that constraint. An item is copied into
//! a staging directory nested in its destination directory, completion is
//! detected by bounded polling, and only a fully staged file is ever moved
//! (atomically) onto the final destination path. Two variants exist:
//!
//! - full-verify ([`transfer_verified`]): SHA-256 the staged bytes, compare
//!   against the ledger (or the current destination file), and record the
//!   digest so unchanged content is never re-verified across runs;
//! - update mode ([`transfer_update`]): cheap size-based reconciliation
//!   with no hashing and no ledger writes, for frequent incremental runs.
//!
//! Exactly one item is in flight at a time; the staging directory is
//! cleared before every transfer call.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crate::cancel::CancelFlag;
use crate::device::DeviceItem;
use crate::digest::sha256_file;
use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::model::{LocalEntry, SourceSize, TransferOptions, TransferStatus, UnknownSizePolicy};
use crate::observer::TransferObserver;

/// Name of the staging subdirectory nested in each destination directory.
pub const STAGING_DIR_NAME: &str = ".devsync_tmp";

/// Destination directory and ledger key for an item.
///
/// With preserve-subfolders enabled, the immediate parent folder's display
/// title becomes one path component under the destination root; the ledger
/// key always uses forward slashes.
pub(crate) fn destination_for(
    name: &str,
    parent_title: &str,
    dest_root: &Path,
    preserve_subfolders: bool,
) -> (PathBuf, String) {
    if preserve_subfolders && !parent_title.is_empty() {
        (
            dest_root.join(parent_title),
            format!("{}/{}", parent_title, name),
        )
    } else {
        (dest_root.to_path_buf(), name.to_string())
    }
}

fn ensure_dir(path: &Path) -> Result<(), EngineError> {
    fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreationFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Clear and recreate the staging directory. Called before every transfer
/// so a prior item's remnants can never be mistaken for the staged file.
fn clear_staging(stage_dir: &Path) -> Result<(), EngineError> {
    if stage_dir.exists() {
        fs::remove_dir_all(stage_dir).map_err(|e| EngineError::Write {
            path: stage_dir.to_path_buf(),
            source: e,
        })?;
    }
    ensure_dir(stage_dir)
}

/// Child names of a directory; transient listing failures read as empty.
fn list_names(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

/// Poll the staging directory for a file that was absent before the copy
/// request. An exact name match wins; otherwise the most recently modified
/// new file is taken. Not appearing within the bound is fatal for the item.
fn wait_for_staged(
    stage_dir: &Path,
    expected_name: &str,
    before: &HashSet<String>,
    opts: &TransferOptions,
    cancel: &CancelFlag,
) -> Result<PathBuf, EngineError> {
    let start = Instant::now();
    loop {
        cancel.check()?;

        let new_names: Vec<String> = list_names(stage_dir)
            .into_iter()
            .filter(|n| !before.contains(n))
            .collect();
        if new_names.iter().any(|n| n == expected_name) {
            let path = stage_dir.join(expected_name);
            if path.is_file() {
                return Ok(path);
            }
        }
        let newest = new_names
            .iter()
            .map(|n| stage_dir.join(n))
            .filter(|p| p.is_file())
            .max_by_key(|p| {
                fs::metadata(p)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH)
            });
        if let Some(path) = newest {
            return Ok(path);
        }

        if start.elapsed() >= opts.stage_timeout {
            return Err(EngineError::Timeout {
                path: stage_dir.to_path_buf(),
                waited: opts.stage_timeout,
            });
        }
        thread::sleep(opts.poll_interval);
    }
}

/// Poll until the staged file's size reaches or exceeds `expected`, or,
/// when a settle window is given, until the size is non-zero and has not
/// changed for that long.
///
/// Returns whether a completion condition was met. Timing out here is not
/// fatal: hashing proceeds regardless and, when an exact size is known,
/// the post-finalize size check is authoritative. Early termination on
/// exceeding the expected size is deliberate — an approximate expectation
/// may overshoot the true size.
fn wait_for_size(
    staged: &Path,
    expected: Option<u64>,
    settle: Option<Duration>,
    opts: &TransferOptions,
    cancel: &CancelFlag,
) -> Result<bool, EngineError> {
    let start = Instant::now();
    let mut last_len: Option<u64> = None;
    let mut last_change = Instant::now();
    loop {
        cancel.check()?;
        if let Ok(meta) = fs::metadata(staged) {
            let len = meta.len();
            if last_len != Some(len) {
                last_len = Some(len);
                last_change = Instant::now();
            }
            if let Some(expected) = expected {
                if len >= expected && len > 0 {
                    return Ok(true);
                }
            }
            if let Some(window) = settle {
                if len > 0 && last_change.elapsed() >= window {
                    return Ok(true);
                }
            }
        }
        if start.elapsed() >= opts.stage_timeout {
            return Ok(false);
        }
        thread::sleep(opts.poll_interval);
    }
}

/// Best-effort cleanup handle for the staged temporary file. Dropping the
/// guard removes the file unless it was finalized into place.
struct StagedGuard {
    path: PathBuf,
    keep: bool,
}

impl Drop for StagedGuard {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Issue the asynchronous copy, wait for the staged file to appear, then
/// wait for its size to catch up: to the exact size when the source
/// exposes one, otherwise until the file stops growing for a settle
/// window.
fn stage_item(
    item: &dyn DeviceItem,
    name: &str,
    dest_dir: &Path,
    opts: &TransferOptions,
    cancel: &CancelFlag,
    observer: Option<&dyn TransferObserver>,
) -> Result<StagedGuard, EngineError> {
    let stage_dir = dest_dir.join(STAGING_DIR_NAME);
    clear_staging(&stage_dir)?;

    cancel.check()?;
    let before: HashSet<String> = list_names(&stage_dir).into_iter().collect();
    if let Some(obs) = observer {
        obs.on_stage_started(&stage_dir);
    }
    item.begin_copy_to(&stage_dir)?;

    let staged = wait_for_staged(&stage_dir, name, &before, opts, cancel)?;
    let guard = StagedGuard {
        path: staged,
        keep: false,
    };
    if let Some(obs) = observer {
        obs.on_staged(&guard.path);
    }

    // An exact size expectation completes the wait on its own (a zero-byte
    // source is complete on appearance). Without one, the staged file must
    // stop growing for a full settle window before it can be trusted; an
    // approximate expectation additionally bounds that wait from below.
    let settled = match best_known_size(item) {
        Some(SourceSize { bytes: 0, exact: true }) => true,
        Some(SourceSize { bytes, exact: true }) => {
            wait_for_size(&guard.path, Some(bytes), None, opts, cancel)?
        }
        known => {
            let approx = known.map(|s| s.bytes).filter(|b| *b > 0);
            wait_for_size(&guard.path, approx, Some(opts.settle_window), opts, cancel)?
        }
    };
    if settled {
        if let Some(obs) = observer {
            let len = fs::metadata(&guard.path).map(|m| m.len()).unwrap_or(0);
            obs.on_size_verified(len);
        }
    }
    Ok(guard)
}

/// Atomically move `staged` onto `target`, replacing any existing file.
/// Falls back to remove-then-rename for platforms where rename cannot
/// replace.
fn replace_file(staged: &Path, target: &Path) -> Result<(), EngineError> {
    if fs::rename(staged, target).is_ok() {
        return Ok(());
    }
    if target.exists() {
        fs::remove_file(target).map_err(|e| EngineError::Write {
            path: target.to_path_buf(),
            source: e,
        })?;
    }
    fs::rename(staged, target).map_err(|e| EngineError::Write {
        path: target.to_path_buf(),
        source: e,
    })
}

/// Finalize a staged file onto `target`, disarming its cleanup guard.
fn finalize(mut guard: StagedGuard, target: &Path, cancel: &CancelFlag) -> Result<(), EngineError> {
    cancel.check()?;
    replace_file(&guard.path, target)?;
    guard.keep = true;
    Ok(())
}

/// Smallest non-colliding `name (n).ext` path inside `dest_dir`.
fn unique_target(dest_dir: &Path, name: &str) -> PathBuf {
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    };
    let mut n = 1;
    loop {
        let candidate = dest_dir.join(format!("{} ({}){}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Best-known source size: the exact attribute when present, else a parsed
/// display string flagged as approximate.
pub fn best_known_size(item: &dyn DeviceItem) -> Option<SourceSize> {
    if let Some(bytes) = item.exact_size() {
        return Some(SourceSize { bytes, exact: true });
    }
    item.size_display()
        .and_then(|s| parse_size_display(&s))
        .map(|bytes| SourceSize {
            bytes,
            exact: false,
        })
}

/// Parse a human-formatted size string ("5.2 MB", "1,024 KB") into
/// approximate bytes. Units are the 1024-based display units.
pub fn parse_size_display(s: &str) -> Option<u64> {
    let s = s.trim();
    let split = s
        .find(|c: char| c.is_alphabetic())
        .unwrap_or(s.len());
    let value: f64 = s[..split].trim().replace(',', "").parse().ok()?;
    if value < 0.0 {
        return None;
    }
    let multiplier: f64 = match s[split..].trim().to_uppercase().as_str() {
        "" | "B" | "BYTES" => 1.0,
        "KB" => 1024.0,
        "MB" => 1024.0 * 1024.0,
        "GB" => 1024.0 * 1024.0 * 1024.0,
        "TB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * multiplier).round() as u64)
}

/// Update-mode metadata pre-check, run by the caller before staging
/// anything: skip only when the normalized extension matches and pixel
/// dimensions are known on both sides and equal. Any missing evidence
/// fails toward transferring.
pub fn metadata_matches(local: &LocalEntry, item: &dyn DeviceItem) -> bool {
    let src_ext = Path::new(&item.name())
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    if src_ext != local.extension() {
        return false;
    }
    match (local.dimensions, item.dimensions()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Full-verify transfer of a single item.
///
/// Stages the item next to its destination, hashes the staged bytes
/// (cancellation-checked per chunk), and either discards an identical copy
/// or atomically replaces the destination, recording the digest in the
/// ledger either way. When the source advertises an exact size, the
/// finalized file's size must match it or an `Integrity` error is raised —
/// the file is left in place but must not be trusted.
pub fn transfer_verified(
    item: &dyn DeviceItem,
    parent_title: &str,
    dest_root: &Path,
    opts: &TransferOptions,
    ledger: &mut Ledger,
    cancel: &CancelFlag,
    observer: Option<&dyn TransferObserver>,
) -> Result<(TransferStatus, PathBuf), EngineError> {
    cancel.check()?;
    let name = item.name();
    let (dest_dir, rel_key) =
        destination_for(&name, parent_title, dest_root, opts.preserve_subfolders);
    ensure_dir(&dest_dir)?;
    if let Some(obs) = observer {
        obs.on_dest_prepared(&dest_dir);
    }
    let target = dest_dir.join(&name);

    // Fast skip on cheap evidence, before any device I/O.
    cancel.check()?;
    if target.is_file() {
        if opts.fast_skip.uses_ledger() && ledger.contains(&rel_key) {
            return Ok((TransferStatus::SkippedIdentical, target));
        }
        if opts.fast_skip.uses_size() {
            if let Some(src_size) = item.exact_size() {
                let dest_size = fs::metadata(&target).map(|m| m.len()).ok();
                if dest_size == Some(src_size) {
                    return Ok((TransferStatus::SkippedIdentical, target));
                }
            }
        }
    }

    let staged = stage_item(item, &name, &dest_dir, opts, cancel, observer)?;

    cancel.check()?;
    let digest = sha256_file(&staged.path, cancel)?;
    if let Some(obs) = observer {
        obs.on_hash_computed(&staged.path, &digest);
    }

    // Prior digest: the ledger is authoritative; only hash the destination
    // when it exists and the ledger has never seen this path.
    let existing = match ledger.get(&rel_key) {
        Some(d) => Some(d.to_string()),
        None if target.is_file() => {
            cancel.check()?;
            let d = sha256_file(&target, cancel)?;
            if let Some(obs) = observer {
                obs.on_hash_computed(&target, &d);
            }
            Some(d)
        }
        None => None,
    };

    if existing.as_deref() == Some(digest.as_str()) {
        drop(staged);
        if !ledger.contains(&rel_key) {
            ledger.record(&rel_key, &digest)?;
            if let Some(obs) = observer {
                obs.on_recorded(&rel_key);
            }
        }
        return Ok((TransferStatus::SkippedIdentical, target));
    }

    let had_existing = target.is_file();
    finalize(staged, &target, cancel)?;

    if ledger.get(&rel_key) != Some(digest.as_str()) {
        ledger.record(&rel_key, &digest)?;
        if let Some(obs) = observer {
            obs.on_recorded(&rel_key);
        }
    }

    // The post-finalize size check is authoritative.
    if let Some(expected) = item.exact_size() {
        let actual = fs::metadata(&target)
            .map(|m| m.len())
            .map_err(|e| EngineError::Read {
                path: target.clone(),
                source: e,
            })?;
        if actual != expected {
            return Err(EngineError::Integrity {
                path: target,
                expected,
                actual,
            });
        }
    }

    let status = if had_existing {
        TransferStatus::Replaced
    } else {
        TransferStatus::Copied
    };
    if let Some(obs) = observer {
        obs.on_finalized(&target, status);
    }
    Ok((status, target))
}

/// Update-mode transfer of a single item: size-based reconciliation with
/// no hashing and no ledger writes.
///
/// With skip-existing enabled, an existing destination is skipped when the
/// best-known source size matches (exactly, or within the configured
/// tolerance for approximate sizes); an unknown size follows the
/// unknown-size policy; a size differing beyond tolerance is copied under
/// a unique name so neither file is overwritten.
pub fn transfer_update(
    item: &dyn DeviceItem,
    parent_title: &str,
    dest_root: &Path,
    opts: &TransferOptions,
    cancel: &CancelFlag,
    observer: Option<&dyn TransferObserver>,
) -> Result<(TransferStatus, PathBuf), EngineError> {
    cancel.check()?;
    let name = item.name();
    let (dest_dir, _rel_key) =
        destination_for(&name, parent_title, dest_root, opts.preserve_subfolders);
    ensure_dir(&dest_dir)?;
    if let Some(obs) = observer {
        obs.on_dest_prepared(&dest_dir);
    }
    let target = dest_dir.join(&name);

    if !target.is_file() {
        let staged = stage_item(item, &name, &dest_dir, opts, cancel, observer)?;
        finalize(staged, &target, cancel)?;
        if let Some(obs) = observer {
            obs.on_finalized(&target, TransferStatus::CopiedNew);
        }
        return Ok((TransferStatus::CopiedNew, target));
    }

    if opts.skip_existing {
        let local = LocalEntry::probe(&target)?;
        // Matching pixel dimensions are decisive evidence on their own.
        if metadata_matches(&local, item) {
            return Ok((TransferStatus::SkippedSameSize, target));
        }
        let dest_size = local.size;
        match best_known_size(item) {
            Some(size) if size.exact && size.bytes == dest_size => {
                return Ok((TransferStatus::SkippedSameSize, target));
            }
            Some(size) if !size.exact && size.bytes.abs_diff(dest_size) <= opts.size_tolerance => {
                return Ok((TransferStatus::SkippedSameSize, target));
            }
            None => match opts.unknown_size {
                UnknownSizePolicy::Skip => {
                    return Ok((TransferStatus::SkippedUnknownSize, target));
                }
                UnknownSizePolicy::Replace => {
                    let staged = stage_item(item, &name, &dest_dir, opts, cancel, observer)?;
                    finalize(staged, &target, cancel)?;
                    if let Some(obs) = observer {
                        obs.on_finalized(&target, TransferStatus::CopiedReplaced);
                    }
                    return Ok((TransferStatus::CopiedReplaced, target));
                }
                UnknownSizePolicy::CopyUnique => {}
            },
            // Size known and differing beyond tolerance: keep both.
            Some(_) => {}
        }
    }

    let unique = unique_target(&dest_dir, &name);
    let staged = stage_item(item, &name, &dest_dir, opts, cancel, observer)?;
    finalize(staged, &unique, cancel)?;
    if let Some(obs) = observer {
        obs.on_finalized(&unique, TransferStatus::CopiedUnique);
    }
    Ok((TransferStatus::CopiedUnique, unique))
}
