//! Core data model for device transfers.
//!
//! This module defines the outcome taxonomy, the policies controlling
//! skip behavior, the per-call options bundle, and the read-only views of
//! local and remote sizes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::EngineError;

/// Outcome of a single-item transfer.
///
/// Aborts and failures are not statuses; they surface as
/// `Err(EngineError)` from the transfer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Full-verify: no destination existed, staged file moved into place
    Copied,
    /// Full-verify: destination existed with a different digest and was
    /// atomically replaced
    Replaced,
    /// Full-verify: digests matched, staged copy discarded
    SkippedIdentical,
    /// Update mode: no destination existed
    CopiedNew,
    /// Update mode: destination kept, new content under a unique name
    CopiedUnique,
    /// Update mode: destination replaced in place (unknown-size policy)
    CopiedReplaced,
    /// Update mode: source and destination sizes match within tolerance
    SkippedSameSize,
    /// Update mode: source size unknown, policy says skip
    SkippedUnknownSize,
}

impl TransferStatus {
    /// True for outcomes that left the destination tree unchanged.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            TransferStatus::SkippedIdentical
                | TransferStatus::SkippedSameSize
                | TransferStatus::SkippedUnknownSize
        )
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferStatus::Copied => "copied",
            TransferStatus::Replaced => "replaced",
            TransferStatus::SkippedIdentical => "skipped-identical",
            TransferStatus::CopiedNew => "copied-new",
            TransferStatus::CopiedUnique => "copied-unique",
            TransferStatus::CopiedReplaced => "copied-replaced",
            TransferStatus::SkippedSameSize => "skipped-same-size",
            TransferStatus::SkippedUnknownSize => "skipped-unknown-size",
        };
        write!(f, "{}", s)
    }
}

/// Cheap-evidence skip policy for the full-verify path, applied before any
/// device I/O.
///
/// `Size` and `LedgerOrSize` trade integrity assurance for speed: a size
/// match alone does not prove the content is identical. The default is
/// `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FastSkipPolicy {
    /// Never fast-skip; always stage and hash
    #[default]
    None,
    /// Skip when the ledger already has an entry for the relative path
    Ledger,
    /// Skip when the source exposes an exact size equal to the destination's
    Size,
    /// Skip on either kind of evidence
    LedgerOrSize,
}

impl FastSkipPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "ledger" => Some(Self::Ledger),
            "size" => Some(Self::Size),
            "ledger_or_size" => Some(Self::LedgerOrSize),
            _ => None,
        }
    }

    pub fn uses_ledger(&self) -> bool {
        matches!(self, Self::Ledger | Self::LedgerOrSize)
    }

    pub fn uses_size(&self) -> bool {
        matches!(self, Self::Size | Self::LedgerOrSize)
    }
}

/// What update mode does when the destination exists but the source size
/// cannot be determined at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownSizePolicy {
    /// Leave the destination alone (default)
    #[default]
    Skip,
    /// Replace the destination in place
    Replace,
    /// Copy under a new unique name, keeping both
    CopyUnique,
}

impl UnknownSizePolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "replace" => Some(Self::Replace),
            "copy_unique" => Some(Self::CopyUnique),
            _ => None,
        }
    }
}

/// Per-call options for the transfer engine.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Join the immediate parent folder's display title onto the
    /// destination root
    pub preserve_subfolders: bool,

    /// Update mode: apply the size-based skip checks when the destination
    /// already exists
    pub skip_existing: bool,

    /// Full-verify: cheap-evidence skip policy
    pub fast_skip: FastSkipPolicy,

    /// Update mode: behavior when the source size is unknown
    pub unknown_size: UnknownSizePolicy,

    /// Update mode: byte tolerance when the known size is only approximate
    pub size_tolerance: u64,

    /// Bound on the stage-wait and size-wait polling loops
    pub stage_timeout: Duration,

    /// Sleep between polling iterations; also bounds cancellation latency
    pub poll_interval: Duration,

    /// How long a staged file without an exact size expectation must stop
    /// growing before it is treated as complete
    pub settle_window: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        TransferOptions {
            preserve_subfolders: true,
            skip_existing: true,
            fast_skip: FastSkipPolicy::None,
            unknown_size: UnknownSizePolicy::Skip,
            size_tolerance: 4096,
            stage_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(300),
            settle_window: Duration::from_secs(1),
        }
    }
}

/// Best-known source size with an exactness flag.
///
/// `exact` is false when the value was parsed from a human-formatted
/// display string and may be rounded to a display unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSize {
    pub bytes: u64,
    pub exact: bool,
}

/// Read-only view of a destination-tree file.
#[derive(Debug, Clone)]
pub struct LocalEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Decoded pixel dimensions, when the file is a readable image
    pub dimensions: Option<(u32, u32)>,
}

impl LocalEntry {
    /// Stat a destination file, probing image dimensions best-effort.
    pub fn probe(path: &Path) -> Result<Self, EngineError> {
        let meta = fs::metadata(path).map_err(|e| EngineError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(LocalEntry {
            path: path.to_path_buf(),
            size: meta.len(),
            modified: meta.modified().ok(),
            dimensions: image::image_dimensions(path).ok(),
        })
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

/// Counters produced by a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub copied: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Cooperative cancellation stopped the batch
    pub aborted: bool,
    /// The batch stopped early because the source device vanished
    pub device_lost: bool,
}
