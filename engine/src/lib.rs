//! # devsync Engine - Device Transfer Library
//!
//! A headless engine for pulling media off portable devices whose storage
//! is only reachable through a shell-style namespace (no drive letters, no
//! direct file paths). Designed as the foundation for multiple UIs.
//!
//! ## Overview
//!
//! The engine navigates a device namespace by display names, enumerates
//! matching files, and transfers them one at a time with verification:
//! - Tolerant name-based navigation with fuzzy suggestions on failure
//! - Lazy, snapshot-based file enumeration with glob filtering
//! - Staged copies: data lands in a hidden staging directory and is moved
//!   onto the destination atomically, so a readable destination file is
//!   always complete
//! - SHA-256 verification backed by an append-only ledger, making repeat
//!   runs idempotent
//! - A cheap size-based update mode for frequent incremental runs
//! - Cooperative cancellation safe at every wait point
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::path::Path;
//! use engine::{
//!     run_batch, BatchMode, BatchRequest, CancelFlag, FsNamespace, Ledger, TransferOptions,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let namespace = FsNamespace::new("/mnt/devices");
//! let mut ledger = Ledger::load("/backups/phone/verified.txt")?;
//!
//! let segments = vec!["Apple iPhone".into(), "Internal Storage".into(), "DCIM".into()];
//! let patterns = vec!["*.jpg".into(), "*.heic".into(), "*.mov".into()];
//! let options = TransferOptions::default();
//! let request = BatchRequest {
//!     source_segments: &segments,
//!     include_patterns: &patterns,
//!     recursive: true,
//!     mode: BatchMode::Verify,
//!     dest_root: Path::new("/backups/phone"),
//!     options: &options,
//! };
//!
//! let summary = run_batch(&namespace, &request, &mut ledger, &CancelFlag::new(), None)?;
//! println!("copied={} skipped={} errors={}", summary.copied, summary.skipped, summary.errors);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **device**: Namespace abstraction (folders, items, async copy requests)
//! - **navigate**: Name-based path resolution and suggestions
//! - **enumerate**: Lazy glob-filtered file enumeration
//! - **transfer**: Single-item staged transfer (full-verify and update mode)
//! - **ledger**: Append-only digest ledger
//! - **batch**: Batch loop with per-item error isolation
//! - **digest**: SHA-256 hashing with cancellation checks
//! - **cancel**: Cooperative cancellation flag
//! - **model**: Statuses, policies, options
//! - **error**: Error types and handling
//! - **observer**: Transfer lifecycle observer trait

pub mod batch;
pub mod cancel;
pub mod device;
pub mod digest;
pub mod enumerate;
pub mod error;
pub mod ledger;
pub mod model;
pub mod navigate;
pub mod observer;
pub mod transfer;

#[cfg(test)]
pub(crate) mod mock;

// Re-export main types and functions
pub use batch::{run_batch, BatchMode, BatchRequest};
pub use cancel::CancelFlag;
pub use device::{DeviceFolder, DeviceItem, DeviceNamespace, FsNamespace};
pub use digest::sha256_file;
pub use enumerate::{FileEnumerator, SourceFile};
pub use error::EngineError;
pub use ledger::{Ledger, RebuildStats};
pub use model::{
    BatchSummary, FastSkipPolicy, LocalEntry, SourceSize, TransferOptions, TransferStatus,
    UnknownSizePolicy,
};
pub use navigate::{device_present, navigate, suggest_names};
pub use observer::TransferObserver;
pub use transfer::{
    best_known_size, metadata_matches, parse_size_display, transfer_update, transfer_verified,
    STAGING_DIR_NAME,
};
