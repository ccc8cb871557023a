//! Batch loop over an enumerated source folder.
//!
//! Navigation failure is fatal for the whole run; everything after that is
//! per-item. A failing item is counted and reported through the observer,
//! and the loop moves on — unless the source device has vanished from the
//! namespace, in which case every remaining item would fail the same way
//! and the batch stops early.

use std::path::Path;

use crate::cancel::CancelFlag;
use crate::device::DeviceNamespace;
use crate::enumerate::FileEnumerator;
use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::model::{BatchSummary, TransferOptions};
use crate::navigate::{device_present, navigate, strip_root_synonym};
use crate::observer::TransferObserver;
use crate::transfer::{transfer_update, transfer_verified};

/// Which transfer variant the batch applies to each file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Stage, hash, and record every file (ledger-backed)
    Verify,
    /// Size-based reconciliation, no hashing
    Update,
}

/// One batch run: where to read from, what to match, where to write.
pub struct BatchRequest<'a> {
    /// Human-entered path segments naming the source folder
    pub source_segments: &'a [String],
    /// Case-insensitive filename globs; empty matches everything
    pub include_patterns: &'a [String],
    /// Descend into subfolders
    pub recursive: bool,
    pub mode: BatchMode,
    pub dest_root: &'a Path,
    pub options: &'a TransferOptions,
}

/// Run a batch transfer.
///
/// Returns `Err` only for failures that invalidate the whole run (the
/// source folder cannot be resolved, or the enumerator cannot take its
/// initial snapshot). Per-item failures are counted in the summary.
/// Cancellation and device loss end the loop early and are flagged in the
/// summary rather than reported as errors.
pub fn run_batch(
    namespace: &dyn DeviceNamespace,
    request: &BatchRequest,
    ledger: &mut Ledger,
    cancel: &CancelFlag,
    observer: Option<&dyn TransferObserver>,
) -> Result<BatchSummary, EngineError> {
    let folder = navigate(namespace, request.source_segments)?;
    let device_segment = strip_root_synonym(request.source_segments)
        .first()
        .cloned()
        .unwrap_or_default();

    let enumerator = FileEnumerator::new(
        folder.as_ref(),
        request.include_patterns,
        request.recursive,
    )?;

    let mut summary = BatchSummary::default();
    for (index, entry) in enumerator.enumerate() {
        if cancel.is_cancelled() {
            summary.aborted = true;
            break;
        }

        let source = match entry {
            Ok(source) => source,
            Err(e) => {
                // Listing failure for one subtree; the walk continues.
                summary.errors += 1;
                if let Some(obs) = observer {
                    obs.on_item_error("(folder listing)", &e);
                }
                continue;
            }
        };

        let name = source.item.name();
        if let Some(obs) = observer {
            obs.on_item_started(index, &name);
        }

        let outcome = match request.mode {
            BatchMode::Verify => transfer_verified(
                source.item.as_ref(),
                &source.parent_title,
                request.dest_root,
                request.options,
                ledger,
                cancel,
                observer,
            ),
            BatchMode::Update => transfer_update(
                source.item.as_ref(),
                &source.parent_title,
                request.dest_root,
                request.options,
                cancel,
                observer,
            ),
        };

        match outcome {
            Ok((status, _)) => {
                if status.is_skip() {
                    summary.skipped += 1;
                } else {
                    summary.copied += 1;
                }
            }
            Err(EngineError::Aborted) => {
                summary.aborted = true;
                break;
            }
            Err(e) => {
                summary.errors += 1;
                if let Some(obs) = observer {
                    obs.on_item_error(&name, &e);
                }
                // A vanished device would fail every remaining item the
                // same way; stop instead of grinding through timeouts.
                if !device_segment.is_empty() && !device_present(namespace, &device_segment) {
                    summary.device_lost = true;
                    break;
                }
            }
        }
    }

    Ok(summary)
}
