//! Transfer lifecycle observer trait.
//!
//! Decouples the engine from any specific UI. All hooks have empty default
//! bodies and are infallible by construction, so an observer can never
//! affect a transfer's outcome. Hooks are called synchronously from the
//! transfer and batch loops.

use std::path::Path;

use crate::error::EngineError;
use crate::model::TransferStatus;

/// Receives lifecycle events from the transfer engine and the batch loop.
pub trait TransferObserver: Send {
    /// An item is about to be processed by the batch loop.
    fn on_item_started(&self, _index: usize, _name: &str) {}

    /// The destination directory exists and is ready.
    fn on_dest_prepared(&self, _dest_dir: &Path) {}

    /// The asynchronous copy into the staging directory was issued.
    fn on_stage_started(&self, _stage_dir: &Path) {}

    /// The staged file was identified.
    fn on_staged(&self, _staged_file: &Path) {}

    /// The staged file reached the expected source size.
    fn on_size_verified(&self, _bytes: u64) {}

    /// A content digest was computed.
    fn on_hash_computed(&self, _path: &Path, _digest: &str) {}

    /// A ledger record was appended.
    fn on_recorded(&self, _relpath: &str) {}

    /// The item reached a terminal status.
    fn on_finalized(&self, _target: &Path, _status: TransferStatus) {}

    /// A per-item error was recorded by the batch loop.
    fn on_item_error(&self, _name: &str, _error: &EngineError) {}
}
