//! Cooperative cancellation flag.
//!
//! A single shared flag, typically set from an interrupt handler, polled by
//! every blocking loop in the engine. Cancellation latency is bounded by the
//! poll interval of whichever loop observes the flag first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::EngineError;

/// Shared cancellation flag threaded through every blocking engine call.
///
/// Clones observe the same underlying flag. Once set, the flag stays set
/// for the lifetime of the run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation. Safe to call from a signal handler thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Checkpoint helper: returns `EngineError::Aborted` once cancelled.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Aborted)
        } else {
            Ok(())
        }
    }
}
