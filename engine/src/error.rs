//! Error types for the transfer engine.
//!
//! The primary error type is `EngineError`. Per-item errors are caught at
//! the batch-loop boundary and counted; only `Aborted` and `Navigation`
//! halt a batch (see the `batch` module).

use std::fmt::{self, Display};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Errors raised by the transfer engine.
///
/// `Navigation` means the source folder could not be resolved at all and is
/// fatal for the whole run. `Aborted` is cooperative cancellation and stops
/// the batch without counting as a failure. Everything else is per-item:
/// the batch loop records it and moves on to the next item.
#[derive(Debug)]
pub enum EngineError {
    /// A path segment could not be resolved from any namespace root
    Navigation { segment: String },

    /// A bounded polling wait expired before the condition was met
    Timeout { path: PathBuf, waited: Duration },

    /// Post-finalize size check failed; the destination file is in place
    /// but must not be trusted
    Integrity {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Cooperative cancellation was requested
    Aborted,

    /// Failed to read a local file
    Read { path: PathBuf, source: io::Error },

    /// Failed to write or replace a local file
    Write { path: PathBuf, source: io::Error },

    /// Failed to create a directory
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Failed to read or update the verification ledger
    Ledger { path: PathBuf, source: io::Error },

    /// A filename pattern could not be compiled
    InvalidPattern { pattern: String },

    /// Failure reported by the platform namespace layer
    Device { message: String },
}

impl Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigation { segment } => {
                write!(f, "Could not find namespace segment: {}", segment)
            }
            Self::Timeout { path, waited } => {
                write!(
                    f,
                    "Timed out after {}s waiting on: {}",
                    waited.as_secs(),
                    path.display()
                )
            }
            Self::Integrity {
                path,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Size mismatch after copy: expected {} bytes, found {} bytes: {}",
                    expected,
                    actual,
                    path.display()
                )
            }
            Self::Aborted => write!(f, "Aborted by user"),
            Self::Read { path, .. } => {
                write!(f, "Failed to read file: {}", path.display())
            }
            Self::Write { path, .. } => {
                write!(f, "Failed to write file: {}", path.display())
            }
            Self::DirectoryCreationFailed { path, .. } => {
                write!(f, "Failed to create directory: {}", path.display())
            }
            Self::Ledger { path, .. } => {
                write!(f, "Ledger I/O failed: {}", path.display())
            }
            Self::InvalidPattern { pattern } => {
                write!(f, "Invalid filename pattern: {}", pattern)
            }
            Self::Device { message } => {
                write!(f, "Device error: {}", message)
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. }
            | Self::Write { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::Ledger { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl EngineError {
    /// True if this error must stop the whole batch rather than a single item.
    pub fn halts_batch(&self) -> bool {
        matches!(self, Self::Aborted | Self::Navigation { .. })
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::Device {
            message: err.to_string(),
        }
    }
}
