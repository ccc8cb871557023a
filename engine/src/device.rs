//! Capability traits for the remote device namespace.
//!
//! The engine never talks to a device directly. The platform integration
//! layer (Windows Shell, MTP, ...) implements these traits; the engine only
//! relies on three capabilities:
//! - navigation: child listings and folder handles,
//! - a fire-and-forget asynchronous copy into a named local directory,
//! - best-effort size information (exact bytes when available, else a
//!   human-formatted display string).
//!
//! Completion of the asynchronous copy has no native callback; it is
//! detected externally by the bounded polling in the `transfer` module.
//!
//! A local-filesystem-backed implementation, [`FsNamespace`], ships with
//! the engine so the pipeline can run and be tested without a device.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::error::EngineError;

/// Ephemeral handle to one entry in the remote namespace.
///
/// Handles are recreated on every enumeration pass and are never persisted.
pub trait DeviceItem {
    /// Display name of the entry. Never altered by the engine.
    fn name(&self) -> String;

    /// Whether this entry is a folder. `None` when the platform cannot
    /// tell; callers must treat `None` as a file to avoid unbounded
    /// recursion.
    fn is_folder(&self) -> Option<bool>;

    /// Exact byte size, when the platform exposes one.
    fn exact_size(&self) -> Option<u64>;

    /// Human-formatted size string ("12.3 MB"), possibly rounded to a
    /// display unit. Only approximate.
    fn size_display(&self) -> Option<String> {
        None
    }

    /// Decoded pixel dimensions, when the platform exposes them.
    fn dimensions(&self) -> Option<(u32, u32)> {
        None
    }

    /// Open this entry as a folder. Only meaningful when
    /// `is_folder() == Some(true)`.
    fn open_folder(&self) -> Result<Box<dyn DeviceFolder>, EngineError>;

    /// Begin an asynchronous byte-copy of this entry into `dest_dir`,
    /// returning immediately. The copied file keeps this entry's name.
    fn begin_copy_to(&self, dest_dir: &Path) -> Result<(), EngineError>;
}

/// Handle to a folder inside the remote namespace.
pub trait DeviceFolder {
    /// Display title of the folder.
    fn title(&self) -> String;

    /// Snapshot of the current child listing. The underlying listing may
    /// mutate between calls; each call returns one self-consistent copy.
    fn items(&self) -> Result<Vec<Box<dyn DeviceItem>>, EngineError>;
}

/// Entry points into the namespace: the candidate navigation roots.
pub trait DeviceNamespace {
    /// The container aggregating attached devices ("This PC").
    fn devices_root(&self) -> Option<Box<dyn DeviceFolder>>;

    /// The user desktop, tried after the devices root.
    fn desktop_root(&self) -> Option<Box<dyn DeviceFolder>>;
}

/// Local-filesystem-backed namespace.
///
/// Directories stand in for device folders and `begin_copy_to` spawns a
/// thread that copies the bytes after a short delay, reproducing the
/// fire-and-forget behavior of the real copy primitive.
pub struct FsNamespace {
    devices_root: PathBuf,
    desktop_root: Option<PathBuf>,
    copy_delay: Duration,
}

impl FsNamespace {
    pub fn new(devices_root: impl Into<PathBuf>) -> Self {
        FsNamespace {
            devices_root: devices_root.into(),
            desktop_root: None,
            copy_delay: Duration::from_millis(25),
        }
    }

    pub fn with_desktop(mut self, desktop_root: impl Into<PathBuf>) -> Self {
        self.desktop_root = Some(desktop_root.into());
        self
    }

    pub fn with_copy_delay(mut self, delay: Duration) -> Self {
        self.copy_delay = delay;
        self
    }
}

impl DeviceNamespace for FsNamespace {
    fn devices_root(&self) -> Option<Box<dyn DeviceFolder>> {
        if self.devices_root.is_dir() {
            Some(Box::new(FsFolder {
                path: self.devices_root.clone(),
                copy_delay: self.copy_delay,
            }))
        } else {
            None
        }
    }

    fn desktop_root(&self) -> Option<Box<dyn DeviceFolder>> {
        let path = self.desktop_root.as_ref()?;
        if path.is_dir() {
            Some(Box::new(FsFolder {
                path: path.clone(),
                copy_delay: self.copy_delay,
            }))
        } else {
            None
        }
    }
}

struct FsFolder {
    path: PathBuf,
    copy_delay: Duration,
}

impl DeviceFolder for FsFolder {
    fn title(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn items(&self) -> Result<Vec<Box<dyn DeviceItem>>, EngineError> {
        let entries = fs::read_dir(&self.path).map_err(|e| EngineError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        let mut items: Vec<Box<dyn DeviceItem>> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::Read {
                path: self.path.clone(),
                source: e,
            })?;
            items.push(Box::new(FsItem {
                path: entry.path(),
                copy_delay: self.copy_delay,
            }));
        }
        Ok(items)
    }
}

struct FsItem {
    path: PathBuf,
    copy_delay: Duration,
}

impl DeviceItem for FsItem {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn is_folder(&self) -> Option<bool> {
        fs::metadata(&self.path).map(|m| m.is_dir()).ok()
    }

    fn exact_size(&self) -> Option<u64> {
        let meta = fs::metadata(&self.path).ok()?;
        if meta.is_file() {
            Some(meta.len())
        } else {
            None
        }
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        image::image_dimensions(&self.path).ok()
    }

    fn open_folder(&self) -> Result<Box<dyn DeviceFolder>, EngineError> {
        if self.is_folder() != Some(true) {
            return Err(EngineError::Device {
                message: format!("not a folder: {}", self.path.display()),
            });
        }
        Ok(Box::new(FsFolder {
            path: self.path.clone(),
            copy_delay: self.copy_delay,
        }))
    }

    fn begin_copy_to(&self, dest_dir: &Path) -> Result<(), EngineError> {
        let src = self.path.clone();
        let dest = dest_dir.join(self.name());
        let delay = self.copy_delay;
        // Fire and forget: the caller detects completion by polling.
        thread::spawn(move || {
            thread::sleep(delay);
            let _ = fs::copy(&src, &dest);
        });
        Ok(())
    }
}
