//! In-memory device namespace used by the engine's tests.
//!
//! `MockFile::begin_copy_to` reproduces the fire-and-forget copy primitive:
//! it returns immediately and a background thread writes the bytes after a
//! configurable delay. A per-file counter records how many copy requests
//! were issued, so tests can assert that fast-skip paths touch the device
//! not at all.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::device::{DeviceFolder, DeviceItem, DeviceNamespace};
use crate::error::EngineError;

#[derive(Clone)]
pub(crate) struct MockFile {
    name: String,
    content: Vec<u8>,
    exact_size: Option<u64>,
    size_display: Option<String>,
    dimensions: Option<(u32, u32)>,
    folder_flag: Option<bool>,
    copy_delay: Duration,
    written_len: Option<usize>,
    trickle: Option<(usize, Duration)>,
    copies: Arc<AtomicUsize>,
}

impl MockFile {
    pub fn new(name: &str, content: &[u8]) -> Self {
        MockFile {
            name: name.to_string(),
            content: content.to_vec(),
            exact_size: Some(content.len() as u64),
            size_display: None,
            dimensions: None,
            folder_flag: Some(false),
            copy_delay: Duration::from_millis(5),
            written_len: None,
            trickle: None,
            copies: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pretend the platform cannot report an exact byte size.
    pub fn without_size(mut self) -> Self {
        self.exact_size = None;
        self
    }

    pub fn with_display_size(mut self, display: &str) -> Self {
        self.size_display = Some(display.to_string());
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some((width, height));
        self
    }

    /// Pretend the platform cannot tell whether this entry is a folder.
    pub fn type_unknown(mut self) -> Self {
        self.folder_flag = None;
        self
    }

    /// Make the async copy write a different number of bytes than the
    /// advertised size (integrity-failure simulation).
    pub fn with_written_len(mut self, len: usize) -> Self {
        self.written_len = Some(len);
        self
    }

    pub fn with_copy_delay(mut self, delay: Duration) -> Self {
        self.copy_delay = delay;
        self
    }

    /// Deliver the copy in two bursts: `first` bytes, a pause, then the
    /// rest (still-growing-file simulation).
    pub fn with_trickle(mut self, first: usize, pause: Duration) -> Self {
        self.trickle = Some((first, pause));
        self
    }

    /// Handle on the number of copy requests issued for this file.
    pub fn copy_counter(&self) -> Arc<AtomicUsize> {
        self.copies.clone()
    }

    /// Box this file as a bare device item, bypassing folder listings.
    pub fn into_item(self) -> Box<dyn DeviceItem> {
        Box::new(MockItem::File(self))
    }
}

#[derive(Clone)]
pub(crate) struct MockFolder {
    title: String,
    folders: Vec<MockFolder>,
    files: Vec<MockFile>,
}

impl MockFolder {
    pub fn new(title: &str) -> Self {
        MockFolder {
            title: title.to_string(),
            folders: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn with_folder(mut self, folder: MockFolder) -> Self {
        self.folders.push(folder);
        self
    }

    pub fn with_file(mut self, file: MockFile) -> Self {
        self.files.push(file);
        self
    }
}

impl DeviceFolder for MockFolder {
    fn title(&self) -> String {
        self.title.clone()
    }

    fn items(&self) -> Result<Vec<Box<dyn DeviceItem>>, EngineError> {
        let mut items: Vec<Box<dyn DeviceItem>> = Vec::new();
        for folder in &self.folders {
            items.push(Box::new(MockItem::Folder(folder.clone())));
        }
        for file in &self.files {
            items.push(Box::new(MockItem::File(file.clone())));
        }
        Ok(items)
    }
}

enum MockItem {
    Folder(MockFolder),
    File(MockFile),
}

impl DeviceItem for MockItem {
    fn name(&self) -> String {
        match self {
            MockItem::Folder(f) => f.title.clone(),
            MockItem::File(f) => f.name.clone(),
        }
    }

    fn is_folder(&self) -> Option<bool> {
        match self {
            MockItem::Folder(_) => Some(true),
            MockItem::File(f) => f.folder_flag,
        }
    }

    fn exact_size(&self) -> Option<u64> {
        match self {
            MockItem::Folder(_) => None,
            MockItem::File(f) => f.exact_size,
        }
    }

    fn size_display(&self) -> Option<String> {
        match self {
            MockItem::Folder(_) => None,
            MockItem::File(f) => f.size_display.clone(),
        }
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            MockItem::Folder(_) => None,
            MockItem::File(f) => f.dimensions,
        }
    }

    fn open_folder(&self) -> Result<Box<dyn DeviceFolder>, EngineError> {
        match self {
            MockItem::Folder(f) => Ok(Box::new(f.clone())),
            MockItem::File(f) => Err(EngineError::Device {
                message: format!("not a folder: {}", f.name),
            }),
        }
    }

    fn begin_copy_to(&self, dest_dir: &Path) -> Result<(), EngineError> {
        let file = match self {
            MockItem::File(f) => f,
            MockItem::Folder(f) => {
                return Err(EngineError::Device {
                    message: format!("cannot copy folder: {}", f.title),
                })
            }
        };
        file.copies.fetch_add(1, Ordering::SeqCst);
        let mut bytes = file.content.clone();
        if let Some(len) = file.written_len {
            bytes.resize(len, 0);
        }
        let dest = dest_dir.join(&file.name);
        let delay = file.copy_delay;
        let trickle = file.trickle;
        thread::spawn(move || {
            thread::sleep(delay);
            match trickle {
                Some((first, pause)) => {
                    let split = first.min(bytes.len());
                    let _ = fs::write(&dest, &bytes[..split]);
                    thread::sleep(pause);
                    let _ = fs::OpenOptions::new()
                        .append(true)
                        .open(&dest)
                        .and_then(|mut f| f.write_all(&bytes[split..]));
                }
                None => {
                    let _ = fs::write(&dest, &bytes);
                }
            }
        });
        Ok(())
    }
}

pub(crate) struct MockNamespace {
    devices: Option<MockFolder>,
    desktop: Option<MockFolder>,
}

impl MockNamespace {
    pub fn new(devices: MockFolder) -> Self {
        MockNamespace {
            devices: Some(devices),
            desktop: None,
        }
    }

    pub fn empty() -> Self {
        MockNamespace {
            devices: None,
            desktop: None,
        }
    }

    pub fn with_desktop(mut self, desktop: MockFolder) -> Self {
        self.desktop = Some(desktop);
        self
    }
}

impl DeviceNamespace for MockNamespace {
    fn devices_root(&self) -> Option<Box<dyn DeviceFolder>> {
        self.devices
            .as_ref()
            .map(|f| Box::new(f.clone()) as Box<dyn DeviceFolder>)
    }

    fn desktop_root(&self) -> Option<Box<dyn DeviceFolder>> {
        self.desktop
            .as_ref()
            .map(|f| Box::new(f.clone()) as Box<dyn DeviceFolder>)
    }
}
