//! devsync - Command-line interface for the device transfer engine.
//!
//! Reads a JSON configuration describing the device path, filename
//! patterns, and destination, then runs a verified (or update-mode) batch
//! transfer with progress reporting to stderr. Ctrl-C requests cooperative
//! cancellation; the engine stops at the next safe point.

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use engine::{
    navigate, run_batch, suggest_names, BatchMode, BatchRequest, CancelFlag, DeviceNamespace,
    EngineError, FastSkipPolicy, FileEnumerator, FsNamespace, Ledger, TransferObserver,
    TransferOptions, TransferStatus, UnknownSizePolicy, STAGING_DIR_NAME,
};

/// devsync - Pull media off portable devices with verification
#[derive(Parser, Debug)]
#[command(name = "devsync")]
#[command(version = "0.1.0")]
#[command(about = "Copy files from a device namespace with SHA-256 verification")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long, value_name = "PATH", default_value = "config.json")]
    config: PathBuf,

    /// List the devices visible at the namespace root and exit
    #[arg(long)]
    probe: bool,

    /// Enumerate matching files without transferring anything
    #[arg(long)]
    list_only: bool,

    /// Update mode: size-based reconciliation instead of full verification
    #[arg(long)]
    update: bool,

    /// Recompute the ledger from the destination tree and exit
    #[arg(long)]
    rebuild_ledger: bool,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// JSON configuration. Missing fields take their defaults, so a minimal
/// config only names the device path and the destination.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Config {
    /// Directory standing in for the namespace's devices root
    device_root: PathBuf,
    /// Optional secondary root, tried after the devices root
    desktop_root: Option<PathBuf>,
    /// Path segments naming the source folder ("Apple iPhone", "DCIM", ...)
    source_names: Vec<String>,
    /// Case-insensitive filename globs; empty matches everything
    include_patterns: Vec<String>,
    /// Destination directory on the local filesystem
    destination: PathBuf,
    /// Mirror the immediate parent folder under the destination
    preserve_subfolders: bool,
    /// Descend into subfolders of the source
    subfolders: bool,
    /// Update mode: apply size checks to existing destination files
    skip_existing: bool,
    /// Ledger filename, resolved against the destination when relative
    verified_file: PathBuf,
    /// Full-verify fast-skip policy: none, ledger, size, ledger_or_size
    fast_skip: String,
    /// Update mode unknown-size policy: skip, replace, copy_unique
    unknown_size_policy: String,
    /// Update mode byte tolerance for approximate sizes
    size_tolerance_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_root: PathBuf::new(),
            desktop_root: None,
            source_names: Vec::new(),
            include_patterns: vec![
                "*.jpg".to_string(),
                "*.jpeg".to_string(),
                "*.png".to_string(),
                "*.heic".to_string(),
                "*.mov".to_string(),
                "*.mp4".to_string(),
            ],
            destination: PathBuf::new(),
            preserve_subfolders: true,
            subfolders: true,
            skip_existing: true,
            verified_file: PathBuf::from("verified.txt"),
            fast_skip: "none".to_string(),
            unknown_size_policy: "skip".to_string(),
            size_tolerance_bytes: 4096,
        }
    }
}

impl Config {
    fn load(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
        serde_json::from_str(&text)
            .map_err(|e| format!("Invalid config {}: {}", path.display(), e))
    }

    fn ledger_path(&self) -> PathBuf {
        if self.verified_file.is_absolute() {
            self.verified_file.clone()
        } else {
            self.destination.join(&self.verified_file)
        }
    }

    fn transfer_options(&self) -> Result<TransferOptions, String> {
        let fast_skip = FastSkipPolicy::from_str(&self.fast_skip).ok_or_else(|| {
            format!(
                "Invalid fast_skip '{}'. Must be 'none', 'ledger', 'size', or 'ledger_or_size'",
                self.fast_skip
            )
        })?;
        let unknown_size =
            UnknownSizePolicy::from_str(&self.unknown_size_policy).ok_or_else(|| {
                format!(
                    "Invalid unknown_size_policy '{}'. Must be 'skip', 'replace', or 'copy_unique'",
                    self.unknown_size_policy
                )
            })?;
        Ok(TransferOptions {
            preserve_subfolders: self.preserve_subfolders,
            skip_existing: self.skip_existing,
            fast_skip,
            unknown_size,
            size_tolerance: self.size_tolerance_bytes,
            ..TransferOptions::default()
        })
    }
}

/// CLI implementation of TransferObserver for reporting progress to stderr
struct CliObserver {
    verbose: bool,
}

impl TransferObserver for CliObserver {
    fn on_item_started(&self, index: usize, name: &str) {
        if self.verbose {
            eprintln!("[{:4}] Starting: {}", index, name);
        }
    }

    fn on_staged(&self, staged_file: &Path) {
        if self.verbose {
            eprintln!("       staged: {}", staged_file.display());
        }
    }

    fn on_hash_computed(&self, path: &Path, digest: &str) {
        if self.verbose {
            eprintln!("       sha256 {}: {}", &digest[..12], path.display());
        }
    }

    fn on_finalized(&self, target: &Path, status: TransferStatus) {
        eprintln!("{}: {}", status, target.display());
    }

    fn on_item_error(&self, name: &str, error: &EngineError) {
        eprintln!("Failed: {}: {}", name, error);
    }
}

fn main() {
    let args = Args::parse();

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    if ctrlc::set_handler(move || handler_flag.cancel()).is_err() {
        eprintln!("Warning: Ctrl-C handler could not be installed");
    }

    let exit_code = match run_cli(&args, &cancel) {
        Ok(code) => code,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability. `Err` means a configuration
/// or navigation failure (exit 2); `Ok` carries the exit code for runs that
/// got as far as doing work.
fn run_cli(args: &Args, cancel: &CancelFlag) -> Result<i32, String> {
    let config = Config::load(&args.config)?;

    let mut namespace = FsNamespace::new(&config.device_root);
    if let Some(desktop) = &config.desktop_root {
        namespace = namespace.with_desktop(desktop);
    }

    if args.probe {
        return probe_namespace(&namespace);
    }

    if config.source_names.is_empty() {
        return Err("Config must set source_names".to_string());
    }
    if config.destination.as_os_str().is_empty() {
        return Err("Config must set destination".to_string());
    }
    fs::create_dir_all(&config.destination).map_err(|e| {
        format!(
            "Cannot create destination {}: {}",
            config.destination.display(),
            e
        )
    })?;

    let options = config.transfer_options()?;
    let mut ledger = Ledger::load(config.ledger_path()).map_err(|e| e.to_string())?;

    if args.rebuild_ledger {
        return rebuild_ledger(&config, &mut ledger, cancel);
    }

    if args.list_only {
        return list_matching(&namespace, &config);
    }

    let mode = if args.update {
        BatchMode::Update
    } else {
        BatchMode::Verify
    };
    let request = BatchRequest {
        source_segments: &config.source_names,
        include_patterns: &config.include_patterns,
        recursive: config.subfolders,
        mode,
        dest_root: &config.destination,
        options: &options,
    };
    let observer = CliObserver {
        verbose: args.verbose,
    };

    let start = Instant::now();
    let summary = match run_batch(&namespace, &request, &mut ledger, cancel, Some(&observer)) {
        Ok(summary) => summary,
        Err(EngineError::Navigation { segment }) => {
            return Err(navigation_failure(&namespace, &segment));
        }
        Err(e) => return Err(e.to_string()),
    };

    eprintln!();
    eprintln!(
        "Done. copied={} skipped={} errors={} ({}s)",
        summary.copied,
        summary.skipped,
        summary.errors,
        start.elapsed().as_secs()
    );

    if summary.aborted {
        eprintln!("Transfer aborted by user.");
        return Ok(130);
    }
    if summary.device_lost {
        eprintln!("Device disappeared from the namespace; transfer stopped.");
        return Ok(3);
    }
    if summary.errors > 0 {
        return Ok(1);
    }
    Ok(0)
}

/// Describe a failed navigation, suggesting near-matching device names.
fn navigation_failure(namespace: &dyn DeviceNamespace, segment: &str) -> String {
    let mut msg = format!("Could not find '{}' in the device namespace.", segment);
    let candidates: Vec<String> = namespace
        .devices_root()
        .and_then(|root| root.items().ok())
        .map(|items| items.iter().map(|i| i.name()).collect())
        .unwrap_or_default();
    let suggestions = suggest_names(&candidates, segment);
    if !suggestions.is_empty() {
        msg.push_str("\nDid you mean:");
        for name in suggestions {
            msg.push_str(&format!("\n  {}", name));
        }
    }
    msg
}

fn probe_namespace(namespace: &dyn DeviceNamespace) -> Result<i32, String> {
    let Some(root) = namespace.devices_root() else {
        return Err("Devices root is not accessible".to_string());
    };
    let items = root.items().map_err(|e| e.to_string())?;
    if items.is_empty() {
        println!("No devices found.");
        return Ok(0);
    }
    println!("Devices:");
    for item in items {
        let kind = match item.is_folder() {
            Some(true) => "folder",
            Some(false) => "file",
            None => "unknown",
        };
        println!("  {} ({})", item.name(), kind);
    }
    Ok(0)
}

fn list_matching(namespace: &dyn DeviceNamespace, config: &Config) -> Result<i32, String> {
    let folder = match navigate(namespace, &config.source_names) {
        Ok(folder) => folder,
        Err(EngineError::Navigation { segment }) => {
            return Err(navigation_failure(namespace, &segment));
        }
        Err(e) => return Err(e.to_string()),
    };
    let enumerator = FileEnumerator::new(
        folder.as_ref(),
        &config.include_patterns,
        config.subfolders,
    )
    .map_err(|e| e.to_string())?;

    let mut count = 0usize;
    let mut errors = 0usize;
    for entry in enumerator {
        match entry {
            Ok(source) => {
                count += 1;
                let size = source
                    .item
                    .exact_size()
                    .map(|b| format!("{} bytes", b))
                    .or_else(|| source.item.size_display())
                    .unwrap_or_else(|| "size unknown".to_string());
                println!(
                    "{}/{} ({})",
                    source.parent_title,
                    source.item.name(),
                    size
                );
            }
            Err(e) => {
                errors += 1;
                eprintln!("Listing error: {}", e);
            }
        }
    }
    eprintln!("{} matching files, {} listing errors", count, errors);
    Ok(if errors > 0 { 1 } else { 0 })
}

fn rebuild_ledger(
    config: &Config,
    ledger: &mut Ledger,
    cancel: &CancelFlag,
) -> Result<i32, String> {
    eprintln!("Rebuilding ledger from {}...", config.destination.display());
    match ledger.rebuild(
        &config.destination,
        &config.include_patterns,
        &[STAGING_DIR_NAME],
        cancel,
    ) {
        Ok(stats) => {
            eprintln!(
                "Ledger rebuilt: {} entries, {} files could not be hashed",
                stats.entries, stats.errors
            );
            Ok(if stats.errors > 0 { 1 } else { 0 })
        }
        Err(EngineError::Aborted) => {
            eprintln!("Rebuild aborted; the previous ledger was kept.");
            Ok(130)
        }
        Err(e) => Err(e.to_string()),
    }
}
