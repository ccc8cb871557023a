//! Namespace navigation.
//!
//! Resolves human-entered path segments ("Apple iPhone" / "Internal
//! Storage" / "DCIM") into a folder handle. Matching is tolerant: names are
//! compared case-insensitively with curly and straight apostrophes
//! normalized, and a leading "This PC"-style segment is stripped. Two roots
//! are tried in priority order: the devices container, then the desktop.

use crate::device::{DeviceFolder, DeviceNamespace};
use crate::error::EngineError;

/// Segment names treated as the top-level aggregation root and dropped.
const ROOT_SYNONYMS: &[&str] = &["this pc", "computer", "my computer"];

/// Normalize a name for comparison: trim, lowercase, and map curly
/// apostrophes to straight ones. Display names are never altered.
pub(crate) fn norm_text(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace(['\u{2018}', '\u{2019}'], "'")
}

fn traverse_from(
    root: Box<dyn DeviceFolder>,
    segments: &[String],
) -> Result<Box<dyn DeviceFolder>, EngineError> {
    let mut folder = root;
    for segment in segments {
        let wanted = norm_text(segment);
        let children = folder.items()?;
        let found = children
            .into_iter()
            .find(|item| norm_text(&item.name()) == wanted)
            .ok_or_else(|| EngineError::Navigation {
                segment: segment.clone(),
            })?;
        folder = found.open_folder()?;
    }
    Ok(folder)
}

/// Resolve `segments` to a folder handle.
///
/// Each candidate root is tried in turn; the first segment that fails to
/// match aborts that root and the next one is tried. If every root fails,
/// the first failure is reported so the caller can name the offending
/// segment.
/// Drop a leading "This PC"-style segment, which names the aggregation
/// root itself rather than anything inside it.
pub(crate) fn strip_root_synonym(segments: &[String]) -> &[String] {
    match segments.first() {
        Some(first) if ROOT_SYNONYMS.contains(&norm_text(first).as_str()) => &segments[1..],
        _ => segments,
    }
}

pub fn navigate(
    namespace: &dyn DeviceNamespace,
    segments: &[String],
) -> Result<Box<dyn DeviceFolder>, EngineError> {
    let cleaned = strip_root_synonym(segments);

    let roots = [namespace.devices_root(), namespace.desktop_root()];
    let mut first_error: Option<EngineError> = None;
    for root in roots.into_iter().flatten() {
        match traverse_from(root, cleaned) {
            Ok(folder) => return Ok(folder),
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }
    Err(first_error.unwrap_or_else(|| EngineError::Navigation {
        segment: cleaned
            .first()
            .cloned()
            .unwrap_or_else(|| "(empty)".to_string()),
    }))
}

/// Similarity ratio in `[0, 1]`: twice the longest common subsequence over
/// the combined length, computed on normalized names.
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in &a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let lcs = prev[b.len()];
    (2.0 * lcs as f64) / ((a.len() + b.len()) as f64)
}

/// Up to 5 candidate names similar to `target`, best first, for diagnostic
/// suggestions. Read-only; threshold 0.4.
pub fn suggest_names(candidates: &[String], target: &str) -> Vec<String> {
    let wanted = norm_text(target);
    let mut scored: Vec<(f64, &String)> = candidates
        .iter()
        .map(|c| (similarity(&norm_text(c), &wanted), c))
        .filter(|(score, _)| *score >= 0.4)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(5).map(|(_, c)| c.clone()).collect()
}

/// Whether `first_segment` still appears under the devices root.
///
/// Used by the batch loop after a per-item error to distinguish a bad file
/// from a disconnected device. Any failure reads as "not present".
pub fn device_present(namespace: &dyn DeviceNamespace, first_segment: &str) -> bool {
    let Some(root) = namespace.devices_root() else {
        return false;
    };
    let wanted = norm_text(first_segment);
    match root.items() {
        Ok(items) => items.iter().any(|i| norm_text(&i.name()) == wanted),
        Err(_) => false,
    }
}
