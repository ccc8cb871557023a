//! Lazy enumeration of device files.
//!
//! The live child listing behind a folder handle can mutate while it is
//! being walked, so the enumerator snapshots the full child set once per
//! folder and then operates only on that snapshot. Recursion is depth-first.
//! An entry whose type cannot be determined is treated as a file so a
//! misreported folder can never cause unbounded recursion.

use std::collections::VecDeque;

use crate::device::{DeviceFolder, DeviceItem};
use crate::error::EngineError;

/// One enumerated file together with the display title of its immediate
/// parent folder (used for preserve-subfolder destination layout).
pub struct SourceFile {
    pub parent_title: String,
    pub item: Box<dyn DeviceItem>,
}

/// Compile glob patterns for name matching. Matching is case-insensitive,
/// so patterns are lowercased here and names at match time.
pub(crate) fn compile_patterns(patterns: &[String]) -> Result<Vec<glob::Pattern>, EngineError> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(&p.to_lowercase()).map_err(|_| EngineError::InvalidPattern {
                pattern: p.clone(),
            })
        })
        .collect()
}

/// True if `name` matches at least one pattern. An empty pattern set
/// matches everything.
pub(crate) fn matches_any(name: &str, patterns: &[glob::Pattern]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let lower = name.to_lowercase();
    patterns.iter().any(|p| p.matches(&lower))
}

struct Frame {
    title: String,
    items: VecDeque<Box<dyn DeviceItem>>,
}

/// Lazy, finite, non-restartable sequence of matching device files.
pub struct FileEnumerator {
    patterns: Vec<glob::Pattern>,
    recursive: bool,
    stack: Vec<Frame>,
}

impl FileEnumerator {
    /// Snapshot `folder`'s children and prepare a depth-first walk.
    pub fn new(
        folder: &dyn DeviceFolder,
        patterns: &[String],
        recursive: bool,
    ) -> Result<Self, EngineError> {
        let patterns = compile_patterns(patterns)?;
        let items = folder.items()?;
        Ok(FileEnumerator {
            patterns,
            recursive,
            stack: vec![Frame {
                title: folder.title(),
                items: items.into(),
            }],
        })
    }
}

impl Iterator for FileEnumerator {
    type Item = Result<SourceFile, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let Some(item) = frame.items.pop_front() else {
                self.stack.pop();
                continue;
            };

            if item.is_folder() == Some(true) {
                if self.recursive {
                    // Snapshot the subfolder before descending into it.
                    let opened = item
                        .open_folder()
                        .and_then(|f| f.items().map(|items| (f.title(), items)));
                    match opened {
                        Ok((title, items)) => self.stack.push(Frame {
                            title,
                            items: items.into(),
                        }),
                        Err(e) => return Some(Err(e)),
                    }
                }
                continue;
            }

            if matches_any(&item.name(), &self.patterns) {
                let parent_title = self
                    .stack
                    .last()
                    .map(|f| f.title.clone())
                    .unwrap_or_default();
                return Some(Ok(SourceFile { parent_title, item }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFile, MockFolder};

    fn pats(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|s| s.to_string()).collect()
    }

    fn names(folder: &MockFolder, patterns: &[&str], recursive: bool) -> Vec<String> {
        FileEnumerator::new(folder, &pats(patterns), recursive)
            .expect("enumerator should build")
            .map(|r| r.expect("enumeration should succeed").item.name())
            .collect()
    }

    #[test]
    fn test_patterns_match_case_insensitively() {
        let folder = MockFolder::new("DCIM")
            .with_file(MockFile::new("IMG_0001.JPG", b"a"))
            .with_file(MockFile::new("clip.mov", b"b"))
            .with_file(MockFile::new("notes.txt", b"c"));
        assert_eq!(
            names(&folder, &["*.jpg", "*.mov"], false),
            vec!["IMG_0001.JPG", "clip.mov"]
        );
    }

    #[test]
    fn test_empty_pattern_set_matches_everything() {
        let folder = MockFolder::new("DCIM")
            .with_file(MockFile::new("a.jpg", b"a"))
            .with_file(MockFile::new("b.txt", b"b"));
        assert_eq!(names(&folder, &[], false), vec!["a.jpg", "b.txt"]);
    }

    #[test]
    fn test_recursion_is_depth_first_with_parent_titles() {
        let folder = MockFolder::new("DCIM")
            .with_folder(
                MockFolder::new("100APPLE").with_file(MockFile::new("IMG_0001.JPG", b"a")),
            )
            .with_file(MockFile::new("IMG_0002.JPG", b"b"));

        let results: Vec<(String, String)> =
            FileEnumerator::new(&folder, &pats(&["*.jpg"]), true)
                .expect("enumerator should build")
                .map(|r| {
                    let f = r.expect("enumeration should succeed");
                    (f.parent_title.clone(), f.item.name())
                })
                .collect();

        assert_eq!(
            results,
            vec![
                ("100APPLE".to_string(), "IMG_0001.JPG".to_string()),
                ("DCIM".to_string(), "IMG_0002.JPG".to_string()),
            ]
        );
    }

    #[test]
    fn test_non_recursive_skips_folders() {
        let folder = MockFolder::new("DCIM")
            .with_folder(
                MockFolder::new("100APPLE").with_file(MockFile::new("IMG_0001.JPG", b"a")),
            )
            .with_file(MockFile::new("IMG_0002.JPG", b"b"));
        assert_eq!(names(&folder, &["*.jpg"], false), vec!["IMG_0002.JPG"]);
    }

    #[test]
    fn test_unknown_type_treated_as_file() {
        let folder = MockFolder::new("DCIM")
            .with_file(MockFile::new("mystery.jpg", b"a").type_unknown());
        assert_eq!(names(&folder, &["*.jpg"], true), vec!["mystery.jpg"]);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let folder = MockFolder::new("DCIM");
        let err = FileEnumerator::new(&folder, &pats(&["[invalid"]), false)
            .err()
            .expect("invalid pattern should be rejected");
        assert!(matches!(err, EngineError::InvalidPattern { .. }));
    }
}
