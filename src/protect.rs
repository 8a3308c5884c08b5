//! Protected-area extraction and storage.
//!
//! Generated files may contain marker-delimited regions that users edit by
//! hand. Before regeneration the manager scans the previous output; during
//! regeneration the interpreter re-splices the preserved content instead of
//! the template's default body.

use std::path::Path;
use std::sync::Mutex;

use indexmap::IndexMap;
use log::warn;

use crate::error::{ExecError, ExecResult};

pub const START_MARKER: &str = "START PROTECTED REGION ";
pub const END_MARKER: &str = "END PROTECTED REGION ";

/// One preserved region: its content without the marker lines, plus the
/// marker lines as found in the scanned output.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectedRegion {
    pub id: String,
    pub content: String,
    pub start_marker: String,
    pub end_marker: String,
}

/// Compose the marker line for a region boundary. The prefix (a comment
/// leader such as `//`) is separated by a single space when non-empty.
pub fn marker(prefix: &str, marker_kind: &str, id: &str) -> String {
    if prefix.is_empty() {
        format!("{}{}", marker_kind, id)
    } else {
        format!("{} {}{}", prefix, marker_kind, id)
    }
}

/// Region store shared between generation runs. Interior locking keeps every
/// operation atomic with respect to concurrent callers.
#[derive(Debug, Default)]
pub struct ProtectedAreaManager {
    regions: Mutex<IndexMap<String, ProtectedRegion>>,
}

impl ProtectedAreaManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a previously generated file. A missing file is not an error;
    /// first-time generation has nothing to preserve.
    pub fn scan_file(&self, path: &Path) -> ExecResult<()> {
        if !path.exists() {
            return Ok(());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ExecError::file_error(format!("{}: {}", path.display(), e)))?;
        self.scan_content(&text);
        Ok(())
    }

    /// Line-based scan. An unterminated region is abandoned when another one
    /// opens; orphan or mismatched end markers are ignored.
    pub fn scan_content(&self, text: &str) {
        let mut open: Option<(String, String, Vec<String>)> = None;
        let mut regions = self.regions.lock().unwrap();

        for line in text.lines() {
            let trimmed = line.trim();
            if let Some(id) = marker_id(trimmed, START_MARKER) {
                if let Some((abandoned, _, _)) = open.take() {
                    warn!("protected region '{}' has no end marker; abandoned", abandoned);
                }
                open = Some((id.to_string(), line.to_string(), Vec::new()));
                continue;
            }
            if let Some(id) = marker_id(trimmed, END_MARKER) {
                match open.take() {
                    Some((open_id, start_line, lines)) if open_id == id => {
                        regions.insert(
                            open_id.clone(),
                            ProtectedRegion {
                                id: open_id,
                                content: lines.join("\n"),
                                start_marker: start_line,
                                end_marker: line.to_string(),
                            },
                        );
                    }
                    mut other => {
                        // Mismatched or orphan end marker: an open region
                        // keeps the line as ordinary content.
                        if let Some((_, _, lines)) = other.as_mut() {
                            lines.push(line.to_string());
                        }
                        open = other;
                    }
                }
                continue;
            }
            if let Some((_, _, lines)) = open.as_mut() {
                lines.push(line.to_string());
            }
        }

        if let Some((abandoned, _, _)) = open {
            warn!("protected region '{}' has no end marker; abandoned", abandoned);
        }
    }

    pub fn get(&self, id: &str) -> Option<ProtectedRegion> {
        self.regions.lock().unwrap().get(id).cloned()
    }

    pub fn content(&self, id: &str) -> Option<String> {
        self.regions.lock().unwrap().get(id).map(|r| r.content.clone())
    }

    /// Store a region directly. Markers default to the canonical unprefixed
    /// form when not supplied.
    pub fn set(&self, id: &str, content: &str, markers: Option<(String, String)>) {
        let (start_marker, end_marker) =
            markers.unwrap_or_else(|| generate_markers(id, None));
        self.regions.lock().unwrap().insert(
            id.to_string(),
            ProtectedRegion {
                id: id.to_string(),
                content: content.to_string(),
                start_marker,
                end_marker,
            },
        );
    }

    pub fn remove(&self, id: &str) -> Option<ProtectedRegion> {
        self.regions.lock().unwrap().shift_remove(id)
    }

    pub fn clear(&self) {
        self.regions.lock().unwrap().clear();
    }

    pub fn all(&self) -> IndexMap<String, ProtectedRegion> {
        self.regions.lock().unwrap().clone()
    }
}

/// The (start, end) marker pair for a region id.
pub fn generate_markers(id: &str, prefix: Option<&str>) -> (String, String) {
    let prefix = prefix.unwrap_or("");
    (marker(prefix, START_MARKER, id), marker(prefix, END_MARKER, id))
}

/// The non-empty id following a marker substring, if this line carries one.
fn marker_id<'a>(line: &'a str, marker_kind: &str) -> Option<&'a str> {
    let at = line.find(marker_kind)?;
    let id = line[at + marker_kind.len()..].trim();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_round_trips_region_content() {
        let manager = ProtectedAreaManager::new();
        manager.scan_content(
            "// START PROTECTED REGION imports\nuse std::fmt;\nuse std::io;\n// END PROTECTED REGION imports\n",
        );
        assert_eq!(
            manager.content("imports").as_deref(),
            Some("use std::fmt;\nuse std::io;")
        );
        let region = manager.get("imports").unwrap();
        assert_eq!(region.start_marker, "// START PROTECTED REGION imports");
        assert_eq!(region.end_marker, "// END PROTECTED REGION imports");
    }

    #[test]
    fn scan_keeps_multiple_regions() {
        let manager = ProtectedAreaManager::new();
        manager.scan_content(
            "START PROTECTED REGION a\none\nEND PROTECTED REGION a\nnoise\nSTART PROTECTED REGION b\ntwo\nthree\nEND PROTECTED REGION b\n",
        );
        assert_eq!(manager.content("a").as_deref(), Some("one"));
        assert_eq!(manager.content("b").as_deref(), Some("two\nthree"));
        assert_eq!(manager.all().len(), 2);
    }

    #[test]
    fn second_start_abandons_open_region() {
        let manager = ProtectedAreaManager::new();
        manager.scan_content(
            "START PROTECTED REGION lost\nx\nSTART PROTECTED REGION kept\ny\nEND PROTECTED REGION kept\n",
        );
        assert!(manager.content("lost").is_none());
        assert_eq!(manager.content("kept").as_deref(), Some("y"));
    }

    #[test]
    fn mismatched_end_marker_is_ignored() {
        let manager = ProtectedAreaManager::new();
        manager.scan_content(
            "START PROTECTED REGION a\nbody\nEND PROTECTED REGION other\nmore\nEND PROTECTED REGION a\n",
        );
        assert_eq!(
            manager.content("a").as_deref(),
            Some("body\nEND PROTECTED REGION other\nmore")
        );
    }

    #[test]
    fn orphan_end_marker_is_ignored() {
        let manager = ProtectedAreaManager::new();
        manager.scan_content("END PROTECTED REGION nobody\nplain\n");
        assert!(manager.all().is_empty());
    }

    #[test]
    fn empty_region_preserves_empty_content() {
        let manager = ProtectedAreaManager::new();
        manager.scan_content("START PROTECTED REGION e\nEND PROTECTED REGION e\n");
        assert_eq!(manager.content("e").as_deref(), Some(""));
    }

    #[test]
    fn markers_space_separated_only_with_prefix() {
        let (start, end) = generate_markers("k", Some("//"));
        assert_eq!(start, "// START PROTECTED REGION k");
        assert_eq!(end, "// END PROTECTED REGION k");
        let (start, end) = generate_markers("k", None);
        assert_eq!(start, "START PROTECTED REGION k");
        assert_eq!(end, "END PROTECTED REGION k");
    }

    #[test]
    fn set_and_remove() {
        let manager = ProtectedAreaManager::new();
        manager.set("x", "content", None);
        assert_eq!(manager.content("x").as_deref(), Some("content"));
        assert!(manager.remove("x").is_some());
        assert!(manager.content("x").is_none());
    }

    #[test]
    fn scan_missing_file_is_not_an_error() {
        let manager = ProtectedAreaManager::new();
        assert!(manager.scan_file(Path::new("/nonexistent/weft-out.txt")).is_ok());
    }
}
