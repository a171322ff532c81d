//! Segment files and their names.
//!
//! A segment is named by the decimal nanosecond stamp of its creation, so
//! sorting names sorts segments chronologically. Compacted segments carry
//! a leading `0` and therefore sort before every live segment.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use super::error::JournalError;

pub const COMPACTED_PREFIX: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentFile {
    pub name: String,
    pub path: PathBuf,
}

impl SegmentFile {
    pub fn is_compacted(&self) -> bool {
        self.name.starts_with(COMPACTED_PREFIX)
    }
}

/// Only all-digit names are segments; temp files and strays are ignored.
pub fn is_segment_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

pub fn segment_name(stamp: u128) -> String {
    stamp.to_string()
}

pub fn compacted_name(stamp: u128) -> String {
    format!("{COMPACTED_PREFIX}{stamp}")
}

/// Lists the segments of `dir` in chronological order.
///
/// An unreadable directory is fatal; an unreadable entry is skipped.
pub fn list_segments(dir: &Path) -> Result<Vec<SegmentFile>, JournalError> {
    let entries = fs::read_dir(dir).map_err(|source| JournalError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut segments = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry in {:?}: {}", dir, e);
                continue;
            }
        };

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !is_segment_name(&name) {
            continue;
        }
        match entry.file_type() {
            Ok(ft) if ft.is_file() => {}
            _ => continue,
        }

        segments.push(SegmentFile {
            path: entry.path(),
            name,
        });
    }

    segments.sort();
    Ok(segments)
}

/// Hands out strictly increasing nanosecond stamps.
#[derive(Debug, Default)]
pub struct SegmentClock {
    last: u128,
}

impl SegmentClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_stamp(&mut self) -> u128 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        self.last = now.max(self.last + 1);
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_strictly_increase() {
        let mut clock = SegmentClock::new();
        let mut prev = clock.next_stamp();
        for _ in 0..1000 {
            let next = clock.next_stamp();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn compacted_names_sort_first() {
        let mut clock = SegmentClock::new();
        let live = segment_name(clock.next_stamp());
        let compacted = compacted_name(clock.next_stamp());
        assert!(compacted < live);
    }

    #[test]
    fn listing_ignores_non_segments() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("200"), b"").unwrap();
        fs::write(dir.path().join("0300"), b"").unwrap();
        fs::write(dir.path().join("100"), b"").unwrap();
        fs::write(dir.path().join(".0400.tmp"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::create_dir(dir.path().join("999")).unwrap();

        let names: Vec<String> = list_segments(dir.path())
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["0300", "100", "200"]);
    }

    #[test]
    fn missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_segments(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, JournalError::DirectoryUnreadable { .. }));
    }
}
