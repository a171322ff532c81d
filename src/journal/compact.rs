//! Offline compaction of historical segments.
//!
//! Folds every segment except the newest (which may still be the live
//! writer's) and re-emits the folded counts as a minimal record stream in
//! `0`-prefixed segments, which replay before any remaining live segment.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::error::JournalError;
use super::record::JournalRecord;
use super::replay::Replay;
use super::segment::{compacted_name, list_segments, SegmentClock, SegmentFile};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    pub segments_read: usize,
    pub segments_skipped: usize,
    pub segments_written: usize,
    pub records_read: usize,
    pub records_written: usize,
    pub malformed_lines: usize,
}

#[derive(Debug, Clone)]
pub struct Compactor {
    dir: PathBuf,
    file_size: usize,
}

impl Compactor {
    /// `file_size` is the record-count rotation threshold, the same one the
    /// live writer uses.
    pub fn new(dir: impl Into<PathBuf>, file_size: usize) -> Self {
        Self {
            dir: dir.into(),
            file_size: file_size.max(1),
        }
    }

    pub fn run(&self) -> Result<CompactionReport, JournalError> {
        let mut segments = list_segments(&self.dir)?;
        if let Some(newest) = segments.pop() {
            debug!("leaving newest segment {} untouched", newest.name);
        }
        if segments.is_empty() {
            info!("nothing to compact in {:?}", self.dir);
            return Ok(CompactionReport::default());
        }

        let replay = Replay::fold(&segments);
        let records = replay.counts.to_records();

        let written = self.write_compacted(&records)?;
        let removed = replay.remove_consumed();
        if removed < replay.consumed.len() {
            warn!(
                "{} compacted segments could not be removed and will replay twice",
                replay.consumed.len() - removed
            );
        }

        let report = CompactionReport {
            segments_read: replay.consumed.len(),
            segments_skipped: replay.skipped.len(),
            segments_written: written.len(),
            records_read: replay.stats.records,
            records_written: records.len(),
            malformed_lines: replay.stats.malformed,
        };
        info!(
            "compacted {} segments ({} records) into {} segments ({} records)",
            report.segments_read,
            report.records_read,
            report.segments_written,
            report.records_written
        );
        Ok(report)
    }

    /// Writes `records` into rotated temp files, fsyncs them, then renames
    /// them into place. Temp names are not segment names, so a crash
    /// before the rename leaves nothing that would replay.
    fn write_compacted(&self, records: &[JournalRecord]) -> Result<Vec<SegmentFile>, JournalError> {
        let mut clock = SegmentClock::new();
        let mut staged: Vec<(PathBuf, SegmentFile)> = Vec::new();

        for chunk in records.chunks(self.file_size) {
            let name = compacted_name(clock.next_stamp());
            let tmp = self.dir.join(format!(".{name}.tmp"));
            write_segment(&tmp, chunk)?;
            staged.push((
                tmp,
                SegmentFile {
                    path: self.dir.join(&name),
                    name,
                },
            ));
        }

        let mut written = Vec::with_capacity(staged.len());
        for (tmp, segment) in staged {
            fs::rename(&tmp, &segment.path)?;
            debug!("wrote compacted segment {}", segment.name);
            written.push(segment);
        }
        sync_dir(&self.dir);
        Ok(written)
    }
}

fn write_segment(path: &Path, records: &[JournalRecord]) -> Result<(), JournalError> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    for record in records {
        out.write_all(record.encode().as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    out.get_ref().sync_all()?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        warn!("failed to sync directory {:?}: {}", dir, e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::replay::NetCounts;

    fn write(dir: &Path, name: &str, lines: &[&str]) {
        let mut body = lines.join("\n");
        body.push('\n');
        fs::write(dir.join(name), body).unwrap();
    }

    fn names(dir: &Path) -> Vec<String> {
        list_segments(dir).unwrap().into_iter().map(|s| s.name).collect()
    }

    #[test]
    fn newest_segment_is_never_touched() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "100", &["SET+q+a", "SET+q+b"]);
        write(dir.path(), "200", &["GET+q+a"]);
        write(dir.path(), "300", &["SET+q+live"]);
        let live_before = fs::read(dir.path().join("300")).unwrap();

        let report = Compactor::new(dir.path(), 100).run().unwrap();
        assert_eq!(report.segments_read, 2);
        assert_eq!(report.records_read, 3);
        assert_eq!(report.records_written, 1);
        assert_eq!(report.segments_written, 1);

        let after = names(dir.path());
        assert_eq!(after.len(), 2);
        assert!(after[0].starts_with('0'));
        assert_eq!(after[1], "300");
        assert_eq!(fs::read(dir.path().join("300")).unwrap(), live_before);
    }

    #[test]
    fn single_segment_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "100", &["SET+q+a"]);
        let report = Compactor::new(dir.path(), 100).run().unwrap();
        assert_eq!(report, CompactionReport::default());
        assert_eq!(names(dir.path()), vec!["100"]);
    }

    #[test]
    fn output_respects_rotation_threshold() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "100", &["SET+q+a"; 5]);
        write(dir.path(), "200", &["SET+q+b"]);

        let report = Compactor::new(dir.path(), 2).run().unwrap();
        assert_eq!(report.records_written, 5);
        assert_eq!(report.segments_written, 3);

        for segment in list_segments(dir.path()).unwrap() {
            let lines = fs::read_to_string(&segment.path).unwrap().lines().count();
            assert!(lines <= 2);
        }
    }

    #[test]
    fn compaction_preserves_net_counts() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "100", &["SET+q+a", "SET+q+a", "GET+q+x", "SET+r+c"]);
        write(dir.path(), "200", &["DEL+r+", "SET+r+d", "GET+q+a", "SET+s+e"]);
        write(dir.path(), "300", &["SET+q+z", "DEL+s+"]);

        let before = Replay::from_dir(dir.path()).unwrap().counts.net_map();
        Compactor::new(dir.path(), 2).run().unwrap();
        let after = Replay::from_dir(dir.path()).unwrap().counts.net_map();
        assert_eq!(before, after);
    }

    #[test]
    fn compacting_twice_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "100", &["SET+q+a", "SET+q+b"]);
        write(dir.path(), "200", &["GET+q+b"]);
        write(dir.path(), "300", &["SET+q+c"]);

        Compactor::new(dir.path(), 10).run().unwrap();
        let once = Replay::from_dir(dir.path()).unwrap().counts.net_map();
        Compactor::new(dir.path(), 10).run().unwrap();
        let twice = Replay::from_dir(dir.path()).unwrap().counts.net_map();
        assert_eq!(once, twice);

        let mut expected = NetCounts::new();
        expected.apply(&JournalRecord::set("q", "a"));
        expected.apply(&JournalRecord::set("q", "c"));
        assert_eq!(twice, expected.net_map());
    }
}
