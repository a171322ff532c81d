//! Startup replay: folds segments into per-queue net counts.
//!
//! Recovery is count-based, not an ordered log: for every queue and every
//! distinct message value it tracks `#SET - #GET` since the last DEL of
//! that queue. Two equal messages enqueued at different times are
//! indistinguishable afterwards, so FIFO order only holds within one
//! process run.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use super::error::JournalError;
use super::record::{JournalRecord, Method};
use super::segment::{list_segments, SegmentFile};
use crate::metrics;

#[derive(Debug, Clone, Copy)]
struct Tally {
    // Fold sequence number at which the current positive run started.
    first_seen: u64,
    count: i64,
}

/// `queue -> message -> net count` for one replay window.
#[derive(Debug, Default, Clone)]
pub struct NetCounts {
    queues: HashMap<String, HashMap<String, Tally>>,
    seq: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FoldStats {
    pub records: usize,
    pub malformed: usize,
}

impl FoldStats {
    fn absorb(&mut self, other: FoldStats) {
        self.records += other.records;
        self.malformed += other.malformed;
    }
}

impl NetCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, record: &JournalRecord) {
        self.seq += 1;
        let seq = self.seq;

        let delta = match record.method {
            Method::Del => {
                self.queues.remove(&record.queue);
                return;
            }
            Method::Set => 1,
            Method::Get => -1,
        };

        let tally = self
            .queues
            .entry(record.queue.clone())
            .or_default()
            .entry(record.message.clone())
            .or_insert(Tally {
                first_seen: seq,
                count: 0,
            });
        tally.count += delta;
        if delta > 0 && tally.count == 1 {
            tally.first_seen = seq;
        }
    }

    pub fn net(&self, queue: &str, message: &str) -> i64 {
        self.queues
            .get(queue)
            .and_then(|m| m.get(message))
            .map_or(0, |t| t.count)
    }

    pub fn is_empty(&self) -> bool {
        self.queues
            .values()
            .all(|messages| messages.values().all(|t| t.count == 0))
    }

    /// Non-zero counts only, in a comparable shape.
    pub fn net_map(&self) -> BTreeMap<String, BTreeMap<String, i64>> {
        self.queues
            .iter()
            .filter_map(|(queue, messages)| {
                let counts: BTreeMap<String, i64> = messages
                    .iter()
                    .filter(|(_, t)| t.count != 0)
                    .map(|(m, t)| (m.clone(), t.count))
                    .collect();
                (!counts.is_empty()).then(|| (queue.clone(), counts))
            })
            .collect()
    }

    /// The contents to load into the store: queues sorted by name, each
    /// with its positive-count messages in first-seen order.
    pub fn materialize(&self) -> Vec<(String, Vec<(String, usize)>)> {
        let mut queues: Vec<(String, Vec<(String, usize)>)> = self
            .queues
            .iter()
            .filter_map(|(queue, messages)| {
                let mut positive: Vec<(&String, &Tally)> =
                    messages.iter().filter(|(_, t)| t.count > 0).collect();
                if positive.is_empty() {
                    return None;
                }
                positive.sort_by(|a, b| a.1.first_seen.cmp(&b.1.first_seen).then(a.0.cmp(b.0)));
                let messages = positive
                    .into_iter()
                    .map(|(m, t)| (m.clone(), t.count as usize))
                    .collect();
                Some((queue.clone(), messages))
            })
            .collect();
        queues.sort_by(|a, b| a.0.cmp(&b.0));
        queues
    }

    /// Minimal record stream that folds back to exactly these counts:
    /// SET for every positive unit, GET for every negative one.
    pub fn to_records(&self) -> Vec<JournalRecord> {
        let mut queues: Vec<(&String, &HashMap<String, Tally>)> = self.queues.iter().collect();
        queues.sort_by(|a, b| a.0.cmp(b.0));

        let mut records = Vec::new();
        for (queue, messages) in queues {
            let mut ordered: Vec<(&String, &Tally)> =
                messages.iter().filter(|(_, t)| t.count != 0).collect();
            ordered.sort_by(|a, b| a.1.first_seen.cmp(&b.1.first_seen).then(a.0.cmp(b.0)));

            for (message, tally) in ordered {
                let method = if tally.count > 0 {
                    Method::Set
                } else {
                    Method::Get
                };
                for _ in 0..tally.count.unsigned_abs() {
                    records.push(JournalRecord {
                        method,
                        queue: queue.clone(),
                        message: message.clone(),
                    });
                }
            }
        }
        records
    }

    /// Folds the lines of one segment. Malformed lines are logged and
    /// skipped; blank lines are ignored.
    pub fn fold_lines(&mut self, content: &[u8], origin: &str) -> FoldStats {
        let mut stats = FoldStats::default();

        for (idx, raw) in content.split(|b| *b == b'\n').enumerate() {
            if raw.is_empty() || raw == b"\r" {
                continue;
            }
            let decoded = std::str::from_utf8(raw)
                .map_err(|e| JournalError::malformed(format!("invalid UTF-8: {e}")))
                .and_then(JournalRecord::decode);
            match decoded {
                Ok(record) => {
                    self.apply(&record);
                    stats.records += 1;
                }
                Err(e) => {
                    warn!("{}:{}: skipping journal line: {}", origin, idx + 1, e);
                    metrics::inc_malformed_lines(1);
                    stats.malformed += 1;
                }
            }
        }

        stats
    }

    pub fn fold_segment(&mut self, path: &Path) -> Result<FoldStats, JournalError> {
        let content = fs::read(path)?;
        Ok(self.fold_lines(&content, &path.display().to_string()))
    }
}

/// Result of folding a set of segments.
#[derive(Debug, Default)]
pub struct Replay {
    pub counts: NetCounts,
    /// Segments fully folded into `counts`.
    pub consumed: Vec<SegmentFile>,
    /// Segments that could not be read; left on disk.
    pub skipped: Vec<SegmentFile>,
    pub stats: FoldStats,
}

impl Replay {
    /// Folds `segments` in the given (chronological) order.
    pub fn fold(segments: &[SegmentFile]) -> Self {
        let mut replay = Replay::default();

        for segment in segments {
            match replay.counts.fold_segment(&segment.path) {
                Ok(stats) => {
                    debug!(
                        "folded segment {}: {} records, {} malformed",
                        segment.name, stats.records, stats.malformed
                    );
                    replay.stats.absorb(stats);
                    replay.consumed.push(segment.clone());
                }
                Err(e) => {
                    warn!("skipping unreadable segment {}: {}", segment.name, e);
                    replay.skipped.push(segment.clone());
                }
            }
        }

        replay
    }

    /// Folds every segment in `dir`. Fails only if the directory itself
    /// cannot be listed.
    pub fn from_dir(dir: &Path) -> Result<Self, JournalError> {
        let segments = list_segments(dir)?;
        let replay = Self::fold(&segments);
        info!(
            "replayed {} segments ({} records, {} malformed, {} unreadable) from {:?}",
            replay.consumed.len(),
            replay.stats.records,
            replay.stats.malformed,
            replay.skipped.len(),
            dir
        );
        Ok(replay)
    }

    /// Deletes the consumed segments; returns how many were removed.
    pub fn remove_consumed(&self) -> usize {
        let mut removed = 0;
        for segment in &self.consumed {
            match fs::remove_file(&segment.path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("failed to remove segment {}: {}", segment.name, e),
            }
        }
        removed
    }
}
