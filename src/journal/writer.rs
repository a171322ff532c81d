//! The single background writer that appends records to rotating segments.
//!
//! Callers hand records over a bounded channel. `offer` never waits: a full
//! channel is reported as backpressure so the request layer can refuse the
//! operation instead of acknowledging something that is not journaled.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

use super::error::JournalError;
use super::record::JournalRecord;
use super::segment::{segment_name, SegmentClock};
use crate::config::RecoveryConfig;
use crate::metrics;

#[derive(Debug, Clone)]
pub struct JournalConfig {
    pub dir: PathBuf,
    /// Records per segment before rotation.
    pub file_size: usize,
    /// Capacity of the pending-records channel. When full, offers fail.
    pub channel_capacity: usize,
    /// Call fsync every N records. Rotation and explicit flushes always
    /// fsync.
    pub fsync_every_n: Option<usize>,
}

impl From<&RecoveryConfig> for JournalConfig {
    fn from(cfg: &RecoveryConfig) -> Self {
        Self {
            dir: cfg.dir.clone(),
            file_size: cfg.file_size,
            channel_capacity: cfg.channel_capacity,
            fsync_every_n: cfg.fsync_every_n,
        }
    }
}

#[derive(Debug)]
enum JournalMessage {
    Record(String),
    Flush(oneshot::Sender<Result<(), JournalError>>),
}

/// Cheap, cloneable handle to the writer task.
#[derive(Debug, Clone)]
pub struct JournalWriter {
    sender: mpsc::Sender<JournalMessage>,
}

/// The consuming half. Drive it with [`JournalTask::run`].
#[derive(Debug)]
pub struct JournalTask {
    receiver: mpsc::Receiver<JournalMessage>,
    dir: PathBuf,
    file_size: usize,
    fsync_every_n: Option<usize>,
    clock: SegmentClock,
    current: Option<OpenSegment>,
    unsynced_records: usize,
    fsyncs: u64,
}

#[derive(Debug)]
struct OpenSegment {
    name: String,
    file: File,
    records: usize,
}

impl JournalWriter {
    /// Creates the handle and its task without starting the task.
    pub fn new(config: JournalConfig) -> Result<(Self, JournalTask), JournalError> {
        if config.channel_capacity == 0 || config.file_size == 0 {
            return Err(JournalError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "journal channel capacity and file size must be greater than 0",
            )));
        }

        let (sender, receiver) = mpsc::channel(config.channel_capacity);
        let task = JournalTask {
            receiver,
            dir: config.dir,
            file_size: config.file_size,
            fsync_every_n: config.fsync_every_n,
            clock: SegmentClock::new(),
            current: None,
            unsynced_records: 0,
            fsyncs: 0,
        };
        Ok((Self { sender }, task))
    }

    /// Creates the writer and runs its task on the current tokio runtime.
    pub fn spawn(config: JournalConfig) -> Result<Self, JournalError> {
        let (writer, task) = Self::new(config)?;
        tokio::spawn(async move {
            if let Err(err) = task.run().await {
                error!("journal writer stopped with error: {err}");
            }
        });
        Ok(writer)
    }

    /// Queues a record without waiting.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn offer(&self, record: &JournalRecord) -> Result<(), JournalError> {
        self.sender
            .try_send(JournalMessage::Record(record.encode()))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => {
                    metrics::inc_journal_backpressure(1);
                    JournalError::Backpressure("journal channel full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => JournalError::WriterStopped,
            })
    }

    /// Queues a record, waiting for channel space.
    pub async fn append(&self, record: &JournalRecord) -> Result<(), JournalError> {
        self.sender
            .send(JournalMessage::Record(record.encode()))
            .await
            .map_err(|_| JournalError::WriterStopped)
    }

    /// Waits until everything queued so far is written and fsynced.
    pub async fn flush(&self) -> Result<(), JournalError> {
        let (sender, receiver) = oneshot::channel();
        self.sender
            .send(JournalMessage::Flush(sender))
            .await
            .map_err(|_| JournalError::WriterStopped)?;
        receiver.await.map_err(|_| JournalError::WriterStopped)?
    }
}

impl JournalTask {
    pub async fn run(mut self) -> Result<(), JournalError> {
        while let Some(message) = self.receiver.recv().await {
            match message {
                JournalMessage::Record(line) => {
                    let (lines, pending_flush) = self.collect_batch(line);
                    self.write_batch(&lines).await?;
                    if let Some(flush_sender) = pending_flush {
                        let result = self.flush_segment().await;
                        let _ = flush_sender.send(result);
                    }
                }
                JournalMessage::Flush(sender) => {
                    let result = self.flush_segment().await;
                    let _ = sender.send(result);
                }
            }
        }

        debug!("journal channel closed after {} fsyncs, closing writer", self.fsyncs);
        self.flush_segment().await
    }

    fn collect_batch(
        &mut self,
        first: String,
    ) -> (Vec<String>, Option<oneshot::Sender<Result<(), JournalError>>>) {
        let mut lines = vec![first];
        let mut pending_flush = None;

        loop {
            match self.receiver.try_recv() {
                Ok(JournalMessage::Record(line)) => lines.push(line),
                Ok(JournalMessage::Flush(sender)) => {
                    pending_flush = Some(sender);
                    break;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => break,
            }
        }

        (lines, pending_flush)
    }

    async fn write_batch(&mut self, lines: &[String]) -> Result<(), JournalError> {
        let mut pending = lines;

        while !pending.is_empty() {
            let mut segment = match self.current.take() {
                Some(segment) => segment,
                None => OpenSegment::create(&self.dir, self.clock.next_stamp()).await?,
            };

            let room = self.file_size.saturating_sub(segment.records).max(1);
            let (now, rest) = pending.split_at(room.min(pending.len()));

            let mut buffer = Vec::with_capacity(now.iter().map(|l| l.len() + 1).sum());
            for line in now {
                buffer.extend_from_slice(line.as_bytes());
                buffer.push(b'\n');
            }
            segment.file.write_all(&buffer).await?;
            segment.file.flush().await?;

            segment.records += now.len();
            self.unsynced_records += now.len();
            metrics::inc_journal_records(now.len() as u64);
            pending = rest;

            if segment.records >= self.file_size {
                trace!("rotating journal segment {}", segment.name);
                self.close_segment(segment).await?;
                metrics::inc_segment_rotations(1);
            } else {
                self.current = Some(segment);
            }
        }

        self.maybe_sync().await
    }

    // Rotated segments are never reopened, so they are synced here.
    async fn close_segment(&mut self, mut segment: OpenSegment) -> Result<(), JournalError> {
        segment.sync().await?;
        self.record_fsync();
        Ok(())
    }

    async fn flush_segment(&mut self) -> Result<(), JournalError> {
        if let Some(segment) = self.current.as_mut() {
            segment.sync().await?;
            self.record_fsync();
        }
        self.unsynced_records = 0;
        Ok(())
    }

    fn record_fsync(&mut self) {
        self.fsyncs += 1;
        self.unsynced_records = 0;
        metrics::inc_journal_fsyncs(1);
    }

    async fn maybe_sync(&mut self) -> Result<(), JournalError> {
        let Some(every_n) = self.fsync_every_n else {
            return Ok(());
        };
        if self.unsynced_records >= every_n {
            let span = tracing::trace_span!("journal_fsync");
            let _guard = span.enter();
            self.flush_segment().await?;
        }
        Ok(())
    }
}

impl OpenSegment {
    async fn create(dir: &Path, stamp: u128) -> Result<Self, JournalError> {
        let name = segment_name(stamp);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(&name))
            .await?;
        debug!("opened journal segment {}", name);
        Ok(Self {
            name,
            file,
            records: 0,
        })
    }

    async fn sync(&mut self) -> Result<(), JournalError> {
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::segment::list_segments;

    fn config(dir: &Path, file_size: usize, channel_capacity: usize) -> JournalConfig {
        JournalConfig {
            dir: dir.to_path_buf(),
            file_size,
            channel_capacity,
            fsync_every_n: None,
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JournalWriter::spawn(config(dir.path(), 100, 16)).unwrap();

        writer.offer(&JournalRecord::set("jobs", "a")).unwrap();
        writer.offer(&JournalRecord::get("jobs", "a")).unwrap();
        writer.offer(&JournalRecord::del("jobs")).unwrap();
        writer.flush().await.unwrap();

        let segments = list_segments(dir.path()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(
            read_lines(&segments[0].path),
            vec!["SET%20jobs%20a", "GET%20jobs%20a", "DEL%20jobs%20"]
        );
    }

    #[tokio::test]
    async fn rotates_at_record_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JournalWriter::spawn(config(dir.path(), 3, 64)).unwrap();

        for i in 0..7 {
            writer
                .append(&JournalRecord::set("jobs", format!("m{i}")))
                .await
                .unwrap();
        }
        writer.flush().await.unwrap();

        let segments = list_segments(dir.path()).unwrap();
        let sizes: Vec<usize> = segments.iter().map(|s| read_lines(&s.path).len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        let all: Vec<String> = segments.iter().flat_map(|s| read_lines(&s.path)).collect();
        let expected: Vec<String> = (0..7)
            .map(|i| JournalRecord::set("jobs", format!("m{i}")).encode())
            .collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn full_channel_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        // Task is never run, so nothing drains the channel.
        let (writer, _task) = JournalWriter::new(config(dir.path(), 10, 1)).unwrap();

        writer.offer(&JournalRecord::set("jobs", "a")).unwrap();
        let err = writer.offer(&JournalRecord::set("jobs", "b")).unwrap_err();
        assert!(matches!(err, JournalError::Backpressure(_)));
    }

    #[tokio::test]
    async fn stopped_writer_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (writer, task) = JournalWriter::new(config(dir.path(), 10, 4)).unwrap();
        drop(task);

        let err = writer.offer(&JournalRecord::set("jobs", "a")).unwrap_err();
        assert!(matches!(err, JournalError::WriterStopped));
        assert!(matches!(writer.flush().await, Err(JournalError::WriterStopped)));
    }

    #[tokio::test]
    async fn rotated_segments_are_synced_without_a_cadence() {
        let dir = tempfile::tempdir().unwrap();
        let (_writer, mut task) = JournalWriter::new(config(dir.path(), 3, 16)).unwrap();

        let lines: Vec<String> = (0..7)
            .map(|i| JournalRecord::set("jobs", format!("m{i}")).encode())
            .collect();
        task.write_batch(&lines).await.unwrap();
        assert_eq!(task.fsyncs, 2);

        task.flush_segment().await.unwrap();
        assert_eq!(task.fsyncs, 3);
        assert_eq!(list_segments(dir.path()).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn idle_writer_leaves_no_segment() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JournalWriter::spawn(config(dir.path(), 10, 4)).unwrap();
        writer.flush().await.unwrap();
        assert!(list_segments(dir.path()).unwrap().is_empty());
    }
}
