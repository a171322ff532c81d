//! The queue service proper: the in-memory store coupled to the journal.
//!
//! Every mutation takes the queue's lock, journals the matching record and
//! only then commits. Records of one queue therefore reach the writer in
//! the order their operations were applied, and an operation the writer
//! refuses leaves the store as it was.

use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::{Message, QueueError, QueueManager, QueueResult};
use crate::journal::{JournalConfig, JournalError, JournalRecord, JournalWriter, NetCounts, Replay};
use crate::metrics;

#[derive(Debug)]
pub struct Broker {
    store: QueueManager,
    journal: JournalWriter,
}

impl Broker {
    pub fn new(store: QueueManager, journal: JournalWriter) -> Self {
        Self { store, journal }
    }

    /// Recovers the store from the recovery directory and starts the
    /// journal writer. The returned broker is ready for traffic.
    ///
    /// Consumed segments are deleted only after the recovered state has
    /// been re-journaled and flushed.
    pub async fn open(config: &Config) -> Result<Self, JournalError> {
        let dir = &config.recovery.dir;
        tokio::fs::create_dir_all(dir).await?;

        let replay = Replay::from_dir(dir)?;
        let journal = JournalWriter::spawn(JournalConfig::from(&config.recovery))?;
        let broker = Self::new(QueueManager::new(&config.queues), journal);

        let restored = broker
            .restore(&replay.counts, config.recovery.blocking_rejournal)
            .await?;
        broker.journal.flush().await?;

        let removed = replay.remove_consumed();
        metrics::set_ready(true);
        info!(
            "recovered {} messages in {} queues, removed {} old segments",
            restored,
            broker.store.queue_count(),
            removed
        );
        Ok(broker)
    }

    /// Loads the positive net counts into the store and journals a SET for
    /// every loaded message. Recovered messages are never refused for
    /// capacity, so a queue may come back above `max_size`.
    ///
    /// With `blocking` the re-journal waits for channel space; otherwise a
    /// refused record is logged and that message stays in memory only.
    pub async fn restore(&self, counts: &NetCounts, blocking: bool) -> Result<usize, JournalError> {
        let mut restored = 0usize;

        for (queue, messages) in counts.materialize() {
            for (text, copies) in messages {
                let message = Message::from(text);
                for _ in 0..copies {
                    self.store.enqueue_recovered(&queue, message.clone());

                    let record = JournalRecord::set(queue.as_str(), message.as_str());
                    if blocking {
                        self.journal.append(&record).await?;
                    } else if let Err(e) = self.journal.offer(&record) {
                        error!(
                            "recovered message {:?} in queue {} was not re-journaled: {}",
                            message.as_str(),
                            queue,
                            e
                        );
                    }
                    restored += 1;
                }
            }
        }

        metrics::inc_recovered(restored as u64);
        Ok(restored)
    }

    #[inline]
    pub fn store(&self) -> &QueueManager {
        &self.store
    }

    #[inline]
    pub fn journal(&self) -> &JournalWriter {
        &self.journal
    }

    /// Enqueues `message`, creating the queue on demand.
    pub fn set(&self, queue: &str, message: impl Into<Message>) -> QueueResult<()> {
        validate_queue_name(queue)?;
        let message = message.into();
        if message.is_empty() {
            return Err(QueueError::InvalidInput("message is empty".to_string()));
        }

        let (increment, ceiling) = (self.store.init_size(), self.store.max_size());
        let result = self.store.try_with_queue_or_create(queue, |state| {
            state.grow(increment, ceiling);
            if state.is_full() {
                return Err(QueueError::CapacityExhausted(queue.to_string()));
            }
            self.journal
                .offer(&JournalRecord::set(queue, message.as_str()))
                .map_err(QueueError::DurabilityFailure)?;
            state.try_push(message);
            Ok(())
        });

        self.record_outcome(&result, metrics::inc_sets);
        result
    }

    /// Dequeues the front message of `queue`.
    pub fn get(&self, queue: &str) -> QueueResult<Message> {
        let result = self.store.with_queue(queue, |state| {
            let message = state
                .try_pop()
                .ok_or_else(|| QueueError::Empty(queue.to_string()))?;
            if let Err(e) = self.journal.offer(&JournalRecord::get(queue, message.as_str())) {
                state.restore_front(message);
                return Err(QueueError::DurabilityFailure(e));
            }
            Ok(message)
        });

        self.record_outcome(&result, metrics::inc_gets);
        result
    }

    /// Removes `queue` and everything in it.
    pub fn delete(&self, queue: &str) -> QueueResult<()> {
        let result = self.store.remove_with(queue, |_| {
            self.journal
                .offer(&JournalRecord::del(queue))
                .map_err(QueueError::DurabilityFailure)
        });

        self.record_outcome(&result, metrics::inc_deletes);
        result
    }

    pub fn count(&self, queue: &str) -> QueueResult<usize> {
        self.store.count(queue)
    }

    /// Up to `n` messages from the front, rotated to the back. Not journaled.
    pub fn peek(&self, queue: &str, n: usize) -> QueueResult<Vec<Message>> {
        self.store.peek(queue, n)
    }

    /// Names of queues holding at least one message.
    pub fn list(&self) -> Vec<String> {
        self.store
            .names()
            .into_iter()
            .filter(|name| self.store.count(name).is_ok_and(|n| n > 0))
            .collect()
    }

    /// Waits until every accepted record is on disk.
    pub async fn flush(&self) -> Result<(), JournalError> {
        self.journal.flush().await
    }

    fn record_outcome<T>(&self, result: &QueueResult<T>, on_success: fn(u64)) {
        match result {
            Ok(_) => on_success(1),
            Err(QueueError::CapacityExhausted(queue)) => {
                warn!("queue {} is full", queue);
                metrics::inc_rejected(1);
            }
            Err(QueueError::DurabilityFailure(e)) => {
                warn!("rejecting operation: {}", e);
                metrics::inc_rejected(1);
            }
            Err(_) => {}
        }
    }
}

/// Queue names travel inside space-separated journal records.
pub fn validate_queue_name(name: &str) -> QueueResult<()> {
    if name.is_empty() {
        return Err(QueueError::InvalidInput("queue name is empty".to_string()));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(QueueError::InvalidInput(format!(
            "queue name {name:?} contains whitespace"
        )));
    }
    Ok(())
}
