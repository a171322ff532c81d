//! QueueManager: the in-memory store of named queues.
//!
//! Uses DashMap for the name → queue mapping; each queue carries its own
//! mutex. Creation, growth and deletion are serialised per name: a caller
//! that raced with a deletion sees the queue's `dropped` flag under the
//! queue lock and re-resolves the name.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::QueueConfig;
use crate::core::error::{QueueError, QueueResult};
use crate::core::message::Message;
use crate::core::queue::{Queue, QueueState};

#[derive(Debug)]
pub struct QueueManager {
    queues: DashMap<String, Arc<Queue>>,
    init_size: usize,
    max_size: Option<usize>,
}

impl QueueManager {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            queues: DashMap::new(),
            init_size: config.init_size,
            max_size: config.max_size,
        }
    }

    /// Initial capacity of new queues, also used as the growth increment.
    #[inline]
    pub fn init_size(&self) -> usize {
        self.init_size
    }

    #[inline]
    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// Returns the queue for `name`, creating an empty one if absent.
    pub fn ensure(&self, name: &str) -> Arc<Queue> {
        self.ensure_tracked(name).0
    }

    // The flag tells whether this call inserted the queue.
    fn ensure_tracked(&self, name: &str) -> (Arc<Queue>, bool) {
        if let Some(existing) = self.queues.get(name) {
            return (Arc::clone(&*existing), false);
        }

        match self.queues.entry(name.to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let queue = Arc::new(Queue::new(name, self.init_size));
                entry.insert(Arc::clone(&queue));
                (queue, true)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues.get(name).map(|q| Arc::clone(&*q))
    }

    /// Runs `f` under the lock of the live queue for `name`, creating it
    /// first when needed.
    pub fn with_queue_or_create<R>(&self, name: &str, f: impl FnOnce(&mut QueueState) -> R) -> R {
        loop {
            let queue = self.ensure(name);
            let mut state = queue.lock();
            if state.is_dropped() {
                continue;
            }
            return f(&mut state);
        }
    }

    /// Like [`with_queue_or_create`](Self::with_queue_or_create), but a
    /// queue this call created is discarded again when `f` fails and the
    /// queue is still empty, so a rejected first write leaves no queue
    /// behind.
    pub fn try_with_queue_or_create<R, E>(
        &self,
        name: &str,
        f: impl FnOnce(&mut QueueState) -> Result<R, E>,
    ) -> Result<R, E> {
        loop {
            let (queue, created) = self.ensure_tracked(name);
            let mut state = queue.lock();
            if state.is_dropped() {
                continue;
            }

            let result = f(&mut state);
            if result.is_err() && created && state.is_empty() {
                state.mark_dropped();
                drop(state);
                self.queues.remove_if(name, |_, q| Arc::ptr_eq(q, &queue));
            }
            return result;
        }
    }

    /// Runs `f` under the lock of the live queue for `name`.
    pub fn with_queue<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut QueueState) -> QueueResult<R>,
    ) -> QueueResult<R> {
        let queue = self
            .get(name)
            .ok_or_else(|| QueueError::NotFound(name.to_string()))?;
        let mut state = queue.lock();
        if state.is_dropped() {
            return Err(QueueError::NotFound(name.to_string()));
        }
        f(&mut state)
    }

    /// Removes `name` once `commit` accepts the removal.
    ///
    /// `commit` runs while both the map entry and the queue are locked, so
    /// no enqueue or dequeue can interleave between it and the removal.
    pub fn remove_with(
        &self,
        name: &str,
        commit: impl FnOnce(&mut QueueState) -> QueueResult<()>,
    ) -> QueueResult<()> {
        match self.queues.entry(name.to_string()) {
            Entry::Vacant(_) => Err(QueueError::NotFound(name.to_string())),
            Entry::Occupied(entry) => {
                let queue = Arc::clone(entry.get());
                let mut state = queue.lock();
                commit(&mut state)?;
                state.mark_dropped();
                drop(state);
                entry.remove();
                Ok(())
            }
        }
    }

    pub fn remove(&self, name: &str) -> QueueResult<()> {
        self.remove_with(name, |_| Ok(()))
    }

    /// Grows the buffer of `name` by `increment` if it is running low.
    pub fn grow(&self, name: &str, increment: usize) -> QueueResult<bool> {
        let max_size = self.max_size;
        self.with_queue(name, |state| Ok(state.grow(increment, max_size)))
    }

    /// Unjournaled append; `false` means the queue is full even after growth.
    pub fn enqueue(&self, name: &str, message: Message) -> bool {
        let (increment, max_size) = (self.init_size, self.max_size);
        self.with_queue_or_create(name, |state| {
            state.grow(increment, max_size);
            state.try_push(message)
        })
    }

    /// Unjournaled append that grows past `max_size`. Used for recovered
    /// messages, which have no other copy once old segments are removed.
    pub fn enqueue_recovered(&self, name: &str, message: Message) {
        let increment = self.init_size;
        self.with_queue_or_create(name, |state| {
            state.grow(increment, None);
            state.try_push(message);
        })
    }

    pub fn dequeue(&self, name: &str) -> QueueResult<Message> {
        self.with_queue(name, |state| {
            state
                .try_pop()
                .ok_or_else(|| QueueError::Empty(name.to_string()))
        })
    }

    pub fn peek(&self, name: &str, n: usize) -> QueueResult<Vec<Message>> {
        self.with_queue(name, |state| Ok(state.rotate(n)))
    }

    pub fn count(&self, name: &str) -> QueueResult<usize> {
        self.with_queue(name, |state| Ok(state.len()))
    }

    /// Every existing queue name, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Number of queues currently in the store.
    #[inline]
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }
}
