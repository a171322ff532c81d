//! A single named FIFO queue.
//!
//! The buffer is an explicit bounded deque: "full" and "empty" are return
//! states, nothing ever waits. All mutation happens under the queue's own
//! mutex, which also serialises buffer growth against concurrent
//! enqueue/dequeue so no message is seen twice or lost during a swap.

use std::collections::VecDeque;

use parking_lot::{Mutex, MutexGuard};

use super::message::Message;

#[derive(Debug)]
pub struct Queue {
    name: String,
    state: Mutex<QueueState>,
}

/// Buffer plus the guarded length/capacity bookkeeping.
#[derive(Debug)]
pub struct QueueState {
    buffer: VecDeque<Message>,
    capacity: usize,
    // Set once the queue is removed from the store; holders of a stale
    // handle must re-resolve the name instead of writing into it.
    dropped: bool,
}

impl Queue {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::with_capacity(capacity)),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Locks the queue for a compound operation.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock()
    }

    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }

    /// Grows if needed, then appends. Returns `false` when still full.
    pub fn try_enqueue(&self, message: Message, increment: usize, ceiling: Option<usize>) -> bool {
        let mut state = self.state.lock();
        state.grow(increment, ceiling);
        state.try_push(message)
    }

    pub fn try_dequeue(&self) -> Option<Message> {
        self.state.lock().try_pop()
    }

    /// Moves up to `n` messages from the front to the back and returns them.
    pub fn peek(&self, n: usize) -> Vec<Message> {
        self.state.lock().rotate(n)
    }
}

impl QueueState {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            dropped: false,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    #[inline]
    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    pub(crate) fn mark_dropped(&mut self) {
        self.dropped = true;
    }

    /// Enlarges the buffer by `increment` when less than half an increment
    /// is free. Capacity never shrinks; `ceiling` caps it.
    ///
    /// Returns whether a new buffer was installed.
    pub fn grow(&mut self, increment: usize, ceiling: Option<usize>) -> bool {
        let free = self.capacity.saturating_sub(self.buffer.len());
        if free.saturating_mul(2) >= increment {
            return false;
        }

        let mut target = self.capacity.saturating_add(increment);
        if let Some(max) = ceiling {
            target = target.min(max);
        }
        if target <= self.capacity {
            return false;
        }

        let mut next = VecDeque::with_capacity(target);
        next.extend(self.buffer.drain(..));
        self.buffer = next;
        self.capacity = target;
        true
    }

    pub fn try_push(&mut self, message: Message) -> bool {
        if self.is_full() {
            return false;
        }
        self.buffer.push_back(message);
        true
    }

    pub fn try_pop(&mut self) -> Option<Message> {
        self.buffer.pop_front()
    }

    /// Undoes a `try_pop` whose journal record was rejected.
    pub(crate) fn restore_front(&mut self, message: Message) {
        self.buffer.push_front(message);
    }

    pub fn rotate(&mut self, n: usize) -> Vec<Message> {
        let n = n.min(self.buffer.len());
        let mut seen = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some(message) = self.buffer.pop_front() {
                self.buffer.push_back(message.clone());
                seen.push(message);
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &Queue) -> Vec<String> {
        std::iter::from_fn(|| queue.try_dequeue())
            .map(|m| m.to_string())
            .collect()
    }

    #[test]
    fn fifo_order_is_kept() {
        let q = Queue::new("jobs", 8);
        for m in ["a", "b", "c"] {
            assert!(q.try_enqueue(m.into(), 8, None));
        }
        assert_eq!(drain(&q), vec!["a", "b", "c"]);
        assert!(q.try_dequeue().is_none());
    }

    #[test]
    fn grows_when_less_than_half_an_increment_is_free() {
        let mut state = QueueState::with_capacity(4);
        assert!(!state.grow(4, None));
        state.try_push("a".into());
        state.try_push("b".into());
        state.try_push("c".into());
        // one slot free, 2 * 1 < 4
        assert!(state.grow(4, None));
        assert_eq!(state.capacity(), 8);
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn growth_keeps_order_and_loses_nothing() {
        let q = Queue::new("jobs", 2);
        let expected: Vec<String> = (0..100).map(|i| format!("m{i}")).collect();
        for m in &expected {
            assert!(q.try_enqueue(m.as_str().into(), 2, None));
        }
        assert!(q.capacity() >= 100);
        assert_eq!(drain(&q), expected);
    }

    #[test]
    fn increment_of_one_still_grows() {
        let q = Queue::new("jobs", 1);
        assert!(q.try_enqueue("a".into(), 1, None));
        assert!(q.try_enqueue("b".into(), 1, None));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn ceiling_caps_growth() {
        let q = Queue::new("jobs", 2);
        assert!(q.try_enqueue("a".into(), 2, Some(3)));
        assert!(q.try_enqueue("b".into(), 2, Some(3)));
        assert!(q.try_enqueue("c".into(), 2, Some(3)));
        assert!(!q.try_enqueue("d".into(), 2, Some(3)));
        assert_eq!(q.capacity(), 3);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn peek_rotates_without_losing_messages() {
        let q = Queue::new("jobs", 8);
        for m in ["a", "b", "c"] {
            q.try_enqueue(m.into(), 8, None);
        }
        let seen: Vec<String> = q.peek(2).into_iter().map(|m| m.to_string()).collect();
        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(q.peek(10).len(), 3);
        assert_eq!(q.len(), 3);
    }
}
