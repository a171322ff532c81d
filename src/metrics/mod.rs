use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// Global counters (low overhead). These are coarse-grained and process-wide.
static SETS: AtomicU64 = AtomicU64::new(0);
static GETS: AtomicU64 = AtomicU64::new(0);
static DELETES: AtomicU64 = AtomicU64::new(0);
static REJECTED: AtomicU64 = AtomicU64::new(0);
static JOURNAL_RECORDS: AtomicU64 = AtomicU64::new(0);
static JOURNAL_BACKPRESSURE: AtomicU64 = AtomicU64::new(0);
static SEGMENT_ROTATIONS: AtomicU64 = AtomicU64::new(0);
static JOURNAL_FSYNCS: AtomicU64 = AtomicU64::new(0);
static MALFORMED_LINES: AtomicU64 = AtomicU64::new(0);
static RECOVERED: AtomicU64 = AtomicU64::new(0);

// Set once startup recovery has finished.
static READY: AtomicBool = AtomicBool::new(false);

#[inline]
pub fn set_ready(v: bool) {
    READY.store(v, Ordering::Relaxed);
}

#[inline]
pub fn is_ready() -> bool {
    READY.load(Ordering::Relaxed)
}

#[inline]
pub fn inc_sets(n: u64) {
    SETS.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_gets(n: u64) {
    GETS.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_deletes(n: u64) {
    DELETES.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_rejected(n: u64) {
    REJECTED.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_journal_records(n: u64) {
    JOURNAL_RECORDS.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_journal_backpressure(n: u64) {
    JOURNAL_BACKPRESSURE.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_segment_rotations(n: u64) {
    SEGMENT_ROTATIONS.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_journal_fsyncs(n: u64) {
    JOURNAL_FSYNCS.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_malformed_lines(n: u64) {
    MALFORMED_LINES.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_recovered(n: u64) {
    RECOVERED.fetch_add(n, Ordering::Relaxed);
}

pub fn snapshot() -> String {
    // Simple text format (Prometheus-style without HELP/TYPE lines for brevity)
    format!(
        "lmq_ready {}\nlmq_sets {}\nlmq_gets {}\nlmq_deletes {}\nlmq_rejected {}\nlmq_journal_records {}\nlmq_journal_backpressure {}\nlmq_segment_rotations {}\nlmq_journal_fsyncs {}\nlmq_malformed_lines {}\nlmq_recovered {}\n",
        u8::from(is_ready()),
        SETS.load(Ordering::Relaxed),
        GETS.load(Ordering::Relaxed),
        DELETES.load(Ordering::Relaxed),
        REJECTED.load(Ordering::Relaxed),
        JOURNAL_RECORDS.load(Ordering::Relaxed),
        JOURNAL_BACKPRESSURE.load(Ordering::Relaxed),
        SEGMENT_ROTATIONS.load(Ordering::Relaxed),
        JOURNAL_FSYNCS.load(Ordering::Relaxed),
        MALFORMED_LINES.load(Ordering::Relaxed),
        RECOVERED.load(Ordering::Relaxed),
    )
}
