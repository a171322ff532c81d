//! Append-only operation journal: record codec, segment files, the
//! background writer, startup replay and offline compaction.

pub mod compact;
pub mod error;
pub mod record;
pub mod replay;
pub mod segment;
pub mod writer;

pub use compact::{CompactionReport, Compactor};
pub use error::JournalError;
pub use record::{JournalRecord, Method};
pub use replay::{FoldStats, NetCounts, Replay};
pub use segment::{list_segments, SegmentFile};
pub use writer::{JournalConfig, JournalTask, JournalWriter};
