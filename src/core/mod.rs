pub mod error;
pub mod message;
pub mod queue;
pub mod queue_manager;

pub use error::{QueueError, QueueResult};
pub use message::{Message, PayloadRef};
pub use queue::Queue;
pub use queue_manager::QueueManager;
