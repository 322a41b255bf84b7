//! Background work: webhook events are queued and handled by a pool of
//! workers; periodic reports and reminders come from the scheduler.

pub mod processor;
pub mod queue;
pub mod scheduler;

pub use processor::{spawn_workers, Command, MessageProcessor, ProcessError};
pub use queue::{Job, JobQueue, QueueError};
pub use scheduler::{ScheduledTask, Scheduler};
