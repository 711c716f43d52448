//! Domain model (ids, wire message, entries, delayed tasks, errors).

pub mod delayed;
pub mod entry;
pub mod errors;
pub mod ids;
pub mod task;
pub mod task_type;

pub use self::delayed::{DelayedEntry, ReadyScore};
pub use self::entry::{PendingEntry, QueueEntry, StartPosition};
pub use self::errors::{
    ConsumerError, DecodeError, HandlerError, ProduceError, SchedulerError, StoreError,
};
pub use self::ids::{EntryId, ParseEntryIdError, TaskId};
pub use self::task::Message;
pub use self::task_type::EventType;
