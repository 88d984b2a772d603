//! Persistence of execution records.
//!
//! When enabled, the [`RepositoryMiddleware`] captures every message that
//! reaches it as a [`MessageRecord`] and hands it to a
//! [`MessageRepository`]. Storage is up to the implementation; this module
//! ships a no-op sink, an in-memory sink and a tracing sink.

mod filter;
mod middleware;
mod record;
mod sink;

pub use filter::{MessageRecordFilter, RecordPredicate};
pub use middleware::{RepositoryMiddleware, RepositoryOptions};
pub use record::{ErrorRecord, MessageRecord};
pub use sink::{InMemoryMessageRepository, LoggingMessageRepository, MessageRepository, NoOpMessageRepository};
