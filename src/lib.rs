//! Queue-to-storage ingestion: a single-task consumer runtime that decodes
//! each delivery, runs it through a pluggable handler, dead-letters what it
//! could not process, and optionally batches records for bulk writes.

mod buffer;
mod client;
mod config;
mod consumer;
mod decoder;
mod error;
mod gateway;
mod handlers;
mod message;
mod outcome;
mod publisher;
mod stats;
mod worker;

pub mod impls;

#[cfg(test)]
mod test_utils;

pub use buffer::{Buffer, Drained};
pub use client::{Queue, QueueTransport, Subscription};
pub use config::IngestConfig;
pub use consumer::{HandlerError, MessageHandler};
pub use decoder::decode;
pub use error::{Error, Result};
pub use gateway::{PersistenceGateway, Query, SortDirection};
pub use handlers::{BufferedPersistHandler, PersistHandler};
pub use message::{Message, Record};
pub use outcome::{decide, FailureInjector, NeverFail, Outcome, RandomFailure};
pub use publisher::{DeadLetterSink, QueueDeadLetterSink};
pub use stats::{RuntimeStats, StatsSnapshot};
pub use worker::{serve, ConsumerRuntime, RuntimeConfig, RuntimeState, StopHandle};
