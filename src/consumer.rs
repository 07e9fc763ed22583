use crate::Record;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Tells the runtime what to do after a handler could not process a record.
/// Either way the message is dead-lettered and removed from the source queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    // this message failed; keep consuming
    #[error("handler failed - {0}")]
    Failed(String),

    // poison pill: stop consuming once this message is disposed of
    #[error("handler halted consumption - {0}")]
    Halt(String),
}

/// The pluggable processing step. A runtime owns its handler and calls it
/// from a single task, one record at a time, so `&mut self` is safe.
#[async_trait]
pub trait MessageHandler: Send {
    async fn handle(&mut self, record: Record) -> Result<(), HandlerError>;

    /// Called once while the runtime drains. Returns how many records the
    /// handler had to give up on.
    async fn shutdown(&mut self, _grace: Duration) -> usize {
        0
    }
}
