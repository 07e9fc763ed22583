use crate::buffer::Drained;
use crate::{Buffer, HandlerError, MessageHandler, PersistenceGateway, Record};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Writes every record with its own `insert_one` call.
pub struct PersistHandler {
    gateway: Arc<dyn PersistenceGateway>,
    collection: String,
    halt_on_failure: bool,
}

impl PersistHandler {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, collection: impl Into<String>) -> Self {
        Self {
            gateway,
            collection: collection.into(),
            halt_on_failure: false,
        }
    }

    /// Treat a failed write as a poison pill instead of a per-message failure.
    pub fn halt_on_failure(mut self) -> Self {
        self.halt_on_failure = true;
        self
    }
}

#[async_trait]
impl MessageHandler for PersistHandler {
    async fn handle(&mut self, record: Record) -> Result<(), HandlerError> {
        match self.gateway.insert_one(&self.collection, &record).await {
            Ok(()) => Ok(()),
            Err(e) if self.halt_on_failure => Err(HandlerError::Halt(e.to_string())),
            Err(e) => Err(HandlerError::Failed(e.to_string())),
        }
    }
}

/// Appends records to a [`Buffer`] and lets it write them in bulk. A failed
/// bulk write is not a per-message failure: the records stay buffered and are
/// retried on the next flush.
pub struct BufferedPersistHandler {
    buffer: Buffer,
}

impl BufferedPersistHandler {
    pub fn new(buffer: Buffer) -> Self {
        Self { buffer }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[async_trait]
impl MessageHandler for BufferedPersistHandler {
    async fn handle(&mut self, record: Record) -> Result<(), HandlerError> {
        if let Err(e) = self.buffer.add(record).await {
            log::error!(
                "Bulk write failed, keeping {} records buffered for retry: {e}",
                self.buffer.len()
            );
        }
        Ok(())
    }

    async fn shutdown(&mut self, grace: Duration) -> usize {
        match self.buffer.drain(grace).await {
            Drained::Flushed(count) => {
                log::info!("Final flush wrote {count} records");
                0
            }
            Drained::Lost { count, .. } => count,
        }
    }
}
