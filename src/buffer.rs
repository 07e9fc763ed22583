use crate::{Error, PersistenceGateway, Record, Result};
use std::sync::Arc;
use std::time::Duration;

/// Accumulates records for one bulk write. Owned by a single runtime worker,
/// so every mutation goes through `&mut self`.
///
/// A failed flush leaves the contents in place: the next `add` or `flush`
/// resubmits the same records, so the gateway may receive a batch more than
/// once (at-least-once).
pub struct Buffer {
    gateway: Arc<dyn PersistenceGateway>,
    collection: String,
    capacity: usize,
    records: Vec<Record>,
}

/// How the final flush at shutdown ended.
#[derive(Debug)]
pub enum Drained {
    Flushed(usize),
    Lost { count: usize, reason: Error },
}

impl Buffer {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        collection: impl Into<String>,
        capacity: usize,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("buffer capacity must be at least 1".into()));
        }
        Ok(Self {
            gateway,
            collection: collection.into(),
            capacity,
            records: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Appends the record and flushes when the threshold is reached. Returns
    /// the number of records written if a flush happened. On a flush error the
    /// record is still buffered.
    pub async fn add(&mut self, record: Record) -> Result<Option<usize>> {
        self.records.push(record);
        if self.records.len() >= self.capacity {
            return self.flush().await.map(Some);
        }
        Ok(None)
    }

    pub async fn flush(&mut self) -> Result<usize> {
        if self.records.is_empty() {
            return Ok(0);
        }

        let inserted = self
            .gateway
            .insert_many(&self.collection, &self.records)
            .await?;
        log::debug!(
            "Flushed {} records into {} ({inserted} inserted)",
            self.records.len(),
            self.collection
        );
        self.records.clear();
        Ok(inserted)
    }

    /// Final flush before shutdown. The grace period bounds the flush call
    /// itself; whatever is still buffered when it fails or times out is
    /// dropped and reported as lost.
    pub async fn drain(&mut self, grace: Duration) -> Drained {
        let reason = match tokio::time::timeout(grace, self.flush()).await {
            Ok(Ok(flushed)) => return Drained::Flushed(flushed),
            Ok(Err(e)) => e,
            Err(_) => Error::DrainTimeout(grace),
        };

        let count = self.records.len();
        log::error!(
            "Final flush into {} failed, losing {count} buffered records: {reason}",
            self.collection
        );
        self.records.clear();
        Drained::Lost { count, reason }
    }
}
