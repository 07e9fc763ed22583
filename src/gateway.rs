use crate::{Record, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Durable storage for decoded records. Implementations that are safe to
/// share between several runtimes must say so; the runtime does not assume it.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn insert_one(&self, collection: &str, record: &Record) -> Result<()>;

    // default implementation in case the concrete store has no bulk write
    async fn insert_many(&self, collection: &str, records: &[Record]) -> Result<usize> {
        for record in records {
            self.insert_one(collection, record).await?;
        }
        Ok(records.len())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Record>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Equality filter, optional single-field sort, optional limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filter: Vec<(String, Value)>,
    sort: Option<(String, SortDirection)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.push((field.into(), value.into()));
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filter(&self) -> &[(String, Value)] {
        &self.filter
    }

    pub fn sort(&self) -> Option<(&str, SortDirection)> {
        self.sort.as_ref().map(|(field, dir)| (field.as_str(), *dir))
    }

    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.filter
            .iter()
            .all(|(field, value)| record.get(field) == Some(value))
    }
}
