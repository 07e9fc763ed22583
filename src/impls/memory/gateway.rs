use crate::{PersistenceGateway, Query, Record, Result, SortDirection};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Collections kept in process memory. Safe to share between runtimes.
#[derive(Default)]
pub struct MemoryGateway {
    collections: Mutex<HashMap<String, Vec<Record>>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections().get(collection).map_or(0, Vec::len)
    }

    fn collections(&self) -> MutexGuard<'_, HashMap<String, Vec<Record>>> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn insert_one(&self, collection: &str, record: &Record) -> Result<()> {
        self.collections()
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn insert_many(&self, collection: &str, records: &[Record]) -> Result<usize> {
        self.collections()
            .entry(collection.to_string())
            .or_default()
            .extend_from_slice(records);
        log::debug!("Inserted {} records into {collection}", records.len());
        Ok(records.len())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Record>> {
        let mut found: Vec<Record> = self
            .collections()
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| query.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, direction)) = query.sort() {
            found.sort_by(|a, b| {
                let ord = compare(a.get(field), b.get(field));
                match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.max_results() {
            found.truncate(limit);
        }
        Ok(found)
    }
}

// Missing fields sort first; numbers and strings compare naturally; anything
// else compares equal so the sort stays stable.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::record;
    use serde_json::json;

    async fn seeded() -> MemoryGateway {
        let gw = MemoryGateway::new();
        gw.insert_many(
            "logs",
            &[
                record(r#"{"organization":"acme","project_id":1,"timestamp":"2024-01-02"}"#),
                record(r#"{"organization":"acme","project_id":2,"timestamp":"2024-01-03"}"#),
                record(r#"{"organization":"other","project_id":1,"timestamp":"2024-01-04"}"#),
                record(r#"{"organization":"acme","project_id":1,"timestamp":"2024-01-01"}"#),
            ],
        )
        .await
        .unwrap();
        gw
    }

    #[tokio::test]
    async fn test_query_filter_sort_limit() {
        // given
        let gw = seeded().await;
        let query = Query::new()
            .filter_eq("organization", "acme")
            .filter_eq("project_id", 1)
            .sort_by("timestamp", SortDirection::Descending)
            .limit(5);

        // when
        let found = gw.query("logs", &query).await.unwrap();

        // then
        let stamps: Vec<_> = found.iter().map(|r| r.get("timestamp").cloned()).collect();
        assert_eq!(
            stamps,
            vec![Some(json!("2024-01-02")), Some(json!("2024-01-01"))]
        );
    }

    #[tokio::test]
    async fn test_query_limit_and_ascending_numbers() {
        let gw = seeded().await;
        let query = Query::new()
            .sort_by("project_id", SortDirection::Ascending)
            .limit(3);

        let found = gw.query("logs", &query).await.unwrap();

        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|r| r.get("project_id") == Some(&json!(1))));
    }

    #[tokio::test]
    async fn test_query_unknown_collection_is_empty() {
        let gw = MemoryGateway::new();
        assert!(gw.query("nope", &Query::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_one_appends() {
        let gw = MemoryGateway::new();
        gw.insert_one("logs", &record(r#"{"x":1}"#)).await.unwrap();
        gw.insert_one("logs", &record(r#"{"x":2}"#)).await.unwrap();
        assert_eq!(gw.count("logs"), 2);
    }
}
