use crate::{Error, FailureInjector, NeverFail, RandomFailure, Result, RuntimeConfig};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_QUEUE: &str = "log";
const DEFAULT_COLLECTION: &str = "logs";
const DEFAULT_BUFFER_CAPACITY: usize = 100;
const MAX_BUFFER_CAPACITY: usize = 100_000;
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const DEFAULT_DRAIN_DEADLINE: Duration = Duration::from_secs(10);

/// Everything an ingestion process needs, read from `INGEST_*` environment
/// variables.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub transport_uri: Option<String>,
    pub queue: String,
    pub durable: bool,
    pub dead_letter_queue: Option<String>,
    pub buffer_capacity: usize,
    pub shutdown_grace: Duration,
    pub drain_deadline: Duration,
    pub gateway_uri: Option<String>,
    pub collection: String,
    pub failure_rate: f64,
    pub failure_seed: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            transport_uri: None,
            queue: DEFAULT_QUEUE.to_string(),
            durable: true,
            dead_letter_queue: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            drain_deadline: DEFAULT_DRAIN_DEADLINE,
            gateway_uri: None,
            collection: DEFAULT_COLLECTION.to_string(),
            failure_rate: 0.0,
            failure_seed: 0,
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            transport_uri: get("INGEST_TRANSPORT_URI"),
            queue: get("INGEST_QUEUE").unwrap_or(defaults.queue),
            durable: parse(&get, "INGEST_QUEUE_DURABLE")?.unwrap_or(defaults.durable),
            dead_letter_queue: get("INGEST_DEAD_LETTER_QUEUE"),
            buffer_capacity: parse(&get, "INGEST_BUFFER_CAPACITY")?
                .unwrap_or(defaults.buffer_capacity),
            shutdown_grace: parse(&get, "INGEST_SHUTDOWN_GRACE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_grace),
            drain_deadline: parse(&get, "INGEST_DRAIN_DEADLINE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.drain_deadline),
            gateway_uri: get("INGEST_GATEWAY_URI"),
            collection: get("INGEST_COLLECTION").unwrap_or(defaults.collection),
            failure_rate: parse(&get, "INGEST_FAILURE_RATE")?.unwrap_or(defaults.failure_rate),
            failure_seed: parse(&get, "INGEST_FAILURE_SEED")?.unwrap_or(defaults.failure_seed),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(Error::Config("INGEST_BUFFER_CAPACITY must be at least 1".into()));
        }
        if self.buffer_capacity > MAX_BUFFER_CAPACITY {
            return Err(Error::Config(format!(
                "INGEST_BUFFER_CAPACITY must be at most {MAX_BUFFER_CAPACITY}, got {}",
                self.buffer_capacity
            )));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(Error::Config(format!(
                "INGEST_FAILURE_RATE must be within [0, 1], got {}",
                self.failure_rate
            )));
        }
        if self.dead_letter_queue.as_deref() == Some(self.queue.as_str()) {
            return Err(Error::Config(
                "dead letter queue must differ from the source queue".into(),
            ));
        }
        Ok(())
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::new(&self.queue).with_shutdown_grace(self.shutdown_grace);
        config.durable = self.durable;
        if let Some(dlq) = &self.dead_letter_queue {
            config = config.with_dead_letter_queue(dlq);
        }
        config
    }

    pub fn failure_injector(&self) -> Result<Box<dyn FailureInjector>> {
        if self.failure_rate == 0.0 {
            return Ok(Box::new(NeverFail));
        }
        Ok(Box::new(RandomFailure::seeded(
            self.failure_rate,
            self.failure_seed,
        )?))
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("invalid {key}={raw}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IngestConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.queue, "log");
        assert_eq!(config.collection, "logs");
    }

    #[test]
    fn test_overrides() {
        // given
        let vars = lookup(&[
            ("INGEST_TRANSPORT_URI", "http://localhost:4566"),
            ("INGEST_QUEUE", "events"),
            ("INGEST_DEAD_LETTER_QUEUE", "events-dlq"),
            ("INGEST_QUEUE_DURABLE", "false"),
            ("INGEST_BUFFER_CAPACITY", "3"),
            ("INGEST_SHUTDOWN_GRACE_MS", "250"),
            ("INGEST_DRAIN_DEADLINE_MS", "1000"),
            ("INGEST_FAILURE_RATE", "0.25"),
            ("INGEST_FAILURE_SEED", "99"),
        ]);

        // when
        let config = IngestConfig::from_lookup(vars).unwrap();

        // then
        assert_eq!(config.transport_uri.as_deref(), Some("http://localhost:4566"));
        assert_eq!(config.buffer_capacity, 3);
        assert_eq!(config.shutdown_grace, Duration::from_millis(250));
        assert_eq!(config.drain_deadline, Duration::from_secs(1));
        let runtime = config.runtime_config();
        assert_eq!(runtime.queue, "events");
        assert!(!runtime.durable);
        assert_eq!(runtime.dead_letter_queue.as_deref(), Some("events-dlq"));
        assert_eq!(runtime.shutdown_grace, Duration::from_millis(250));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = IngestConfig::from_lookup(lookup(&[("INGEST_QUEUE", "  ")])).unwrap();
        assert_eq!(config.queue, "log");
    }

    #[test]
    fn test_invalid_values() {
        for vars in [
            [("INGEST_BUFFER_CAPACITY", "lots")],
            [("INGEST_BUFFER_CAPACITY", "0")],
            [("INGEST_BUFFER_CAPACITY", "100001")],
            [("INGEST_BUFFER_CAPACITY", "18446744073709551615")],
            [("INGEST_FAILURE_RATE", "2")],
            [("INGEST_QUEUE_DURABLE", "maybe")],
            [("INGEST_DEAD_LETTER_QUEUE", "log")],
        ] {
            let res = IngestConfig::from_lookup(lookup(&vars));
            assert!(matches!(res, Err(Error::Config(_))), "{vars:?}");
        }
    }

    #[test]
    fn test_seeded_injector_is_reproducible() {
        let vars = [("INGEST_FAILURE_RATE", "0.5"), ("INGEST_FAILURE_SEED", "3")];
        let config = IngestConfig::from_lookup(lookup(&vars)).unwrap();

        let mut a = config.failure_injector().unwrap();
        let mut b = config.failure_injector().unwrap();

        let first: Vec<bool> = (0..32).map(|_| a.should_fail()).collect();
        let second: Vec<bool> = (0..32).map(|_| b.should_fail()).collect();
        assert_eq!(first, second);
    }
}
