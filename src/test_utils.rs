use crate::{
    decode, DeadLetterSink, Error, HandlerError, Message, MessageHandler, PersistenceGateway,
    Query, Record, Result,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub(crate) fn record(json: &str) -> Record {
    decode(json.as_bytes()).unwrap()
}

pub(crate) struct MockGateway {
    singles: Mutex<Vec<Record>>,
    attempts: Mutex<Vec<Vec<Record>>>,
    batches: Mutex<Vec<Vec<Record>>>,
    failures: AtomicUsize,
    delay: Option<Duration>,
}

impl MockGateway {
    pub(crate) fn new() -> Self {
        Self {
            singles: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    // the next `count` writes fail
    pub(crate) fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn singles(&self) -> Vec<Record> {
        self.singles.lock().unwrap().clone()
    }

    // every insert_many call, including failed ones
    pub(crate) fn attempts(&self) -> Vec<Vec<Record>> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.lock().unwrap().clone()
    }

    async fn write(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Error::Write("mock write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for MockGateway {
    async fn insert_one(&self, _collection: &str, record: &Record) -> Result<()> {
        self.write().await?;
        self.singles.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn insert_many(&self, _collection: &str, records: &[Record]) -> Result<usize> {
        self.attempts.lock().unwrap().push(records.to_vec());
        self.write().await?;
        self.batches.lock().unwrap().push(records.to_vec());
        Ok(records.len())
    }

    async fn query(&self, _collection: &str, _query: &Query) -> Result<Vec<Record>> {
        Err(Error::Read("mock gateway does not answer queries".into()))
    }
}

#[derive(Clone, Default)]
pub(crate) struct Handled(Arc<Mutex<Vec<Record>>>);

impl Handled {
    pub(crate) fn get(&self) -> Vec<Record> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, record: Record) {
        self.0.lock().unwrap().push(record);
    }
}

type Script = Box<dyn Fn(&Record) -> std::result::Result<(), HandlerError> + Send>;

pub(crate) struct MockHandler {
    handled: Handled,
    script: Script,
}

impl MockHandler {
    pub(crate) fn new(
        script: impl Fn(&Record) -> std::result::Result<(), HandlerError> + Send + 'static,
    ) -> Self {
        Self {
            handled: Handled::default(),
            script: Box::new(script),
        }
    }

    pub(crate) fn succeeding() -> Self {
        Self::new(|_| Ok(()))
    }

    pub(crate) fn handled(&self) -> Handled {
        self.handled.clone()
    }
}

#[async_trait]
impl MessageHandler for MockHandler {
    async fn handle(&mut self, record: Record) -> std::result::Result<(), HandlerError> {
        let res = (self.script)(&record);
        self.handled.push(record);
        res
    }
}

/// Signals on `started` when a record arrives, then waits for `release`.
pub(crate) struct BlockingHandler {
    handled: Handled,
    started: mpsc::UnboundedSender<()>,
    release: Arc<Notify>,
}

impl BlockingHandler {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<()>, Arc<Notify>) {
        let (started, started_rx) = mpsc::unbounded_channel();
        let release = Arc::new(Notify::new());
        let handler = Self {
            handled: Handled::default(),
            started,
            release: release.clone(),
        };
        (handler, started_rx, release)
    }

    pub(crate) fn handled(&self) -> Handled {
        self.handled.clone()
    }
}

#[async_trait]
impl MessageHandler for BlockingHandler {
    async fn handle(&mut self, record: Record) -> std::result::Result<(), HandlerError> {
        let _ = self.started.send(());
        self.release.notified().await;
        self.handled.push(record);
        Ok(())
    }
}

pub(crate) struct FailingSink {
    attempts: Mutex<Vec<String>>,
}

impl FailingSink {
    pub(crate) fn new() -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterSink for FailingSink {
    async fn forward(&self, message: &Message) -> Result<()> {
        self.attempts.lock().unwrap().push(message.tag().to_string());
        Err(Error::Forward("dead letter destination unreachable".into()))
    }
}
