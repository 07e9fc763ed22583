use crate::{Error, Message, Queue, QueueTransport, Result, Subscription};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use uuid::Uuid;

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>>;

const DEFAULT_HISTORY: usize = 1024;

/// In-process broker. Clones share the same queues, so a test (or a second
/// runtime) can publish into a queue another runtime is subscribed to.
///
/// Each queue remembers its most recent publications and acks for
/// inspection, up to a fixed history; older entries are dropped.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    broker: Arc<Mutex<Broker>>,
}

struct Broker {
    closed: bool,
    history: usize,
    queues: HashMap<String, MemoryQueue>,
}

impl Default for Broker {
    fn default() -> Self {
        Self {
            closed: false,
            history: DEFAULT_HISTORY,
            queues: HashMap::new(),
        }
    }
}

struct MemoryQueue {
    durable: bool,
    sender: Option<mpsc::UnboundedSender<Message>>,
    receiver: SharedReceiver,
    published: VecDeque<Message>,
    acked: VecDeque<String>,
}

fn remember<T>(entries: &mut VecDeque<T>, item: T, limit: usize) {
    if limit == 0 {
        return;
    }
    if entries.len() == limit {
        entries.pop_front();
    }
    entries.push_back(item);
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `history` publications and acks per queue.
    pub fn with_history(history: usize) -> Self {
        let broker = Broker {
            history,
            ..Broker::default()
        };
        Self {
            broker: Arc::new(Mutex::new(broker)),
        }
    }

    /// The most recent publications to `queue`, oldest first.
    pub fn published(&self, queue: &str) -> Vec<Message> {
        self.broker()
            .queues
            .get(queue)
            .map(|q| q.published.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The most recent tags acknowledged on `queue`, in ack order.
    pub fn acked(&self, queue: &str) -> Vec<String> {
        self.broker()
            .queues
            .get(queue)
            .map(|q| q.acked.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Stops accepting publications on `queue`. Subscribers receive what is
    /// already queued, then see the end of the subscription.
    pub fn close_queue(&self, queue: &str) {
        if let Some(q) = self.broker().queues.get_mut(queue) {
            q.sender = None;
        }
    }

    fn broker(&self) -> MutexGuard<'_, Broker> {
        self.broker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl QueueTransport for MemoryTransport {
    type Subscription = MemorySubscription;

    async fn declare_queue(&self, name: &str, durable: bool) -> Result<Queue> {
        let mut broker = self.broker();
        if broker.closed {
            return Err(Error::Connection("transport is closed".into()));
        }
        if let Some(existing) = broker.queues.get(name) {
            if existing.durable != durable {
                return Err(Error::Declaration(format!(
                    "queue {name} already declared with durable={}",
                    existing.durable
                )));
            }
        } else {
            let (sender, receiver) = mpsc::unbounded_channel();
            broker.queues.insert(
                name.to_string(),
                MemoryQueue {
                    durable,
                    sender: Some(sender),
                    receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
                    published: VecDeque::new(),
                    acked: VecDeque::new(),
                },
            );
        }
        Ok(Queue {
            name: name.to_string(),
            address: name.to_string(),
        })
    }

    async fn subscribe(&self, queue: &Queue) -> Result<MemorySubscription> {
        let broker = self.broker();
        if broker.closed {
            return Err(Error::Connection("transport is closed".into()));
        }
        let q = broker
            .queues
            .get(&queue.address)
            .ok_or_else(|| Error::Transport(format!("queue {} is not declared", queue.name)))?;
        Ok(MemorySubscription {
            queue: queue.address.clone(),
            receiver: q.receiver.clone(),
            transport: self.clone(),
            closed: false,
        })
    }

    async fn publish(
        &self,
        queue: &Queue,
        payload: &[u8],
        content_type: Option<&str>,
    ) -> Result<()> {
        let mut broker = self.broker();
        if broker.closed {
            return Err(Error::Transport("transport is closed".into()));
        }
        let history = broker.history;
        let q = broker
            .queues
            .get_mut(&queue.address)
            .ok_or_else(|| Error::Transport(format!("queue {} is not declared", queue.name)))?;
        let sender = q
            .sender
            .as_ref()
            .ok_or_else(|| Error::Transport(format!("queue {} is closed", queue.name)))?;

        let mut message = Message::new(Uuid::new_v4().to_string(), payload.to_vec());
        if let Some(content_type) = content_type {
            message = message.with_content_type(content_type);
        }
        sender
            .send(message.clone())
            .map_err(|e| Error::Transport(e.to_string()))?;
        remember(&mut q.published, message, history);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut broker = self.broker();
        broker.closed = true;
        for q in broker.queues.values_mut() {
            q.sender = None;
        }
        Ok(())
    }
}

pub struct MemorySubscription {
    queue: String,
    receiver: SharedReceiver,
    transport: MemoryTransport,
    closed: bool,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_delivery(&mut self) -> Option<Result<Message>> {
        if self.closed {
            return None;
        }
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.map(Ok)
    }

    async fn ack(&mut self, message: &Message) -> Result<()> {
        if self.closed {
            return Err(Error::Transport("subscription is closed".into()));
        }
        let mut broker = self.transport.broker();
        let history = broker.history;
        let q = broker
            .queues
            .get_mut(&self.queue)
            .ok_or_else(|| Error::Transport(format!("queue {} is gone", self.queue)))?;
        remember(&mut q.acked, message.tag().to_string(), history);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
