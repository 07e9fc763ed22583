use crate::{Message, Result};
use async_trait::async_trait;

/// A queue after declaration. `address` is whatever the transport uses to
/// reach it (the queue URL on SQS, the name in memory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queue {
    pub name: String,
    pub address: String,
}

// This trait abstracts away the queue technology. Connecting is left to each
// implementation's constructor, which reports `Error::Connection`.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    type Subscription: Subscription + 'static;

    async fn declare_queue(&self, name: &str, durable: bool) -> Result<Queue>;

    async fn subscribe(&self, queue: &Queue) -> Result<Self::Subscription>;

    async fn publish(&self, queue: &Queue, payload: &[u8], content_type: Option<&str>)
        -> Result<()>;

    async fn close(&self) -> Result<()>;
}

// A single consumer's view of a queue. Deliveries come back in queue order.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next delivery. `None` once the subscription is closed.
    /// Must be safe to drop mid-wait; the runtime races it against its stop
    /// signal.
    async fn next_delivery(&mut self) -> Option<Result<Message>>;

    async fn ack(&mut self, message: &Message) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}
