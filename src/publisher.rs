use crate::{Error, Message, Queue, QueueTransport, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Secondary durable destination for messages that could not be processed.
/// Implementations republish the raw payload unmodified, keeping its content
/// type.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn forward(&self, message: &Message) -> Result<()>;
}

/// Dead-letter sink publishing to a queue on the same transport as the source.
pub struct QueueDeadLetterSink<T: QueueTransport> {
    transport: Arc<T>,
    queue: Queue,
}

impl<T: QueueTransport> QueueDeadLetterSink<T> {
    pub fn new(transport: Arc<T>, queue: Queue) -> Self {
        Self { transport, queue }
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }
}

#[async_trait]
impl<T: QueueTransport> DeadLetterSink for QueueDeadLetterSink<T> {
    async fn forward(&self, message: &Message) -> Result<()> {
        self.transport
            .publish(&self.queue, message.payload(), message.content_type())
            .await
            .map_err(|e| {
                Error::Forward(format!(
                    "failed to publish {} to {}: {e}",
                    message.tag(),
                    self.queue.name
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::memory::MemoryTransport;

    #[tokio::test]
    async fn test_forward_preserves_payload_and_content_type() {
        // given
        let transport = Arc::new(MemoryTransport::new());
        let dlq = transport.declare_queue("log.dead", true).await.unwrap();
        let sink = QueueDeadLetterSink::new(transport.clone(), dlq);
        let msg =
            Message::new("tag-1", br#"{"x":1}"#.to_vec()).with_content_type("application/json");

        // when
        let res = sink.forward(&msg).await;

        // then
        assert!(res.is_ok());
        let published = transport.published("log.dead");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].payload(), br#"{"x":1}"#);
        assert_eq!(published[0].content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_forward_to_closed_transport_fails() {
        let transport = Arc::new(MemoryTransport::new());
        let dlq = transport.declare_queue("log.dead", true).await.unwrap();
        let sink = QueueDeadLetterSink::new(transport.clone(), dlq);
        transport.close().await.unwrap();

        let res = sink.forward(&Message::new("tag-1", b"{}".to_vec())).await;

        assert!(matches!(res, Err(Error::Forward(_))));
    }
}
