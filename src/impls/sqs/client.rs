use super::CONTENT_TYPE_ATTRIBUTE;
use crate::{Error, Message, Queue, QueueTransport, Result, Subscription};
use async_trait::async_trait;
use aws_sdk_sqs::{types::MessageAttributeValue, Client};
use std::collections::VecDeque;

pub struct SqsTransport {
    sqs_client: Client,
    max_number_of_messages: i32,
    wait_time_seconds: i32,
}

impl SqsTransport {
    /// Loads AWS config from the environment, pointing at `endpoint_url` when
    /// given (e.g. a local emulator), and checks that SQS answers.
    pub async fn connect(endpoint_url: Option<&str>) -> Result<Self> {
        let mut loader = aws_config::from_env();
        if let Some(endpoint_url) = endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let config = loader.load().await;
        let transport = Self::from_client(Client::new(&config));

        transport
            .sqs_client
            .list_queues()
            .max_results(1)
            .send()
            .await
            .map_err(|e| Error::Connection(format!("SQS is unreachable: {e}")))?;
        Ok(transport)
    }

    pub fn from_client(sqs_client: Client) -> Self {
        Self {
            sqs_client,
            max_number_of_messages: 10,
            wait_time_seconds: 20,
        }
    }
}

#[async_trait]
impl QueueTransport for SqsTransport {
    type Subscription = SqsSubscription;

    async fn declare_queue(&self, name: &str, durable: bool) -> Result<Queue> {
        if !durable {
            log::warn!("SQS queues are always durable; declaring {name} as durable");
        }
        let output = self
            .sqs_client
            .create_queue()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| Error::Declaration(format!("failed to create queue {name}: {e}")))?;
        let address = output
            .queue_url
            .ok_or_else(|| Error::Declaration(format!("no url returned for queue {name}")))?;
        Ok(Queue {
            name: name.to_string(),
            address,
        })
    }

    async fn subscribe(&self, queue: &Queue) -> Result<SqsSubscription> {
        Ok(SqsSubscription {
            sqs_client: self.sqs_client.clone(),
            queue_url: queue.address.clone(),
            pending: VecDeque::new(),
            max_number_of_messages: self.max_number_of_messages,
            wait_time_seconds: self.wait_time_seconds,
            closed: false,
        })
    }

    async fn publish(
        &self,
        queue: &Queue,
        payload: &[u8],
        content_type: Option<&str>,
    ) -> Result<()> {
        let body = std::str::from_utf8(payload)
            .map_err(|e| Error::Transport(format!("SQS message bodies must be UTF-8: {e}")))?;
        let mut request = self
            .sqs_client
            .send_message()
            .queue_url(&queue.address)
            .message_body(body);
        if let Some(content_type) = content_type {
            let attribute = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(content_type)
                .build()
                .map_err(|e| Error::Transport(e.to_string()))?;
            request = request.message_attributes(CONTENT_TYPE_ATTRIBUTE, attribute);
        }
        request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("failed to publish to {}: {e}", queue.name)))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // the SDK client holds no connection that needs closing
        Ok(())
    }
}

/// Long-polls one queue. Messages received but not yet handed out stay in
/// `pending`; if the subscription is dropped first they become visible on
/// the queue again once their visibility timeout runs out.
pub struct SqsSubscription {
    sqs_client: Client,
    queue_url: String,
    pending: VecDeque<Message>,
    max_number_of_messages: i32,
    wait_time_seconds: i32,
    closed: bool,
}

impl SqsSubscription {
    async fn receive(&self) -> Result<Vec<Message>> {
        let messages = self
            .sqs_client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(self.max_number_of_messages)
            .wait_time_seconds(self.wait_time_seconds)
            .message_attribute_names(CONTENT_TYPE_ATTRIBUTE)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("failed to receive messages: {e}")))?
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(Message::from)
            .collect();
        Ok(messages)
    }
}

#[async_trait]
impl Subscription for SqsSubscription {
    async fn next_delivery(&mut self) -> Option<Result<Message>> {
        loop {
            if self.closed {
                return None;
            }
            if let Some(message) = self.pending.pop_front() {
                return Some(Ok(message));
            }
            match self.receive().await {
                Ok(messages) => self.pending.extend(messages),
                Err(e) => return Some(Err(e)),
            }
        }
    }

    async fn ack(&mut self, message: &Message) -> Result<()> {
        self.sqs_client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(message.tag())
            .send()
            .await
            .map_err(|e| Error::Transport(format!("failed to delete message: {e}")))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            log::info!(
                "Leaving {} received messages on {} for redelivery",
                self.pending.len(),
                self.queue_url
            );
        }
        self.closed = true;
        Ok(())
    }
}
