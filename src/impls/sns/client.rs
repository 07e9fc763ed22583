use crate::{DeadLetterSink, Error, Message, Result};
use async_trait::async_trait;
use aws_sdk_sns::{types::MessageAttributeValue, Client};

const CONTENT_TYPE_ATTRIBUTE: &str = "content-type";

/// Dead-letter sink that fans rejected messages out through an SNS topic.
pub struct SnsDeadLetterSink {
    sns_client: Client,
    topic_arn: String,
}

impl SnsDeadLetterSink {
    pub async fn init(topic_arn: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::from_client(Client::new(&config), topic_arn)
    }

    pub fn from_client(sns_client: Client, topic_arn: impl Into<String>) -> Self {
        Self {
            sns_client,
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait]
impl DeadLetterSink for SnsDeadLetterSink {
    async fn forward(&self, message: &Message) -> Result<()> {
        let body = std::str::from_utf8(message.payload())
            .map_err(|e| Error::Forward(format!("SNS messages must be UTF-8: {e}")))?;
        let mut request = self
            .sns_client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(body);
        if let Some(content_type) = message.content_type() {
            let attribute = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(content_type)
                .build()
                .map_err(|e| Error::Forward(e.to_string()))?;
            request = request.message_attributes(CONTENT_TYPE_ATTRIBUTE, attribute);
        }
        request.send().await.map_err(|e| {
            Error::Forward(format!(
                "failed to publish {} to {}: {e}",
                message.tag(),
                self.topic_arn
            ))
        })?;
        Ok(())
    }
}
