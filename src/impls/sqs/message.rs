use super::CONTENT_TYPE_ATTRIBUTE;
use crate::Message;
use aws_sdk_sqs::types::Message as SqsMessage;

// The receipt handle, not the message id, is what `delete_message` needs.
impl From<SqsMessage> for Message {
    fn from(value: SqsMessage) -> Self {
        let content_type = value
            .message_attributes
            .as_ref()
            .and_then(|attributes| attributes.get(CONTENT_TYPE_ATTRIBUTE))
            .and_then(|attribute| attribute.string_value.clone());
        let message = Message::new(
            value.receipt_handle.unwrap_or_default(),
            value.body.unwrap_or_default().into_bytes(),
        );
        match content_type {
            Some(content_type) => message.with_content_type(content_type),
            None => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_sqs::types::MessageAttributeValue;

    #[test]
    fn test_from_sqs_message() {
        // given
        let attribute = MessageAttributeValue::builder()
            .data_type("String")
            .string_value("application/json")
            .build()
            .unwrap();
        let sqs_message = SqsMessage::builder()
            .message_id("id-1")
            .receipt_handle("receipt-1")
            .body(r#"{"x":1}"#)
            .message_attributes(CONTENT_TYPE_ATTRIBUTE, attribute)
            .build();

        // when
        let message = Message::from(sqs_message);

        // then
        assert_eq!(message.tag(), "receipt-1");
        assert_eq!(message.payload(), br#"{"x":1}"#);
        assert_eq!(message.content_type(), Some("application/json"));
    }

    #[test]
    fn test_from_bare_sqs_message() {
        let message = Message::from(SqsMessage::builder().receipt_handle("r").build());
        assert_eq!(message.tag(), "r");
        assert!(message.payload().is_empty());
        assert_eq!(message.content_type(), None);
    }
}
