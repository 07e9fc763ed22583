use serde_json::{Map, Value};

/// A single delivery pulled from the source queue. The tag is whatever the
/// transport needs to acknowledge it (a receipt handle on SQS).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    tag: String,
    payload: Vec<u8>,
    content_type: Option<String>,
}

impl Message {
    pub fn new(tag: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tag: tag.into(),
            payload: payload.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

/// A decoded payload: field name to dynamically-typed value. There are no
/// mutable accessors, so a record stays as the decoder produced it while it
/// moves from handler to buffer to gateway.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
