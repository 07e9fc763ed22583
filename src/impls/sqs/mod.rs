mod client;
mod message;

pub use client::{SqsSubscription, SqsTransport};

// message attribute carrying the payload's content type across SQS
pub(crate) const CONTENT_TYPE_ATTRIBUTE: &str = "content-type";
