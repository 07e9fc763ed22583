mod client;

pub use client::SnsDeadLetterSink;
