mod gateway;
mod transport;

pub use gateway::MemoryGateway;
pub use transport::{MemorySubscription, MemoryTransport};
