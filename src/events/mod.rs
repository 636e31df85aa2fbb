//! Like-event fan-out: a broker port with memory and Redis Streams adapters,
//! the fire-and-forget publisher used by the post service, and the consumer
//! that feeds the notification service.

mod broker;
mod consumer;
mod dedup;
mod memory;
mod publisher;
mod redis_streams;

pub use broker::{Acknowledger, Broker, BrokerError, Delivery, Subscription};
pub use consumer::{ConsumerConfig, HandleOutcome, NotificationConsumer};
pub use dedup::{
    DEFAULT_DEDUP_WINDOW, DedupKey, DedupPolicy, DeliveryDeduplicator, WindowedDeduplicator,
};
pub use memory::MemoryBroker;
pub use publisher::{LikePublisher, PublishHandle, PublishOutcome};
pub use redis_streams::{RedisStreamBroker, StreamConsumerConfig};
