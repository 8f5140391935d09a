//! Broker module for queue declaration and consumption.
//!
//! This module provides:
//! - The `Broker` contract the dispatcher is written against
//! - `AmqpConnection`, the lapin-backed RabbitMQ implementation
//!
//! ## Lifecycle
//!
//! ```text
//! open(url) → declare_queue(name)* → subscribe(name)* → close()
//! ```
//!
//! Declaration and subscription happen during sequential startup. Once loops
//! are running each one only reads its own `DeliveryStream`.

pub mod amqp;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub use amqp::AmqpConnection;

/// A single message handed from the broker to a consumer.
///
/// Deliveries are settled on receipt, so dropping one never causes a
/// redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Queue the message was consumed from
    pub queue: String,
    /// Raw message body
    pub data: Vec<u8>,
}

/// Lazy, non-restartable sequence of deliveries for one queue.
///
/// Ends when the underlying channel or connection is closed.
pub type DeliveryStream = BoxStream<'static, Delivery>;

/// Errors raised while talking to the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to connect to broker: {0}")]
    Connect(#[source] lapin::Error),

    #[error("failed to open channel: {0}")]
    Channel(#[source] lapin::Error),

    #[error("failed to declare queue [{queue}]: {source}")]
    Declare {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    #[error("failed to start consumer for queue [{queue}]: {source}")]
    Subscribe {
        queue: String,
        #[source]
        source: lapin::Error,
    },
}

/// Connection to a message broker.
///
/// Implementations own the network link and one communication channel.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Idempotently ensure a durable queue named `queue` exists.
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Open a receipt-acknowledged subscription to `queue`.
    async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, BrokerError>;

    /// Release the channel then the link. Safe to call more than once.
    async fn close(&self);
}
