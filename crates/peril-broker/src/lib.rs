//! Message broker abstraction layer for Peril.
//!
//! Provides the [`Connection`], [`Channel`], [`Consumer`] and [`Delivery`]
//! traits that abstract over an exchange/queue style broker (AMQP 0-9-1).
//! The pub/sub layer is written against these traits only, so the same
//! code runs over a real RabbitMQ connection or the in-process
//! [`MemoryBroker`].
//!
//! # Feature Flags
//!
//! - `amqp` (default): RabbitMQ connection via `lapin`

mod error;
mod memory;
#[cfg(feature = "amqp")]
mod amqp;

pub use error::BrokerError;
pub use memory::{MemoryBroker, MemoryChannel, MemoryConnection, MemoryConsumer, MemoryDelivery};
#[cfg(feature = "amqp")]
pub use amqp::{AmqpChannel, AmqpConnection, AmqpConsumer, AmqpDelivery};

use std::fmt;
use std::future::Future;

/// Queue argument carrying the dead-letter exchange name.
pub const DEAD_LETTER_EXCHANGE_ARG: &str = "x-dead-letter-exchange";

/// Opaque identifier for a broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Declaration types
// ---------------------------------------------------------------------------

/// How an exchange routes published messages to bound queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Exact routing key match.
    Direct,
    /// Dot-separated pattern match (`*` = one word, `#` = zero or more).
    Topic,
    /// Every bound queue, key ignored.
    Fanout,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Topic => write!(f, "topic"),
            Self::Fanout => write!(f, "fanout"),
        }
    }
}

/// Flags a queue is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueOptions {
    /// Survives a broker restart.
    pub durable: bool,
    /// Private to the declaring connection.
    pub exclusive: bool,
    /// Deleted once its last consumer goes away.
    pub auto_delete: bool,
}

/// Optional queue arguments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueArguments {
    /// Exchange that receives messages rejected without requeue.
    pub dead_letter_exchange: Option<String>,
}

impl QueueArguments {
    /// Arguments with only a dead-letter exchange set.
    pub fn with_dead_letter_exchange(exchange: impl Into<String>) -> Self {
        Self {
            dead_letter_exchange: Some(exchange.into()),
        }
    }
}

/// What the broker reports back after a queue declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    /// The queue's name.
    pub name: String,
    /// Messages ready for delivery.
    pub message_count: u32,
    /// Active consumers.
    pub consumer_count: u32,
}

/// A message about to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// MIME type describing how `body` is encoded.
    pub content_type: String,
    /// Encoded payload.
    pub body: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A connection to the broker. Cheap channels are opened from it.
pub trait Connection: Send + Sync + 'static {
    /// The channel type produced by this connection.
    type Channel: Channel;

    /// Opens a fresh channel.
    fn create_channel(
        &self,
    ) -> impl Future<Output = Result<Self::Channel, BrokerError>> + Send;

    /// Closes the connection. Every consumer opened through it ends.
    fn close(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

/// A lightweight session on a connection used to declare, publish and consume.
pub trait Channel: Send + Sync + 'static {
    /// The consumer type produced by [`Channel::consume`].
    type Consumer: Consumer;

    /// Declares an exchange (idempotent when the kind matches).
    fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Declares a queue (idempotent when the options match).
    fn declare_queue(
        &self,
        name: &str,
        options: QueueOptions,
        arguments: QueueArguments,
    ) -> impl Future<Output = Result<QueueInfo, BrokerError>> + Send;

    /// Binds `queue` to `exchange` under `routing_key`.
    fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Publishes a message (non-mandatory, non-immediate).
    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Starts a manual-acknowledgment consumer on `queue`.
    fn consume(
        &self,
        queue: &str,
    ) -> impl Future<Output = Result<Self::Consumer, BrokerError>> + Send;

    /// Closes the channel.
    fn close(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// A stream of deliveries from one queue.
pub trait Consumer: Send + 'static {
    /// The delivery type yielded by this consumer.
    type Delivery: Delivery;

    /// Waits for the next delivery.
    ///
    /// Returns `Ok(None)` once the stream is closed (connection or
    /// channel teardown, consumer cancelled).
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Self::Delivery>, BrokerError>> + Send;
}

/// One delivered message awaiting an explicit settle decision.
pub trait Delivery: Send + Sync + 'static {
    /// Encoded payload.
    fn body(&self) -> &[u8];

    /// Content type the publisher tagged the message with, if any.
    fn content_type(&self) -> Option<&str>;

    /// Routing key the message was published under.
    fn routing_key(&self) -> &str;

    /// `true` if this message was requeued at least once before.
    fn redelivered(&self) -> bool;

    /// Marks the message as consumed.
    fn ack(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Rejects the message. With `requeue` the broker redelivers it,
    /// otherwise it is dead-lettered (or dropped when no dead-letter
    /// exchange is configured).
    fn nack(
        &self,
        requeue: bool,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_exchange_kind_display() {
        assert_eq!(ExchangeKind::Direct.to_string(), "direct");
        assert_eq!(ExchangeKind::Topic.to_string(), "topic");
        assert_eq!(ExchangeKind::Fanout.to_string(), "fanout");
    }

    #[test]
    fn test_queue_arguments_with_dead_letter_exchange() {
        let args = QueueArguments::with_dead_letter_exchange("dlx");
        assert_eq!(args.dead_letter_exchange.as_deref(), Some("dlx"));
        assert_eq!(QueueArguments::default().dead_letter_exchange, None);
    }
}
