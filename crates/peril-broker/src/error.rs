/// Errors that can occur while talking to the message broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Establishing the broker connection failed.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// The connection or channel was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Opening a channel failed.
    #[error("channel open failed: {0}")]
    ChannelFailed(String),

    /// Declaring an exchange or queue failed.
    #[error("failed to declare {name}: {reason}")]
    DeclareFailed { name: String, reason: String },

    /// Binding a queue to an exchange failed.
    #[error("failed to bind queue {queue} to {exchange} with key {routing_key}: {reason}")]
    BindFailed {
        queue: String,
        exchange: String,
        routing_key: String,
        reason: String,
    },

    /// Publishing a message failed.
    #[error("failed to publish to {exchange} with key {routing_key}: {reason}")]
    PublishFailed {
        exchange: String,
        routing_key: String,
        reason: String,
    },

    /// Starting or reading a consumer failed.
    #[error("consume failed on {queue}: {reason}")]
    ConsumeFailed { queue: String, reason: String },

    /// Acknowledging or rejecting a delivery failed.
    #[error("settle failed: {0}")]
    SettleFailed(String),

    /// The named exchange or queue does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An exclusive queue is owned by another connection.
    #[error("resource locked: {0}")]
    ResourceLocked(String),

    /// The request conflicts with existing broker state
    /// (e.g. re-declaring a queue with different flags).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
}
