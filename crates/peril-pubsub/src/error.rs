//! Error types for the pub/sub layer.

use peril_broker::BrokerError;
use peril_protocol::ProtocolError;

/// Errors returned by binding, publishing and subscribing.
///
/// Failures inside a running subscription loop are never returned here:
/// they are settled against the broker and logged.
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    /// The broker refused a channel, declaration, binding or publish.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The value could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
