//! Typed publisher.

use peril_broker::{Channel, OutboundMessage};
use peril_protocol::Codec;
#[cfg(feature = "bincode")]
use peril_protocol::BincodeCodec;
#[cfg(feature = "json")]
use peril_protocol::JsonCodec;
use serde::Serialize;

use crate::PubSubError;

/// Encodes `value` with `codec` and publishes it to `exchange` under
/// `routing_key`, tagged with the codec's content type.
///
/// One broker write per call. No buffering and no retry: the caller
/// decides what a failure means.
///
/// # Errors
/// [`PubSubError::Protocol`] if encoding fails (nothing is sent),
/// [`PubSubError::Broker`] if the broker rejects the publish.
pub async fn publish<Ch, K, T>(
    channel: &Ch,
    exchange: &str,
    routing_key: &str,
    value: &T,
    codec: &K,
) -> Result<(), PubSubError>
where
    Ch: Channel,
    K: Codec,
    T: Serialize + ?Sized,
{
    let body = codec.encode(value)?;
    let len = body.len();
    channel
        .publish(
            exchange,
            routing_key,
            OutboundMessage {
                content_type: codec.content_type().to_string(),
                body,
            },
        )
        .await?;
    tracing::debug!(exchange, routing_key, bytes = len, "published");
    Ok(())
}

/// [`publish`] with [`JsonCodec`].
#[cfg(feature = "json")]
pub async fn publish_json<Ch, T>(
    channel: &Ch,
    exchange: &str,
    routing_key: &str,
    value: &T,
) -> Result<(), PubSubError>
where
    Ch: Channel,
    T: Serialize + ?Sized,
{
    publish(channel, exchange, routing_key, value, &JsonCodec).await
}

/// [`publish`] with [`BincodeCodec`].
#[cfg(feature = "bincode")]
pub async fn publish_bincode<Ch, T>(
    channel: &Ch,
    exchange: &str,
    routing_key: &str,
    value: &T,
) -> Result<(), PubSubError>
where
    Ch: Channel,
    T: Serialize + ?Sized,
{
    publish(channel, exchange, routing_key, value, &BincodeCodec).await
}
