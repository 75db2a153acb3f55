//! Queue binder: one fresh channel, one declared queue, one binding.

use peril_broker::{
    BrokerError, Channel, Connection, QueueArguments, QueueInfo, QueueOptions,
};
use peril_protocol::routing::EXCHANGE_PERIL_DEAD_LETTER;

use crate::PubSubError;

/// Durability class of a subscriber queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueDurability {
    /// Survives a broker restart and may be shared by many consumers.
    Durable,
    /// Private to the declaring connection and removed with its last
    /// consumer.
    Transient,
}

impl QueueDurability {
    /// Queue flags for this class.
    pub fn options(self) -> QueueOptions {
        match self {
            Self::Durable => QueueOptions {
                durable: true,
                exclusive: false,
                auto_delete: false,
            },
            Self::Transient => QueueOptions {
                durable: false,
                exclusive: true,
                auto_delete: true,
            },
        }
    }
}

/// Opens a channel on `connection`, declares `queue` with the flags of
/// `durability` and the Peril dead-letter exchange, and binds it to
/// `exchange` under `routing_key`.
///
/// The returned channel is the one the queue was declared on; the
/// subscriber consumes from it.
///
/// # Errors
/// Any broker failure is returned as-is. Nothing is retried, and the
/// failure only affects this call.
pub async fn declare_and_bind<C: Connection>(
    connection: &C,
    exchange: &str,
    queue: &str,
    routing_key: &str,
    durability: QueueDurability,
) -> Result<(C::Channel, QueueInfo), PubSubError> {
    let channel = connection.create_channel().await?;
    let declared = async {
        let info = channel
            .declare_queue(
                queue,
                durability.options(),
                QueueArguments::with_dead_letter_exchange(EXCHANGE_PERIL_DEAD_LETTER),
            )
            .await?;
        channel.bind_queue(&info.name, exchange, routing_key).await?;
        Ok::<_, BrokerError>(info)
    }
    .await;
    let info = close_on_error(&channel, declared).await?;

    tracing::info!(
        queue = %info.name,
        exchange,
        routing_key,
        ?durability,
        "queue declared and bound"
    );
    Ok((channel, info))
}

/// Closes `channel` when `result` failed, then hands `result` back.
pub(crate) async fn close_on_error<Ch: Channel, T>(
    channel: &Ch,
    result: Result<T, BrokerError>,
) -> Result<T, PubSubError> {
    if result.is_err() {
        if let Err(e) = channel.close().await {
            tracing::debug!(error = %e, "channel close after failure failed");
        }
    }
    result.map_err(PubSubError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durable_maps_to_shared_persistent_queue() {
        let opts = QueueDurability::Durable.options();
        assert!(opts.durable);
        assert!(!opts.auto_delete);
        assert!(!opts.exclusive);
    }

    #[test]
    fn test_transient_maps_to_private_auto_deleted_queue() {
        let opts = QueueDurability::Transient.options();
        assert!(!opts.durable);
        assert!(opts.auto_delete);
        assert!(opts.exclusive);
    }

    #[test]
    fn test_mapping_is_stable_across_calls() {
        for class in [QueueDurability::Durable, QueueDurability::Transient] {
            assert_eq!(class.options(), class.options());
        }
    }
}
