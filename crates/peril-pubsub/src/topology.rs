//! Broker topology shared by every Peril process.

use peril_broker::{Channel, Connection, ExchangeKind, QueueArguments, QueueOptions};
use peril_protocol::routing::{
    EXCHANGE_PERIL_DEAD_LETTER, EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_TOPIC,
    QUEUE_PERIL_DEAD_LETTER,
};

use crate::PubSubError;
use crate::queue::close_on_error;

/// Declares the direct, topic and dead-letter exchanges plus the durable
/// dead-letter queue. Idempotent.
///
/// # Errors
/// Any declaration or binding the broker refuses.
pub async fn declare_topology<C: Connection>(connection: &C) -> Result<(), PubSubError> {
    let channel = connection.create_channel().await?;
    let declared = async {
        channel
            .declare_exchange(EXCHANGE_PERIL_DIRECT, ExchangeKind::Direct, true)
            .await?;
        channel
            .declare_exchange(EXCHANGE_PERIL_TOPIC, ExchangeKind::Topic, true)
            .await?;
        channel
            .declare_exchange(EXCHANGE_PERIL_DEAD_LETTER, ExchangeKind::Fanout, true)
            .await?;

        let dlq = QueueOptions {
            durable: true,
            exclusive: false,
            auto_delete: false,
        };
        channel
            .declare_queue(QUEUE_PERIL_DEAD_LETTER, dlq, QueueArguments::default())
            .await?;
        channel
            .bind_queue(QUEUE_PERIL_DEAD_LETTER, EXCHANGE_PERIL_DEAD_LETTER, "")
            .await
    }
    .await;
    close_on_error(&channel, declared).await?;

    channel.close().await?;
    tracing::info!("peril topology declared");
    Ok(())
}
