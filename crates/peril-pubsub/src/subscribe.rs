//! Typed subscriber.
//!
//! [`subscribe`] binds a queue, starts a manual-ack consumer on it and
//! spawns one Tokio task that runs the consumption loop:
//!
//! ```text
//! recv → decode → handler(value) → AckType → ack / nack(requeue) / nack
//! ```
//!
//! Messages are handled one at a time, in delivery order. Independent
//! subscriptions run in independent tasks, so their handlers may run in
//! parallel.

use std::future::Future;

use peril_broker::{Channel, Consumer, Delivery};
use peril_protocol::Codec;
#[cfg(feature = "bincode")]
use peril_protocol::BincodeCodec;
#[cfg(feature = "json")]
use peril_protocol::JsonCodec;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::queue::close_on_error;
use crate::{PubSubError, QueueDurability, declare_and_bind};

/// What a handler wants done with the message it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckType {
    /// Consumed; the broker forgets it.
    Ack,
    /// Not handled yet; the broker redelivers it, possibly to another
    /// consumer.
    NackRequeue,
    /// Never handleable; dead-lettered.
    NackDiscard,
}

/// Handle to a running subscription loop.
///
/// Dropping the handle stops the loop as well, but without waiting for
/// it to finish.
#[derive(Debug)]
pub struct Subscription {
    queue: String,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Name of the queue being consumed.
    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    /// `true` once the loop has exited, for whatever reason.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the loop and waits for it to cancel its consumer and close
    /// its channel.
    ///
    /// A handler already running finishes and its message is settled
    /// first.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!(queue = %self.queue, error = %e, "subscription task failed");
        }
    }
}

/// Binds `queue` to `exchange`/`routing_key`, then consumes it with
/// `handler`, decoding every body with `codec`.
///
/// Returns once the queue is bound and the consumer is registered; the
/// loop itself runs in a spawned task until [`Subscription::stop`] is
/// called, the handle is dropped, or the delivery stream closes
/// (connection teardown).
///
/// A body that fails to decode is logged and rejected without requeue,
/// so it ends up in the dead-letter queue instead of blocking the queue.
///
/// # Errors
/// Binding or consumer registration failures. Nothing is spawned then.
pub async fn subscribe<C, T, F, Fut, K>(
    connection: &C,
    exchange: &str,
    queue: &str,
    routing_key: &str,
    durability: QueueDurability,
    handler: F,
    codec: K,
) -> Result<Subscription, PubSubError>
where
    C: peril_broker::Connection,
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckType> + Send + 'static,
    K: Codec,
{
    let (channel, info) =
        declare_and_bind(connection, exchange, queue, routing_key, durability).await?;
    let consumer = close_on_error(&channel, channel.consume(&info.name).await).await?;
    let (stop_tx, stop_rx) = oneshot::channel();

    tracing::info!(queue = %info.name, exchange, routing_key, "subscription started");
    let task = tokio::spawn(consume_loop(
        channel,
        consumer,
        info.name.clone(),
        codec,
        handler,
        stop_rx,
    ));

    Ok(Subscription {
        queue: info.name,
        stop: Some(stop_tx),
        task,
    })
}

/// [`subscribe`] with [`JsonCodec`].
#[cfg(feature = "json")]
pub async fn subscribe_json<C, T, F, Fut>(
    connection: &C,
    exchange: &str,
    queue: &str,
    routing_key: &str,
    durability: QueueDurability,
    handler: F,
) -> Result<Subscription, PubSubError>
where
    C: peril_broker::Connection,
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckType> + Send + 'static,
{
    subscribe(
        connection,
        exchange,
        queue,
        routing_key,
        durability,
        handler,
        JsonCodec,
    )
    .await
}

/// [`subscribe`] with [`BincodeCodec`].
#[cfg(feature = "bincode")]
pub async fn subscribe_bincode<C, T, F, Fut>(
    connection: &C,
    exchange: &str,
    queue: &str,
    routing_key: &str,
    durability: QueueDurability,
    handler: F,
) -> Result<Subscription, PubSubError>
where
    C: peril_broker::Connection,
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckType> + Send + 'static,
{
    subscribe(
        connection,
        exchange,
        queue,
        routing_key,
        durability,
        handler,
        BincodeCodec,
    )
    .await
}

async fn consume_loop<Ch, Co, K, T, F, Fut>(
    channel: Ch,
    mut consumer: Co,
    queue: String,
    codec: K,
    handler: F,
    mut stop: oneshot::Receiver<()>,
) where
    Ch: Channel,
    Co: Consumer,
    K: Codec,
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckType> + Send + 'static,
{
    loop {
        let delivery = tokio::select! {
            _ = &mut stop => {
                tracing::info!(%queue, "subscription stopped");
                break;
            }
            next = consumer.recv() => match next {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    tracing::info!(%queue, "delivery stream closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(%queue, error = %e, "consumer failed");
                    break;
                }
            },
        };

        let value: T = match codec.decode(delivery.body()) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    %queue,
                    routing_key = delivery.routing_key(),
                    content_type = delivery.content_type().unwrap_or("-"),
                    error = %e,
                    "undecodable message, discarding"
                );
                if let Err(e) = delivery.nack(false).await {
                    tracing::error!(%queue, error = %e, "failed to discard message");
                }
                continue;
            }
        };

        let ack = handler(value).await;
        settle(&delivery, ack, &queue).await;
    }

    drop(consumer);
    if let Err(e) = channel.close().await {
        tracing::debug!(%queue, error = %e, "channel close failed");
    }
}

/// Translates a handler decision into the broker action.
async fn settle<D: Delivery>(delivery: &D, ack: AckType, queue: &str) {
    let result = match ack {
        AckType::Ack => {
            tracing::debug!(queue, "ack");
            delivery.ack().await
        }
        AckType::NackRequeue => {
            tracing::debug!(queue, redelivered = delivery.redelivered(), "nack, requeue");
            delivery.nack(true).await
        }
        AckType::NackDiscard => {
            tracing::debug!(queue, "nack, discard");
            delivery.nack(false).await
        }
    };
    if let Err(e) = result {
        tracing::error!(queue, ?ack, error = %e, "failed to settle message");
    }
}
