//! In-process broker with exchange routing, queue flags and manual acks.
//!
//! [`MemoryBroker`] plays the role of the RabbitMQ server: it owns every
//! exchange, queue and binding. Each call to [`MemoryBroker::connect`]
//! returns a [`MemoryConnection`] with its own [`ConnectionId`], which is
//! what exclusive queues are tied to.
//!
//! The broker keeps the AMQP behaviors the pub/sub layer relies on:
//!
//! - direct, topic and fanout routing, plus the default `""` exchange
//! - exclusive queues are private to their connection and removed with it
//! - auto-delete queues are removed once their last consumer goes away
//! - consumers on one queue are served round-robin
//! - `nack(requeue)` redelivers, `nack(!requeue)` dead-letters
//!
//! Everything lives behind one `std::sync::Mutex`. Every critical section
//! is short and never awaits, so a blocking lock is fine here.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::{self, Future};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;

use crate::{
    BrokerError, Channel, Connection, ConnectionId, Consumer, Delivery, ExchangeKind,
    OutboundMessage, QueueArguments, QueueInfo, QueueOptions,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Counter for generating unique channel IDs.
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Broker state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredMessage {
    routing_key: String,
    content_type: Option<String>,
    body: Vec<u8>,
    redelivered: bool,
}

struct ConsumerSlot {
    tag: u64,
    connection: ConnectionId,
    channel: u64,
    sender: mpsc::UnboundedSender<MemoryDelivery>,
}

struct MemoryQueue {
    options: QueueOptions,
    arguments: QueueArguments,
    owner: ConnectionId,
    ready: VecDeque<StoredMessage>,
    consumers: Vec<ConsumerSlot>,
    /// Round-robin position into `consumers`.
    cursor: usize,
}

impl MemoryQueue {
    fn info(&self, name: &str) -> QueueInfo {
        QueueInfo {
            name: name.to_string(),
            message_count: u32::try_from(self.ready.len()).unwrap_or(u32::MAX),
            consumer_count: u32::try_from(self.consumers.len()).unwrap_or(u32::MAX),
        }
    }

    fn locked_for(&self, connection: ConnectionId) -> bool {
        self.options.exclusive && self.owner != connection
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    queue: String,
    exchange: String,
    routing_key: String,
}

#[derive(Default)]
struct Hub {
    exchanges: HashMap<String, ExchangeKind>,
    queues: HashMap<String, MemoryQueue>,
    bindings: Vec<Binding>,
    closed_connections: HashSet<ConnectionId>,
    closed_channels: HashSet<u64>,
    open_channels: HashMap<u64, ConnectionId>,
    next_consumer_tag: u64,
    next_generated_queue: u64,
}

fn lock(hub: &Mutex<Hub>) -> MutexGuard<'_, Hub> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Hub {
    fn ensure_open(&self, connection: ConnectionId, channel: u64) -> Result<(), BrokerError> {
        if self.closed_connections.contains(&connection) {
            return Err(BrokerError::ConnectionClosed(connection.to_string()));
        }
        if self.closed_channels.contains(&channel) {
            return Err(BrokerError::ConnectionClosed(format!("channel {channel}")));
        }
        Ok(())
    }

    /// Names of the queues a message published to `exchange` with
    /// `routing_key` lands in.
    fn route(&self, exchange: &str, routing_key: &str) -> Result<Vec<String>, BrokerError> {
        if exchange.is_empty() {
            return Ok(self
                .queues
                .contains_key(routing_key)
                .then(|| routing_key.to_string())
                .into_iter()
                .collect());
        }
        let kind = self
            .exchanges
            .get(exchange)
            .copied()
            .ok_or_else(|| BrokerError::NotFound(format!("exchange {exchange}")))?;

        let mut targets: Vec<String> = Vec::new();
        for binding in self.bindings.iter().filter(|b| b.exchange == exchange) {
            let hit = match kind {
                ExchangeKind::Direct => binding.routing_key == routing_key,
                ExchangeKind::Topic => topic_matches(&binding.routing_key, routing_key),
                ExchangeKind::Fanout => true,
            };
            if hit && !targets.contains(&binding.queue) {
                targets.push(binding.queue.clone());
            }
        }
        Ok(targets)
    }

    /// Hands `message` to the next live consumer of `queue_name`, or parks
    /// it in the ready list when nobody is consuming.
    fn dispatch(
        &mut self,
        hub: &Weak<Mutex<Hub>>,
        queue_name: &str,
        mut message: StoredMessage,
        requeued: bool,
    ) {
        let Some(queue) = self.queues.get_mut(queue_name) else {
            return;
        };

        while !queue.consumers.is_empty() {
            let idx = queue.cursor % queue.consumers.len();
            let delivery = MemoryDelivery {
                hub: hub.clone(),
                queue: queue_name.to_string(),
                message,
                settled: AtomicBool::new(false),
            };
            match queue.consumers[idx].sender.send(delivery) {
                Ok(()) => {
                    queue.cursor = idx + 1;
                    return;
                }
                Err(mpsc::error::SendError(returned)) => {
                    message = returned.into_message();
                    queue.consumers.remove(idx);
                }
            }
        }

        if requeued {
            queue.ready.push_front(message);
        } else {
            queue.ready.push_back(message);
        }
    }

    fn publish(
        &mut self,
        hub: &Weak<Mutex<Hub>>,
        exchange: &str,
        message: StoredMessage,
    ) -> Result<usize, BrokerError> {
        let targets = self.route(exchange, &message.routing_key)?;
        for queue in &targets {
            self.dispatch(hub, queue, message.clone(), false);
        }
        Ok(targets.len())
    }

    fn delete_queue(&mut self, name: &str) {
        if self.queues.remove(name).is_some() {
            self.bindings.retain(|b| b.queue != name);
            tracing::debug!(queue = name, "queue deleted");
        }
    }

    /// Drops every consumer slot matching `pred` and applies auto-delete.
    fn cancel_consumers(&mut self, pred: impl Fn(&ConsumerSlot) -> bool) {
        let mut emptied = Vec::new();
        for (name, queue) in self.queues.iter_mut() {
            let before = queue.consumers.len();
            queue.consumers.retain(|slot| !pred(slot));
            if before != queue.consumers.len()
                && queue.consumers.is_empty()
                && queue.options.auto_delete
            {
                emptied.push(name.clone());
            }
        }
        for name in emptied {
            self.delete_queue(&name);
        }
    }
}

/// Matches an AMQP topic binding pattern against a routing key.
///
/// Both are split on `.`; `*` matches exactly one word and `#` matches
/// zero or more words.
fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    words_match(&pattern, &key)
}

fn words_match(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| words_match(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && words_match(rest, &key[1..]),
        Some((word, rest)) => key.first() == Some(word) && words_match(rest, &key[1..]),
    }
}

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

/// The in-process broker. Cheap to clone; clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryBroker {
    /// Creates an empty broker with no exchanges or queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new connection to this broker.
    pub fn connect(&self) -> MemoryConnection {
        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, "memory broker connection opened");
        MemoryConnection {
            id,
            hub: Arc::clone(&self.hub),
        }
    }

    /// Returns `true` if an exchange with this name exists.
    pub fn has_exchange(&self, name: &str) -> bool {
        lock(&self.hub).exchanges.contains_key(name)
    }

    /// Returns `true` if a queue with this name exists.
    pub fn has_queue(&self, name: &str) -> bool {
        lock(&self.hub).queues.contains_key(name)
    }

    /// Flags the queue was declared with.
    pub fn queue_options(&self, name: &str) -> Option<QueueOptions> {
        lock(&self.hub).queues.get(name).map(|q| q.options)
    }

    /// Arguments the queue was declared with.
    pub fn queue_arguments(&self, name: &str) -> Option<QueueArguments> {
        lock(&self.hub).queues.get(name).map(|q| q.arguments.clone())
    }

    /// Messages waiting in the queue with no consumer to take them.
    pub fn ready_count(&self, name: &str) -> Option<usize> {
        lock(&self.hub).queues.get(name).map(|q| q.ready.len())
    }

    /// Number of active consumers on the queue.
    pub fn consumer_count(&self, name: &str) -> Option<usize> {
        lock(&self.hub).queues.get(name).map(|q| q.consumers.len())
    }

    /// Channels created and not yet closed, directly or with their
    /// connection.
    pub fn open_channel_count(&self) -> usize {
        lock(&self.hub).open_channels.len()
    }

    /// `(exchange, routing_key)` pairs the queue is bound with.
    pub fn bindings(&self, queue: &str) -> Vec<(String, String)> {
        lock(&self.hub)
            .bindings
            .iter()
            .filter(|b| b.queue == queue)
            .map(|b| (b.exchange.clone(), b.routing_key.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A connection to a [`MemoryBroker`].
pub struct MemoryConnection {
    id: ConnectionId,
    hub: Arc<Mutex<Hub>>,
}

impl Connection for MemoryConnection {
    type Channel = MemoryChannel;

    async fn create_channel(&self) -> Result<Self::Channel, BrokerError> {
        let mut hub = lock(&self.hub);
        if hub.closed_connections.contains(&self.id) {
            return Err(BrokerError::ChannelFailed(format!(
                "{} is closed",
                self.id
            )));
        }
        let id = NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed);
        hub.open_channels.insert(id, self.id);
        drop(hub);
        Ok(MemoryChannel {
            id,
            connection: self.id,
            hub: Arc::clone(&self.hub),
        })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let mut hub = lock(&self.hub);
        if !hub.closed_connections.insert(self.id) {
            return Ok(());
        }
        let id = self.id;
        hub.open_channels.retain(|_, owner| *owner != id);
        hub.cancel_consumers(|slot| slot.connection == id);
        let exclusive: Vec<String> = hub
            .queues
            .iter()
            .filter(|(_, q)| q.options.exclusive && q.owner == id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in exclusive {
            hub.delete_queue(&name);
        }
        tracing::debug!(%id, "memory broker connection closed");
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A channel on a [`MemoryConnection`].
pub struct MemoryChannel {
    id: u64,
    connection: ConnectionId,
    hub: Arc<Mutex<Hub>>,
}

impl fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl Channel for MemoryChannel {
    type Consumer = MemoryConsumer;

    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        _durable: bool,
    ) -> Result<(), BrokerError> {
        let mut hub = lock(&self.hub);
        hub.ensure_open(self.connection, self.id)?;
        match hub.exchanges.get(name) {
            Some(existing) if *existing != kind => Err(BrokerError::PreconditionFailed(format!(
                "exchange {name} already declared as {existing}"
            ))),
            Some(_) => Ok(()),
            None => {
                hub.exchanges.insert(name.to_string(), kind);
                Ok(())
            }
        }
    }

    async fn declare_queue(
        &self,
        name: &str,
        options: QueueOptions,
        arguments: QueueArguments,
    ) -> Result<QueueInfo, BrokerError> {
        let mut hub = lock(&self.hub);
        hub.ensure_open(self.connection, self.id)?;

        let name = if name.is_empty() {
            hub.next_generated_queue += 1;
            format!("amq.gen-{}", hub.next_generated_queue)
        } else {
            name.to_string()
        };

        if let Some(existing) = hub.queues.get(&name) {
            if existing.locked_for(self.connection) {
                return Err(BrokerError::ResourceLocked(format!(
                    "queue {name} is exclusive to another connection"
                )));
            }
            if existing.options != options || existing.arguments != arguments {
                return Err(BrokerError::PreconditionFailed(format!(
                    "queue {name} already declared with different options"
                )));
            }
            return Ok(existing.info(&name));
        }

        let queue = MemoryQueue {
            options,
            arguments,
            owner: self.connection,
            ready: VecDeque::new(),
            consumers: Vec::new(),
            cursor: 0,
        };
        let info = queue.info(&name);
        hub.queues.insert(name, queue);
        Ok(info)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        let mut hub = lock(&self.hub);
        hub.ensure_open(self.connection, self.id)?;
        let bind_failed = |reason: String| BrokerError::BindFailed {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            reason,
        };

        match hub.queues.get(queue) {
            None => return Err(BrokerError::NotFound(format!("queue {queue}"))),
            Some(q) if q.locked_for(self.connection) => {
                return Err(BrokerError::ResourceLocked(format!(
                    "queue {queue} is exclusive to another connection"
                )));
            }
            Some(_) => {}
        }
        if exchange.is_empty() {
            return Err(bind_failed("cannot bind to the default exchange".into()));
        }
        if !hub.exchanges.contains_key(exchange) {
            return Err(BrokerError::NotFound(format!("exchange {exchange}")));
        }

        let binding = Binding {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        };
        if !hub.bindings.contains(&binding) {
            hub.bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> Result<(), BrokerError> {
        let mut hub = lock(&self.hub);
        hub.ensure_open(self.connection, self.id)?;
        let stored = StoredMessage {
            routing_key: routing_key.to_string(),
            content_type: Some(message.content_type),
            body: message.body,
            redelivered: false,
        };
        let routed = hub
            .publish(&Arc::downgrade(&self.hub), exchange, stored)
            .map_err(|e| BrokerError::PublishFailed {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                reason: e.to_string(),
            })?;
        if routed == 0 {
            tracing::trace!(exchange, routing_key, "message unroutable, dropped");
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Self::Consumer, BrokerError> {
        let mut hub = lock(&self.hub);
        hub.ensure_open(self.connection, self.id)?;
        hub.next_consumer_tag += 1;
        let tag = hub.next_consumer_tag;
        let (sender, receiver) = mpsc::unbounded_channel();

        let q = hub
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::NotFound(format!("queue {queue}")))?;
        if q.locked_for(self.connection) {
            return Err(BrokerError::ResourceLocked(format!(
                "queue {queue} is exclusive to another connection"
            )));
        }
        q.consumers.push(ConsumerSlot {
            tag,
            connection: self.connection,
            channel: self.id,
            sender,
        });

        // Flush anything that arrived before this consumer existed.
        let backlog: Vec<StoredMessage> = q.ready.drain(..).collect();
        let weak = Arc::downgrade(&self.hub);
        for message in backlog {
            hub.dispatch(&weak, queue, message, false);
        }

        Ok(MemoryConsumer {
            hub: weak,
            queue: queue.to_string(),
            tag,
            receiver,
        })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let mut hub = lock(&self.hub);
        if hub.closed_channels.insert(self.id) {
            let id = self.id;
            hub.open_channels.remove(&id);
            hub.cancel_consumers(|slot| slot.channel == id);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// A consumer on one queue of a [`MemoryBroker`].
///
/// Dropping the consumer cancels it; an auto-delete queue whose last
/// consumer is dropped is deleted.
pub struct MemoryConsumer {
    hub: Weak<Mutex<Hub>>,
    queue: String,
    tag: u64,
    receiver: mpsc::UnboundedReceiver<MemoryDelivery>,
}

impl Consumer for MemoryConsumer {
    type Delivery = MemoryDelivery;

    async fn recv(&mut self) -> Result<Option<Self::Delivery>, BrokerError> {
        Ok(self.receiver.recv().await)
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        let Some(shared) = self.hub.upgrade() else {
            return;
        };

        // Deliveries still buffered here were never seen by the caller;
        // hand them back to the queue like the broker does for unacked
        // messages on a cancelled consumer.
        self.receiver.close();
        let mut pending = Vec::new();
        while let Ok(delivery) = self.receiver.try_recv() {
            pending.push(delivery.into_message());
        }

        let weak = Arc::downgrade(&shared);
        let mut hub = lock(&shared);
        let tag = self.tag;
        hub.cancel_consumers(|slot| slot.tag == tag);
        for mut message in pending.into_iter().rev() {
            message.redelivered = true;
            hub.dispatch(&weak, &self.queue, message, true);
        }
        tracing::trace!(queue = %self.queue, tag, "memory consumer cancelled");
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// A message delivered by a [`MemoryBroker`].
pub struct MemoryDelivery {
    hub: Weak<Mutex<Hub>>,
    queue: String,
    message: StoredMessage,
    settled: AtomicBool,
}

impl MemoryDelivery {
    /// Takes the message back without settling it on the broker.
    fn into_message(self) -> StoredMessage {
        self.settled.store(true, Ordering::Release);
        self.message.clone()
    }

    fn settle(&self) -> Result<Arc<Mutex<Hub>>, BrokerError> {
        if self.settled.swap(true, Ordering::AcqRel) {
            return Err(BrokerError::PreconditionFailed(
                "delivery already settled".into(),
            ));
        }
        self.hub
            .upgrade()
            .ok_or_else(|| BrokerError::ConnectionClosed("broker dropped".into()))
    }

    fn reject(&self, requeue: bool) -> Result<(), BrokerError> {
        let shared = self.settle()?;
        let weak = Arc::downgrade(&shared);
        let mut hub = lock(&shared);

        if requeue {
            let mut message = self.message.clone();
            message.redelivered = true;
            hub.dispatch(&weak, &self.queue, message, true);
            return Ok(());
        }

        let dead_letter_exchange = hub
            .queues
            .get(&self.queue)
            .and_then(|q| q.arguments.dead_letter_exchange.clone());
        match dead_letter_exchange {
            Some(dlx) => {
                let mut message = self.message.clone();
                message.redelivered = false;
                if let Err(e) = hub.publish(&weak, &dlx, message) {
                    tracing::debug!(queue = %self.queue, error = %e, "dead-letter dropped");
                }
            }
            None => {
                tracing::trace!(queue = %self.queue, "rejected message dropped");
            }
        }
        Ok(())
    }
}

/// An unsettled delivery that goes away is requeued, as the broker does
/// for unacked messages when their channel closes.
impl Drop for MemoryDelivery {
    fn drop(&mut self) {
        if self.settled.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.reject(true) {
            tracing::trace!(queue = %self.queue, error = %e, "unsettled delivery not requeued");
            return;
        }
        tracing::debug!(queue = %self.queue, "unsettled delivery requeued");
    }
}

impl Delivery for MemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.message.body
    }

    fn content_type(&self) -> Option<&str> {
        self.message.content_type.as_deref()
    }

    fn routing_key(&self) -> &str {
        &self.message.routing_key
    }

    fn redelivered(&self) -> bool {
        self.message.redelivered
    }

    fn ack(&self) -> impl Future<Output = Result<(), BrokerError>> + Send {
        future::ready(self.settle().map(|_| ()))
    }

    fn nack(&self, requeue: bool) -> impl Future<Output = Result<(), BrokerError>> + Send {
        future::ready(self.reject(requeue))
    }
}
