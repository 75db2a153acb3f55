//! Typed publish/subscribe for Peril.
//!
//! Sits between the broker abstraction and the game:
//!
//! - [`declare_and_bind`]: the queue binder, one fresh channel per call
//! - [`publish`] / [`publish_json`] / [`publish_bincode`]: encode and send
//! - [`subscribe`] / [`subscribe_json`] / [`subscribe_bincode`]: bind,
//!   consume, decode, hand to a handler, settle by its [`AckType`]
//! - [`declare_topology`]: the exchanges and dead-letter queue every
//!   process expects
//!
//! Everything is generic over [`peril_broker::Connection`], so the same
//! code runs against RabbitMQ and the in-memory broker.

mod error;
mod publish;
mod queue;
mod subscribe;
mod topology;

pub use error::PubSubError;
pub use publish::publish;
#[cfg(feature = "bincode")]
pub use publish::publish_bincode;
#[cfg(feature = "json")]
pub use publish::publish_json;
pub use queue::{QueueDurability, declare_and_bind};
pub use subscribe::{AckType, Subscription, subscribe};
#[cfg(feature = "bincode")]
pub use subscribe::subscribe_bincode;
#[cfg(feature = "json")]
pub use subscribe::subscribe_json;
pub use topology::declare_topology;
