//! Wire protocol for Peril.
//!
//! This crate defines the "language" that players and the coordinator
//! speak through the broker:
//!
//! - **Types** ([`ArmyMove`], [`RecognitionOfWar`], [`PlayingState`],
//!   [`GameLog`], [`PlayerSnapshot`], [`Location`]): the events that
//!   travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`], [`BincodeCodec`]): how
//!   those events are converted to/from bytes.
//! - **Routing** ([`routing`]): exchange names and routing-key
//!   conventions.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Broker (bytes) → Protocol (typed events) → Pub/Sub → Game state
//! ```

mod codec;
mod error;
pub mod routing;
mod types;

pub use codec::Codec;
#[cfg(feature = "bincode")]
pub use codec::BincodeCodec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{ArmyMove, GameLog, Location, PlayerSnapshot, PlayingState, RecognitionOfWar};
