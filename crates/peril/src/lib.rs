//! # Peril
//!
//! A multiplayer war game played entirely over a message broker.
//!
//! Players publish moves, declare wars and receive pause signals; a
//! coordinator broadcasts pause/resume and collects every player's game
//! log. No process talks to another directly.
//!
//! ## Layers
//!
//! ```text
//! peril-broker → peril-protocol → peril-pubsub → peril-game → peril
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peril::prelude::*;
//!
//! # async fn run() -> Result<(), PerilError> {
//! let config = PerilConfig::from_env();
//! let broker = MemoryBroker::new();
//!
//! let server = PerilServer::start(broker.connect(), &config).await?;
//! let alice = PerilClient::join(broker.connect(), "alice").await?;
//!
//! alice.spawn(Location::Europe, 5).await?;
//! server.pause().await?;
//! # Ok(())
//! # }
//! ```

mod aggregator;
mod client;
mod command;
mod config;
mod error;
mod handlers;
mod server;

pub use aggregator::GameLogAggregator;
pub use client::PerilClient;
pub use command::{CLIENT_HELP, ClientCommand, CommandError, SERVER_HELP, ServerCommand};
pub use config::{DEFAULT_BROKER_URL, DEFAULT_GAME_LOG, PerilConfig};
pub use error::PerilError;
pub use handlers::{handle_move, handle_pause, handle_war};
pub use server::PerilServer;

/// Common imports for Peril binaries and tests.
pub mod prelude {
    pub use crate::{
        ClientCommand, GameLogAggregator, PerilClient, PerilConfig, PerilError, PerilServer,
        ServerCommand,
    };
    pub use peril_broker::{Connection, MemoryBroker};
    #[cfg(feature = "amqp")]
    pub use peril_broker::AmqpConnection;
    pub use peril_game::{GameStatus, MoveOutcome, WarOutcome};
    pub use peril_protocol::{ArmyMove, GameLog, Location, PlayingState, RecognitionOfWar};
    pub use peril_pubsub::AckType;
}
