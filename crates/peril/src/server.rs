//! `PerilServer`: the coordinator process.
//!
//! The coordinator declares the shared topology, runs the game log
//! aggregator and broadcasts pause/resume signals.

use peril_broker::Connection;
use peril_protocol::routing::{EXCHANGE_PERIL_DIRECT, PAUSE_KEY};
use peril_protocol::{JsonCodec, PlayingState};
use peril_pubsub::{Subscription, declare_topology};

use crate::handlers::publish_once;
use crate::{GameLogAggregator, PerilConfig, PerilError};

/// A running coordinator.
pub struct PerilServer<C: Connection> {
    connection: C,
    aggregator: Subscription,
}

impl<C: Connection> PerilServer<C> {
    /// Declares the topology and starts aggregating game logs into
    /// `config.game_log`.
    ///
    /// # Errors
    /// Any declaration or binding failure.
    pub async fn start(connection: C, config: &PerilConfig) -> Result<Self, PerilError> {
        declare_topology(&connection).await?;
        let aggregator = GameLogAggregator::new(config.game_log.clone())
            .start(&connection)
            .await?;
        tracing::info!(game_log = %config.game_log.display(), "coordinator started");
        Ok(Self {
            connection,
            aggregator,
        })
    }

    /// The broker connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Pauses the game for every player.
    ///
    /// # Errors
    /// The signal could not be published.
    pub async fn pause(&self) -> Result<(), PerilError> {
        self.broadcast(true).await
    }

    /// Resumes the game for every player.
    ///
    /// # Errors
    /// The signal could not be published.
    pub async fn resume(&self) -> Result<(), PerilError> {
        self.broadcast(false).await
    }

    async fn broadcast(&self, is_paused: bool) -> Result<(), PerilError> {
        let signal = PlayingState { is_paused };
        publish_once(
            &self.connection,
            EXCHANGE_PERIL_DIRECT,
            PAUSE_KEY,
            &signal,
            &JsonCodec,
        )
        .await?;
        tracing::info!(is_paused, "playing state published");
        Ok(())
    }

    /// Stops the aggregator and closes the connection.
    pub async fn shutdown(self) -> Result<(), PerilError> {
        self.aggregator.stop().await;
        self.connection.close().await?;
        tracing::info!("coordinator stopped");
        Ok(())
    }
}
