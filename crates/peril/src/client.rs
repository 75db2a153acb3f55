//! `PerilClient`: one player's process.
//!
//! Joining wires three subscriptions to the player's game actor:
//!
//! ```text
//! peril_direct  pause          → pause.<user>       (transient) → handle_pause
//! peril_topic   army_moves.*   → army_moves.<user>  (transient) → handle_move
//! peril_topic   war.*          → war                (durable, shared) → handle_war
//! ```

use std::sync::Arc;

use peril_broker::Connection;
use peril_game::{DEFAULT_COMMAND_BUFFER, GameHandle, GameState, GameStatus};
use peril_protocol::routing::{
    ARMY_MOVES_PREFIX, EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_TOPIC, GAME_LOG_SLUG, PAUSE_KEY,
    WAR_RECOGNITIONS_PREFIX, all_players_key, player_key, validate_username,
};
use peril_protocol::{
    ArmyMove, BincodeCodec, GameLog, JsonCodec, Location, PlayingState, RecognitionOfWar,
};
use peril_pubsub::{QueueDurability, Subscription, declare_topology, subscribe_json};
use rand::Rng;

use crate::PerilError;
use crate::handlers::{handle_move, handle_pause, handle_war, publish_once};

/// Nonsense lines published by `spam`.
const SPAM_LINES: &[&str] = &[
    "Never interrupt your enemy when he is making a mistake.",
    "The hardest thing of all for a soldier is to retreat.",
    "A soldier will fight long and hard for a bit of colored ribbon.",
    "It is well that war is so terrible, otherwise we should grow too fond of it.",
    "The art of war is simple enough.",
    "All warfare is based on deception.",
    "My armies are not lost, they are merely elsewhere.",
    "In war there is no prize for the runner-up.",
];

/// A connected player.
pub struct PerilClient<C: Connection> {
    connection: Arc<C>,
    game: GameHandle,
    subscriptions: Vec<Subscription>,
}

impl<C: Connection> PerilClient<C> {
    /// Joins the game as `username` over `connection`.
    ///
    /// Declares the shared topology (idempotent), starts the game actor
    /// and subscribes to pause signals, moves and war declarations.
    ///
    /// # Errors
    /// An invalid username, or any binding failure. Nothing keeps running
    /// on failure.
    pub async fn join(connection: C, username: &str) -> Result<Self, PerilError> {
        validate_username(username)?;
        let connection = Arc::new(connection);
        declare_topology(connection.as_ref()).await?;

        let game = GameHandle::spawn(GameState::new(username), DEFAULT_COMMAND_BUFFER);
        let mut subscriptions = Vec::with_capacity(3);

        let g = game.clone();
        subscriptions.push(
            subscribe_json(
                connection.as_ref(),
                EXCHANGE_PERIL_DIRECT,
                &player_key(PAUSE_KEY, username),
                PAUSE_KEY,
                QueueDurability::Transient,
                move |signal: PlayingState| {
                    let g = g.clone();
                    async move { handle_pause(&g, signal).await }
                },
            )
            .await?,
        );

        let g = game.clone();
        let conn = Arc::clone(&connection);
        subscriptions.push(
            subscribe_json(
                connection.as_ref(),
                EXCHANGE_PERIL_TOPIC,
                &player_key(ARMY_MOVES_PREFIX, username),
                &all_players_key(ARMY_MOVES_PREFIX),
                QueueDurability::Transient,
                move |mv: ArmyMove| {
                    let g = g.clone();
                    let conn = Arc::clone(&conn);
                    async move { handle_move(&g, conn.as_ref(), mv).await }
                },
            )
            .await?,
        );

        let g = game.clone();
        let conn = Arc::clone(&connection);
        subscriptions.push(
            subscribe_json(
                connection.as_ref(),
                EXCHANGE_PERIL_TOPIC,
                WAR_RECOGNITIONS_PREFIX,
                &all_players_key(WAR_RECOGNITIONS_PREFIX),
                QueueDurability::Durable,
                move |rw: RecognitionOfWar| {
                    let g = g.clone();
                    let conn = Arc::clone(&conn);
                    async move { handle_war(&g, conn.as_ref(), rw).await }
                },
            )
            .await?,
        );

        tracing::info!(player = username, "joined the game");
        Ok(Self {
            connection,
            game,
            subscriptions,
        })
    }

    /// The local player.
    pub fn username(&self) -> &str {
        self.game.username()
    }

    /// The player's game actor.
    pub fn game(&self) -> &GameHandle {
        &self.game
    }

    /// Queue names of the running subscriptions.
    pub fn queues(&self) -> Vec<&str> {
        self.subscriptions.iter().map(Subscription::queue_name).collect()
    }

    /// Places units on the local board. Spawns are not broadcast.
    pub async fn spawn(&self, location: Location, units: u32) -> Result<(), PerilError> {
        self.game.spawn_units(location, units).await?;
        Ok(())
    }

    /// Moves units locally and broadcasts the move.
    ///
    /// # Errors
    /// A rejected move leaves everything untouched. A failed broadcast is
    /// returned after the local move has been applied; the game goes on.
    pub async fn move_units(
        &self,
        from: Location,
        to: Location,
        units: u32,
    ) -> Result<ArmyMove, PerilError> {
        let mv = self.game.command_move(from, to, units).await?;
        let key = player_key(ARMY_MOVES_PREFIX, self.username());
        publish_once(self.connection.as_ref(), EXCHANGE_PERIL_TOPIC, &key, &mv, &JsonCodec)
            .await?;
        tracing::info!(%from, %to, units, "army in motion");
        Ok(mv)
    }

    /// Publishes `count` random nonsense lines to the game log.
    pub async fn spam(&self, count: u32) -> Result<(), PerilError> {
        let lines: Vec<&'static str> = {
            let mut rng = rand::rng();
            (0..count)
                .map(|_| SPAM_LINES[rng.random_range(0..SPAM_LINES.len())])
                .collect()
        };
        let key = player_key(GAME_LOG_SLUG, self.username());
        for line in lines {
            let entry = GameLog::now(self.username(), line);
            publish_once(
                self.connection.as_ref(),
                EXCHANGE_PERIL_TOPIC,
                &key,
                &entry,
                &BincodeCodec,
            )
            .await?;
        }
        tracing::info!(count, "spam published");
        Ok(())
    }

    /// The local view of the board.
    pub async fn status(&self) -> Result<GameStatus, PerilError> {
        Ok(self.game.status().await?)
    }

    /// Stops every subscription and the game actor, then closes the
    /// connection.
    pub async fn shutdown(self) -> Result<(), PerilError> {
        for subscription in self.subscriptions {
            subscription.stop().await;
        }
        if let Err(e) = self.game.shutdown().await {
            tracing::debug!(error = %e, "game actor already stopped");
        }
        self.connection.close().await?;
        tracing::info!("left the game");
        Ok(())
    }
}
