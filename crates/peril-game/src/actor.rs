//! Game actor: a Tokio task that owns the [`GameState`].
//!
//! Every subscription handler of a player touches the same state, and
//! those handlers run concurrently. Instead of a lock, the state lives in
//! one task and every read or write is a command sent through an mpsc
//! channel, so mutations are applied one at a time in arrival order.

use peril_protocol::{ArmyMove, Location, PlayerSnapshot, PlayingState, RecognitionOfWar};
use tokio::sync::{mpsc, oneshot};

use crate::{GameError, GameState, GameStatus, MoveOutcome, WarOutcome};

/// Commands sent to a game actor.
///
/// Each carries a `oneshot::Sender` the actor answers on.
enum GameCommand {
    Spawn {
        location: Location,
        units: u32,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    Move {
        from: Location,
        to: Location,
        units: u32,
        reply: oneshot::Sender<Result<ArmyMove, GameError>>,
    },
    ApplyMove {
        mv: ArmyMove,
        reply: oneshot::Sender<Result<MoveOutcome, GameError>>,
    },
    DecideWar {
        rw: RecognitionOfWar,
        reply: oneshot::Sender<Result<WarOutcome, GameError>>,
    },
    ResolveWar {
        rw: RecognitionOfWar,
        reply: oneshot::Sender<Result<WarOutcome, GameError>>,
    },
    ApplyPause {
        signal: PlayingState,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<PlayerSnapshot>,
    },
    Status {
        reply: oneshot::Sender<GameStatus>,
    },
    Shutdown,
}

/// Handle to a running game actor.
///
/// Cheap to clone. Each subscription handler holds its own clone.
#[derive(Clone)]
pub struct GameHandle {
    username: String,
    sender: mpsc::Sender<GameCommand>,
}

impl GameHandle {
    /// Starts an actor owning `state`.
    ///
    /// `channel_size` bounds the command queue; senders wait when it is
    /// full.
    pub fn spawn(state: GameState, channel_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(channel_size.max(1));
        let username = state.username().to_string();
        tokio::spawn(GameActor { state, receiver: rx }.run());
        Self {
            username,
            sender: tx,
        }
    }

    /// The local player.
    pub fn username(&self) -> &str {
        &self.username
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> GameCommand,
    ) -> Result<T, GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| GameError::Unavailable(self.username.clone()))?;
        reply_rx
            .await
            .map_err(|_| GameError::Unavailable(self.username.clone()))
    }

    /// See [`GameState::apply_spawn`].
    pub async fn spawn_units(&self, location: Location, units: u32) -> Result<(), GameError> {
        self.request(|reply| GameCommand::Spawn {
            location,
            units,
            reply,
        })
        .await?
    }

    /// See [`GameState::command_move`].
    pub async fn command_move(
        &self,
        from: Location,
        to: Location,
        units: u32,
    ) -> Result<ArmyMove, GameError> {
        self.request(|reply| GameCommand::Move {
            from,
            to,
            units,
            reply,
        })
        .await?
    }

    /// See [`GameState::apply_move`].
    pub async fn apply_move(&self, mv: ArmyMove) -> Result<MoveOutcome, GameError> {
        self.request(|reply| GameCommand::ApplyMove { mv, reply }).await?
    }

    /// See [`GameState::war_outcome`].
    pub async fn war_outcome(&self, rw: RecognitionOfWar) -> Result<WarOutcome, GameError> {
        self.request(|reply| GameCommand::DecideWar { rw, reply })
            .await?
    }

    /// See [`GameState::resolve_war`].
    pub async fn resolve_war(&self, rw: RecognitionOfWar) -> Result<WarOutcome, GameError> {
        self.request(|reply| GameCommand::ResolveWar { rw, reply })
            .await?
    }

    /// See [`GameState::apply_pause`].
    pub async fn apply_pause(&self, signal: PlayingState) -> Result<(), GameError> {
        self.request(|reply| GameCommand::ApplyPause { signal, reply })
            .await
    }

    /// See [`GameState::snapshot`].
    pub async fn snapshot(&self) -> Result<PlayerSnapshot, GameError> {
        self.request(|reply| GameCommand::Snapshot { reply }).await
    }

    /// See [`GameState::status`].
    pub async fn status(&self) -> Result<GameStatus, GameError> {
        self.request(|reply| GameCommand::Status { reply }).await
    }

    /// Whether local moves are frozen.
    pub async fn is_paused(&self) -> Result<bool, GameError> {
        Ok(self.status().await?.paused)
    }

    /// Tells the actor to stop. Later requests fail with
    /// [`GameError::Unavailable`].
    pub async fn shutdown(&self) -> Result<(), GameError> {
        self.sender
            .send(GameCommand::Shutdown)
            .await
            .map_err(|_| GameError::Unavailable(self.username.clone()))
    }
}

struct GameActor {
    state: GameState,
    receiver: mpsc::Receiver<GameCommand>,
}

impl GameActor {
    async fn run(mut self) {
        let player = self.state.username().to_string();
        tracing::info!(%player, "game actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                GameCommand::Spawn {
                    location,
                    units,
                    reply,
                } => {
                    let _ = reply.send(self.state.apply_spawn(location, units));
                }
                GameCommand::Move {
                    from,
                    to,
                    units,
                    reply,
                } => {
                    let _ = reply.send(self.state.command_move(from, to, units));
                }
                GameCommand::ApplyMove { mv, reply } => {
                    let _ = reply.send(self.state.apply_move(&mv));
                }
                GameCommand::DecideWar { rw, reply } => {
                    let _ = reply.send(self.state.war_outcome(&rw));
                }
                GameCommand::ResolveWar { rw, reply } => {
                    let _ = reply.send(self.state.resolve_war(&rw));
                }
                GameCommand::ApplyPause { signal, reply } => {
                    self.state.apply_pause(&signal);
                    let _ = reply.send(());
                }
                GameCommand::Snapshot { reply } => {
                    let _ = reply.send(self.state.snapshot());
                }
                GameCommand::Status { reply } => {
                    let _ = reply.send(self.state.status());
                }
                GameCommand::Shutdown => {
                    tracing::info!(%player, "game shutting down");
                    break;
                }
            }
        }

        tracing::info!(%player, "game actor stopped");
    }
}
