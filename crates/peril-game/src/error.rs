//! Error types for the game layer.

use peril_protocol::Location;

/// Errors raised by the game state machine.
///
/// A rejected local command leaves the state untouched. A rejected inbound
/// event means the event itself is malformed and can never be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// A spawn or move with zero units.
    #[error("unit count must be positive")]
    ZeroUnits,

    /// A move whose source and destination are the same.
    #[error("cannot move from {0} to itself")]
    SameLocation(Location),

    /// More units requested than the player holds at the source.
    #[error("only {available} units at {location}, cannot move {requested}")]
    InsufficientUnits {
        location: Location,
        available: u32,
        requested: u32,
    },

    /// Spawning into a location someone else controls.
    #[error("{location} is controlled by {owner}")]
    OccupiedByOther { location: Location, owner: String },

    /// Local moves are frozen while the game is paused.
    #[error("the game is paused")]
    Paused,

    /// An inbound move that contradicts itself.
    #[error("malformed move from {player}: {reason}")]
    MalformedMove { player: String, reason: String },

    /// A war recognition naming the same player on both sides.
    #[error("{0} cannot declare war on themselves")]
    SelfWar(String),

    /// The game actor has stopped.
    #[error("game {0} is unavailable")]
    Unavailable(String),
}
