//! Game state machine for Peril.
//!
//! # Key types
//!
//! - [`GameState`]: one player's view of the board and its transitions
//! - [`MoveOutcome`] / [`WarOutcome`]: results of inbound events
//! - [`GameHandle`]: single-writer actor wrapping a `GameState`
//! - [`GameError`]: rejected commands and malformed events

mod actor;
mod error;
mod outcome;
mod state;

pub use actor::GameHandle;
pub use error::GameError;
pub use outcome::{MoveOutcome, WarOutcome};
pub use state::{GameState, GameStatus, Territory};

/// Default bound of a game actor's command queue.
pub const DEFAULT_COMMAND_BUFFER: usize = 64;
