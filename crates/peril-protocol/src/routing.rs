//! Exchange names, routing-key prefixes and key helpers.
//!
//! Player-scoped events are published under `<prefix>.<username>`.
//! A consumer that wants every player's instance of an event binds with
//! `<prefix>.*` on the topic exchange.

use crate::ProtocolError;

/// Direct exchange for 1:1 control signals (pause/resume).
pub const EXCHANGE_PERIL_DIRECT: &str = "peril_direct";

/// Topic exchange for game events and logs.
pub const EXCHANGE_PERIL_TOPIC: &str = "peril_topic";

/// Fanout exchange receiving every message a subscriber discards.
pub const EXCHANGE_PERIL_DEAD_LETTER: &str = "peril_dlx";

/// Durable queue collecting dead-lettered messages.
pub const QUEUE_PERIL_DEAD_LETTER: &str = "peril_dlq";

/// Prefix for [`ArmyMove`](crate::ArmyMove) events.
pub const ARMY_MOVES_PREFIX: &str = "army_moves";

/// Prefix for [`RecognitionOfWar`](crate::RecognitionOfWar) events.
/// Also the name of the shared war queue.
pub const WAR_RECOGNITIONS_PREFIX: &str = "war";

/// Routing key for [`PlayingState`](crate::PlayingState) signals and the
/// prefix of each player's pause queue.
pub const PAUSE_KEY: &str = "pause";

/// Prefix for [`GameLog`](crate::GameLog) entries. Also the name of the
/// aggregator's durable queue.
pub const GAME_LOG_SLUG: &str = "game_logs";

/// `<prefix>.<username>`: the key a player publishes under, and the name
/// of that player's private queue for the event.
pub fn player_key(prefix: &str, username: &str) -> String {
    format!("{prefix}.{username}")
}

/// `<prefix>.*`: binding pattern matching every player's key.
pub fn all_players_key(prefix: &str) -> String {
    format!("{prefix}.*")
}

/// Checks that `username` can be used as one routing-key word.
///
/// # Errors
/// Returns [`ProtocolError::InvalidUsername`] if the name is empty,
/// contains whitespace, or contains `.`, `*` or `#`.
pub fn validate_username(username: &str) -> Result<(), ProtocolError> {
    if username.is_empty() {
        return Err(ProtocolError::InvalidUsername(
            username.to_string(),
            "must not be empty",
        ));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ProtocolError::InvalidUsername(
            username.to_string(),
            "must not contain whitespace",
        ));
    }
    if username.contains(['.', '*', '#']) {
        return Err(ProtocolError::InvalidUsername(
            username.to_string(),
            "must not contain '.', '*' or '#'",
        ));
    }
    Ok(())
}
