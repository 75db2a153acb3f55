//! Unified error type for Peril.

use peril_broker::BrokerError;
use peril_game::GameError;
use peril_protocol::ProtocolError;
use peril_pubsub::PubSubError;

use crate::CommandError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` attribute on each variant generates a `From` impl, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PerilError {
    /// Connection, channel or declaration failure.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Encoding failure or invalid wire value.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Binding, publishing or subscribing failed.
    #[error(transparent)]
    PubSub(#[from] PubSubError),

    /// A rejected game command.
    #[error(transparent)]
    Game(#[from] GameError),

    /// A command line that could not be parsed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The game log file could not be written.
    #[error("game log i/o: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_broker_error() {
        let err: PerilError = BrokerError::ConnectFailed("refused".into()).into();
        assert!(matches!(err, PerilError::Broker(_)));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_from_game_error() {
        let err: PerilError = GameError::Paused.into();
        assert!(matches!(err, PerilError::Game(GameError::Paused)));
    }

    #[test]
    fn test_from_pubsub_error() {
        let inner = PubSubError::Broker(BrokerError::NotFound("queue x".into()));
        let err: PerilError = inner.into();
        assert!(matches!(err, PerilError::PubSub(_)));
    }

    #[test]
    fn test_from_command_error() {
        let err: PerilError = CommandError::Unknown("dance".into()).into();
        assert!(matches!(err, PerilError::Command(_)));
        assert!(err.to_string().contains("dance"));
    }
}
