//! Interactive command parsing for the client and coordinator prompts.

use std::str::FromStr;

use peril_protocol::{Location, ProtocolError};

/// Help text printed by the client's `help` command.
pub const CLIENT_HELP: &str = "\
Possible commands:
  spawn <location> <units>      place units on a free or owned location
  move <from> <to> <units>      move units between locations
  spam <n>                      publish n nonsense game log lines
  status                        show your view of the board
  help                          show this help
  quit                          leave the game
Locations: americas, europe, africa, asia, australia, antarctica";

/// Help text printed by the coordinator's `help` command.
pub const SERVER_HELP: &str = "\
Possible commands:
  pause     pause the game for every player
  resume    resume the game
  help      show this help
  quit      stop the coordinator";

/// Why a command line was rejected.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Blank input.
    #[error("no command given")]
    Empty,

    /// First word is not a command.
    #[error("unknown command: {0:?}")]
    Unknown(String),

    /// Right command, wrong arguments.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// An argument that should be a positive number.
    #[error("not a positive number: {0:?}")]
    InvalidNumber(String),

    /// An argument that should be a location.
    #[error(transparent)]
    Location(#[from] ProtocolError),
}

/// A player command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Spawn { location: Location, units: u32 },
    Move { from: Location, to: Location, units: u32 },
    Spam { count: u32 },
    Status,
    Help,
    Quit,
}

impl FromStr for ClientCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let (first, args) = words.split_first().ok_or(CommandError::Empty)?;
        match first.to_ascii_lowercase().as_str() {
            "spawn" => match args {
                [location, units] => Ok(Self::Spawn {
                    location: location.parse()?,
                    units: positive(units)?,
                }),
                _ => Err(CommandError::Usage("spawn <location> <units>")),
            },
            "move" => match args {
                [from, to, units] => Ok(Self::Move {
                    from: from.parse()?,
                    to: to.parse()?,
                    units: positive(units)?,
                }),
                _ => Err(CommandError::Usage("move <from> <to> <units>")),
            },
            "spam" => match args {
                [count] => Ok(Self::Spam {
                    count: positive(count)?,
                }),
                _ => Err(CommandError::Usage("spam <n>")),
            },
            "status" => Ok(Self::Status),
            "help" => Ok(Self::Help),
            "quit" => Ok(Self::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// A coordinator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCommand {
    Pause,
    Resume,
    Help,
    Quit,
}

impl FromStr for ServerCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let first = line.split_whitespace().next().ok_or(CommandError::Empty)?;
        match first.to_ascii_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "help" => Ok(Self::Help),
            "quit" => Ok(Self::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn positive(word: &str) -> Result<u32, CommandError> {
    word.parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| CommandError::InvalidNumber(word.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spawn_and_move() {
        assert_eq!(
            "spawn Asia 3".parse::<ClientCommand>().unwrap(),
            ClientCommand::Spawn {
                location: Location::Asia,
                units: 3
            }
        );
        assert_eq!(
            "  move europe asia 2 ".parse::<ClientCommand>().unwrap(),
            ClientCommand::Move {
                from: Location::Europe,
                to: Location::Asia,
                units: 2
            }
        );
    }

    #[test]
    fn test_parse_simple_client_commands() {
        assert_eq!("status".parse::<ClientCommand>().unwrap(), ClientCommand::Status);
        assert_eq!("HELP".parse::<ClientCommand>().unwrap(), ClientCommand::Help);
        assert_eq!("quit".parse::<ClientCommand>().unwrap(), ClientCommand::Quit);
        assert_eq!(
            "spam 10".parse::<ClientCommand>().unwrap(),
            ClientCommand::Spam { count: 10 }
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!("".parse::<ClientCommand>(), Err(CommandError::Empty)));
        assert!(matches!(
            "dance".parse::<ClientCommand>(),
            Err(CommandError::Unknown(w)) if w == "dance"
        ));
        assert!(matches!(
            "spawn asia".parse::<ClientCommand>(),
            Err(CommandError::Usage(_))
        ));
        assert!(matches!(
            "spawn asia 0".parse::<ClientCommand>(),
            Err(CommandError::InvalidNumber(_))
        ));
        assert!(matches!(
            "spawn asia -2".parse::<ClientCommand>(),
            Err(CommandError::InvalidNumber(_))
        ));
        assert!(matches!(
            "move mars asia 1".parse::<ClientCommand>(),
            Err(CommandError::Location(ProtocolError::UnknownLocation(_)))
        ));
    }

    #[test]
    fn test_parse_server_commands() {
        assert_eq!("pause".parse::<ServerCommand>().unwrap(), ServerCommand::Pause);
        assert_eq!("Resume".parse::<ServerCommand>().unwrap(), ServerCommand::Resume);
        assert!(matches!(
            "spawn asia 1".parse::<ServerCommand>(),
            Err(CommandError::Unknown(_))
        ));
        assert!(matches!("   ".parse::<ServerCommand>(), Err(CommandError::Empty)));
    }
}
