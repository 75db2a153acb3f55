//! Outcomes of applying inbound events.
//!
//! These are game vocabulary only. Mapping them to broker acknowledgments
//! is the subscriber side's job.

/// Result of applying another player's move to the local view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Destination was free or already the mover's; units relocated.
    Safe,
    /// Destination is held by `defender`; nothing changed, a war has to
    /// be declared.
    MakeWar { defender: String },
    /// The move is the local player's own, echoed back by the broker.
    SamePlayer,
}

/// Result of resolving a declared war from the local player's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarOutcome {
    /// The local player is neither attacker nor defender.
    NotInvolved,
    /// One side has no units at the contested location.
    NoUnits,
    /// The local player won.
    YouWon { winner: String, loser: String },
    /// The local player lost.
    OpponentWon { winner: String, loser: String },
    /// Equal strength; ownership unchanged.
    Draw { attacker: String, defender: String },
}

impl WarOutcome {
    /// The line the game log records for a decided war, if any.
    pub fn log_message(&self) -> Option<String> {
        match self {
            Self::YouWon { winner, loser } | Self::OpponentWon { winner, loser } => {
                Some(format!("{winner} won a war against {loser}"))
            }
            Self::Draw { attacker, defender } => Some(format!(
                "A war between {attacker} and {defender} resulted in a draw"
            )),
            Self::NotInvolved | Self::NoUnits => None,
        }
    }
}
