//! The Peril game state machine.
//!
//! A [`GameState`] is one player's view of the board. It changes only
//! through local commands ([`GameState::apply_spawn`],
//! [`GameState::command_move`]) and inbound events
//! ([`GameState::apply_move`], [`GameState::resolve_war`],
//! [`GameState::apply_pause`]). There are no timers.
//!
//! Each territory is controlled by at most one player, but several
//! players may have units standing in it: a player that moved into
//! enemy ground keeps its units there until a war settles it.

use std::collections::BTreeMap;
use std::fmt;

use peril_protocol::{ArmyMove, Location, PlayerSnapshot, PlayingState, RecognitionOfWar};
use serde::{Deserialize, Serialize};

use crate::{GameError, MoveOutcome, WarOutcome};

// ---------------------------------------------------------------------------
// Territory
// ---------------------------------------------------------------------------

/// One location on the board.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Territory {
    /// Player in control, if any.
    pub owner: Option<String>,
    /// Units per player standing here. Zero counts are never stored.
    pub forces: BTreeMap<String, u32>,
}

impl Territory {
    /// Units `player` has here.
    pub fn units_of(&self, player: &str) -> u32 {
        self.forces.get(player).copied().unwrap_or(0)
    }

    /// `true` if someone other than `player` controls this territory.
    pub fn is_held_against(&self, player: &str) -> bool {
        self.owner.as_deref().is_some_and(|owner| owner != player)
    }

    fn set_units(&mut self, player: &str, units: u32) {
        if units == 0 {
            self.forces.remove(player);
            if self.owner.as_deref() == Some(player) {
                self.owner = None;
            }
        } else {
            self.forces.insert(player.to_string(), units);
            if self.owner.is_none() {
                self.owner = Some(player.to_string());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// One player's game state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    username: String,
    board: BTreeMap<Location, Territory>,
    paused: bool,
}

impl GameState {
    /// An empty, unpaused board for `username`.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            board: Location::ALL
                .into_iter()
                .map(|loc| (loc, Territory::default()))
                .collect(),
            paused: false,
        }
    }

    /// The local player.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether local moves are currently frozen.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The territory at `location`.
    pub fn territory(&self, location: Location) -> &Territory {
        &self.board[&location]
    }

    /// Units `player` has at `location` in this view.
    pub fn units_at(&self, player: &str, location: Location) -> u32 {
        self.territory(location).units_of(player)
    }

    /// Who controls `location` in this view.
    pub fn owner_of(&self, location: Location) -> Option<&str> {
        self.territory(location).owner.as_deref()
    }

    /// The local player's forces, as carried on the wire.
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot_of(&self.username)
    }

    fn snapshot_of(&self, player: &str) -> PlayerSnapshot {
        let forces = self
            .board
            .iter()
            .filter_map(|(loc, t)| {
                let units = t.units_of(player);
                (units > 0).then_some((*loc, units))
            })
            .collect();
        PlayerSnapshot {
            username: player.to_string(),
            forces,
        }
    }

    fn territory_mut(&mut self, location: Location) -> &mut Territory {
        self.board.entry(location).or_default()
    }

    // -----------------------------------------------------------------------
    // Local commands
    // -----------------------------------------------------------------------

    /// Adds `units` of the local player's units at `location`.
    ///
    /// Claims the territory when it is free.
    ///
    /// # Errors
    /// [`GameError::ZeroUnits`], or [`GameError::OccupiedByOther`] when
    /// another player controls the territory.
    pub fn apply_spawn(&mut self, location: Location, units: u32) -> Result<(), GameError> {
        if units == 0 {
            return Err(GameError::ZeroUnits);
        }
        let me = self.username.clone();
        let territory = self.territory_mut(location);
        if let Some(owner) = territory.owner.as_ref().filter(|o| **o != me) {
            return Err(GameError::OccupiedByOther {
                location,
                owner: owner.clone(),
            });
        }
        let total = territory.units_of(&me).saturating_add(units);
        territory.set_units(&me, total);
        tracing::debug!(player = %me, %location, units, "spawned");
        Ok(())
    }

    /// Moves the local player's units and returns the event to publish.
    ///
    /// The returned move carries the snapshot taken after relocation.
    ///
    /// # Errors
    /// [`GameError::Paused`], [`GameError::SameLocation`],
    /// [`GameError::ZeroUnits`] or [`GameError::InsufficientUnits`].
    pub fn command_move(
        &mut self,
        from: Location,
        to: Location,
        units: u32,
    ) -> Result<ArmyMove, GameError> {
        if self.paused {
            return Err(GameError::Paused);
        }
        if from == to {
            return Err(GameError::SameLocation(from));
        }
        if units == 0 {
            return Err(GameError::ZeroUnits);
        }
        let me = self.username.clone();
        let available = self.units_at(&me, from);
        if units > available {
            return Err(GameError::InsufficientUnits {
                location: from,
                available,
                requested: units,
            });
        }

        self.relocate(&me, from, to, units);
        tracing::debug!(player = %me, %from, %to, units, "moved");
        Ok(ArmyMove {
            player: self.snapshot(),
            from,
            to,
            units,
        })
    }

    fn relocate(&mut self, player: &str, from: Location, to: Location, units: u32) {
        let source = self.territory_mut(from);
        let left = source.units_of(player).saturating_sub(units);
        source.set_units(player, left);

        let dest = self.territory_mut(to);
        let total = dest.units_of(player).saturating_add(units);
        dest.set_units(player, total);
    }

    // -----------------------------------------------------------------------
    // Inbound events
    // -----------------------------------------------------------------------

    /// Applies another player's move to the local view.
    ///
    /// On [`MoveOutcome::Safe`] the mover's forces are first aligned with
    /// its snapshot as it stood before the move, then the moved units are
    /// relocated. [`MoveOutcome::MakeWar`] and [`MoveOutcome::SamePlayer`]
    /// leave the state untouched.
    ///
    /// # Errors
    /// [`GameError::MalformedMove`] when the move has zero units, the same
    /// source and destination, or a snapshot without the moved units at
    /// the destination.
    pub fn apply_move(&mut self, mv: &ArmyMove) -> Result<MoveOutcome, GameError> {
        let mover = mv.player.username.as_str();
        if mover == self.username {
            return Ok(MoveOutcome::SamePlayer);
        }

        let malformed = |reason: &str| GameError::MalformedMove {
            player: mover.to_string(),
            reason: reason.to_string(),
        };
        if mv.units == 0 {
            return Err(malformed("zero units"));
        }
        if mv.from == mv.to {
            return Err(malformed("source equals destination"));
        }
        if mv.player.units_at(mv.to) < mv.units {
            return Err(malformed("snapshot lacks the moved units at the destination"));
        }

        if let Some(defender) = self
            .owner_of(mv.to)
            .filter(|owner| *owner != mover)
            .map(str::to_string)
        {
            tracing::info!(attacker = mover, %defender, location = %mv.to, "move into held territory");
            return Ok(MoveOutcome::MakeWar { defender });
        }

        let before = mv
            .player
            .clone()
            .with_units(mv.to, mv.player.units_at(mv.to) - mv.units)
            .with_units(mv.from, mv.player.units_at(mv.from).saturating_add(mv.units));
        self.adopt(&before);
        self.relocate(mover, mv.from, mv.to, mv.units);
        Ok(MoveOutcome::Safe)
    }

    /// Replaces everything this view knows about `snapshot.username` with
    /// the snapshot.
    fn adopt(&mut self, snapshot: &PlayerSnapshot) {
        for location in Location::ALL {
            let units = snapshot.units_at(location);
            self.territory_mut(location)
                .set_units(&snapshot.username, units);
        }
    }

    /// Decides a declared war from the local player's side without
    /// touching the board.
    ///
    /// The local player's strength comes from this board, the opponent's
    /// from the snapshot in the recognition. Higher strength wins. Equal
    /// strength is a draw.
    ///
    /// # Errors
    /// [`GameError::SelfWar`] when attacker and defender are the same
    /// player.
    pub fn war_outcome(&self, rw: &RecognitionOfWar) -> Result<WarOutcome, GameError> {
        let attacker = rw.attacker.username.as_str();
        let defender = rw.defender.username.as_str();
        if attacker == defender {
            return Err(GameError::SelfWar(attacker.to_string()));
        }

        let me = self.username.as_str();
        let opponent = if me == attacker {
            &rw.defender
        } else if me == defender {
            &rw.attacker
        } else {
            return Ok(WarOutcome::NotInvolved);
        };

        let mine = self.units_at(me, rw.location);
        let theirs = opponent.units_at(rw.location);
        if mine == 0 || theirs == 0 {
            return Ok(WarOutcome::NoUnits);
        }

        let (attacking, defending) = if me == attacker {
            (mine, theirs)
        } else {
            (theirs, mine)
        };
        let (winner, loser) = match attacking.cmp(&defending) {
            std::cmp::Ordering::Equal => {
                return Ok(WarOutcome::Draw {
                    attacker: attacker.to_string(),
                    defender: defender.to_string(),
                });
            }
            std::cmp::Ordering::Greater => (attacker, defender),
            std::cmp::Ordering::Less => (defender, attacker),
        };

        let (winner, loser) = (winner.to_string(), loser.to_string());
        if winner == me {
            Ok(WarOutcome::YouWon { winner, loser })
        } else {
            Ok(WarOutcome::OpponentWon { winner, loser })
        }
    }

    /// Resolves a declared war and applies it: the winner takes control
    /// and the loser's units there are wiped. A draw changes nothing.
    ///
    /// # Errors
    /// See [`GameState::war_outcome`].
    pub fn resolve_war(&mut self, rw: &RecognitionOfWar) -> Result<WarOutcome, GameError> {
        let outcome = self.war_outcome(rw)?;
        let (winner, loser) = match &outcome {
            WarOutcome::YouWon { winner, loser } | WarOutcome::OpponentWon { winner, loser } => {
                (winner.clone(), loser.clone())
            }
            _ => return Ok(outcome),
        };

        let location = rw.location;
        let winner_units = if winner == self.username {
            self.units_at(&winner, location)
        } else if winner == rw.attacker.username {
            rw.attacker.units_at(location)
        } else {
            rw.defender.units_at(location)
        };
        tracing::info!(%winner, %loser, %location, winner_units, "war decided");

        let territory = self.territory_mut(location);
        territory.set_units(&loser, 0);
        territory.set_units(&winner, winner_units);
        territory.owner = Some(winner);
        Ok(outcome)
    }

    /// Overwrites the paused flag. Last signal wins.
    pub fn apply_pause(&mut self, signal: &PlayingState) {
        if self.paused != signal.is_paused {
            tracing::info!(paused = signal.is_paused, "pause state changed");
        }
        self.paused = signal.is_paused;
    }

    /// A read-only report of the local view.
    pub fn status(&self) -> GameStatus {
        GameStatus {
            username: self.username.clone(),
            paused: self.paused,
            territories: self
                .board
                .iter()
                .filter(|(_, t)| t.owner.is_some() || !t.forces.is_empty())
                .map(|(loc, t)| (*loc, t.clone()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// GameStatus
// ---------------------------------------------------------------------------

/// What `status` prints: the local player and every non-empty territory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStatus {
    pub username: String,
    pub paused: bool,
    pub territories: Vec<(Location, Territory)>,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player {}", self.username)?;
        if self.paused {
            write!(f, " (paused)")?;
        }
        if self.territories.is_empty() {
            return write!(f, "\n  no units on the board");
        }
        for (location, territory) in &self.territories {
            write!(
                f,
                "\n  {location}: {}",
                territory.owner.as_deref().unwrap_or("unowned")
            )?;
            for (player, units) in &territory.forces {
                write!(f, " {player}={units}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_board_is_empty_and_unpaused() {
        let state = GameState::new("alice");
        assert_eq!(state.username(), "alice");
        assert!(!state.is_paused());
        for loc in Location::ALL {
            assert_eq!(state.owner_of(loc), None);
        }
        assert!(state.snapshot().forces.is_empty());
    }

    #[test]
    fn test_territory_releases_control_when_owner_empties_it() {
        let mut t = Territory::default();
        t.set_units("alice", 3);
        assert_eq!(t.owner.as_deref(), Some("alice"));
        t.set_units("alice", 0);
        assert_eq!(t.owner, None);
        assert!(t.forces.is_empty());
    }

    #[test]
    fn test_territory_keeps_owner_when_guest_units_arrive() {
        let mut t = Territory::default();
        t.set_units("bob", 3);
        t.set_units("alice", 5);
        assert_eq!(t.owner.as_deref(), Some("bob"));
        assert!(t.is_held_against("alice"));
        assert!(!t.is_held_against("bob"));
    }

    #[test]
    fn test_status_display_lists_non_empty_territories() {
        let mut state = GameState::new("alice");
        state.apply_spawn(Location::Asia, 4).unwrap();
        let text = state.status().to_string();
        assert!(text.starts_with("player alice"));
        assert!(text.contains("asia: alice alice=4"));
        assert!(!text.contains("europe"));
    }

    #[test]
    fn test_status_display_marks_paused_and_empty_board() {
        let mut state = GameState::new("bob");
        state.apply_pause(&PlayingState { is_paused: true });
        let text = state.status().to_string();
        assert!(text.contains("(paused)"));
        assert!(text.contains("no units on the board"));
    }
}
