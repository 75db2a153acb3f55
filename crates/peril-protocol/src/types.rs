//! Wire types for Peril game events.
//!
//! Every struct in this module travels through the broker: the game
//! state machine produces them, a codec turns them into bytes, and peer
//! processes decode them back. They are plain data with no behavior
//! beyond small read-only helpers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A named territory on the board.
///
/// The board is a closed set of continents. Serialized in lowercase
/// (`"asia"`), parsed case-insensitively so `"Asia"` and `"ASIA"` work
/// from the command line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Americas,
    Europe,
    Africa,
    Asia,
    Australia,
    Antarctica,
}

impl Location {
    /// Every location, in board order.
    pub const ALL: [Location; 6] = [
        Location::Americas,
        Location::Europe,
        Location::Africa,
        Location::Asia,
        Location::Australia,
        Location::Antarctica,
    ];

    /// The lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Americas => "americas",
            Self::Europe => "europe",
            Self::Africa => "africa",
            Self::Asia => "asia",
            Self::Australia => "australia",
            Self::Antarctica => "antarctica",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::ALL
            .into_iter()
            .find(|loc| loc.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProtocolError::UnknownLocation(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// PlayerSnapshot
// ---------------------------------------------------------------------------

/// A player's identity plus their unit counts at the moment an event
/// was produced.
///
/// Locations with zero units are omitted from `forces`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Unique within a game session.
    pub username: String,
    /// Units per location.
    pub forces: BTreeMap<Location, u32>,
}

impl PlayerSnapshot {
    /// A snapshot with no units anywhere.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            forces: BTreeMap::new(),
        }
    }

    /// Builder-style helper that sets the unit count at one location.
    pub fn with_units(mut self, location: Location, units: u32) -> Self {
        if units == 0 {
            self.forces.remove(&location);
        } else {
            self.forces.insert(location, units);
        }
        self
    }

    /// Units this player holds at `location`.
    pub fn units_at(&self, location: Location) -> u32 {
        self.forces.get(&location).copied().unwrap_or(0)
    }

    /// Units this player holds across the whole board.
    pub fn total_units(&self) -> u32 {
        self.forces.values().sum()
    }
}

// ---------------------------------------------------------------------------
// Game events
// ---------------------------------------------------------------------------

/// A player moved units from one location to another.
///
/// `player` is the mover's snapshot *after* the move was applied on the
/// mover's side, so `player.units_at(to)` includes the moved units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmyMove {
    pub player: PlayerSnapshot,
    pub from: Location,
    pub to: Location,
    /// Units moved.
    pub units: u32,
}

/// A declared war between two players over one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOfWar {
    pub attacker: PlayerSnapshot,
    pub defender: PlayerSnapshot,
    /// The contested location.
    pub location: Location,
}

/// Global pause signal. Last writer wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayingState {
    pub is_paused: bool,
}

/// One line of the shared game log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLog {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub username: String,
    pub message: String,
}

impl GameLog {
    /// A log entry stamped with the current wall-clock time.
    pub fn now(username: impl Into<String>, message: impl Into<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            timestamp_ms,
            username: username.into(),
            message: message.into(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parses_case_insensitively() {
        assert_eq!("asia".parse::<Location>().unwrap(), Location::Asia);
        assert_eq!("Asia".parse::<Location>().unwrap(), Location::Asia);
        assert_eq!(" EUROPE ".parse::<Location>().unwrap(), Location::Europe);
    }

    #[test]
    fn test_location_rejects_unknown_names() {
        let err = "atlantis".parse::<Location>().unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownLocation(name) if name == "atlantis"));
    }

    #[test]
    fn test_location_display_matches_wire_name() {
        for loc in Location::ALL {
            assert_eq!(loc.to_string(), loc.as_str());
        }
    }

    #[test]
    fn test_location_serializes_lowercase() {
        let json = serde_json::to_string(&Location::Antarctica).unwrap();
        assert_eq!(json, "\"antarctica\"");
    }

    #[test]
    fn test_snapshot_with_units_and_lookup() {
        let snap = PlayerSnapshot::new("alice")
            .with_units(Location::Asia, 5)
            .with_units(Location::Europe, 2);
        assert_eq!(snap.units_at(Location::Asia), 5);
        assert_eq!(snap.units_at(Location::Africa), 0);
        assert_eq!(snap.total_units(), 7);
    }

    #[test]
    fn test_snapshot_with_zero_units_removes_entry() {
        let snap = PlayerSnapshot::new("alice")
            .with_units(Location::Asia, 5)
            .with_units(Location::Asia, 0);
        assert!(snap.forces.is_empty());
    }

    #[test]
    fn test_snapshot_forces_serialize_as_location_keyed_map() {
        let snap = PlayerSnapshot::new("bob").with_units(Location::Asia, 3);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["username"], "bob");
        assert_eq!(json["forces"]["asia"], 3);
    }

    #[test]
    fn test_playing_state_json_shape() {
        let json = serde_json::to_string(&PlayingState { is_paused: true }).unwrap();
        assert_eq!(json, r#"{"is_paused":true}"#);
    }

    #[test]
    fn test_game_log_now_stamps_current_time() {
        let log = GameLog::now("alice", "hello");
        assert!(log.timestamp_ms > 0);
        assert_eq!(log.username, "alice");
        assert_eq!(log.message, "hello");
    }
}
