//! Participant directory
//!
//! This module tracks everyone inside a lobby: waiting players, team
//! rosters, and the optional quizmaster. There is exactly one source of
//! truth, a mapping from session ID to participant; every other view
//! (waiting list, per-team roster, quizmaster) is a derived query, so
//! roster bookkeeping cannot drift out of sync.

use std::{
    collections::HashMap,
    fmt::Display,
    str::FromStr,
};

use enum_map::Enum;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use uuid::Uuid;

/// A unique identifier for participants in a lobby
///
/// Each participant gets a unique ID that persists throughout their
/// participation in the lobby. Hosts are identified by the same ID type
/// but are not stored in the directory.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random participant ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Id {
    /// Creates a new random participant ID (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Id {
    /// Formats the ID as a UUID string
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    /// Parses an ID from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// One of the two competing teams
///
/// Scores, error counters, and rotation cursors are kept in
/// `EnumMap<TeamSide, _>` keyed by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
pub enum TeamSide {
    /// The first team; opens round one
    One,
    /// The second team
    Two,
}

impl TeamSide {
    /// Returns the opposing side
    pub fn other(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }
}

/// Where a participant currently sits within the lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    /// Joined but not yet assigned to a team
    Waiting,
    /// Playing on the given team
    Playing(TeamSide),
    /// Acting as the human quizmaster who rules on answers
    QuizMaster,
}

impl Slot {
    /// Returns the team the participant plays on, if any
    pub fn team(self) -> Option<TeamSide> {
        match self {
            Self::Playing(side) => Some(side),
            _ => None,
        }
    }
}

/// A member of a lobby
///
/// Equality is by session ID only; nickname and slot are mutable facts
/// about the same participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Stable session identifier
    pub id: Id,
    /// Display name, validated through [`crate::names::Names`]
    pub nickname: String,
    /// Current position within the lobby
    pub slot: Slot,
    /// Monotonic join sequence used to keep derived lists ordered
    seq: u64,
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Participant {}

/// Errors that can occur when admitting participants
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The lobby has reached the maximum number of participants
    #[error("maximum number of participants reached")]
    Full,
    /// The session is already present in the directory
    #[error("participant already joined")]
    AlreadyJoined,
}

/// The single directory of everyone in a lobby
///
/// All mutation goes through this struct; waiting lists and rosters are
/// computed on demand from the one mapping.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Directory {
    mapping: HashMap<Id, Participant>,
    next_seq: u64,
}

impl Directory {
    /// Admits a new participant into the waiting area
    ///
    /// # Arguments
    ///
    /// * `id` - The session ID of the joining participant
    /// * `nickname` - Their already-validated display name
    ///
    /// # Errors
    ///
    /// Returns `Error::Full` when the lobby is at capacity and
    /// `Error::AlreadyJoined` when the session is already present.
    pub fn add_waiting(&mut self, id: Id, nickname: String) -> Result<(), Error> {
        if self.mapping.len() >= crate::constants::lobby::MAX_PARTICIPANTS {
            return Err(Error::Full);
        }
        if self.mapping.contains_key(&id) {
            return Err(Error::AlreadyJoined);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.mapping.insert(
            id,
            Participant {
                id,
                nickname,
                slot: Slot::Waiting,
                seq,
            },
        );
        Ok(())
    }

    /// Looks up a participant by session ID
    pub fn get(&self, id: Id) -> Option<&Participant> {
        self.mapping.get(&id)
    }

    /// Returns the participant's current slot, if they are present
    pub fn slot(&self, id: Id) -> Option<Slot> {
        self.mapping.get(&id).map(|p| p.slot)
    }

    /// Moves a participant to a different slot
    ///
    /// Unknown IDs are ignored.
    pub fn set_slot(&mut self, id: Id, slot: Slot) {
        if let Some(participant) = self.mapping.get_mut(&id) {
            participant.slot = slot;
        }
    }

    /// Removes a participant entirely
    pub fn remove(&mut self, id: Id) -> Option<Participant> {
        self.mapping.remove(&id)
    }

    /// Removes every participant
    pub fn clear(&mut self) {
        self.mapping.clear();
    }

    /// Checks whether a session is present
    pub fn contains(&self, id: Id) -> bool {
        self.mapping.contains_key(&id)
    }

    /// Total number of participants
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Checks whether the directory is empty
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Every participant ID, in join order
    pub fn ids(&self) -> Vec<Id> {
        self.mapping
            .values()
            .sorted_by_key(|p| p.seq)
            .map(|p| p.id)
            .collect_vec()
    }

    /// Participants still waiting for a team, in join order
    pub fn waiting(&self) -> Vec<&Participant> {
        self.mapping
            .values()
            .filter(|p| p.slot == Slot::Waiting)
            .sorted_by_key(|p| p.seq)
            .collect_vec()
    }

    /// The roster of one team, in join order
    pub fn roster(&self, side: TeamSide) -> Vec<&Participant> {
        self.mapping
            .values()
            .filter(|p| p.slot == Slot::Playing(side))
            .sorted_by_key(|p| p.seq)
            .collect_vec()
    }

    /// Number of players currently on one team
    pub fn team_len(&self, side: TeamSide) -> usize {
        self.mapping
            .values()
            .filter(|p| p.slot == Slot::Playing(side))
            .count()
    }

    /// The current quizmaster, if one is assigned
    pub fn quiz_master(&self) -> Option<&Participant> {
        self.mapping.values().find(|p| p.slot == Slot::QuizMaster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(count: usize) -> Directory {
        let mut directory = Directory::default();
        for i in 0..count {
            directory
                .add_waiting(Id::new(), format!("player {i}"))
                .unwrap();
        }
        directory
    }

    #[test]
    fn test_add_waiting_and_query() {
        let mut directory = Directory::default();
        let id = Id::new();
        directory.add_waiting(id, "Anna".to_string()).unwrap();

        assert!(directory.contains(id));
        assert_eq!(directory.slot(id), Some(Slot::Waiting));
        assert_eq!(directory.waiting().len(), 1);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_add_waiting_rejects_duplicates() {
        let mut directory = Directory::default();
        let id = Id::new();
        directory.add_waiting(id, "Anna".to_string()).unwrap();

        assert_eq!(
            directory.add_waiting(id, "Anna again".to_string()),
            Err(Error::AlreadyJoined)
        );
    }

    #[test]
    fn test_capacity_limit() {
        let mut directory = filled(crate::constants::lobby::MAX_PARTICIPANTS);
        assert_eq!(
            directory.add_waiting(Id::new(), "late".to_string()),
            Err(Error::Full)
        );
    }

    #[test]
    fn test_roster_is_join_ordered() {
        let mut directory = Directory::default();
        let first = Id::new();
        let second = Id::new();
        let third = Id::new();
        for (id, name) in [(first, "a"), (second, "b"), (third, "c")] {
            directory.add_waiting(id, name.to_string()).unwrap();
        }
        directory.set_slot(second, Slot::Playing(TeamSide::One));
        directory.set_slot(first, Slot::Playing(TeamSide::One));
        directory.set_slot(third, Slot::Playing(TeamSide::Two));

        let roster: Vec<Id> = directory
            .roster(TeamSide::One)
            .into_iter()
            .map(|p| p.id)
            .collect();
        // Join order, not assignment order
        assert_eq!(roster, vec![first, second]);
        assert_eq!(directory.team_len(TeamSide::Two), 1);
        assert!(directory.waiting().is_empty());
    }

    #[test]
    fn test_quiz_master_query() {
        let mut directory = Directory::default();
        let id = Id::new();
        directory.add_waiting(id, "qm".to_string()).unwrap();
        assert!(directory.quiz_master().is_none());

        directory.set_slot(id, Slot::QuizMaster);
        assert_eq!(directory.quiz_master().map(|p| p.id), Some(id));
    }

    #[test]
    fn test_remove() {
        let mut directory = Directory::default();
        let id = Id::new();
        directory.add_waiting(id, "Anna".to_string()).unwrap();

        let removed = directory.remove(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(!directory.contains(id));
        assert!(directory.remove(id).is_none());
    }

    #[test]
    fn test_team_side_other() {
        assert_eq!(TeamSide::One.other(), TeamSide::Two);
        assert_eq!(TeamSide::Two.other(), TeamSide::One);
    }

    #[test]
    fn test_equality_is_by_id() {
        let id = Id::new();
        let a = Participant {
            id,
            nickname: "a".to_string(),
            slot: Slot::Waiting,
            seq: 0,
        };
        let b = Participant {
            id,
            nickname: "b".to_string(),
            slot: Slot::QuizMaster,
            seq: 7,
        };
        assert_eq!(a, b);
    }
}
