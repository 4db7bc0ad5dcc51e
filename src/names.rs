//! Nickname management and validation
//!
//! This module handles the assignment and validation of participant
//! nicknames within a lobby. It ensures uniqueness, filters inappropriate
//! content, and maintains bidirectional mappings between participant IDs
//! and nicknames.

use std::collections::{HashMap, HashSet, hash_map::Entry};

use rustrict::CensorStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::participant::Id;

/// Serialization helper for Names struct
#[derive(Deserialize)]
struct NamesSerde {
    mapping: HashMap<Id, String>,
}

/// Manages nicknames and their associations with participant IDs
///
/// This struct maintains a bidirectional mapping between participant IDs
/// and nicknames, ensuring that nicknames are unique within a lobby and
/// meet content and length requirements.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(from = "NamesSerde")]
pub struct Names {
    /// Primary mapping from participant ID to nickname
    mapping: HashMap<Id, String>,

    /// Reverse mapping from nickname to participant ID (not serialized)
    #[serde(skip_serializing)]
    reverse_mapping: HashMap<String, Id>,
    /// Set of all taken nicknames for quick uniqueness checks (not serialized)
    #[serde(skip_serializing)]
    existing: HashSet<String>,
}

impl From<NamesSerde> for Names {
    /// Reconstructs the Names struct from serialized data
    ///
    /// This rebuilds the reverse mapping and taken-nickname set from
    /// the primary mapping, which is necessary since these fields
    /// are not serialized.
    fn from(serde: NamesSerde) -> Self {
        let NamesSerde { mapping } = serde;
        let mut reverse_mapping = HashMap::new();
        let mut existing = HashSet::new();
        for (id, name) in &mapping {
            reverse_mapping.insert(name.to_owned(), *id);
            existing.insert(name.to_owned());
        }
        Self {
            mapping,
            reverse_mapping,
            existing,
        }
    }
}

/// Errors that can occur during nickname validation and assignment
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested nickname is already in use by another participant
    #[error("name already in-use")]
    Used,
    /// The participant already has an assigned nickname
    #[error("participant has an existing name")]
    Assigned,
    /// The nickname is empty or contains only whitespace
    #[error("name cannot be empty")]
    Empty,
    /// The nickname contains inappropriate content
    #[error("name is inappropriate")]
    Sinful,
    /// The nickname exceeds the maximum allowed length
    #[error("name is too long")]
    TooLong,
}

impl Names {
    /// Retrieves the nickname associated with a participant ID
    ///
    /// # Arguments
    ///
    /// * `id` - The participant ID to look up
    ///
    /// # Returns
    ///
    /// The nickname if one is assigned, otherwise `None`
    pub fn get_name(&self, id: &Id) -> Option<String> {
        self.mapping.get(id).map(std::borrow::ToOwned::to_owned)
    }

    /// Assigns a nickname to a participant after validation
    ///
    /// # Arguments
    ///
    /// * `id` - The participant ID to assign the nickname to
    /// * `name` - The requested nickname (will be trimmed of whitespace)
    ///
    /// # Returns
    ///
    /// The cleaned and assigned nickname on success, or an error describing
    /// why it was rejected.
    ///
    /// # Errors
    ///
    /// * `Error::TooLong` - Nickname exceeds the configured length limit
    /// * `Error::Empty` - Nickname is empty after trimming whitespace
    /// * `Error::Sinful` - Nickname contains inappropriate content
    /// * `Error::Used` - Nickname is already taken by another participant
    /// * `Error::Assigned` - Participant already has a nickname assigned
    pub fn set_name(&mut self, id: Id, name: &str) -> Result<String, Error> {
        if name.len() > crate::constants::nickname::MAX_LENGTH {
            return Err(Error::TooLong);
        }
        let name = rustrict::trim_whitespace(name);
        if name.is_empty() {
            return Err(Error::Empty);
        }
        if name.is_inappropriate() {
            return Err(Error::Sinful);
        }
        if !self.existing.insert(name.to_owned()) {
            return Err(Error::Used);
        }
        match self.mapping.entry(id) {
            Entry::Occupied(_) => Err(Error::Assigned),
            Entry::Vacant(v) => {
                v.insert(name.to_owned());
                self.reverse_mapping.insert(name.to_owned(), id);
                Ok(name.to_owned())
            }
        }
    }

    /// Releases a participant's nickname so it can be reused
    ///
    /// # Arguments
    ///
    /// * `id` - The participant whose nickname should be released
    pub fn remove(&mut self, id: &Id) {
        if let Some(name) = self.mapping.remove(id) {
            self.reverse_mapping.remove(&name);
            self.existing.remove(&name);
        }
    }

    /// Releases every nickname
    pub fn clear(&mut self) {
        self.mapping.clear();
        self.reverse_mapping.clear();
        self.existing.clear();
    }

    /// Retrieves the participant ID associated with a nickname
    ///
    /// # Arguments
    ///
    /// * `name` - The nickname to look up
    ///
    /// # Returns
    ///
    /// The participant ID if the nickname is assigned, otherwise `None`
    pub fn get_id(&self, name: &str) -> Option<Id> {
        self.reverse_mapping.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_set_and_get() {
        let mut names = Names::default();
        let id = Id::new();

        let result = names.set_name(id, "TestPlayer");
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "TestPlayer");

        assert_eq!(names.get_name(&id), Some("TestPlayer".to_string()));
        assert_eq!(names.get_id("TestPlayer"), Some(id));
    }

    #[test]
    fn test_names_too_long() {
        let mut names = Names::default();
        let id = Id::new();

        let long_name = "a".repeat(crate::constants::nickname::MAX_LENGTH + 1);
        assert_eq!(names.set_name(id, &long_name), Err(Error::TooLong));
    }

    #[test]
    fn test_names_empty_name() {
        let mut names = Names::default();
        let id = Id::new();

        assert_eq!(names.set_name(id, ""), Err(Error::Empty));
        assert_eq!(names.set_name(id, "   "), Err(Error::Empty));
    }

    #[test]
    fn test_names_whitespace_trimming() {
        let mut names = Names::default();
        let id = Id::new();

        let result = names.set_name(id, "  TestPlayer  ");
        assert_eq!(result.unwrap(), "TestPlayer");
    }

    #[test]
    fn test_names_duplicate_error() {
        let mut names = Names::default();
        let id1 = Id::new();
        let id2 = Id::new();

        names.set_name(id1, "Player").unwrap();
        assert_eq!(names.set_name(id2, "Player"), Err(Error::Used));
        assert_eq!(names.set_name(id2, "  Player  "), Err(Error::Used));
    }

    #[test]
    fn test_names_already_assigned_error() {
        let mut names = Names::default();
        let id = Id::new();

        names.set_name(id, "FirstName").unwrap();
        assert_eq!(names.set_name(id, "SecondName"), Err(Error::Assigned));
        assert_eq!(names.get_name(&id), Some("FirstName".to_string()));
    }

    #[test]
    fn test_names_inappropriate_content() {
        let mut names = Names::default();
        let id = Id::new();

        assert_eq!(names.set_name(id, "fuck"), Err(Error::Sinful));
    }

    #[test]
    fn test_names_remove_frees_nickname() {
        let mut names = Names::default();
        let id1 = Id::new();
        let id2 = Id::new();

        names.set_name(id1, "Player").unwrap();
        names.remove(&id1);

        assert_eq!(names.get_name(&id1), None);
        assert!(names.set_name(id2, "Player").is_ok());
    }

    #[test]
    fn test_names_clear() {
        let mut names = Names::default();
        let id = Id::new();

        names.set_name(id, "Player").unwrap();
        names.clear();

        assert_eq!(names.get_name(&id), None);
        assert_eq!(names.get_id("Player"), None);
    }

    #[test]
    fn test_names_serialization_round_trip() {
        let mut original = Names::default();
        let id = Id::new();
        original.set_name(id, "Player1").unwrap();

        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: Names = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.get_name(&id), Some("Player1".to_string()));
        assert_eq!(deserialized.get_id("Player1"), Some(id));

        // Rebuilt uniqueness index still rejects duplicates
        let mut names = deserialized;
        assert_eq!(names.set_name(Id::new(), "Player1"), Err(Error::Used));
    }
}
