//! Lobby ID generation and management
//!
//! This module provides functionality for generating unique lobby IDs.
//! IDs are displayed in octal format so a host can read them out loud
//! without ambiguity.

use std::{fmt::Display, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};

/// Minimum value for generated lobby IDs (in octal: 10000)
const MIN_VALUE: u16 = 0o10_000;
/// Maximum value for generated lobby IDs (in octal: 100000)
const MAX_VALUE: u16 = 0o100_000;

/// A unique identifier for a lobby
///
/// Lobby IDs are generated randomly within a fixed range and displayed
/// as five octal digits. The octal alphabet avoids easily confused
/// characters when the ID is communicated verbally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LobbyId(u16);

impl LobbyId {
    /// Creates a new random lobby ID
    ///
    /// The ID is generated within the valid range to ensure it displays
    /// as a 5-digit octal number.
    pub fn new() -> Self {
        Self(fastrand::u16(MIN_VALUE..MAX_VALUE))
    }
}

impl Default for LobbyId {
    /// Creates a new random lobby ID (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LobbyId {
    /// Formats the lobby ID as a 5-digit octal number
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:05o}", self.0)
    }
}

impl Serialize for LobbyId {
    /// Serializes the lobby ID as an octal string
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for LobbyId {
    /// Deserializes a lobby ID from an octal string
    fn deserialize<D>(deserializer: D) -> Result<LobbyId, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        LobbyId::from_str(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

impl FromStr for LobbyId {
    type Err = ParseIntError;

    /// Parses a lobby ID from an octal string representation
    ///
    /// # Errors
    ///
    /// Returns a `ParseIntError` if the string cannot be parsed as a valid
    /// octal number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(u16::from_str_radix(s, 8)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lobby_id_new_in_range() {
        for _ in 0..100 {
            let id = LobbyId::new();
            assert!(id.0 >= MIN_VALUE);
            assert!(id.0 < MAX_VALUE);
        }
    }

    #[test]
    fn test_lobby_id_display_format() {
        let id = LobbyId(MIN_VALUE);
        assert_eq!(id.to_string(), "10000");

        let id = LobbyId(MAX_VALUE - 1);
        assert_eq!(id.to_string(), "77777");
    }

    #[test]
    fn test_lobby_id_from_str() {
        let id = LobbyId::from_str("12345").unwrap();
        assert_eq!(id.0, 0o12345);
    }

    #[test]
    fn test_lobby_id_from_str_invalid() {
        assert!(LobbyId::from_str("invalid").is_err());
        assert!(LobbyId::from_str("888").is_err()); // Invalid octal digit
        assert!(LobbyId::from_str("").is_err());
    }

    #[test]
    fn test_lobby_id_serialization_round_trip() {
        let id = LobbyId(0o12345);
        let serialized = serde_json::to_string(&id).unwrap();
        assert_eq!(serialized, "\"12345\"");

        let deserialized: LobbyId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, id);
    }
}
