//! Lobby configuration
//!
//! This module defines the host-configurable settings for a lobby:
//! question category, the per-answer countdown, round count, roster
//! capacity, and the two team names. Settings are validated as a whole
//! when the host commits them and replace the previous configuration
//! wholesale.

use enum_map::{EnumMap, enum_map};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{constants::settings::*, participant::TeamSide};

/// Validation result type for team name validation
type ValidationResult = garde::Result;

/// Validates both team names: non-blank and within the length limit.
///
/// This is a custom validation function for use with the `garde` crate.
///
/// # Errors
///
/// Returns a `garde::Error` naming the offending side when a team name
/// is blank or too long.
fn validate_team_names(names: &EnumMap<TeamSide, String>, _ctx: &()) -> ValidationResult {
    for (side, name) in names {
        if name.trim().is_empty() {
            return Err(garde::Error::new(format!("team name for {side:?} is blank")));
        }
        if name.chars().count() > MAX_TEAM_NAME_LENGTH {
            return Err(garde::Error::new(format!(
                "team name for {side:?} exceeds {MAX_TEAM_NAME_LENGTH} characters"
            )));
        }
    }
    Ok(())
}

/// Host-configurable settings for one lobby
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Settings {
    /// Question category, `None` meaning all categories
    #[garde(inner(length(chars, min = 1, max = MAX_CATEGORY_LENGTH)))]
    pub category: Option<String>,
    /// Seconds a responder has to answer before the countdown expires
    #[garde(range(min = MIN_ANSWER_SECONDS, max = MAX_ANSWER_SECONDS))]
    pub answer_seconds: u32,
    /// Number of rounds in a full game
    #[garde(range(min = MIN_ROUNDS, max = MAX_ROUNDS))]
    pub total_rounds: u32,
    /// Maximum players allowed on each team
    #[garde(range(min = MIN_TEAM_CAPACITY, max = MAX_TEAM_CAPACITY))]
    pub team_capacity: usize,
    /// Display names for the two teams
    #[garde(custom(validate_team_names))]
    pub team_names: EnumMap<TeamSide, String>,
}

impl Default for Settings {
    /// The configuration a lobby starts with before a host commits one
    fn default() -> Self {
        Self {
            category: None,
            answer_seconds: 30,
            total_rounds: 5,
            team_capacity: 3,
            team_names: enum_map! {
                TeamSide::One => "Blues".to_string(),
                TeamSide::Two => "Reds".to_string(),
            },
        }
    }
}

impl Settings {
    /// Returns the display name of one team
    pub fn team_name(&self, side: TeamSide) -> &str {
        &self.team_names[side]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_answer_seconds_bounds() {
        let mut settings = Settings::default();
        settings.answer_seconds = MIN_ANSWER_SECONDS - 1;
        assert!(settings.validate().is_err());

        settings.answer_seconds = MAX_ANSWER_SECONDS + 1;
        assert!(settings.validate().is_err());

        settings.answer_seconds = MAX_ANSWER_SECONDS;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_round_bounds() {
        let mut settings = Settings::default();
        settings.total_rounds = 0;
        assert!(settings.validate().is_err());

        settings.total_rounds = MAX_ROUNDS + 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_team_capacity_bounds() {
        let mut settings = Settings::default();
        settings.team_capacity = 0;
        assert!(settings.validate().is_err());

        settings.team_capacity = MAX_TEAM_CAPACITY + 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_blank_team_name_rejected() {
        let mut settings = Settings::default();
        settings.team_names[TeamSide::Two] = "   ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_overlong_team_name_rejected() {
        let mut settings = Settings::default();
        settings.team_names[TeamSide::One] = "x".repeat(MAX_TEAM_NAME_LENGTH + 1);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_empty_category_rejected() {
        let mut settings = Settings::default();
        settings.category = Some(String::new());
        assert!(settings.validate().is_err());

        settings.category = Some("history".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_team_name_lookup() {
        let settings = Settings::default();
        assert_eq!(settings.team_name(TeamSide::One), "Blues");
        assert_eq!(settings.team_name(TeamSide::Two), "Reds");
    }
}
