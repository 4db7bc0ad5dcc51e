//! Configuration constants for the feud game system
//!
//! This module contains the limits and constraints used throughout the
//! crate to ensure data integrity and provide consistent boundaries for
//! lobby configuration and question handling.

/// Lobby-wide limits
pub mod lobby {
    /// Maximum number of participants (players, waiting, quizmaster) in one lobby
    pub const MAX_PARTICIPANTS: usize = 13;
    /// Maximum length of a lobby display name in characters
    pub const MAX_NAME_LENGTH: usize = 50;
}

/// Bounds for host-configurable game settings
pub mod settings {
    /// Minimum per-answer countdown in seconds
    pub const MIN_ANSWER_SECONDS: u32 = 5;
    /// Maximum per-answer countdown in seconds
    pub const MAX_ANSWER_SECONDS: u32 = 120;
    /// Minimum number of rounds in a game
    pub const MIN_ROUNDS: u32 = 1;
    /// Maximum number of rounds in a game
    pub const MAX_ROUNDS: u32 = 10;
    /// Minimum roster capacity per team
    pub const MIN_TEAM_CAPACITY: usize = 1;
    /// Maximum roster capacity per team
    pub const MAX_TEAM_CAPACITY: usize = 6;
    /// Maximum length of a team name in characters
    pub const MAX_TEAM_NAME_LENGTH: usize = 30;
    /// Maximum length of a question category name in characters
    pub const MAX_CATEGORY_LENGTH: usize = 60;
}

/// Round-flow rules
pub mod round {
    /// Wrong answers a team may accumulate before the opposing team
    /// gets a steal attempt
    pub const MAX_TEAM_ERRORS: u32 = 3;
}

/// Question and answer-slot limits
pub mod question {
    /// Maximum number of scored answer slots per question
    pub const MAX_ANSWER_SLOTS: usize = 6;
}

/// Nickname limits
pub mod nickname {
    /// Maximum length of a participant nickname in characters
    pub const MAX_LENGTH: usize = 30;
}
