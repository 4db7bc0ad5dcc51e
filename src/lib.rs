//! # Feud Game Library
//!
//! This library provides the core logic for a real-time, team-based
//! trivia game in the "name the top answers" format. It covers answer
//! matching (deciding whether free-text input names one of a question's
//! accepted answers despite typos, word order, and paraphrase) and the
//! round/turn state machine (control phase, normal play, steal attempts,
//! the per-answer countdown, and quizmaster-validated rulings), along
//! with participant management and real-time snapshot synchronization.
//!
//! Transport, question storage, and language tooling are abstracted
//! behind the [`session::Tunnel`], [`bank::QuestionBank`],
//! [`text::Lexicon`], and [`text::SynonymSource`] traits so the same
//! core runs against whatever stack the host embeds it in.

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
use serde::{Deserialize, Serialize};

pub mod bank;
pub mod constants;
pub mod engine;
pub mod lobby;
pub mod lobby_id;
pub mod names;
pub mod participant;
pub mod session;
pub mod settings;
pub mod text;

/// Messages sent to synchronize a participant's view with lobby state
///
/// Sync messages are sent when participants connect or reconnect and
/// carry everything needed to rebuild their view from scratch.
#[derive(Debug, Serialize, Clone, derive_more::From)]
pub enum SyncMessage {
    /// Lobby synchronization messages
    Lobby(lobby::SyncMessage),
}

impl SyncMessage {
    /// Converts the sync message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// Messages sent to update participants about lobby state changes
///
/// Update messages notify connected clients about changes that affect
/// their local view, such as snapshots, countdown ticks, or the final
/// game summary.
#[derive(Debug, Serialize, Clone, derive_more::From)]
pub enum UpdateMessage {
    /// Lobby update messages
    Lobby(lobby::UpdateMessage),
}

impl UpdateMessage {
    /// Converts the update message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// Alarm messages for timed events
///
/// The embedding runtime schedules these against its worker pool and
/// delivers them back through [`lobby::Lobby::receive_alarm`] under the
/// same per-lobby exclusivity as any other action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::From, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// Lobby countdown alarms
    Lobby(lobby::AlarmMessage),
}
