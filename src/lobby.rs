//! Round and turn state machine
//!
//! This module contains the main lobby struct and logic for running a
//! team feud session: host acquisition, participant and role management,
//! round flow with its control phase, normal play and steal attempts,
//! the per-answer countdown, quizmaster-validated rulings, and real-time
//! snapshot broadcasting to all connected participants.
//!
//! A lobby is one independent unit of mutable state. The embedding
//! runtime must serialize calls into it (one lock or actor per lobby);
//! given that, the generation-stamped countdown guarantees that a timer
//! tick and a real submission never both finalize the same attempt.

use std::{cmp::Ordering, collections::HashSet, fmt::Debug};

use enum_map::{EnumMap, enum_map};
use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use tracing::{debug, info};
use web_time::Duration;

use crate::{
    bank::QuestionBank,
    constants::{lobby::MAX_NAME_LENGTH, round::MAX_TEAM_ERRORS},
    engine::{LoadError, MatchEngine, MatchOutcome},
    lobby_id::LobbyId,
    names::{self, Names},
    participant::{self, Directory, Id, Participant, Slot, TeamSide},
    session::Tunnel,
    settings::Settings,
    text::{Lexicon, SynonymSource},
};

/// Lifecycle status of a lobby
///
/// `Validating` is entered when a submission awaits a human quizmaster's
/// ruling instead of the automatic matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyStatus {
    /// Idle, no host; anyone may claim it
    Available,
    /// A host is configuring or a game is running
    Busy,
    /// A submission is pending the quizmaster's verdict
    Validating,
}

/// One entry of the per-round reveal ledger
///
/// The ledger always has exactly as many entries as the current
/// question's accepted answers, position-aligned with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// Display text of the answer slot
    pub text: String,
    /// Points the slot is worth
    pub points: u32,
    /// Whether the slot has been named this round
    pub revealed: bool,
}

/// Phase of the round currently being played
///
/// Exactly one phase is active at a time, which makes "control phase and
/// steal are never both in progress" structural rather than a flag
/// invariant to maintain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundPhase {
    /// The round-opening team's single attempt
    ControlOpening,
    /// The non-opening team's counter-attempt; carries the board index
    /// the opening team revealed, if any
    ControlCounter { opener_found: Option<usize> },
    /// The controlling team works through the board
    Normal,
    /// Single attempt against `defender`, the team that held control
    Steal { defender: TeamSide },
}

/// What the state machine does after a verdict has been applied
enum Step {
    /// Play continues with the freshly assigned responder
    NextResponder,
    /// The round is over and the pot banks to this team
    RoundOver(TeamSide),
}

/// A submission parked until the quizmaster rules on it
#[derive(Debug, Clone)]
struct PendingSubmission {
    responder: Id,
    text: String,
}

/// Mutable state of a game in progress
#[derive(Debug)]
struct PlayState {
    round: u32,
    /// Team that opened the current round; alternates every round
    opener: TeamSide,
    turn: TeamSide,
    responder: Option<Id>,
    phase: RoundPhase,
    scores: EnumMap<TeamSide, u32>,
    errors: EnumMap<TeamSide, u32>,
    /// Per-team rotation cursors into the join-ordered rosters
    cursors: EnumMap<TeamSide, usize>,
    ledger: Vec<LedgerEntry>,
    revealed: usize,
    pot: u32,
    seconds_left: u32,
    used_questions: HashSet<u32>,
    pending: Option<PendingSubmission>,
}

impl PlayState {
    /// Rotates to the next player of `side`, in join order
    ///
    /// Returns `None` when the roster has emptied mid-game.
    fn advance(&mut self, directory: &Directory, side: TeamSide) -> Option<Id> {
        let roster = directory.roster(side);
        if roster.is_empty() {
            return None;
        }
        let cursor = self.cursors[side];
        self.cursors[side] = cursor + 1;
        Some(roster[cursor % roster.len()].id)
    }

    /// Hands control of the round to `side` and starts normal play
    ///
    /// Falls back to the opposing team when `side` has no players left,
    /// and ends the round outright when nothing remains to play for.
    fn grant_control(&mut self, directory: &Directory, side: TeamSide) -> Step {
        let side = if directory.team_len(side) == 0 && directory.team_len(side.other()) > 0 {
            side.other()
        } else {
            side
        };
        self.phase = RoundPhase::Normal;
        self.errors[side] = 0;
        self.turn = side;
        if self.revealed == self.ledger.len() || directory.team_len(side) == 0 {
            return Step::RoundOver(side);
        }
        self.responder = self.advance(directory, side);
        Step::NextResponder
    }
}

/// Role a host assigns to a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleAssignment {
    /// Play on the given team
    Player(TeamSide),
    /// Rule on answers instead of the matching engine
    QuizMaster,
}

/// Reasons an inbound action is rejected
///
/// Every rejection leaves the lobby state unchanged.
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionError {
    /// The caller is not the lobby's host
    #[error("only the host may do this")]
    NotHost,
    /// The caller is not the registered quizmaster
    #[error("only the quizmaster may rule on answers")]
    NotQuizMaster,
    /// The caller is not the participant whose turn it is
    #[error("it is not this participant's turn")]
    NotResponder,
    /// The lobby is not in a state that allows this action
    #[error("the lobby does not allow this right now")]
    Unavailable,
    /// No submission is awaiting a ruling
    #[error("no submission is awaiting a ruling")]
    NothingPending,
    /// The provided password does not match
    #[error("wrong password")]
    WrongPassword,
    /// The target team is at its configured capacity
    #[error("the team is full")]
    TeamFull,
    /// The session is not a participant of this lobby
    #[error("unknown participant")]
    UnknownParticipant,
    /// Starting a game requires at least one player on each team
    #[error("both teams need at least one player")]
    EmptyTeam,
    /// The question bank has nothing left to offer
    #[error("no questions left to play")]
    QuestionsExhausted,
    /// No game is running
    #[error("no game is running")]
    GameNotRunning,
    /// The host cannot remove itself from the lobby
    #[error("the host cannot remove itself")]
    CannotRemoveSelf,
    /// The committed settings failed validation
    #[error("invalid settings")]
    InvalidSettings,
    /// The nickname was rejected
    #[error("nickname rejected: {0}")]
    Nickname(#[from] names::Error),
    /// The lobby cannot admit this participant
    #[error("cannot join: {0}")]
    Join(#[from] participant::Error),
}

/// A participant as shown in snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerEntry {
    /// Session identifier
    pub id: Id,
    /// Display name
    pub nickname: String,
}

impl From<&Participant> for PlayerEntry {
    fn from(participant: &Participant) -> Self {
        Self {
            id: participant.id,
            nickname: participant.nickname.clone(),
        }
    }
}

/// One team as shown in snapshots
#[derive(Debug, Clone, Serialize)]
pub struct TeamSnapshot {
    /// Configured display name
    pub name: String,
    /// Banked score across rounds
    pub score: u32,
    /// Wrong answers accumulated this round
    pub errors: u32,
    /// Players on the team, in join order
    pub roster: Vec<PlayerEntry>,
}

/// The live round as shown in snapshots
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct RoundSnapshot {
    /// Current round number, starting at 1
    pub number: u32,
    /// Configured number of rounds
    pub total: u32,
    /// Text of the current question, absent between rounds
    pub question: Option<String>,
    /// Id of the current question, absent between rounds
    pub question_id: Option<u32>,
    /// Participant whose turn it is
    pub responder: Option<Id>,
    /// Team whose turn it is
    pub turn: TeamSide,
    /// Whether the round is still in its control phase
    pub control_phase: bool,
    /// The team currently attempting a steal, if any
    pub stealing: Option<TeamSide>,
    /// Reveal ledger, position-aligned with the question's answers
    pub ledger: Vec<LedgerEntry>,
    /// Answers revealed so far this round
    pub revealed: usize,
    /// Points accumulated but not yet banked
    pub pot: u32,
    /// Seconds remaining on the active countdown
    pub seconds_left: u32,
    /// Submission text awaiting the quizmaster's ruling
    pub pending_answer: Option<String>,
}

/// Complete outward view of a lobby
///
/// Broadcast to every connected participant after each successful
/// mutation, and returned as the reconnection sync message.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct LobbySnapshot {
    /// Lobby identifier
    pub id: LobbyId,
    /// Lobby display name
    pub name: String,
    /// Lifecycle status
    pub status: LobbyStatus,
    /// Committed configuration
    pub settings: Settings,
    /// Whether joining requires a password
    pub requires_password: bool,
    /// Session id of the host, if one is present
    pub host: Option<Id>,
    /// The registered quizmaster, if any
    pub quiz_master: Option<PlayerEntry>,
    /// Participants not yet assigned to a team, in join order
    pub waiting: Vec<PlayerEntry>,
    /// Both teams with their rosters, scores and error counters
    pub teams: EnumMap<TeamSide, TeamSnapshot>,
    /// The game in progress, if any
    pub round: Option<RoundSnapshot>,
}

/// Final scores announced when a game ends
#[derive(Debug, Clone, Serialize)]
pub struct SummaryMessage {
    /// Banked score per team
    pub scores: EnumMap<TeamSide, u32>,
    /// Configured team names at the time the game ended
    pub team_names: EnumMap<TeamSide, String>,
    /// The side with the higher score, `None` on a tie
    pub winner: Option<TeamSide>,
}

/// Update messages sent to participants about lobby changes
#[skip_serializing_none]
#[derive(Debug, Serialize, Clone)]
pub enum UpdateMessage {
    /// Full lobby snapshot after a successful mutation
    Lobby(Box<LobbySnapshot>),
    /// Live countdown tick for the active responder
    Countdown {
        /// Seconds remaining before a no-answer is synthesized
        seconds_left: u32,
    },
    /// A submission now awaits the quizmaster's ruling
    PendingVerdict {
        /// Session id of the submitting participant
        responder: Id,
        /// Display name of the submitting participant
        nickname: String,
        /// The submitted text
        answer: String,
    },
    /// Final game summary
    Summary(SummaryMessage),
}

/// Sync messages aligning a participant's view with lobby state
#[derive(Debug, Serialize, Clone)]
pub enum SyncMessage {
    /// Full lobby synchronization, sent on connect and reconnect
    Lobby(Box<LobbySnapshot>),
}

/// Alarm messages driving the countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// One-second countdown tick
    ///
    /// Ticks carry the generation of the countdown that scheduled them;
    /// a tick whose generation is stale is ignored, which is how a real
    /// submission cancels the timer it raced against.
    Tick {
        /// Countdown generation this tick belongs to
        generation: u64,
    },
}

/// The state machine of one lobby
///
/// All participant bookkeeping lives in a single [`Directory`]; waiting
/// lists and rosters are derived queries, never duplicate lists.
pub struct Lobby {
    id: LobbyId,
    name: String,
    status: LobbyStatus,
    settings: Settings,
    password: Option<String>,
    host: Option<Id>,
    directory: Directory,
    names: Names,
    engine: MatchEngine,
    play: Option<PlayState>,
    /// Bumped whenever a countdown starts or stops; stale ticks no-op
    timer_generation: u64,
}

impl Debug for Lobby {
    /// Custom debug implementation that avoids printing the full roster
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lobby")
            .field("id", &self.id)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// Convenience methods
impl Lobby {
    /// Creates an idle lobby with default configuration
    pub fn new(id: LobbyId, name: &str) -> Self {
        Self {
            id,
            name: name.chars().take(MAX_NAME_LENGTH).collect(),
            status: LobbyStatus::Available,
            settings: Settings::default(),
            password: None,
            host: None,
            directory: Directory::default(),
            names: Names::default(),
            engine: MatchEngine::new(),
            play: None,
            timer_generation: 0,
        }
    }

    /// The lobby's identifier
    pub fn id(&self) -> LobbyId {
        self.id
    }

    /// The lobby's display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The lobby's lifecycle status
    pub fn status(&self) -> LobbyStatus {
        self.status
    }

    /// Session id of the current host, if any
    pub fn host(&self) -> Option<Id> {
        self.host
    }

    /// The committed configuration
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn require_host(&self, caller: Id) -> Result<(), ActionError> {
        if self.host == Some(caller) {
            Ok(())
        } else {
            Err(ActionError::NotHost)
        }
    }

    /// Everyone a broadcast should reach: the host plus the directory
    fn everyone(&self) -> Vec<Id> {
        self.host.into_iter().chain(self.directory.ids()).collect_vec()
    }

    fn announce<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        message: &crate::UpdateMessage,
        tunnel_finder: &F,
    ) {
        for id in self.everyone() {
            if let Some(tunnel) = tunnel_finder(id) {
                tunnel.send_message(message);
            }
        }
    }

    fn announce_snapshot<T: Tunnel, F: Fn(Id) -> Option<T>>(&self, tunnel_finder: &F) {
        self.announce(
            &UpdateMessage::Lobby(Box::new(self.snapshot())).into(),
            tunnel_finder,
        );
    }

    /// Builds the complete outward view of the lobby
    pub fn snapshot(&self) -> LobbySnapshot {
        let play = self.play.as_ref();
        LobbySnapshot {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            settings: self.settings.clone(),
            requires_password: self.password.is_some(),
            host: self.host,
            quiz_master: self.directory.quiz_master().map(PlayerEntry::from),
            waiting: self
                .directory
                .waiting()
                .into_iter()
                .map(PlayerEntry::from)
                .collect_vec(),
            teams: enum_map! {
                side => TeamSnapshot {
                    name: self.settings.team_name(side).to_owned(),
                    score: play.map_or(0, |p| p.scores[side]),
                    errors: play.map_or(0, |p| p.errors[side]),
                    roster: self
                        .directory
                        .roster(side)
                        .into_iter()
                        .map(PlayerEntry::from)
                        .collect_vec(),
                },
            },
            round: play.map(|p| RoundSnapshot {
                number: p.round,
                total: self.settings.total_rounds,
                question: self.engine.question_text().map(ToOwned::to_owned),
                question_id: self.engine.question_id(),
                responder: p.responder,
                turn: p.turn,
                control_phase: matches!(
                    p.phase,
                    RoundPhase::ControlOpening | RoundPhase::ControlCounter { .. }
                ),
                stealing: match p.phase {
                    RoundPhase::Steal { defender } => Some(defender.other()),
                    _ => None,
                },
                ledger: p.ledger.clone(),
                revealed: p.revealed,
                pot: p.pot,
                seconds_left: p.seconds_left,
                pending_answer: p.pending.as_ref().map(|pending| pending.text.clone()),
            }),
        }
    }

    /// Returns the message necessary to synchronize a participant's view
    pub fn state_message(&self) -> crate::SyncMessage {
        SyncMessage::Lobby(Box::new(self.snapshot())).into()
    }

    /// Reverts the lobby to its just-created defaults
    ///
    /// Clears participants, nicknames, configuration, password, host and
    /// any game in progress. The generation bump cancels stray ticks.
    fn reset(&mut self) {
        self.status = LobbyStatus::Available;
        self.settings = Settings::default();
        self.password = None;
        self.host = None;
        self.directory.clear();
        self.names.clear();
        self.engine.clear();
        self.play = None;
        self.timer_generation += 1;
    }

    fn start_countdown<S: FnMut(crate::AlarmMessage, Duration)>(
        &mut self,
        schedule_message: &mut S,
    ) {
        self.timer_generation += 1;
        let generation = self.timer_generation;
        let seconds = self.settings.answer_seconds;
        let Some(play) = self.play.as_mut() else {
            return;
        };
        if play.responder.is_none() {
            play.seconds_left = 0;
            return;
        }
        play.seconds_left = seconds;
        schedule_message(
            AlarmMessage::Tick { generation }.into(),
            Duration::from_secs(1),
        );
    }

    fn stop_countdown(&mut self) {
        self.timer_generation += 1;
        if let Some(play) = self.play.as_mut() {
            play.seconds_left = 0;
        }
    }

    /// Unparks a pending submission that lost its quizmaster
    ///
    /// A ruling cannot be decided without a quizmaster, so the parked
    /// submission is dropped and the responder may answer again.
    fn drop_pending_without_quiz_master(&mut self) {
        if self.status == LobbyStatus::Validating && self.directory.quiz_master().is_none() {
            if let Some(play) = self.play.as_mut() {
                play.pending = None;
            }
            self.status = LobbyStatus::Busy;
        }
    }

    fn ledger_from_engine(engine: &MatchEngine) -> Vec<LedgerEntry> {
        engine
            .answers()
            .iter()
            .map(|answer| LedgerEntry {
                text: answer.text.clone(),
                points: answer.points,
                revealed: false,
            })
            .collect_vec()
    }
}

// Inbound actions
impl Lobby {
    /// Claims the lobby as its host
    ///
    /// An available lobby enters `Busy`; a host may re-claim a lobby it
    /// already owns, and an orphaned busy lobby (host left, participants
    /// stayed) may be taken over by a new host.
    ///
    /// # Errors
    ///
    /// `ActionError::Unavailable` when another host holds the lobby.
    pub fn claim_host<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        claimant: Id,
        tunnel_finder: F,
    ) -> Result<(), ActionError> {
        match self.status {
            LobbyStatus::Available => {
                self.host = Some(claimant);
                self.status = LobbyStatus::Busy;
                info!(lobby = %self.id, "host claimed lobby");
            }
            _ if self.host == Some(claimant) => {}
            _ if self.host.is_none() => {
                self.host = Some(claimant);
                info!(lobby = %self.id, "orphaned lobby re-claimed");
            }
            _ => return Err(ActionError::Unavailable),
        }
        self.announce_snapshot(&tunnel_finder);
        Ok(())
    }

    /// Commits a new configuration, replacing the previous one wholesale
    ///
    /// Rosters keep their side across a reconfiguration; players beyond
    /// the new per-team capacity are moved back to waiting, latest
    /// joiners first. An empty password clears the requirement.
    ///
    /// # Errors
    ///
    /// `NotHost` for non-host callers, `Unavailable` outside `Busy`, and
    /// `InvalidSettings` when the settings fail validation.
    pub fn configure<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        caller: Id,
        settings: Settings,
        password: Option<String>,
        tunnel_finder: F,
    ) -> Result<(), ActionError> {
        self.require_host(caller)?;
        if self.status != LobbyStatus::Busy {
            return Err(ActionError::Unavailable);
        }
        if settings.validate().is_err() {
            return Err(ActionError::InvalidSettings);
        }
        self.settings = settings;
        self.password = password.filter(|p| !p.is_empty());
        for side in [TeamSide::One, TeamSide::Two] {
            let overflow = self
                .directory
                .roster(side)
                .iter()
                .skip(self.settings.team_capacity)
                .map(|p| p.id)
                .collect_vec();
            for id in overflow {
                self.directory.set_slot(id, Slot::Waiting);
            }
        }
        debug!(lobby = %self.id, "lobby configured");
        self.announce_snapshot(&tunnel_finder);
        Ok(())
    }

    /// Admits a participant into the waiting area
    ///
    /// Requires a hosted lobby, the correct password when one is set,
    /// and a valid, unique nickname.
    ///
    /// # Errors
    ///
    /// `Unavailable` without a host, `WrongPassword` on a mismatch,
    /// `Nickname` for rejected names, and `Join` when the lobby is at
    /// its participant cap or the session already joined.
    pub fn join_waiting<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        id: Id,
        nickname: &str,
        password: Option<&str>,
        tunnel_finder: F,
    ) -> Result<(), ActionError> {
        if self.host.is_none() || self.status == LobbyStatus::Available {
            return Err(ActionError::Unavailable);
        }
        if let Some(wanted) = self.password.as_deref() {
            if password != Some(wanted) {
                return Err(ActionError::WrongPassword);
            }
        }
        let cleaned = self.names.set_name(id, nickname)?;
        if let Err(error) = self.directory.add_waiting(id, cleaned) {
            self.names.remove(&id);
            return Err(error.into());
        }
        debug!(lobby = %self.id, participant = %id, "participant joined");
        self.announce_snapshot(&tunnel_finder);
        Ok(())
    }

    /// Assigns a waiting or playing participant to a role
    ///
    /// Assigning a new quizmaster demotes the previous one to waiting.
    ///
    /// # Errors
    ///
    /// `NotHost`, `UnknownParticipant`, or `TeamFull` when the target
    /// team is at its configured capacity.
    pub fn assign_role<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        caller: Id,
        participant: Id,
        role: RoleAssignment,
        tunnel_finder: F,
    ) -> Result<(), ActionError> {
        self.require_host(caller)?;
        if !self.directory.contains(participant) {
            return Err(ActionError::UnknownParticipant);
        }
        match role {
            RoleAssignment::Player(side) => {
                if self.directory.slot(participant) != Some(Slot::Playing(side))
                    && self.directory.team_len(side) >= self.settings.team_capacity
                {
                    return Err(ActionError::TeamFull);
                }
                self.directory.set_slot(participant, Slot::Playing(side));
            }
            RoleAssignment::QuizMaster => {
                if let Some(previous) = self.directory.quiz_master().map(|p| p.id) {
                    if previous != participant {
                        self.directory.set_slot(previous, Slot::Waiting);
                    }
                }
                self.directory.set_slot(participant, Slot::QuizMaster);
            }
        }
        self.announce_snapshot(&tunnel_finder);
        Ok(())
    }

    /// Moves a participant back to the waiting area
    ///
    /// # Errors
    ///
    /// `NotHost` or `UnknownParticipant`.
    pub fn unassign<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        caller: Id,
        participant: Id,
        tunnel_finder: F,
    ) -> Result<(), ActionError> {
        self.require_host(caller)?;
        if !self.directory.contains(participant) {
            return Err(ActionError::UnknownParticipant);
        }
        self.directory.set_slot(participant, Slot::Waiting);
        self.drop_pending_without_quiz_master();
        self.announce_snapshot(&tunnel_finder);
        Ok(())
    }

    /// Removes a participant at the host's request
    ///
    /// # Errors
    ///
    /// `NotHost`, `CannotRemoveSelf`, or `UnknownParticipant`.
    pub fn remove_participant<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        caller: Id,
        participant: Id,
        tunnel_finder: F,
    ) -> Result<(), ActionError> {
        self.require_host(caller)?;
        if participant == caller {
            return Err(ActionError::CannotRemoveSelf);
        }
        if self.directory.remove(participant).is_none() {
            return Err(ActionError::UnknownParticipant);
        }
        self.names.remove(&participant);
        self.drop_pending_without_quiz_master();
        self.announce_snapshot(&tunnel_finder);
        Ok(())
    }

    /// Handles a participant or host leaving on their own
    ///
    /// A departing host orphans the lobby (a new host may re-claim it)
    /// unless nobody remains, in which case the lobby reverts to its
    /// defaults. The same reset happens when the last participant leaves
    /// an unhosted lobby. Nothing else is reassigned automatically; a
    /// departed responder simply times out.
    ///
    /// # Errors
    ///
    /// `UnknownParticipant` when the session is neither host nor member.
    pub fn leave<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        id: Id,
        tunnel_finder: F,
    ) -> Result<(), ActionError> {
        if self.host == Some(id) {
            self.host = None;
            info!(lobby = %self.id, "host left");
            if self.directory.is_empty() {
                self.reset();
            }
            self.announce_snapshot(&tunnel_finder);
            return Ok(());
        }
        if self.directory.remove(id).is_none() {
            return Err(ActionError::UnknownParticipant);
        }
        self.names.remove(&id);
        if self.host.is_none() && self.directory.is_empty() {
            self.reset();
        }
        self.drop_pending_without_quiz_master();
        self.announce_snapshot(&tunnel_finder);
        Ok(())
    }

    /// Starts a new game
    ///
    /// Loads a question, resets every round counter and score, seeds the
    /// first responder as team one's first roster entry, and starts the
    /// countdown. The round opens in its control phase.
    ///
    /// # Errors
    ///
    /// `NotHost`, `Unavailable` outside `Busy`, `EmptyTeam` when either
    /// roster is empty, and `QuestionsExhausted` when the bank has
    /// nothing to offer; the lobby is left unchanged in every case.
    pub fn start_game<
        B: QuestionBank,
        L: Lexicon,
        Q: SynonymSource,
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(crate::AlarmMessage, Duration),
    >(
        &mut self,
        caller: Id,
        bank: &B,
        lexicon: &L,
        synonym_source: &Q,
        exclude: &HashSet<u32>,
        mut schedule_message: S,
        tunnel_finder: F,
    ) -> Result<(), ActionError> {
        self.require_host(caller)?;
        if self.status != LobbyStatus::Busy {
            return Err(ActionError::Unavailable);
        }
        if self.directory.team_len(TeamSide::One) == 0
            || self.directory.team_len(TeamSide::Two) == 0
        {
            return Err(ActionError::EmptyTeam);
        }
        self.engine
            .load_question(
                bank,
                lexicon,
                synonym_source,
                self.settings.category.as_deref(),
                exclude,
            )
            .map_err(|LoadError::Exhausted| ActionError::QuestionsExhausted)?;

        let mut used = exclude.clone();
        used.extend(self.engine.question_id());
        let mut play = PlayState {
            round: 1,
            opener: TeamSide::One,
            turn: TeamSide::One,
            responder: None,
            phase: RoundPhase::ControlOpening,
            scores: EnumMap::default(),
            errors: EnumMap::default(),
            cursors: EnumMap::default(),
            ledger: Self::ledger_from_engine(&self.engine),
            revealed: 0,
            pot: 0,
            seconds_left: 0,
            used_questions: used,
            pending: None,
        };
        play.responder = play.advance(&self.directory, TeamSide::One);
        self.play = Some(play);
        info!(lobby = %self.id, "game started");
        self.start_countdown(&mut schedule_message);
        self.announce_snapshot(&tunnel_finder);
        Ok(())
    }

    /// Loads the next round's question
    ///
    /// Only valid between rounds; the caller's exclusion set is unioned
    /// with the ids already used this game before drawing.
    ///
    /// # Errors
    ///
    /// `NotHost`, `GameNotRunning`, `Unavailable` while a question is
    /// still live, and `QuestionsExhausted` when the bank is empty.
    pub fn next_question<
        B: QuestionBank,
        L: Lexicon,
        Q: SynonymSource,
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(crate::AlarmMessage, Duration),
    >(
        &mut self,
        caller: Id,
        bank: &B,
        lexicon: &L,
        synonym_source: &Q,
        exclude: &HashSet<u32>,
        mut schedule_message: S,
        tunnel_finder: F,
    ) -> Result<(), ActionError> {
        self.require_host(caller)?;
        if self.status != LobbyStatus::Busy {
            return Err(ActionError::Unavailable);
        }
        let combined: HashSet<u32> = {
            let Some(play) = self.play.as_ref() else {
                return Err(ActionError::GameNotRunning);
            };
            play.used_questions.union(exclude).copied().collect()
        };
        if self.engine.question_id().is_some() {
            return Err(ActionError::Unavailable);
        }
        self.engine
            .load_question(
                bank,
                lexicon,
                synonym_source,
                self.settings.category.as_deref(),
                &combined,
            )
            .map_err(|LoadError::Exhausted| ActionError::QuestionsExhausted)?;

        let ledger = Self::ledger_from_engine(&self.engine);
        let question_id = self.engine.question_id();
        let Some(play) = self.play.as_mut() else {
            return Err(ActionError::GameNotRunning);
        };
        play.used_questions.extend(question_id);
        play.ledger = ledger;
        play.revealed = 0;
        play.pot = 0;
        play.phase = RoundPhase::ControlOpening;
        play.pending = None;
        if play.responder.is_none() {
            play.responder = play.advance(&self.directory, play.turn);
        }
        debug!(lobby = %self.id, round = play.round, "next question loaded");
        self.start_countdown(&mut schedule_message);
        self.announce_snapshot(&tunnel_finder);
        Ok(())
    }

    /// Handles a submission from the current responder
    ///
    /// Stops the countdown, then either parks the submission for the
    /// quizmaster's ruling (when one is registered) or scores it with
    /// the matching engine and advances the round.
    ///
    /// # Errors
    ///
    /// `Unavailable` outside `Busy` or between rounds, `GameNotRunning`,
    /// and `NotResponder` for anyone but the turn holder.
    pub fn submit_answer<
        L: Lexicon,
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(crate::AlarmMessage, Duration),
    >(
        &mut self,
        caller: Id,
        text: &str,
        lexicon: &L,
        schedule_message: S,
        tunnel_finder: F,
    ) -> Result<(), ActionError> {
        if self.status != LobbyStatus::Busy {
            return Err(ActionError::Unavailable);
        }
        {
            let Some(play) = self.play.as_ref() else {
                return Err(ActionError::GameNotRunning);
            };
            if play.responder != Some(caller) {
                return Err(ActionError::NotResponder);
            }
        }
        if self.engine.question_id().is_none() {
            return Err(ActionError::Unavailable);
        }
        // A stale tick can no longer finalize this attempt.
        self.stop_countdown();
        if self.directory.quiz_master().is_some() {
            let nickname = self
                .directory
                .get(caller)
                .map(|p| p.nickname.clone())
                .unwrap_or_default();
            if let Some(play) = self.play.as_mut() {
                play.pending = Some(PendingSubmission {
                    responder: caller,
                    text: text.to_owned(),
                });
            }
            self.status = LobbyStatus::Validating;
            debug!(lobby = %self.id, responder = %caller, "submission awaits ruling");
            self.announce(
                &UpdateMessage::PendingVerdict {
                    responder: caller,
                    nickname,
                    answer: text.to_owned(),
                }
                .into(),
                &tunnel_finder,
            );
            self.announce_snapshot(&tunnel_finder);
        } else {
            let verdict = self.engine.process_answer(lexicon, text);
            self.apply_verdict(&verdict, schedule_message, tunnel_finder);
        }
        Ok(())
    }

    /// Applies the quizmaster's ruling on the pending submission
    ///
    /// A correct ruling names the display text of the matched answer;
    /// the ruling is converted into the same verdict shape the engine
    /// produces and fed through the identical decision tree.
    ///
    /// # Errors
    ///
    /// `NotQuizMaster` for other callers and `NothingPending` when no
    /// submission awaits a ruling.
    pub fn validate_answer<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(crate::AlarmMessage, Duration),
    >(
        &mut self,
        caller: Id,
        correct: bool,
        matched_text: Option<&str>,
        schedule_message: S,
        tunnel_finder: F,
    ) -> Result<(), ActionError> {
        if self.directory.quiz_master().map(|p| p.id) != Some(caller) {
            return Err(ActionError::NotQuizMaster);
        }
        if self.status != LobbyStatus::Validating {
            return Err(ActionError::NothingPending);
        }
        let Some(pending) = self.play.as_mut().and_then(|play| play.pending.take()) else {
            return Err(ActionError::NothingPending);
        };
        self.status = LobbyStatus::Busy;
        let verdict = if correct {
            matched_text.map_or(MatchOutcome::Miss, |text| self.engine.answer_by_text(text))
        } else {
            MatchOutcome::Miss
        };
        debug!(
            lobby = %self.id,
            responder = %pending.responder,
            correct,
            "quizmaster ruled"
        );
        self.apply_verdict(&verdict, schedule_message, tunnel_finder);
        Ok(())
    }

    /// Handles a scheduled countdown tick
    ///
    /// Stale generations no-op, which resolves the race between a tick
    /// and a real submission: whichever commits first wins. A tick that
    /// brings the countdown to zero synthesizes a no-answer submission
    /// on behalf of the current responder.
    pub fn receive_alarm<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(crate::AlarmMessage, Duration),
    >(
        &mut self,
        message: crate::AlarmMessage,
        mut schedule_message: S,
        tunnel_finder: F,
    ) {
        let crate::AlarmMessage::Lobby(AlarmMessage::Tick { generation }) = message;
        if generation != self.timer_generation {
            return;
        }
        if self.status != LobbyStatus::Busy || self.engine.question_id().is_none() {
            return;
        }
        let seconds_left = {
            let Some(play) = self.play.as_mut() else {
                return;
            };
            if play.responder.is_none() {
                return;
            }
            play.seconds_left = play.seconds_left.saturating_sub(1);
            play.seconds_left
        };
        if seconds_left > 0 {
            self.announce(&UpdateMessage::Countdown { seconds_left }.into(), &tunnel_finder);
            schedule_message(
                AlarmMessage::Tick { generation }.into(),
                Duration::from_secs(1),
            );
        } else {
            debug!(lobby = %self.id, "countdown expired with no answer");
            self.timer_generation += 1;
            self.apply_verdict(&MatchOutcome::Miss, schedule_message, tunnel_finder);
        }
    }
}

// Round flow
impl Lobby {
    /// Advances the round after a verdict, whatever its origin
    ///
    /// This is the single decision tree shared by engine scoring,
    /// quizmaster rulings and countdown timeouts.
    fn apply_verdict<T: Tunnel, F: Fn(Id) -> Option<T>, S: FnMut(crate::AlarmMessage, Duration)>(
        &mut self,
        verdict: &MatchOutcome,
        mut schedule_message: S,
        tunnel_finder: F,
    ) {
        let step = {
            let Some(play) = self.play.as_mut() else {
                return;
            };

            // Reveal the named answer if it is on the board and still
            // hidden; a repeat of a revealed answer earns nothing.
            let found = match verdict {
                MatchOutcome::Hit { points, index, .. } if !play.ledger[*index].revealed => {
                    play.ledger[*index].revealed = true;
                    play.revealed += 1;
                    play.pot += points;
                    Some(*index)
                }
                _ => None,
            };

            match play.phase {
                RoundPhase::ControlOpening => {
                    let opener = play.opener;
                    if found == Some(0) {
                        // Top answer: the opening team keeps initiative
                        // without giving the other side an attempt.
                        play.grant_control(&self.directory, opener)
                    } else if self.directory.team_len(opener.other()) == 0 {
                        // Nobody left to counter, control passes by default.
                        play.grant_control(&self.directory, opener)
                    } else {
                        play.phase = RoundPhase::ControlCounter { opener_found: found };
                        play.turn = opener.other();
                        play.responder = play.advance(&self.directory, opener.other());
                        Step::NextResponder
                    }
                }
                RoundPhase::ControlCounter { opener_found } => {
                    let opener = play.opener;
                    // The lower board index wins control; ties and double
                    // misses hand it to the countering team.
                    let winner = match (opener_found, found) {
                        (Some(first), Some(second)) if first < second => opener,
                        (Some(_), None) => opener,
                        _ => opener.other(),
                    };
                    info!(lobby = %self.id, ?winner, "control decided");
                    play.grant_control(&self.directory, winner)
                }
                RoundPhase::Steal { defender } => {
                    let stealer = play.turn;
                    let banked = if found.is_some() { stealer } else { defender };
                    info!(
                        lobby = %self.id,
                        ?stealer,
                        success = found.is_some(),
                        "steal resolved"
                    );
                    Step::RoundOver(banked)
                }
                RoundPhase::Normal => {
                    let side = play.turn;
                    if found.is_some() {
                        play.errors[side] = 0;
                        if play.revealed == play.ledger.len() {
                            Step::RoundOver(side)
                        } else {
                            play.responder = play.advance(&self.directory, side);
                            Step::NextResponder
                        }
                    } else {
                        play.errors[side] += 1;
                        if play.errors[side] >= MAX_TEAM_ERRORS {
                            let stealer = side.other();
                            if self.directory.team_len(stealer) == 0 {
                                // No one can steal, the pot stays home.
                                Step::RoundOver(side)
                            } else {
                                info!(lobby = %self.id, ?stealer, "steal attempt triggered");
                                play.phase = RoundPhase::Steal { defender: side };
                                play.turn = stealer;
                                play.responder = play.advance(&self.directory, stealer);
                                Step::NextResponder
                            }
                        } else {
                            play.responder = play.advance(&self.directory, side);
                            Step::NextResponder
                        }
                    }
                }
            }
        };

        match step {
            Step::NextResponder => {
                self.start_countdown(&mut schedule_message);
                self.announce_snapshot(&tunnel_finder);
            }
            Step::RoundOver(banked) => {
                self.end_round(banked, &tunnel_finder);
            }
        }
    }

    /// Banks the pot and closes the round
    ///
    /// Ends the whole game once the configured number of rounds has been
    /// played: the summary is announced and the lobby reverts to its
    /// defaults. Otherwise round counters reset, turn order flips, and
    /// the next round's opening responder is seeded; the next question
    /// is requested explicitly by the host.
    fn end_round<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, banked: TeamSide, tunnel_finder: &F) {
        self.stop_countdown();
        let finished = {
            let Some(play) = self.play.as_mut() else {
                return;
            };
            play.scores[banked] += play.pot;
            play.pot = 0;
            play.pending = None;
            info!(lobby = %self.id, round = play.round, team = ?banked, "round ended");
            play.round >= self.settings.total_rounds
        };
        if finished {
            let audience = self.everyone();
            if let Some(play) = self.play.as_ref() {
                let summary = SummaryMessage {
                    scores: play.scores,
                    team_names: self.settings.team_names.clone(),
                    winner: match play.scores[TeamSide::One].cmp(&play.scores[TeamSide::Two]) {
                        Ordering::Greater => Some(TeamSide::One),
                        Ordering::Less => Some(TeamSide::Two),
                        Ordering::Equal => None,
                    },
                };
                info!(lobby = %self.id, scores = ?play.scores, "game over");
                self.announce(&UpdateMessage::Summary(summary).into(), tunnel_finder);
            }
            self.reset();
            let farewell: crate::UpdateMessage =
                UpdateMessage::Lobby(Box::new(self.snapshot())).into();
            for id in audience {
                if let Some(tunnel) = tunnel_finder(id) {
                    tunnel.send_message(&farewell);
                }
            }
        } else {
            if let Some(play) = self.play.as_mut() {
                play.round += 1;
                play.opener = play.opener.other();
                play.turn = play.opener;
                play.phase = RoundPhase::ControlOpening;
                play.errors = EnumMap::default();
                play.cursors = EnumMap::default();
                play.ledger.clear();
                play.revealed = 0;
                play.seconds_left = 0;
                play.responder = play.advance(&self.directory, play.turn);
            }
            self.engine.clear();
            self.announce_snapshot(tunnel_finder);
        }
    }
}
