//! Session state, user-facing events and statistics

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::transcript::{Speaker, TranscriptTurn};

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What the session reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// A finalized transcript entry
    Turn(TranscriptTurn),
    /// A fragment of the turn still in progress
    PartialTranscript { speaker: Speaker, text: String },
    /// The server cut the model off; `flushed` segments were discarded
    Interrupted { flushed: usize },
    /// User-visible failure
    Error(String),
}

/// Session statistics
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Microphone frames handed to the connection
    pub frames_sent: u64,
    /// Audio parts received from the server
    pub frames_received: u64,
    /// Received frames dropped as undecodable
    pub decode_errors: u64,
    pub interruptions: u64,
    pub segments_scheduled: u64,
    pub turns_completed: u64,
}

impl SessionStats {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            started_at: None,
            ended_at: None,
            frames_sent: 0,
            frames_received: 0,
            decode_errors: 0,
            interruptions: 0,
            segments_scheduled: 0,
            turns_completed: 0,
        }
    }

    /// Time spent active, if the session ever started
    pub fn duration(&self) -> Option<chrono::Duration> {
        let started = self.started_at?;
        let ended = self.ended_at.unwrap_or_else(Utc::now);
        Some(ended - started)
    }
}
