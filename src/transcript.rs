//! Per-turn transcript accumulation
//!
//! The server streams partial transcriptions of both sides of the
//! conversation. Fragments are concatenated per channel until a
//! turn-complete signal, when each non-empty buffer becomes one
//! [`TranscriptTurn`] (user before model) and both buffers reset.

use serde::Serialize;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

/// One finalized line of the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptTurn {
    /// Zero-based index of the turn this text completed in
    pub turn: u64,
    pub speaker: Speaker,
    pub text: String,
}

/// Accumulates partial transcription text into a turn-indexed log
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    pending_input: String,
    pending_output: String,
    turns_completed: u64,
    log: Vec<TranscriptTurn>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment of the user's speech
    pub fn push_input(&mut self, text: &str) {
        self.pending_input.push_str(text);
    }

    /// Append a fragment of the model's speech
    pub fn push_output(&mut self, text: &str) {
        self.pending_output.push_str(text);
    }

    pub fn push(&mut self, speaker: Speaker, text: &str) {
        match speaker {
            Speaker::User => self.push_input(text),
            Speaker::Model => self.push_output(text),
        }
    }

    /// Close the current turn. Returns the entries it added to the log.
    pub fn complete_turn(&mut self) -> Vec<TranscriptTurn> {
        let turn = self.turns_completed;
        let input = std::mem::take(&mut self.pending_input);
        let output = std::mem::take(&mut self.pending_output);

        let finalized: Vec<TranscriptTurn> = [(Speaker::User, input), (Speaker::Model, output)]
            .into_iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(speaker, text)| TranscriptTurn { turn, speaker, text })
            .collect();

        self.turns_completed += 1;
        self.log.extend(finalized.iter().cloned());
        finalized
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn pending_output(&self) -> &str {
        &self.pending_output
    }

    /// Finalized entries, oldest first
    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.log
    }

    /// Number of turn-complete boundaries seen
    pub fn turn_count(&self) -> u64 {
        self.turns_completed
    }

    /// Drop unfinished text
    pub fn discard_pending(&mut self) {
        self.pending_input.clear();
        self.pending_output.clear();
    }
}
