//! # Live Voice
//!
//! Real-time duplex voice sessions against a streaming generative-audio API.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          SESSION CONTROLLER                                  │
//! │                                                                              │
//! │  ┌─────────────┐   chunks    ┌─────────────┐   frames    ┌───────────────┐  │
//! │  │ Microphone  │ ──────────▶ │ PCM Encoder │ ──────────▶ │               │  │
//! │  │  (capture)  │   16 kHz    │ (codec)     │  base64     │               │  │
//! │  └─────────────┘             └─────────────┘             │   Duplex      │  │
//! │                                                          │   Connection  │  │
//! │  ┌─────────────┐  segments   ┌─────────────┐   frames    │  (transport)  │  │
//! │  │  Playback   │ ◀────────── │ PCM Decoder │ ◀────────── │               │  │
//! │  │  Scheduler  │   24 kHz    │ (codec)     │             │               │  │
//! │  └──────┬──────┘             └─────────────┘             └───────┬───────┘  │
//! │         │  flush() on interruption                               │          │
//! │         ▼                                                        ▼          │
//! │  ┌─────────────┐                                   ┌────────────────────┐   │
//! │  │   Speaker   │                                   │ Transcript         │   │
//! │  │  (playback) │                                   │ Aggregator         │   │
//! │  └─────────────┘                                   └────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All control flow runs on one task: device threads and the socket task
//! only push into channels that [`session::SessionController`] drains in
//! arrival order.

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod session;
pub mod transcript;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rate of outbound (microphone) audio on the wire
    pub const INPUT_SAMPLE_RATE: u32 = 16_000;

    /// Sample rate of inbound (model) audio on the wire
    pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

    /// Both directions are mono
    pub const WIRE_CHANNELS: u16 = 1;

    /// Samples per outbound capture chunk
    pub const DEFAULT_CAPTURE_CHUNK: usize = 4096;

    /// Default model for live audio sessions
    pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

    /// Default synthesized voice
    pub const DEFAULT_VOICE: &str = "Zephyr";

    /// Bidirectional streaming endpoint
    pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

    /// How long to wait for the server to acknowledge the session setup
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
}
