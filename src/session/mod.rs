//! Session lifecycle
//!
//! A [`SessionController`] owns one duplex session from start to close:
//! the microphone, the playback scheduler and the connection. It is never
//! reused; reconnecting means building a new controller.

pub mod controller;
pub mod events;

use std::time::Duration;

use crate::audio::{CaptureSettings, PlaybackSettings};
use crate::codec::Quantization;
use crate::constants::DEFAULT_CONNECT_TIMEOUT_MS;
use crate::transport::ConnectRequest;

pub use controller::SessionController;
pub use events::{SessionEvent, SessionState, SessionStats};

/// Everything a session needs besides its collaborators
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub request: ConnectRequest,
    pub capture: CaptureSettings,
    pub playback: PlaybackSettings,
    pub quantization: Quantization,
    /// Upper bound on waiting for the server to acknowledge setup
    pub connect_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            request: ConnectRequest::default(),
            capture: CaptureSettings::default(),
            playback: PlaybackSettings::default(),
            quantization: Quantization::default(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}
