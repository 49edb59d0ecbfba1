//! Error types for live voice sessions

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio device errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Device already closed")]
    Closed,
}

/// Frame codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Empty audio payload")]
    EmptyPayload,

    #[error("Payload of {len} bytes is not a whole number of {channels}-channel 16-bit frames")]
    TruncatedPayload { len: usize, channels: u16 },

    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Invalid channel count: {0}")]
    InvalidChannels(u16),
}

/// Duplex connection errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed before setup completed: {0}")]
    ClosedDuringSetup(String),

    #[error("Timed out waiting for setup acknowledgement")]
    Timeout,
}

/// Session lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session is closed; create a new session to reconnect")]
    Closed,

    #[error("Session is not active")]
    NotActive,
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsystem_errors_convert() {
        let err: Error = AudioError::PermissionDenied("denied by user".into()).into();
        assert!(matches!(err, Error::Audio(AudioError::PermissionDenied(_))));
        assert_eq!(err.to_string(), "Audio error: Microphone access denied: denied by user");

        let err: Error = TransportError::Timeout.into();
        assert!(matches!(err, Error::Transport(TransportError::Timeout)));
    }

    #[test]
    fn test_truncated_payload_message() {
        let err = CodecError::TruncatedPayload { len: 3, channels: 1 };
        assert!(err.to_string().contains("3 bytes"));
    }
}
