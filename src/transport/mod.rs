//! Duplex connection to the live API
//!
//! A connection is a pair of ordered channels: frames go out through
//! [`LiveConnection::outbound`], and the open/message/error/close callbacks
//! of the remote session arrive as [`TransportEvent`]s on
//! [`LiveConnection::events`].

pub mod protocol;
pub mod websocket;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::codec::AudioFrame;
use crate::constants::{DEFAULT_MODEL, DEFAULT_VOICE};
use crate::error::TransportError;

pub use protocol::{ClientMessage, InlineAudio, ServerContent, ServerMessage};
pub use websocket::WebSocketConnector;

/// Output modality requested from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseModality {
    #[default]
    Audio,
}

impl ResponseModality {
    pub fn as_wire(&self) -> &'static str {
        match self {
            ResponseModality::Audio => "AUDIO",
        }
    }
}

/// Session options sent with the setup message
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub response_modality: ResponseModality,
    pub input_transcription: bool,
    pub output_transcription: bool,
    /// Prebuilt voice name
    pub voice: Option<String>,
    pub system_instruction: Option<String>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            response_modality: ResponseModality::Audio,
            input_transcription: true,
            output_transcription: true,
            voice: Some(DEFAULT_VOICE.to_string()),
            system_instruction: None,
        }
    }
}

/// Everything needed to open a session
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub model: String,
    pub config: LiveConfig,
}

impl Default for ConnectRequest {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            config: LiveConfig::default(),
        }
    }
}

/// Client-to-server traffic
#[derive(Debug, Clone)]
pub enum Outbound {
    Audio(AudioFrame),
    Close,
}

/// Server-to-client traffic, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The server acknowledged the session
    Open,
    Message(ServerMessage),
    Error(String),
    /// Terminal; nothing follows
    Closed { reason: String },
}

/// Live duplex connection
pub struct LiveConnection {
    pub outbound: UnboundedSender<Outbound>,
    pub events: UnboundedReceiver<TransportEvent>,
}

impl LiveConnection {
    /// Fire-and-forget send. Returns false once the connection is gone.
    pub fn send(&self, message: Outbound) -> bool {
        self.outbound.send(message).is_ok()
    }
}

/// Opens duplex connections
pub trait Connector: Send + Sync {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'static, Result<LiveConnection, TransportError>>;
}
