//! JSON messages of the bidirectional streaming API
//!
//! Client messages are externally tagged (`{"setup": {...}}`,
//! `{"realtimeInput": {...}}`). Server messages carry at most one of
//! `setupComplete`, `serverContent` or `goAway` per frame.

use serde::{Deserialize, Serialize};

use crate::codec::AudioFrame;
use crate::error::TransportError;
use crate::transport::ConnectRequest;

/// Message sent from client to server
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    /// First message on a new connection
    pub fn setup(request: &ConnectRequest) -> Self {
        let config = &request.config;
        ClientMessage::Setup(Setup {
            model: request.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec![config.response_modality.as_wire().to_string()],
                speech_config: config.voice.as_ref().map(|voice| SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.clone(),
                        },
                    },
                }),
            },
            input_audio_transcription: config.input_transcription.then_some(Empty {}),
            output_audio_transcription: config.output_transcription.then_some(Empty {}),
            system_instruction: config.system_instruction.as_ref().map(|text| Content {
                parts: vec![TextPart { text: text.clone() }],
            }),
        })
    }

    /// Wrap a microphone frame
    pub fn audio(frame: &AudioFrame) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            audio: Blob {
                mime_type: frame.format.mime_type(),
                data: frame.to_base64(),
            },
        })
    }

    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Protocol(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<Empty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<Empty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Serializes as `{}`
#[derive(Debug, Clone, Serialize)]
pub struct Empty {}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeInput {
    pub audio: Blob,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// Base64 audio carried in a model turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAudio {
    pub mime_type: String,
    pub data: String,
}

/// Decoded server message
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Setup accepted; the session is live
    SetupComplete,
    /// Incremental model output and turn signals
    Content(ServerContent),
    /// Server will disconnect soon
    GoAway { time_left: Option<String> },
    /// Anything this client does not act on (usage metadata, tool calls, ...)
    Other,
}

/// Payload of a `serverContent` message. Several signals may arrive together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerContent {
    pub audio: Vec<InlineAudio>,
    pub input_transcription: Option<String>,
    pub output_transcription: Option<String>,
    pub interrupted: bool,
    pub turn_complete: bool,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        let raw: RawServerMessage =
            serde_json::from_str(text).map_err(|e| TransportError::Protocol(e.to_string()))?;

        if raw.setup_complete.is_some() {
            return Ok(ServerMessage::SetupComplete);
        }
        if let Some(go_away) = raw.go_away {
            return Ok(ServerMessage::GoAway {
                time_left: go_away.time_left,
            });
        }
        let Some(content) = raw.server_content else {
            return Ok(ServerMessage::Other);
        };

        let audio = content
            .model_turn
            .map(|turn| turn.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.inline_data)
            .filter(|blob| blob.mime_type.starts_with("audio/"))
            .map(|blob| InlineAudio {
                mime_type: blob.mime_type,
                data: blob.data,
            })
            .collect();

        Ok(ServerMessage::Content(ServerContent {
            audio,
            input_transcription: content.input_transcription.and_then(|t| t.text),
            output_transcription: content.output_transcription.and_then(|t| t.text),
            interrupted: content.interrupted,
            turn_complete: content.turn_complete,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<RawServerContent>,
    go_away: Option<RawGoAway>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServerContent {
    model_turn: Option<RawContent>,
    input_transcription: Option<RawTranscription>,
    output_transcription: Option<RawTranscription>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(default)]
    parts: Vec<RawPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPart {
    inline_data: Option<RawBlob>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct RawTranscription {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGoAway {
    time_left: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SampleFormat;
    use crate::transport::LiveConfig;
    use serde_json::{json, Value};

    #[test]
    fn test_setup_message_shape() {
        let request = ConnectRequest {
            model: "models/test-model".to_string(),
            config: LiveConfig {
                voice: Some("Zephyr".to_string()),
                system_instruction: Some("Be brief.".to_string()),
                ..LiveConfig::default()
            },
        };

        let value: Value = serde_json::from_str(&ClientMessage::setup(&request).to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": "models/test-model",
                    "generationConfig": {
                        "responseModalities": ["AUDIO"],
                        "speechConfig": {
                            "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Zephyr" } }
                        }
                    },
                    "inputAudioTranscription": {},
                    "outputAudioTranscription": {},
                    "systemInstruction": { "parts": [{ "text": "Be brief." }] }
                }
            })
        );
    }

    #[test]
    fn test_setup_omits_disabled_options() {
        let request = ConnectRequest {
            model: "m".to_string(),
            config: LiveConfig {
                input_transcription: false,
                output_transcription: false,
                voice: None,
                ..LiveConfig::default()
            },
        };
        let value: Value = serde_json::from_str(&ClientMessage::setup(&request).to_json().unwrap()).unwrap();
        let setup = &value["setup"];
        assert!(setup.get("inputAudioTranscription").is_none());
        assert!(setup.get("outputAudioTranscription").is_none());
        assert!(setup["generationConfig"].get("speechConfig").is_none());
    }

    #[test]
    fn test_audio_message() {
        let frame = AudioFrame::new(vec![0x01u8, 0x00], SampleFormat::outbound());
        let value: Value = serde_json::from_str(&ClientMessage::audio(&frame).to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "realtimeInput": { "audio": { "mimeType": "audio/pcm;rate=16000", "data": "AQA=" } } })
        );
    }

    #[test]
    fn test_parse_setup_complete() {
        assert_eq!(ServerMessage::parse(r#"{"setupComplete":{}}"#).unwrap(), ServerMessage::SetupComplete);
    }

    #[test]
    fn test_parse_server_content() {
        let text = r#"{
            "serverContent": {
                "modelTurn": { "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAA=" } },
                    { "text": "ignored" }
                ] },
                "outputTranscription": { "text": "Hi there" },
                "turnComplete": true
            }
        }"#;

        let ServerMessage::Content(content) = ServerMessage::parse(text).unwrap() else {
            panic!("expected content");
        };
        assert_eq!(content.audio.len(), 1);
        assert_eq!(content.audio[0].mime_type, "audio/pcm;rate=24000");
        assert_eq!(content.output_transcription.as_deref(), Some("Hi there"));
        assert!(content.input_transcription.is_none());
        assert!(content.turn_complete);
        assert!(!content.interrupted);
    }

    #[test]
    fn test_parse_interrupted_and_go_away() {
        let ServerMessage::Content(content) =
            ServerMessage::parse(r#"{"serverContent":{"interrupted":true}}"#).unwrap()
        else {
            panic!("expected content");
        };
        assert!(content.interrupted);

        assert_eq!(
            ServerMessage::parse(r#"{"goAway":{"timeLeft":"5s"}}"#).unwrap(),
            ServerMessage::GoAway { time_left: Some("5s".to_string()) }
        );
        assert_eq!(ServerMessage::parse(r#"{"usageMetadata":{}}"#).unwrap(), ServerMessage::Other);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(ServerMessage::parse("not json"), Err(TransportError::Protocol(_))));
    }
}
