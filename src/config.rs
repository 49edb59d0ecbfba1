//! # Configuration
//!
//! Settings come from three places, highest priority first:
//! 1. Environment variables (`GEMINI_API_KEY`, `LIVE_VOICE_MODEL`, ...)
//! 2. A TOML file: an explicit path, else `config.toml` in the platform
//!    config directory (`~/.config/live-voice` on Linux)
//! 3. Built-in defaults
//!
//! Every section and field is optional in the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audio::{CaptureSettings, PlaybackSettings};
use crate::codec::Quantization;
use crate::constants::{
    DEFAULT_CAPTURE_CHUNK, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_VOICE,
    INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE,
};
use crate::error::{Error, Result};
use crate::session::SessionOptions;
use crate::transport::{ConnectRequest, LiveConfig};

/// Environment variables holding the API key, in lookup order
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];
pub const MODEL_VAR: &str = "LIVE_VOICE_MODEL";
pub const VOICE_VAR: &str = "LIVE_VOICE_VOICE";
pub const ENDPOINT_VAR: &str = "LIVE_VOICE_ENDPOINT";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub audio: AudioConfig,
}

/// Remote service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Usually supplied through the environment rather than the file
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Options sent with the session setup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub voice: Option<String>,
    pub system_instruction: Option<String>,
    pub input_transcription: bool,
    pub output_transcription: bool,
    pub connect_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            voice: Some(DEFAULT_VOICE.to_string()),
            system_instruction: None,
            input_transcription: true,
            output_transcription: true,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

/// Local device settings. Microphone audio is always resampled to the
/// fixed 16 kHz wire rate, so only the speaker rate is selectable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; default device when unset
    pub input_device: Option<String>,
    /// Output device name; default device when unset
    pub output_device: Option<String>,
    /// Preferred speaker rate; playback resamples when the device differs
    pub output_sample_rate: u32,
    /// Samples per outbound frame
    pub chunk_size: usize,
    pub quantization: Quantization,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            chunk_size: DEFAULT_CAPTURE_CHUNK,
            quantization: Quantization::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (or the default location, if present) and apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("no config file, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// `config.toml` in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "live-voice").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Override fields from environment variables. `lookup` returns the
    /// value of a variable, if set.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = API_KEY_VARS.iter().find_map(|name| set(name)) {
            self.api.api_key = Some(key);
        }
        if let Some(model) = set(MODEL_VAR) {
            self.api.model = model;
        }
        if let Some(voice) = set(VOICE_VAR) {
            self.session.voice = Some(voice);
        }
        if let Some(endpoint) = set(ENDPOINT_VAR) {
            self.api.endpoint = endpoint;
        }
    }

    /// Reject settings no session could run with
    pub fn validate(&self) -> Result<()> {
        if self.audio.output_sample_rate == 0 {
            return Err(Error::Config("Output sample rate must be greater than 0".to_string()));
        }
        if self.audio.chunk_size == 0 {
            return Err(Error::Config("Chunk size must be greater than 0".to_string()));
        }
        if self.api.model.trim().is_empty() {
            return Err(Error::Config("Model must not be empty".to_string()));
        }
        if self.api.endpoint.trim().is_empty() {
            return Err(Error::Config("Endpoint must not be empty".to_string()));
        }
        Ok(())
    }

    /// [`validate`](Self::validate), plus a usable API key
    pub fn validate_for_connect(&self) -> Result<()> {
        self.validate()?;
        match self.api.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(Error::Config(format!(
                "No API key; set {} or api.api_key in the config file",
                API_KEY_VARS[0]
            ))),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            request: ConnectRequest {
                model: self.api.model.clone(),
                config: LiveConfig {
                    input_transcription: self.session.input_transcription,
                    output_transcription: self.session.output_transcription,
                    voice: self.session.voice.clone(),
                    system_instruction: self.session.system_instruction.clone(),
                    ..LiveConfig::default()
                },
            },
            capture: CaptureSettings {
                device: self.audio.input_device.clone(),
                sample_rate: INPUT_SAMPLE_RATE,
                chunk_size: self.audio.chunk_size,
            },
            playback: PlaybackSettings {
                device: self.audio.output_device.clone(),
                sample_rate: self.audio.output_sample_rate,
            },
            quantization: self.audio.quantization,
            connect_timeout: Duration::from_millis(self.session.connect_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SampleFormat;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.api.model, DEFAULT_MODEL);
        assert_eq!(config.session.voice.as_deref(), Some("Zephyr"));
        assert_eq!(config.audio.output_sample_rate, 24000);
        assert!(config.validate().is_ok());
        assert!(config.validate_for_connect().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [session]
            voice = "Puck"
            system_instruction = "Answer in one sentence."

            [audio]
            chunk_size = 2048
            quantization = "asymmetric"
            "#,
        )
        .unwrap();

        assert_eq!(config.session.voice.as_deref(), Some("Puck"));
        assert_eq!(config.audio.chunk_size, 2048);
        assert_eq!(config.audio.quantization, Quantization::Asymmetric);
        assert_eq!(config.api, ApiConfig::default());
        assert!(config.session.input_transcription);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(AppConfig::from_toml("[audio]\nchunk_size = \"big\""), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("API_KEY", "fallback"),
            ("GEMINI_API_KEY", "primary"),
            ("LIVE_VOICE_MODEL", "models/other"),
            ("LIVE_VOICE_VOICE", "Kore"),
            ("LIVE_VOICE_ENDPOINT", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.api.api_key.as_deref(), Some("primary"));
        assert_eq!(config.api.model, "models/other");
        assert_eq!(config.session.voice.as_deref(), Some("Kore"));
        // Blank values are ignored
        assert_eq!(config.api.endpoint, DEFAULT_ENDPOINT);
        assert!(config.validate_for_connect().is_ok());
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let mut config = AppConfig::default();
        config.audio.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.output_sample_rate = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.api.model = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_options_mapping() {
        let mut config = AppConfig::default();
        config.audio.input_device = Some("USB Mic".to_string());
        config.session.output_transcription = false;
        config.session.connect_timeout_ms = 2500;

        let options = config.session_options();
        assert_eq!(options.capture.device.as_deref(), Some("USB Mic"));
        assert_eq!(options.capture.sample_rate, 16000);
        assert!(!options.request.config.output_transcription);
        assert_eq!(options.connect_timeout, Duration::from_millis(2500));
        assert_eq!(options.request.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_capture_rate_is_fixed() {
        let config = AppConfig::from_toml(
            r#"
            [audio]
            input_sample_rate = 48000
            output_sample_rate = 48000
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());

        let options = config.session_options();
        assert_eq!(options.capture.sample_rate, INPUT_SAMPLE_RATE);
        assert_eq!(options.capture.sample_rate, SampleFormat::outbound().sample_rate);
        assert_eq!(options.playback.sample_rate, 48000);
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/live-voice.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
