//! Wire frame and sample format

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;

use crate::constants::{INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE, WIRE_CHANNELS};
use crate::error::CodecError;

/// Sample encoding carried in a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// 16-bit signed little-endian PCM
    Pcm16Le,
}

/// Declared format of an [`AudioFrame`] payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: Encoding,
}

impl SampleFormat {
    /// Mono 16-bit PCM at the given rate
    pub fn pcm_mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: WIRE_CHANNELS,
            encoding: Encoding::Pcm16Le,
        }
    }

    /// Format of microphone audio sent to the server
    pub fn outbound() -> Self {
        Self::pcm_mono(INPUT_SAMPLE_RATE)
    }

    /// Format of model audio received from the server
    pub fn inbound() -> Self {
        Self::pcm_mono(OUTPUT_SAMPLE_RATE)
    }

    /// MIME-style tag, e.g. `audio/pcm;rate=16000`
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    /// Parse a MIME-style tag. A missing `rate` falls back to the inbound rate;
    /// a zero rate is rejected.
    pub fn parse_mime(mime: &str) -> Result<Self, CodecError> {
        let mut parts = mime.split(';').map(str::trim);
        let base = parts.next().unwrap_or_default();
        if !base.eq_ignore_ascii_case("audio/pcm") && !base.eq_ignore_ascii_case("audio/l16") {
            return Err(CodecError::UnsupportedEncoding(mime.to_string()));
        }

        let mut sample_rate = OUTPUT_SAMPLE_RATE;
        for param in parts {
            if let Some((key, value)) = param.split_once('=') {
                if key.trim().eq_ignore_ascii_case("rate") {
                    sample_rate = value
                        .trim()
                        .parse()
                        .map_err(|_| CodecError::UnsupportedEncoding(mime.to_string()))?;
                }
            }
        }
        if sample_rate == 0 {
            return Err(CodecError::UnsupportedEncoding(mime.to_string()));
        }

        Ok(Self::pcm_mono(sample_rate))
    }
}

/// Immutable unit of audio on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub payload: Bytes,
    pub format: SampleFormat,
}

impl AudioFrame {
    pub fn new(payload: impl Into<Bytes>, format: SampleFormat) -> Self {
        Self {
            payload: payload.into(),
            format,
        }
    }

    /// Unpack a base64 text payload
    pub fn from_base64(data: &str, format: SampleFormat) -> Result<Self, CodecError> {
        let payload = BASE64
            .decode(data.trim())
            .map_err(|e| CodecError::InvalidBase64(e.to_string()))?;
        Ok(Self::new(payload, format))
    }

    /// Pack the payload as base64 text
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.payload)
    }

    /// Number of samples per channel
    pub fn frames(&self) -> usize {
        let channels = self.format.channels.max(1) as usize;
        self.payload.len() / (2 * channels)
    }

    /// Payload duration in seconds
    pub fn duration(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.format.sample_rate as f64
    }
}
