//! Outbound PCM encoder
//!
//! Quantizes floating-point microphone samples to 16-bit little-endian PCM.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::frame::{AudioFrame, SampleFormat};

/// How float samples map onto the 16-bit range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    /// `round(s * 32768)`, saturated to `[-32768, 32767]`
    #[default]
    Symmetric,
    /// Negative samples scale by 32768, non-negative by 32767.
    /// Bit-exact with the browser client's wire format.
    Asymmetric,
}

impl Quantization {
    /// Quantize one sample. Input outside `[-1, 1]` is clamped and NaN maps to 0.
    #[inline]
    pub fn quantize(self, sample: f32) -> i16 {
        if sample.is_nan() {
            return 0;
        }
        let s = sample.clamp(-1.0, 1.0);
        let scaled = match self {
            Quantization::Symmetric => s * 32768.0,
            Quantization::Asymmetric if s < 0.0 => s * 32768.0,
            Quantization::Asymmetric => s * 32767.0,
        };
        scaled.round().clamp(-32768.0, 32767.0) as i16
    }
}

/// PCM encoder for the outbound (microphone) direction
pub struct PcmEncoder {
    format: SampleFormat,
    quantization: Quantization,
    /// Frames produced
    frames_encoded: u64,
    /// Samples that had to be clamped
    samples_clipped: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl PcmEncoder {
    /// Create an encoder producing frames in the given format
    pub fn new(format: SampleFormat, quantization: Quantization) -> Self {
        Self {
            format,
            quantization,
            frames_encoded: 0,
            samples_clipped: 0,
            bytes_produced: 0,
        }
    }

    /// Encoder for the fixed 16 kHz mono outbound format
    pub fn outbound(quantization: Quantization) -> Self {
        Self::new(SampleFormat::outbound(), quantization)
    }

    /// Encode a chunk of mono samples into a wire frame
    pub fn encode(&mut self, samples: &[f32]) -> AudioFrame {
        let mut payload = BytesMut::with_capacity(samples.len() * 2);
        for &sample in samples {
            if !(-1.0..=1.0).contains(&sample) {
                self.samples_clipped += 1;
            }
            payload.put_i16_le(self.quantization.quantize(sample));
        }

        self.frames_encoded += 1;
        self.bytes_produced += payload.len() as u64;

        AudioFrame::new(payload.freeze(), self.format)
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn quantization(&self) -> Quantization {
        self.quantization
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
            samples_clipped: self.samples_clipped,
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    pub samples_clipped: u64,
}
