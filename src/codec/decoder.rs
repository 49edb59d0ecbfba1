//! Inbound PCM decoder
//!
//! Turns 16-bit PCM wire frames into per-channel float buffers for playback.

use crate::codec::frame::{AudioFrame, Encoding};
use crate::error::CodecError;

/// Decoded, de-interleaved audio ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    /// Build a buffer from per-channel samples. All channels must have equal length.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        debug_assert!(channels.windows(2).all(|w| w[0].len() == w[1].len()));
        Self {
            sample_rate,
            channels,
        }
    }

    /// Single-channel buffer
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self::new(sample_rate, vec![samples])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Average all channels into one
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.frames())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

/// PCM decoder for the inbound (model audio) direction
#[derive(Default)]
pub struct PcmDecoder {
    /// Frames decoded
    frames_decoded: u64,
    /// Frames rejected as malformed
    frames_rejected: u64,
    /// Total samples produced (all channels)
    samples_produced: u64,
}

impl PcmDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a frame into a playback buffer with the given rate and channel count.
    ///
    /// The payload must be non-empty and hold a whole number of
    /// `channels`-wide 16-bit frames.
    pub fn decode(
        &mut self,
        frame: &AudioFrame,
        sample_rate: u32,
        channels: u16,
    ) -> Result<PcmBuffer, CodecError> {
        match Self::decode_payload(frame, sample_rate, channels) {
            Ok(buffer) => {
                self.frames_decoded += 1;
                self.samples_produced += (buffer.frames() * buffer.channel_count()) as u64;
                Ok(buffer)
            }
            Err(e) => {
                self.frames_rejected += 1;
                Err(e)
            }
        }
    }

    /// Decode using the rate and channel count the frame declares
    pub fn decode_native(&mut self, frame: &AudioFrame) -> Result<PcmBuffer, CodecError> {
        self.decode(frame, frame.format.sample_rate, frame.format.channels)
    }

    fn decode_payload(
        frame: &AudioFrame,
        sample_rate: u32,
        channels: u16,
    ) -> Result<PcmBuffer, CodecError> {
        match frame.format.encoding {
            Encoding::Pcm16Le => {}
        }
        if channels == 0 {
            return Err(CodecError::InvalidChannels(channels));
        }

        let data = &frame.payload;
        if data.is_empty() {
            return Err(CodecError::EmptyPayload);
        }
        let stride = 2 * channels as usize;
        if data.len() % stride != 0 {
            return Err(CodecError::TruncatedPayload {
                len: data.len(),
                channels,
            });
        }

        let frame_count = data.len() / stride;
        let mut out = vec![Vec::with_capacity(frame_count); channels as usize];
        for (i, pair) in data.chunks_exact(2).enumerate() {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            out[i % channels as usize].push(sample as f32 / 32768.0);
        }

        Ok(PcmBuffer::new(sample_rate, out))
    }

    /// Get statistics
    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            frames_decoded: self.frames_decoded,
            frames_rejected: self.frames_rejected,
            samples_produced: self.samples_produced,
        }
    }
}

/// Decoder statistics
#[derive(Debug, Clone)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub frames_rejected: u64,
    pub samples_produced: u64,
}
