//! Audio subsystem module
//!
//! The session talks to audio hardware only through [`AudioBackend`],
//! [`CaptureSource`] and [`PlaybackSink`]. [`CpalBackend`] is the real
//! implementation; tests substitute in-memory fakes.

pub mod capture;
pub mod device;
pub mod playback;
pub mod resampler;
pub mod scheduler;

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::constants::{DEFAULT_CAPTURE_CHUNK, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::error::AudioError;

pub use capture::CpalCapture;
pub use device::{list_devices, AudioDeviceInfo, CpalBackend};
pub use playback::CpalPlayback;
pub use resampler::LinearResampler;
pub use scheduler::{PlaybackScheduler, SchedulerStats};

/// Identifier of a scheduled playback segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub u64);

/// A decoded buffer placed on the output timeline
#[derive(Debug, Clone)]
pub struct PlaybackSegment {
    pub id: SegmentId,
    /// Mono samples at `sample_rate`
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    /// Start offset on the device clock, in seconds
    pub start_time: f64,
}

impl PlaybackSegment {
    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Scheduled end on the device clock
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration()
    }
}

/// Microphone settings
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Device name; `None` selects the default input
    pub device: Option<String>,
    /// Rate delivered to the session (resampled if the device differs)
    pub sample_rate: u32,
    /// Samples per delivered chunk
    pub chunk_size: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: INPUT_SAMPLE_RATE,
            chunk_size: DEFAULT_CAPTURE_CHUNK,
        }
    }
}

/// Speaker settings
#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    /// Device name; `None` selects the default output
    pub device: Option<String>,
    /// Preferred rate for the output context
    pub sample_rate: u32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: OUTPUT_SAMPLE_RATE,
        }
    }
}

/// Acquired microphone stream
pub trait CaptureSource: Send {
    /// Begin delivering mono chunks of `chunk_size` samples
    fn start(&mut self, chunks: UnboundedSender<Vec<f32>>) -> Result<(), AudioError>;

    /// Stop capturing and release the device. Safe to call more than once.
    fn close(&mut self);
}

/// Output device context with its own clock
pub trait PlaybackSink: Send {
    /// Current device clock, in seconds
    fn now(&self) -> f64;

    /// Queue a segment to start at `segment.start_time`. The sink reports
    /// the id on its finished channel when the segment plays out.
    fn play(&mut self, segment: &PlaybackSegment);

    /// Cut a segment off immediately. Stopped segments are not reported.
    fn stop(&mut self, id: SegmentId);

    /// Release the device. Safe to call more than once.
    fn close(&mut self);
}

/// Factory for device contexts
pub trait AudioBackend: Send + Sync {
    type Input: CaptureSource + 'static;
    type Output: PlaybackSink + 'static;

    fn open_input(&self, settings: &CaptureSettings) -> Result<Self::Input, AudioError>;

    fn open_output(
        &self,
        settings: &PlaybackSettings,
        finished: UnboundedSender<SegmentId>,
    ) -> Result<Self::Output, AudioError>;
}
