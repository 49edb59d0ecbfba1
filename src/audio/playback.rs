//! Speaker output with a sample-accurate timeline
//!
//! The output callback mixes every scheduled segment whose window overlaps
//! the block being rendered. The device clock is the number of frames
//! rendered so far, so start times computed by the scheduler land on exact
//! sample positions.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, StreamConfig};
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::audio::device::{default_config_error, output_device};
use crate::audio::resampler::LinearResampler;
use crate::audio::{PlaybackSegment, PlaybackSettings, PlaybackSink, SegmentId};
use crate::error::AudioError;

struct Voice {
    id: SegmentId,
    /// Mono samples at the device rate
    samples: Vec<f32>,
    start_frame: u64,
}

impl Voice {
    /// Convert a segment to the device rate. The voice covers exactly the
    /// frames between its rounded start and end positions, so back-to-back
    /// segments tile the timeline.
    fn prepare(segment: &PlaybackSegment, rate: u32) -> Self {
        let start_frame = (segment.start_time * rate as f64).round() as u64;
        let end_frame = (segment.end_time() * rate as f64).round() as u64;
        let frames = end_frame.saturating_sub(start_frame) as usize;

        let mut samples = if segment.sample_rate == rate {
            segment.samples.to_vec()
        } else {
            LinearResampler::resample_all(segment.sample_rate, rate, &segment.samples)
        };
        // Interpolation stops at the last input sample; hold it for the tail
        let tail = samples.last().copied().unwrap_or(0.0);
        samples.resize(frames, tail);

        Self {
            id: segment.id,
            samples,
            start_frame,
        }
    }

    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Timeline mixer shared between the session and the output callback
pub struct Mixer {
    rate: u32,
    frames_rendered: u64,
    voices: Vec<Voice>,
    finished: UnboundedSender<SegmentId>,
}

impl Mixer {
    pub fn new(rate: u32, finished: UnboundedSender<SegmentId>) -> Self {
        Self {
            rate,
            frames_rendered: 0,
            voices: Vec::new(),
            finished,
        }
    }

    /// Device clock in seconds
    pub fn now(&self) -> f64 {
        self.frames_rendered as f64 / self.rate as f64
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Add a segment, converting it to the device rate
    pub fn add(&mut self, segment: &PlaybackSegment) {
        let voice = Voice::prepare(segment, self.rate);
        self.insert(voice);
    }

    fn insert(&mut self, mut voice: Voice) {
        // A segment scheduled just behind the clock plays in full, slightly late
        voice.start_frame = voice.start_frame.max(self.frames_rendered);
        self.voices.push(voice);
    }

    /// Drop a segment without reporting completion
    pub fn remove(&mut self, id: SegmentId) {
        self.voices.retain(|v| v.id != id);
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Render the next `out.len()` mono frames and advance the clock
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let block_start = self.frames_rendered;
        let block_end = block_start + out.len() as u64;

        for voice in &self.voices {
            let from = voice.start_frame.max(block_start);
            let to = voice.end_frame().min(block_end);
            for frame in from..to {
                out[(frame - block_start) as usize] += voice.samples[(frame - voice.start_frame) as usize];
            }
        }
        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.frames_rendered = block_end;

        let finished = &self.finished;
        self.voices.retain(|voice| {
            if voice.end_frame() <= block_end {
                let _ = finished.send(voice.id);
                false
            } else {
                true
            }
        });
    }
}

/// Speaker output on a cpal device
pub struct CpalPlayback {
    settings: PlaybackSettings,
    mixer: Arc<Mutex<Mixer>>,
    /// Device rate, fixed once the stream is built
    rate: u32,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalPlayback {
    /// Open the output device and start rendering silence
    pub fn open(settings: PlaybackSettings, finished: UnboundedSender<SegmentId>) -> Result<Self, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<Arc<Mutex<Mixer>>, AudioError>>(1);

        let thread_settings = settings.clone();
        let thread_running = running.clone();

        let handle = thread::Builder::new()
            .name("live-voice-playback".to_string())
            .spawn(move || {
                let stream = match build_playback_stream(&thread_settings, finished) {
                    Ok((stream, mixer)) => {
                        let _ = ready_tx.send(Ok(mixer));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while thread_running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }

                drop(stream);
                debug!("playback stream released");
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(mixer)) => {
                let rate = mixer.lock().rate();
                info!(device_rate = rate, "speaker acquired");
                Ok(Self {
                    settings,
                    mixer,
                    rate,
                    running,
                    thread_handle: Some(handle),
                })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::StreamError("playback thread exited during setup".to_string()))
            }
        }
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }
}

impl PlaybackSink for CpalPlayback {
    fn now(&self) -> f64 {
        self.mixer.lock().now()
    }

    fn play(&mut self, segment: &PlaybackSegment) {
        // Resample outside the lock the output callback contends on
        let voice = Voice::prepare(segment, self.rate);
        self.mixer.lock().insert(voice);
    }

    fn stop(&mut self, id: SegmentId) {
        self.mixer.lock().remove(id);
    }

    fn close(&mut self) {
        self.mixer.lock().clear();
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.close();
    }
}

fn choose_config(device: &cpal::Device, preferred_rate: u32) -> Result<(StreamConfig, cpal::SampleFormat), AudioError> {
    let default_config = device
        .default_output_config()
        .map_err(|e| default_config_error(e, false))?;

    let preferred = cpal::SampleRate(preferred_rate);
    let native = device.supported_output_configs().ok().and_then(|mut configs| {
        configs.find(|c| {
            c.sample_format() == default_config.sample_format()
                && c.min_sample_rate() <= preferred
                && preferred <= c.max_sample_rate()
        })
    });

    let supported = match native {
        Some(range) => range.with_sample_rate(preferred),
        None => default_config,
    };
    Ok((supported.config(), supported.sample_format()))
}

fn build_playback_stream(
    settings: &PlaybackSettings,
    finished: UnboundedSender<SegmentId>,
) -> Result<(cpal::Stream, Arc<Mutex<Mixer>>), AudioError> {
    let device = output_device(settings.device.as_deref())?;
    let (config, format) = choose_config(&device, settings.sample_rate)?;
    let mixer = Arc::new(Mutex::new(Mixer::new(config.sample_rate.0, finished)));

    let stream = match format {
        cpal::SampleFormat::F32 => build_typed::<f32>(&device, &config, mixer.clone()),
        cpal::SampleFormat::I16 => build_typed::<i16>(&device, &config, mixer.clone()),
        cpal::SampleFormat::U16 => build_typed::<u16>(&device, &config, mixer.clone()),
        cpal::SampleFormat::I32 => build_typed::<i32>(&device, &config, mixer.clone()),
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    }
    .map_err(|e| AudioError::StreamError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    Ok((stream, mixer))
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let mut mono: Vec<f32> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            mono.resize(frames, 0.0);
            mixer.lock().render(&mut mono);

            for (frame, &value) in data.chunks_exact_mut(channels).zip(mono.iter()) {
                let sample = value.to_sample::<T>();
                frame.fill(sample);
            }
        },
        move |err| error!("playback stream error: {}", err),
        None,
    )
}
