//! Microphone capture
//!
//! The cpal stream lives on a dedicated thread for its whole lifetime.
//! Opening the capture acquires the device (so a refused microphone fails
//! up front); samples are only delivered once [`CaptureSource::start`] hands
//! over a channel.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, StreamConfig};
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::audio::device::{default_config_error, input_device, input_open_error};
use crate::audio::resampler::LinearResampler;
use crate::audio::{CaptureSettings, CaptureSource};
use crate::error::AudioError;

type ChunkSender = Arc<Mutex<Option<UnboundedSender<Vec<f32>>>>>;

/// Down-mix, resample and chunk raw device audio
pub struct CapturePipeline {
    channels: usize,
    resampler: LinearResampler,
    chunk_size: usize,
    pending: Vec<f32>,
}

impl CapturePipeline {
    pub fn new(device_rate: u32, channels: u16, target_rate: u32, chunk_size: usize) -> Result<Self, AudioError> {
        let resampler = LinearResampler::new(device_rate, target_rate).ok_or_else(|| {
            AudioError::UnsupportedFormat(format!("{} Hz -> {} Hz", device_rate, target_rate))
        })?;
        if channels == 0 || chunk_size == 0 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{} channels, chunk of {}",
                channels, chunk_size
            )));
        }
        Ok(Self {
            channels: channels as usize,
            resampler,
            chunk_size,
            pending: Vec::with_capacity(chunk_size * 2),
        })
    }

    /// Feed interleaved device samples; returns every chunk completed by them
    pub fn push_interleaved(&mut self, data: &[f32]) -> Vec<Vec<f32>> {
        let mono: Vec<f32> = if self.channels == 1 {
            data.to_vec()
        } else {
            data.chunks_exact(self.channels)
                .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
                .collect()
        };

        self.pending.extend(self.resampler.process(&mono));

        let mut chunks = Vec::new();
        while self.pending.len() >= self.chunk_size {
            chunks.push(self.pending.drain(..self.chunk_size).collect());
        }
        chunks
    }

    /// Drop buffered partial audio
    pub fn reset(&mut self) {
        self.pending.clear();
        self.resampler.reset();
    }
}

/// Microphone capture on a cpal input device
pub struct CpalCapture {
    settings: CaptureSettings,

    /// Whether the stream thread should keep running
    running: Arc<AtomicBool>,

    /// Destination for chunks, set by `start`
    delivery: ChunkSender,

    /// Stream thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Chunks handed to the session
    chunks_delivered: Arc<AtomicU64>,

    device_rate: u32,
    device_channels: u16,
}

impl CpalCapture {
    /// Acquire the input device and start its stream without delivering audio
    pub fn open(settings: CaptureSettings) -> Result<Self, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let delivery: ChunkSender = Arc::new(Mutex::new(None));
        let chunks_delivered = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = bounded::<Result<(u32, u16), AudioError>>(1);

        let thread_settings = settings.clone();
        let thread_running = running.clone();
        let thread_delivery = delivery.clone();
        let thread_delivered = chunks_delivered.clone();

        let handle = thread::Builder::new()
            .name("live-voice-capture".to_string())
            .spawn(move || {
                let stream = match build_capture_stream(&thread_settings, thread_delivery, thread_delivered) {
                    Ok((stream, rate, channels)) => {
                        let _ = ready_tx.send(Ok((rate, channels)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Keep thread alive while running
                while thread_running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }

                // Stream is dropped here, releasing the microphone
                drop(stream);
                debug!("capture stream released");
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok((device_rate, device_channels))) => {
                info!(
                    device_rate,
                    device_channels,
                    target_rate = settings.sample_rate,
                    "microphone acquired"
                );
                Ok(Self {
                    settings,
                    running,
                    delivery,
                    thread_handle: Some(handle),
                    chunks_delivered,
                    device_rate,
                    device_channels,
                })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::StreamError("capture thread exited during setup".to_string()))
            }
        }
    }

    pub fn chunks_delivered(&self) -> u64 {
        self.chunks_delivered.load(Ordering::Relaxed)
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    pub fn device_channels(&self) -> u16 {
        self.device_channels
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl CaptureSource for CpalCapture {
    fn start(&mut self, chunks: UnboundedSender<Vec<f32>>) -> Result<(), AudioError> {
        if !self.is_running() {
            return Err(AudioError::Closed);
        }
        *self.delivery.lock() = Some(chunks);
        Ok(())
    }

    fn close(&mut self) {
        self.delivery.lock().take();
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pick a stream config, preferring the target rate so no resampling is needed
fn choose_config(device: &cpal::Device, target_rate: u32) -> Result<(StreamConfig, cpal::SampleFormat), AudioError> {
    let default_config = device
        .default_input_config()
        .map_err(|e| default_config_error(e, true))?;

    let target = cpal::SampleRate(target_rate);
    let native = device.supported_input_configs().ok().and_then(|mut configs| {
        configs.find(|c| {
            c.sample_format() == default_config.sample_format()
                && c.min_sample_rate() <= target
                && target <= c.max_sample_rate()
        })
    });

    let supported = match native {
        Some(range) => range.with_sample_rate(target),
        None => default_config,
    };
    Ok((supported.config(), supported.sample_format()))
}

fn build_capture_stream(
    settings: &CaptureSettings,
    delivery: ChunkSender,
    delivered: Arc<AtomicU64>,
) -> Result<(cpal::Stream, u32, u16), AudioError> {
    let device = input_device(settings.device.as_deref())?;
    let (config, format) = choose_config(&device, settings.sample_rate)?;
    let rate = config.sample_rate.0;
    let channels = config.channels;

    let pipeline = CapturePipeline::new(rate, channels, settings.sample_rate, settings.chunk_size)?;

    let stream = match format {
        cpal::SampleFormat::F32 => build_typed::<f32>(&device, &config, pipeline, delivery, delivered),
        cpal::SampleFormat::I16 => build_typed::<i16>(&device, &config, pipeline, delivery, delivered),
        cpal::SampleFormat::U16 => build_typed::<u16>(&device, &config, pipeline, delivery, delivered),
        cpal::SampleFormat::I32 => build_typed::<i32>(&device, &config, pipeline, delivery, delivered),
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    }
    .map_err(input_open_error)?;

    stream.play().map_err(|e| match e {
        cpal::PlayStreamError::DeviceNotAvailable => {
            AudioError::PermissionDenied("input device is not available".to_string())
        }
        other => AudioError::StreamError(other.to_string()),
    })?;

    Ok((stream, rate, channels))
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut pipeline: CapturePipeline,
    delivery: ChunkSender,
    delivered: Arc<AtomicU64>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut scratch: Vec<f32> = Vec::new();

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let guard = delivery.lock();
            let Some(tx) = guard.as_ref() else {
                // Acquired but not wired to a session yet
                return;
            };

            scratch.clear();
            scratch.extend(data.iter().map(|&s| s.to_sample::<f32>()));

            for chunk in pipeline.push_interleaved(&scratch) {
                if tx.send(chunk).is_err() {
                    break;
                }
                delivered.fetch_add(1, Ordering::Relaxed);
            }
        },
        move |err| error!("capture stream error: {}", err),
        None,
    )
}
