//! In-memory audio backend and connector for unit tests

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::audio::{
    AudioBackend, CaptureSettings, CaptureSource, PlaybackSegment, PlaybackSettings, PlaybackSink, SegmentId,
};
use crate::error::{AudioError, TransportError};
use crate::transport::{ConnectRequest, Connector, LiveConnection, Outbound, TransportEvent};

#[derive(Default)]
struct SinkState {
    now: f64,
    played: Vec<PlaybackSegment>,
    playing: Vec<SegmentId>,
    stopped: Vec<SegmentId>,
    closes: usize,
    finished: Option<UnboundedSender<SegmentId>>,
}

/// Playback sink with a hand-driven clock
#[derive(Clone, Default)]
pub struct FakeSink {
    state: Arc<Mutex<SinkState>>,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_finished(finished: UnboundedSender<SegmentId>) -> Self {
        let sink = Self::new();
        sink.state.lock().finished = Some(finished);
        sink
    }

    pub fn set_now(&self, now: f64) {
        self.state.lock().now = now;
    }

    /// Segments handed to `play` and neither stopped nor finished
    pub fn playing(&self) -> Vec<SegmentId> {
        self.state.lock().playing.clone()
    }

    /// Every segment ever handed to `play`
    pub fn segments(&self) -> Vec<PlaybackSegment> {
        self.state.lock().played.clone()
    }

    pub fn stopped(&self) -> Vec<SegmentId> {
        self.state.lock().stopped.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    /// Play a segment out, reporting it on the finished channel
    pub fn finish(&self, id: SegmentId) {
        let mut state = self.state.lock();
        state.playing.retain(|playing| *playing != id);
        if let Some(finished) = &state.finished {
            let _ = finished.send(id);
        }
    }
}

impl PlaybackSink for FakeSink {
    fn now(&self) -> f64 {
        self.state.lock().now
    }

    fn play(&mut self, segment: &PlaybackSegment) {
        let mut state = self.state.lock();
        state.playing.push(segment.id);
        state.played.push(segment.clone());
    }

    fn stop(&mut self, id: SegmentId) {
        let mut state = self.state.lock();
        state.playing.retain(|playing| *playing != id);
        state.stopped.push(id);
    }

    fn close(&mut self) {
        self.state.lock().closes += 1;
    }
}

#[derive(Default)]
struct MicState {
    chunks: Option<UnboundedSender<Vec<f32>>>,
    closes: usize,
}

/// Microphone whose chunks are pushed by the test
#[derive(Clone, Default)]
pub struct FakeMic {
    state: Arc<Mutex<MicState>>,
}

impl FakeMic {
    /// Deliver one chunk. Returns false when capture is not started.
    pub fn push(&self, chunk: Vec<f32>) -> bool {
        match &self.state.lock().chunks {
            Some(chunks) => chunks.send(chunk).is_ok(),
            None => false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().chunks.is_some()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }
}

impl CaptureSource for FakeMic {
    fn start(&mut self, chunks: UnboundedSender<Vec<f32>>) -> Result<(), AudioError> {
        self.state.lock().chunks = Some(chunks);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.chunks = None;
        state.closes += 1;
    }
}

#[derive(Default)]
struct BackendState {
    deny_input: bool,
    fail_output: bool,
    mics: Vec<FakeMic>,
    sinks: Vec<FakeSink>,
}

/// Audio backend that records every device it hands out
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the microphone as a user would
    pub fn deny_microphone(self) -> Self {
        self.state.lock().deny_input = true;
        self
    }

    pub fn fail_output(self) -> Self {
        self.state.lock().fail_output = true;
        self
    }

    pub fn mics(&self) -> Vec<FakeMic> {
        self.state.lock().mics.clone()
    }

    pub fn sinks(&self) -> Vec<FakeSink> {
        self.state.lock().sinks.clone()
    }

    /// Most recently opened microphone
    pub fn mic(&self) -> FakeMic {
        self.state.lock().mics.last().cloned().expect("no microphone opened")
    }

    /// Most recently opened sink
    pub fn sink(&self) -> FakeSink {
        self.state.lock().sinks.last().cloned().expect("no sink opened")
    }
}

impl AudioBackend for FakeBackend {
    type Input = FakeMic;
    type Output = FakeSink;

    fn open_input(&self, _settings: &CaptureSettings) -> Result<FakeMic, AudioError> {
        let mut state = self.state.lock();
        if state.deny_input {
            return Err(AudioError::PermissionDenied("denied by test".to_string()));
        }
        let mic = FakeMic::default();
        state.mics.push(mic.clone());
        Ok(mic)
    }

    fn open_output(
        &self,
        _settings: &PlaybackSettings,
        finished: UnboundedSender<SegmentId>,
    ) -> Result<FakeSink, AudioError> {
        let mut state = self.state.lock();
        if state.fail_output {
            return Err(AudioError::DeviceNotFound("no speakers".to_string()));
        }
        let sink = FakeSink::with_finished(finished);
        state.sinks.push(sink.clone());
        Ok(sink)
    }
}

/// Server side of a fake connection
pub struct FakeServer {
    pub events: UnboundedSender<TransportEvent>,
    pub received: UnboundedReceiver<Outbound>,
    pub request: ConnectRequest,
}

impl FakeServer {
    pub fn send_json(&self, json: &str) {
        let message = crate::transport::ServerMessage::parse(json).expect("valid server message");
        let _ = self.events.send(TransportEvent::Message(message));
    }

    /// Everything the client has sent so far
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(message) = self.received.try_recv() {
            out.push(message);
        }
        out
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Acknowledge the setup immediately
    Open,
    /// Connect but never acknowledge
    Silent,
    /// Acknowledge nothing and close straight away
    CloseDuringSetup,
    Refuse,
}

/// Connector handing each server side to the test through a channel
pub struct FakeConnector {
    mode: ConnectMode,
    servers: UnboundedSender<FakeServer>,
    attempts: Arc<Mutex<usize>>,
}

impl FakeConnector {
    pub fn new(mode: ConnectMode) -> (Self, UnboundedReceiver<FakeServer>) {
        let (servers, rx) = unbounded_channel();
        (
            Self {
                mode,
                servers,
                attempts: Arc::new(Mutex::new(0)),
            },
            rx,
        )
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

impl Connector for FakeConnector {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'static, Result<LiveConnection, TransportError>> {
        *self.attempts.lock() += 1;
        let mode = self.mode;
        let servers = self.servers.clone();

        async move {
            if mode == ConnectMode::Refuse {
                return Err(TransportError::ConnectionFailed("refused by test".to_string()));
            }

            let (outbound_tx, outbound_rx) = unbounded_channel();
            let (events_tx, events_rx) = unbounded_channel();
            match mode {
                ConnectMode::Open => {
                    let _ = events_tx.send(TransportEvent::Open);
                }
                ConnectMode::CloseDuringSetup => {
                    let _ = events_tx.send(TransportEvent::Closed {
                        reason: "quota exceeded".to_string(),
                    });
                }
                ConnectMode::Silent | ConnectMode::Refuse => {}
            }

            let _ = servers.send(FakeServer {
                events: events_tx,
                received: outbound_rx,
                request,
            });

            Ok(LiveConnection {
                outbound: outbound_tx,
                events: events_rx,
            })
        }
        .boxed()
    }
}
