//! Session controller
//!
//! Drives the `Idle -> Connecting -> Active -> Closed` lifecycle. Device
//! threads and the connection only push into channels; everything that
//! touches session state runs in [`SessionController::next_event`] on the
//! caller's task, one input at a time.

use std::collections::VecDeque;

use chrono::Utc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, error, info, info_span, trace, warn, Instrument, Span};
use uuid::Uuid;

use crate::audio::{AudioBackend, CaptureSource, PlaybackScheduler, SegmentId};
use crate::codec::{AudioFrame, PcmDecoder, PcmEncoder, SampleFormat};
use crate::error::{CodecError, Result, SessionError, TransportError};
use crate::session::{SessionEvent, SessionOptions, SessionState, SessionStats};
use crate::transcript::{Speaker, TranscriptAggregator};
use crate::transport::{Connector, InlineAudio, LiveConnection, Outbound, ServerContent, ServerMessage, TransportEvent};

/// Resources held while the session is active
struct Live<B: AudioBackend> {
    input: B::Input,
    scheduler: PlaybackScheduler<B::Output>,
    connection: LiveConnection,
    chunks: UnboundedReceiver<Vec<f32>>,
    finished: UnboundedReceiver<SegmentId>,
}

enum Input {
    Chunk(Vec<f32>),
    Finished(SegmentId),
    Transport(Option<TransportEvent>),
}

/// Owns a single duplex voice session
pub struct SessionController<C: Connector, B: AudioBackend> {
    id: Uuid,
    span: Span,
    connector: C,
    backend: B,
    options: SessionOptions,
    state: SessionState,
    live: Option<Live<B>>,
    encoder: PcmEncoder,
    decoder: PcmDecoder,
    transcript: TranscriptAggregator,
    pending: VecDeque<SessionEvent>,
    stats: SessionStats,
}

impl<C: Connector, B: AudioBackend> SessionController<C, B> {
    pub fn new(connector: C, backend: B, options: SessionOptions) -> Self {
        let id = Uuid::new_v4();
        let span = info_span!("session", id = %id);
        Self {
            id,
            span,
            connector,
            backend,
            encoder: PcmEncoder::outbound(options.quantization),
            options,
            state: SessionState::Idle,
            live: None,
            decoder: PcmDecoder::new(),
            transcript: TranscriptAggregator::new(),
            pending: VecDeque::new(),
            stats: SessionStats::new(id),
        }
    }

    /// Acquire the devices, open the connection and wait for the server to
    /// acknowledge it. On failure everything acquired is released and the
    /// session is back to `Idle`.
    pub async fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Closed => return Err(SessionError::Closed.into()),
            SessionState::Connecting | SessionState::Active => {
                let _enter = self.span.clone().entered();
                warn!(state = %self.state, "start ignored");
                return Ok(());
            }
            SessionState::Idle => {}
        }

        self.set_state(SessionState::Connecting);
        let span = self.span.clone();
        match self.acquire().instrument(span).await {
            Ok(live) => {
                self.live = Some(live);
                self.stats.started_at = Some(Utc::now());
                self.set_state(SessionState::Active);
                Ok(())
            }
            Err(e) => {
                let _enter = self.span.clone().entered();
                error!("failed to start session: {}", e);
                self.pending.push_back(SessionEvent::Error(e.to_string()));
                self.set_state(SessionState::Idle);
                Err(e)
            }
        }
    }

    async fn acquire(&self) -> Result<Live<B>> {
        let options = &self.options;

        let mut input = self.backend.open_input(&options.capture)?;
        debug!("microphone acquired");

        let (finished_tx, finished) = unbounded_channel();
        let output = match self.backend.open_output(&options.playback, finished_tx) {
            Ok(output) => output,
            Err(e) => {
                input.close();
                return Err(e.into());
            }
        };
        let mut scheduler = PlaybackScheduler::new(output);
        debug!("output device acquired");

        let release = |input: &mut B::Input, scheduler: &mut PlaybackScheduler<B::Output>| {
            input.close();
            scheduler.close();
        };

        let mut connection = match self.connector.connect(options.request.clone()).await {
            Ok(connection) => connection,
            Err(e) => {
                release(&mut input, &mut scheduler);
                return Err(e.into());
            }
        };

        let opened = tokio::time::timeout(options.connect_timeout, wait_for_open(&mut connection)).await;
        let opened = match opened {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };
        if let Err(e) = opened {
            connection.send(Outbound::Close);
            release(&mut input, &mut scheduler);
            return Err(e.into());
        }

        let (chunks_tx, chunks) = unbounded_channel();
        if let Err(e) = input.start(chunks_tx) {
            connection.send(Outbound::Close);
            release(&mut input, &mut scheduler);
            return Err(e.into());
        }

        info!(model = %options.request.model, "session active");
        Ok(Live {
            input,
            scheduler,
            connection,
            chunks,
            finished,
        })
    }

    /// Close the session. Releases the devices and the connection the first
    /// time; later calls do nothing.
    pub fn stop(&mut self) {
        self.close("stopped by user");
    }

    /// Run the control loop until something user-visible happens.
    /// Returns `None` once there is no live session left to drive.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            let live = self.live.as_mut()?;
            let input = tokio::select! {
                biased;
                event = live.connection.events.recv() => Input::Transport(event),
                Some(id) = live.finished.recv() => Input::Finished(id),
                Some(chunk) = live.chunks.recv() => Input::Chunk(chunk),
            };

            let _enter = self.span.clone().entered();
            match input {
                Input::Chunk(samples) => self.send_chunk(&samples),
                Input::Finished(id) => {
                    if let Some(live) = self.live.as_mut() {
                        live.scheduler.on_finished(id);
                    }
                }
                Input::Transport(Some(event)) => self.on_transport(event),
                Input::Transport(None) => self.close("connection dropped"),
            }
        }
    }

    /// Discard all scheduled playback, as on a server interruption
    pub fn flush_playback(&mut self) -> Result<usize> {
        let live = self.live.as_mut().ok_or(SessionError::NotActive)?;
        Ok(live.scheduler.flush())
    }

    fn send_chunk(&mut self, samples: &[f32]) {
        let Some(live) = self.live.as_ref() else {
            return;
        };
        let frame = self.encoder.encode(samples);
        let bytes = frame.payload.len();
        if live.connection.send(Outbound::Audio(frame)) {
            self.stats.frames_sent += 1;
            trace!(bytes, "frame sent");
        } else {
            debug!("connection gone, dropping microphone frame");
        }
    }

    fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {}
            TransportEvent::Message(message) => self.on_message(message),
            TransportEvent::Error(message) => {
                error!("transport error: {}", message);
                self.pending.push_back(SessionEvent::Error(message.clone()));
                self.close(&message);
            }
            TransportEvent::Closed { reason } => {
                info!(reason = %reason, "connection closed by server");
                self.close(&reason);
            }
        }
    }

    fn on_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Content(content) => self.on_content(content),
            ServerMessage::GoAway { time_left } => {
                info!(time_left = ?time_left, "server going away");
                self.close("server going away");
            }
            ServerMessage::SetupComplete | ServerMessage::Other => {}
        }
    }

    fn on_content(&mut self, content: ServerContent) {
        if let Some(text) = content.input_transcription {
            self.transcript.push_input(&text);
            self.pending.push_back(SessionEvent::PartialTranscript {
                speaker: Speaker::User,
                text,
            });
        }
        if let Some(text) = content.output_transcription {
            self.transcript.push_output(&text);
            self.pending.push_back(SessionEvent::PartialTranscript {
                speaker: Speaker::Model,
                text,
            });
        }

        // Audio in the same message as an interruption belongs to the new response
        if content.interrupted {
            if let Some(live) = self.live.as_mut() {
                let flushed = live.scheduler.flush();
                self.stats.interruptions += 1;
                info!(flushed, "interrupted");
                self.pending.push_back(SessionEvent::Interrupted { flushed });
            }
        }

        for audio in &content.audio {
            self.stats.frames_received += 1;
            if let Err(e) = self.play(audio) {
                self.stats.decode_errors += 1;
                warn!(mime = %audio.mime_type, "dropping undecodable frame: {}", e);
            }
        }

        if content.turn_complete {
            let turns = self.transcript.complete_turn();
            self.stats.turns_completed += 1;
            debug!(entries = turns.len(), "turn complete");
            self.pending.extend(turns.into_iter().map(SessionEvent::Turn));
        }
    }

    fn play(&mut self, audio: &InlineAudio) -> std::result::Result<(), CodecError> {
        let format = SampleFormat::parse_mime(&audio.mime_type)?;
        let frame = AudioFrame::from_base64(&audio.data, format)?;
        let buffer = self.decoder.decode_native(&frame)?;

        // Decoded after close: nothing to schedule on
        let Some(live) = self.live.as_mut() else {
            return Ok(());
        };
        let segment = live.scheduler.schedule(&buffer);
        self.stats.segments_scheduled += 1;
        debug!(id = segment.id.0, start = segment.start_time, "scheduled model audio");
        Ok(())
    }

    fn close(&mut self, reason: &str) {
        let _enter = self.span.clone().entered();
        if let Some(mut live) = self.live.take() {
            live.input.close();
            live.scheduler.close();
            live.connection.send(Outbound::Close);
            self.transcript.discard_pending();
            self.stats.ended_at = Some(Utc::now());
            info!(
                reason,
                frames_sent = self.stats.frames_sent,
                frames_received = self.stats.frames_received,
                "session closed"
            );
        }
        self.set_state(SessionState::Closed);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "state change");
        self.state = state;
        self.pending.push_back(SessionEvent::StateChanged(state));
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn transcript(&self) -> &TranscriptAggregator {
        &self.transcript
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.clone()
    }
}

impl<C: Connector, B: AudioBackend> Drop for SessionController<C, B> {
    fn drop(&mut self) {
        if self.live.is_some() {
            self.close("session dropped");
        }
    }
}

/// Wait for the server to acknowledge setup, skipping anything before it
async fn wait_for_open(connection: &mut LiveConnection) -> std::result::Result<(), TransportError> {
    let mut last_error = None;
    loop {
        match connection.events.recv().await {
            Some(TransportEvent::Open) => return Ok(()),
            Some(TransportEvent::Message(message)) => {
                debug!(?message, "message before setup acknowledged");
            }
            Some(TransportEvent::Error(message)) => {
                warn!("error during setup: {}", message);
                last_error = Some(message);
            }
            Some(TransportEvent::Closed { reason }) => {
                return Err(TransportError::ClosedDuringSetup(last_error.unwrap_or(reason)));
            }
            None => {
                return Err(TransportError::ClosedDuringSetup(
                    last_error.unwrap_or_else(|| "connection ended".to_string()),
                ))
            }
        }
    }
}
