//! Gapless playback scheduling
//!
//! Segments arrive at irregular intervals but must play back-to-back on a
//! single output timeline. The scheduler keeps a cursor (`next_start_time`)
//! that never moves backwards except on [`PlaybackScheduler::flush`], which
//! implements barge-in: everything queued or playing is stopped at once.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::audio::{PlaybackSegment, PlaybackSink, SegmentId};
use crate::codec::PcmBuffer;

/// Sequences decoded buffers onto one output timeline
pub struct PlaybackScheduler<S: PlaybackSink> {
    sink: S,
    /// Where the next segment starts, in device-clock seconds
    next_start_time: f64,
    /// Scheduled segments that have not finished yet
    active: BTreeMap<SegmentId, PlaybackSegment>,
    next_id: u64,
    closed: bool,
    stats: SchedulerStats,
}

impl<S: PlaybackSink> PlaybackScheduler<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            next_start_time: 0.0,
            active: BTreeMap::new(),
            next_id: 0,
            closed: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Queue a buffer right after everything already scheduled, or now if
    /// the timeline has drained.
    pub fn schedule(&mut self, buffer: &PcmBuffer) -> PlaybackSegment {
        let now = self.sink.now();
        self.next_start_time = self.next_start_time.max(now);

        let segment = PlaybackSegment {
            id: SegmentId(self.next_id),
            samples: Arc::from(buffer.to_mono()),
            sample_rate: buffer.sample_rate(),
            start_time: self.next_start_time,
        };
        self.next_id += 1;
        self.next_start_time += segment.duration();

        trace!(
            id = segment.id.0,
            start = segment.start_time,
            duration = segment.duration(),
            "scheduling segment"
        );

        if self.closed {
            return segment;
        }
        self.sink.play(&segment);
        self.active.insert(segment.id, segment.clone());
        self.stats.segments_scheduled += 1;
        self.stats.seconds_scheduled += segment.duration();

        segment
    }

    /// Natural completion of a segment. Unknown ids (already flushed) are ignored.
    pub fn on_finished(&mut self, id: SegmentId) -> bool {
        if self.active.remove(&id).is_some() {
            self.stats.segments_completed += 1;
            true
        } else {
            false
        }
    }

    /// Stop everything scheduled or playing and reset the cursor.
    /// Returns the number of segments cut off.
    pub fn flush(&mut self) -> usize {
        let flushed = self.active.len();
        for id in std::mem::take(&mut self.active).into_keys() {
            self.sink.stop(id);
        }
        self.next_start_time = 0.0;
        self.stats.segments_flushed += flushed as u64;

        if flushed > 0 {
            debug!(flushed, "flushed playback");
        }
        flushed
    }

    /// Flush and release the output device. Only the first call releases.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.flush();
        self.sink.close();
        self.closed = true;
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: SegmentId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Device clock of the underlying sink
    pub fn now(&self) -> f64 {
        self.sink.now()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.clone()
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub segments_scheduled: u64,
    pub segments_completed: u64,
    pub segments_flushed: u64,
    /// Total seconds of audio handed to the sink
    pub seconds_scheduled: f64,
}
