//! Streaming linear resampler
//!
//! Device rates rarely match the wire rates (16 kHz up, 24 kHz down), so
//! capture and playback both pass through this. Linear interpolation is
//! plenty for speech.

/// Linear-interpolation resampler that keeps phase across calls
#[derive(Debug, Clone)]
pub struct LinearResampler {
    source_rate: u32,
    target_rate: u32,
    /// Source samples advanced per output sample
    step: f64,
    /// Fractional read position relative to `last`
    position: f64,
    /// Final sample of the previous chunk
    last: Option<f32>,
}

impl LinearResampler {
    /// Returns `None` for a zero rate
    pub fn new(source_rate: u32, target_rate: u32) -> Option<Self> {
        if source_rate == 0 || target_rate == 0 {
            return None;
        }
        Some(Self {
            source_rate,
            target_rate,
            step: source_rate as f64 / target_rate as f64,
            position: 0.0,
            last: None,
        })
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn is_passthrough(&self) -> bool {
        self.source_rate == self.target_rate
    }

    /// Resample one chunk of a continuous stream
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return input.to_vec();
        }
        if input.is_empty() {
            return Vec::new();
        }

        // Index 0 is the carried-over sample from the previous chunk
        let last = self.last;
        let carried = usize::from(last.is_some());
        let sample_at = |i: usize| -> f32 {
            match last {
                Some(prev) if i == 0 => prev,
                _ => input[i - carried],
            }
        };
        let available = input.len() + carried;
        let end = (available - 1) as f64;

        let mut output = Vec::with_capacity((input.len() as f64 / self.step).ceil() as usize + 1);
        let mut pos = self.position;
        while pos <= end {
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let a = sample_at(idx);
            let b = if idx + 1 < available { sample_at(idx + 1) } else { a };
            output.push(a + (b - a) * frac);
            pos += self.step;
        }

        // Re-anchor so the last input sample becomes index 0 of the next call
        self.position = pos - end;
        self.last = input.last().copied();
        output
    }

    /// Resample a complete buffer with fresh state
    pub fn resample_all(source_rate: u32, target_rate: u32, input: &[f32]) -> Vec<f32> {
        match Self::new(source_rate, target_rate) {
            Some(mut resampler) => resampler.process(input),
            None => Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.position = 0.0;
        self.last = None;
    }
}
