//! Bounded FIFO of recent loudness readings
//!
//! Capacity is derived from the averaging period, the sample rate and the
//! frame size, so the buffer holds roughly `AVERAGING_PERIOD` worth of
//! frames. Pushing at capacity evicts the oldest reading.

use std::collections::VecDeque;
use thiserror::Error;

/// Mean requested on a buffer holding no readings
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("mean requested on an empty level buffer")]
pub struct EmptyBuffer;

/// Fixed-capacity FIFO of level readings (dB)
///
/// # Example
/// ```
/// use noisewatch_core::detection::buffer::RollingBuffer;
///
/// let mut buffer = RollingBuffer::new(3);
/// for level in [-10.0, -12.0, -14.0, -16.0] {
///     buffer.push(level);
/// }
/// assert_eq!(buffer.len(), 3);
/// assert_eq!(buffer.mean().unwrap(), -14.0);
/// ```
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    levels: VecDeque<f64>,
    capacity: usize,
}

impl RollingBuffer {
    /// Create a buffer holding at most `capacity` readings
    ///
    /// A zero capacity is raised to one so an open event always has at
    /// least one reading to average.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            levels: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Create a buffer sized to cover `averaging_secs` of audio
    ///
    /// # Arguments
    /// * `averaging_secs` - Averaging period in seconds
    /// * `sample_rate` - Sample rate in Hz
    /// * `frame_size` - Samples per frame
    pub fn for_frame_size(averaging_secs: f64, sample_rate: u32, frame_size: usize) -> Self {
        Self::new(capacity_for(averaging_secs, sample_rate, frame_size))
    }

    /// Append a reading, evicting the oldest one when full
    pub fn push(&mut self, level: f64) {
        if self.levels.len() >= self.capacity {
            self.levels.pop_front();
        }
        self.levels.push_back(level);
    }

    /// Drop every reading
    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Pop the oldest reading if the buffer is over capacity
    ///
    /// Called once per quiet reading while no event is open; removes at most
    /// one element per call.
    pub fn trim_idle(&mut self) {
        if self.levels.len() > self.capacity {
            self.levels.pop_front();
        }
    }

    /// Arithmetic mean of the current contents
    pub fn mean(&self) -> Result<f64, EmptyBuffer> {
        if self.levels.is_empty() {
            return Err(EmptyBuffer);
        }
        let sum: f64 = self.levels.iter().sum();
        Ok(sum / self.levels.len() as f64)
    }

    /// Smallest buffered reading
    pub fn min(&self) -> Option<f64> {
        self.levels.iter().copied().reduce(f64::min)
    }

    /// Largest buffered reading
    pub fn max(&self) -> Option<f64> {
        self.levels.iter().copied().reduce(f64::max)
    }

    /// Readings from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.levels.iter().copied()
    }

    /// Number of buffered readings
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// True when no readings are buffered
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Maximum number of readings
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// `ceil(averaging_secs * sample_rate / frame_size)`, at least 1
pub fn capacity_for(averaging_secs: f64, sample_rate: u32, frame_size: usize) -> usize {
    if frame_size == 0 {
        return 1;
    }
    let frames = (averaging_secs * sample_rate as f64 / frame_size as f64).ceil();
    if frames.is_finite() && frames >= 1.0 {
        frames as usize
    } else {
        1
    }
}
