//! Loudness readings and finished disturbance events

use chrono::{DateTime, Local, TimeDelta};

/// Wall-clock time attached to every reading
pub type Timestamp = DateTime<Local>;

/// A single loudness reading, one per audio frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessSample {
    /// Frame level in dB
    pub level: f64,
    /// When the frame was captured
    pub time: Timestamp,
}

impl LoudnessSample {
    /// Create a new reading
    pub fn new(level: f64, time: Timestamp) -> Self {
        Self { level, time }
    }
}

/// A finished disturbance
///
/// Built exactly once when the detector closes an event; never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DisturbanceEvent {
    start_time: Timestamp,
    end_time: Timestamp,
    mean_level: f64,
}

impl DisturbanceEvent {
    /// Create an event spanning `start_time..=end_time`
    pub fn new(start_time: Timestamp, end_time: Timestamp, mean_level: f64) -> Self {
        Self {
            start_time,
            end_time,
            mean_level,
        }
    }

    /// First noisy reading of the event
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// Last noisy reading of the event
    pub fn end_time(&self) -> Timestamp {
        self.end_time
    }

    /// `end_time - start_time`
    pub fn duration(&self) -> TimeDelta {
        self.end_time - self.start_time
    }

    /// Mean level (dB) of the readings still buffered when the event closed
    pub fn mean_level(&self) -> f64 {
        self.mean_level
    }
}
