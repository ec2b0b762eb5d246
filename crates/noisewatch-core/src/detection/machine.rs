//! Streaming disturbance detector
//!
//! Consumes one loudness reading per frame and merges noisy readings into
//! disturbance events. A reading above the threshold opens (or extends) an
//! event; quiet readings keep the event open until the gap since the last
//! noisy reading exceeds the grace period.
//!
//! ```text
//!            level > threshold                 level > threshold
//!   ┌──────┐ ─────────────────▶ ┌────────┐ ◀──────────────────┐
//!   │ Idle │                    │ Active │ ───────────────────┘
//!   └──────┘ ◀───────────────── └────────┘   quiet, gap <= grace
//!        quiet, gap > grace (emit if duration > 0)
//! ```
//!
//! The threshold decision uses the instantaneous reading; hysteresis is
//! applied purely in time through the grace period.

use chrono::TimeDelta;

use super::buffer::RollingBuffer;
use super::event::{DisturbanceEvent, LoudnessSample, Timestamp};
use crate::config::{GracePrecision, MonitorConfig};

/// Disturbance detector state machine
///
/// Not thread-safe; it must be driven by a single consumer in arrival order.
/// Timestamps are expected to be non-decreasing.
///
/// # Example
/// ```
/// use chrono::{Local, TimeDelta, TimeZone};
/// use noisewatch_core::detection::{event::LoudnessSample, machine::DisturbanceMachine};
///
/// let t0 = Local.with_ymd_and_hms(2024, 6, 1, 23, 0, 0).unwrap();
/// let at = |s: i64| t0 + TimeDelta::seconds(s);
/// let mut machine = DisturbanceMachine::new(-18.0, TimeDelta::seconds(5), 18);
///
/// assert!(machine.observe(LoudnessSample::new(-10.0, at(0))).is_none());
/// assert!(machine.observe(LoudnessSample::new(-10.0, at(2))).is_none());
/// let event = machine.observe(LoudnessSample::new(-40.0, at(8))).unwrap();
/// assert_eq!(event.duration(), TimeDelta::seconds(2));
/// ```
#[derive(Debug)]
pub struct DisturbanceMachine {
    /// Level (dB) a reading must exceed to count as noisy
    threshold: f64,
    /// Longest tolerated quiet gap
    grace_period: TimeDelta,
    /// How the gap is compared against the grace period
    precision: GracePrecision,
    /// Whether a disturbance is currently open
    active: bool,
    /// Start of the open disturbance
    event_start: Option<Timestamp>,
    /// Time of the most recent noisy reading
    last_noise_time: Option<Timestamp>,
    /// Levels of the open disturbance (idle-trimmed otherwise)
    levels: RollingBuffer,
    /// Closed events dropped for having zero duration
    discarded: u64,
}

impl DisturbanceMachine {
    /// Create a detector
    ///
    /// # Arguments
    /// * `threshold` - Level in dB a reading must exceed to count as noisy
    /// * `grace_period` - Longest quiet gap that keeps an event open
    /// * `buffer_capacity` - Number of recent levels kept for averaging
    pub fn new(threshold: f64, grace_period: TimeDelta, buffer_capacity: usize) -> Self {
        Self::with_buffer(threshold, grace_period, RollingBuffer::new(buffer_capacity))
    }

    /// Create a detector from the monitor configuration
    ///
    /// The level buffer covers `averaging_period_secs` of audio at the
    /// configured sample rate and frame size.
    pub fn from_config(config: &MonitorConfig) -> Self {
        let levels = RollingBuffer::for_frame_size(
            config.averaging_period_secs,
            config.sample_rate,
            config.frame_size,
        );
        Self::with_buffer(
            config.noise_level_threshold as f64,
            config.grace_period(),
            levels,
        )
        .with_precision(config.grace_precision)
    }

    fn with_buffer(threshold: f64, grace_period: TimeDelta, levels: RollingBuffer) -> Self {
        Self {
            threshold,
            grace_period,
            precision: GracePrecision::default(),
            active: false,
            event_start: None,
            last_noise_time: None,
            levels,
            discarded: 0,
        }
    }

    /// Set the gap comparison precision
    pub fn with_precision(mut self, precision: GracePrecision) -> Self {
        self.precision = precision;
        self
    }

    /// Feed one reading
    ///
    /// # Returns
    /// `Some(event)` when this reading closes a disturbance of positive
    /// duration, `None` otherwise
    pub fn observe(&mut self, sample: LoudnessSample) -> Option<DisturbanceEvent> {
        let noisy = sample.level > self.threshold;

        match (self.active, noisy) {
            (false, true) => {
                self.open(sample);
                None
            }
            (false, false) => {
                self.levels.trim_idle();
                None
            }
            (true, true) => {
                self.levels.push(sample.level);
                self.last_noise_time = Some(sample.time);
                None
            }
            (true, false) => {
                let last_noise = self.last_noise_time?;
                if self.gap_exceeds_grace(sample.time - last_noise) {
                    self.close()
                } else {
                    None
                }
            }
        }
    }

    /// Close a still-open disturbance
    ///
    /// Applies the same positive-duration rule as a regular close. Used
    /// when monitoring stops and the flush policy is enabled.
    pub fn flush(&mut self) -> Option<DisturbanceEvent> {
        if self.active {
            self.close()
        } else {
            None
        }
    }

    fn open(&mut self, sample: LoudnessSample) {
        self.active = true;
        self.event_start = Some(sample.time);
        self.last_noise_time = Some(sample.time);
        self.levels.clear();
        self.levels.push(sample.level);

        tracing::info!(start = %sample.time, level_db = sample.level, "Noise started");
    }

    fn close(&mut self) -> Option<DisturbanceEvent> {
        let start = self.event_start.take();
        let end = self.last_noise_time.take();
        self.active = false;

        let event = match (start, end) {
            (Some(start), Some(end)) if end - start > TimeDelta::zero() => {
                match self.levels.mean() {
                    Ok(mean_level) => {
                        let event = DisturbanceEvent::new(start, end, mean_level);
                        tracing::info!(
                            start = %start,
                            end = %end,
                            duration_secs = event.duration().num_seconds(),
                            mean_level = %format!("{:.1}", mean_level),
                            "Disturbance finished"
                        );
                        Some(event)
                    }
                    Err(e) => {
                        tracing::error!(error = %e, start = %start, "Open disturbance had no levels, discarding");
                        debug_assert!(!self.levels.is_empty(), "open disturbance had no buffered levels");
                        self.discarded += 1;
                        None
                    }
                }
            }
            _ => {
                tracing::debug!("Zero-duration disturbance discarded");
                self.discarded += 1;
                None
            }
        };

        self.levels.clear();
        event
    }

    fn gap_exceeds_grace(&self, gap: TimeDelta) -> bool {
        match self.precision {
            GracePrecision::WholeSeconds => gap.num_seconds() > self.grace_period.num_seconds(),
            GracePrecision::Exact => gap > self.grace_period,
        }
    }

    /// Whether a disturbance is currently open
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start of the open disturbance
    pub fn event_start(&self) -> Option<Timestamp> {
        self.event_start
    }

    /// Time of the most recent noisy reading of the open disturbance
    pub fn last_noise_time(&self) -> Option<Timestamp> {
        if self.active {
            self.last_noise_time
        } else {
            None
        }
    }

    /// Levels currently held for averaging
    pub fn buffered_levels(&self) -> &RollingBuffer {
        &self.levels
    }

    /// Number of closed disturbances dropped for zero duration
    pub fn discarded_events(&self) -> u64 {
        self.discarded
    }

    /// Threshold in dB
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Grace period
    pub fn grace_period(&self) -> TimeDelta {
        self.grace_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    const LOUD: f64 = -10.0;
    const QUIET: f64 = -25.0;

    fn base() -> Timestamp {
        Local.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap()
    }

    fn at(secs: i64) -> Timestamp {
        base() + TimeDelta::seconds(secs)
    }

    fn at_ms(ms: i64) -> Timestamp {
        base() + TimeDelta::milliseconds(ms)
    }

    fn machine() -> DisturbanceMachine {
        DisturbanceMachine::new(-18.0, TimeDelta::seconds(5), 4)
    }

    fn feed(machine: &mut DisturbanceMachine, samples: &[(f64, i64)]) -> Vec<DisturbanceEvent> {
        samples
            .iter()
            .filter_map(|&(level, secs)| machine.observe(LoudnessSample::new(level, at(secs))))
            .collect()
    }

    #[test]
    fn test_starts_idle() {
        let m = machine();
        assert!(!m.is_active());
        assert!(m.event_start().is_none());
        assert!(m.buffered_levels().is_empty());
    }

    #[test]
    fn test_loud_sample_opens_event() {
        let mut m = machine();
        assert!(m.observe(LoudnessSample::new(LOUD, at(0))).is_none());

        assert!(m.is_active());
        assert_eq!(m.event_start(), Some(at(0)));
        assert_eq!(m.last_noise_time(), Some(at(0)));
        assert_eq!(m.buffered_levels().len(), 1);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut m = machine();
        m.observe(LoudnessSample::new(-18.0, at(0)));
        assert!(!m.is_active(), "Level equal to threshold is quiet");

        m.observe(LoudnessSample::new(-17.99, at(1)));
        assert!(m.is_active());
    }

    #[test]
    fn test_noisy_samples_extend_event() {
        let mut m = machine();
        feed(&mut m, &[(LOUD, 0), (-12.0, 1), (-14.0, 2)]);

        assert_eq!(m.event_start(), Some(at(0)));
        assert_eq!(m.last_noise_time(), Some(at(2)));
        assert_eq!(m.buffered_levels().len(), 3);
    }

    #[test]
    fn test_event_closes_after_grace() {
        let mut m = machine();
        let events = feed(&mut m, &[(LOUD, 0), (LOUD, 1), (LOUD, 2), (QUIET, 8)]);

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.start_time(), at(0));
        assert_eq!(event.end_time(), at(2));
        assert_eq!(event.duration(), TimeDelta::seconds(2));
        assert_eq!(event.mean_level(), LOUD);
        assert!(!m.is_active());
        assert!(m.buffered_levels().is_empty(), "Buffer cleared on close");
    }

    #[test]
    fn test_quiet_within_grace_keeps_event() {
        let mut m = machine();
        let events = feed(&mut m, &[(LOUD, 0), (QUIET, 1), (QUIET, 4), (QUIET, 5)]);

        assert!(events.is_empty());
        assert!(m.is_active());
        // Quiet readings are not averaged
        assert_eq!(m.buffered_levels().len(), 1);
    }

    #[test]
    fn test_gap_equal_to_grace_does_not_close() {
        let mut m = machine();
        let events = feed(&mut m, &[(LOUD, 0), (LOUD, 1), (QUIET, 6)]);
        assert!(events.is_empty());
        assert!(m.is_active());

        let events = feed(&mut m, &[(QUIET, 7)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].end_time(), at(1));
    }

    #[test]
    fn test_zero_duration_event_discarded() {
        let mut m = machine();
        let events = feed(&mut m, &[(LOUD, 0), (QUIET, 1), (QUIET, 6)]);

        assert!(events.is_empty());
        assert!(!m.is_active());
        assert_eq!(m.discarded_events(), 1);
        assert!(m.buffered_levels().is_empty());
    }

    #[test]
    fn test_whole_second_truncation() {
        let mut m = machine();
        m.observe(LoudnessSample::new(LOUD, at_ms(0)));
        m.observe(LoudnessSample::new(LOUD, at_ms(1000)));

        // 5.9 s gap truncates to 5 s, still inside the grace period
        assert!(m.observe(LoudnessSample::new(QUIET, at_ms(6900))).is_none());
        assert!(m.is_active());

        // 6.0 s gap closes
        assert!(m.observe(LoudnessSample::new(QUIET, at_ms(7000))).is_some());
    }

    #[test]
    fn test_exact_precision() {
        let mut m = machine().with_precision(GracePrecision::Exact);
        m.observe(LoudnessSample::new(LOUD, at_ms(0)));
        m.observe(LoudnessSample::new(LOUD, at_ms(1000)));

        assert!(m.observe(LoudnessSample::new(QUIET, at_ms(6000))).is_none());
        assert!(m.observe(LoudnessSample::new(QUIET, at_ms(6001))).is_some());
    }

    #[test]
    fn test_buffer_bounded_during_long_event() {
        let mut m = machine();
        let samples: Vec<(f64, i64)> = (0..100).map(|i| (-10.0 - (i % 3) as f64, i)).collect();
        feed(&mut m, &samples);

        assert_eq!(m.buffered_levels().len(), 4);
    }

    #[test]
    fn test_mean_covers_most_recent_levels_only() {
        let mut m = machine();
        let events = feed(
            &mut m,
            &[
                (-2.0, 0),
                (-2.0, 1),
                (-10.0, 2),
                (-10.0, 3),
                (-10.0, 4),
                (-10.0, 5),
                (QUIET, 20),
            ],
        );

        assert_eq!(events.len(), 1);
        // The two -2 dB readings were evicted (capacity 4)
        assert_eq!(events[0].mean_level(), -10.0);
        assert_eq!(events[0].start_time(), at(0));
    }

    #[test]
    fn test_new_event_resets_buffer() {
        let mut m = machine();
        let first = feed(&mut m, &[(-5.0, 0), (-5.0, 1), (QUIET, 10)]);
        assert_eq!(first.len(), 1);

        let second = feed(&mut m, &[(-15.0, 20), (-15.0, 22), (QUIET, 30)]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].mean_level(), -15.0);
        assert_eq!(second[0].start_time(), at(20));
    }

    #[test]
    fn test_idle_never_grows_buffer() {
        let mut m = machine();
        for i in 0..1000 {
            assert!(m.observe(LoudnessSample::new(QUIET, at(i))).is_none());
            assert!(m.buffered_levels().len() <= m.buffered_levels().capacity());
        }
        assert!(!m.is_active());
    }

    #[test]
    fn test_flush_emits_open_event() {
        let mut m = machine();
        feed(&mut m, &[(LOUD, 0), (LOUD, 3)]);

        let event = m.flush().expect("open event should flush");
        assert_eq!(event.duration(), TimeDelta::seconds(3));
        assert!(!m.is_active());
        assert!(m.flush().is_none(), "Flush is a no-op once idle");
    }

    #[test]
    fn test_flush_single_sample_discarded() {
        let mut m = machine();
        feed(&mut m, &[(LOUD, 0)]);

        assert!(m.flush().is_none());
        assert!(!m.is_active());
        assert_eq!(m.discarded_events(), 1);
    }

    #[test]
    fn test_from_config() {
        let mut config = MonitorConfig::default();
        config.noise_level_threshold = -30;
        config.max_time_between_noise = 2;

        let m = DisturbanceMachine::from_config(&config);
        assert_eq!(m.threshold(), -30.0);
        assert_eq!(m.grace_period(), TimeDelta::seconds(2));
        assert_eq!(m.buffered_levels().capacity(), config.buffer_capacity());
        assert_eq!(m.buffered_levels().capacity(), 18);

        // Buffer follows the effective capture settings
        config.sample_rate = 48000;
        config.frame_size = 480;
        config.averaging_period_secs = 0.5;
        let m = DisturbanceMachine::from_config(&config);
        assert_eq!(m.buffered_levels().capacity(), 50);
    }
}
