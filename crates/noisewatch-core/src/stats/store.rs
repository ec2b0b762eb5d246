//! Running statistics for one monitoring session
//!
//! Keeps counters for the whole session and a short history of recent
//! disturbances for the status display. Nothing here is persisted.

use std::collections::VecDeque;

use crate::detection::event::{DisturbanceEvent, Timestamp};
use crate::sink::csv::{format_duration, format_level};

/// Recent events kept for display
const MAX_RECENT_EVENTS: usize = 32;

/// Running counters updated by the monitor loop
#[derive(Debug, Default, Clone)]
pub struct RunningStats {
    /// Frames turned into a loudness reading
    pub frames_processed: u64,
    /// Frames skipped because they were empty or held non-finite samples
    pub invalid_frames: u64,
    /// Frames the capture callback could not queue (cumulative from engine)
    pub dropped_frames: u64,
    /// Events handed to the sink
    pub events_detected: u64,
    /// Events that closed with zero duration or no buffered levels
    pub events_discarded: u64,
    /// Events confirmed written (cumulative from recorder)
    pub events_written: u64,
    /// Events lost to sink errors (cumulative from recorder)
    pub sink_failures: u64,
    /// Level of the most recent frame (dB)
    pub current_level: Option<f64>,
    /// Loudest frame since start (dB)
    pub peak_level: Option<f64>,
    /// Whether a disturbance is currently open
    pub disturbance_active: bool,
    /// When monitoring started
    pub started_at: Option<Timestamp>,
    /// Capture device name (cached from engine)
    pub device_name: Option<String>,
    /// Capture sample rate (cached from engine)
    pub sample_rate: u32,
}

/// Statistics store for the current session
#[derive(Debug)]
pub struct StatsStore {
    stats: RunningStats,
    recent_events: VecDeque<DisturbanceEvent>,
    max_events: usize,
}

impl StatsStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            stats: RunningStats::default(),
            recent_events: VecDeque::with_capacity(MAX_RECENT_EVENTS),
            max_events: MAX_RECENT_EVENTS,
        }
    }

    /// Mark the start of monitoring
    pub fn start(&mut self, at: Timestamp) {
        self.stats.started_at = Some(at);
    }

    /// Record the level of one processed frame
    pub fn record_level(&mut self, level: f64) {
        self.stats.frames_processed += 1;
        self.stats.current_level = Some(level);
        self.stats.peak_level = Some(match self.stats.peak_level {
            Some(peak) => peak.max(level),
            None => level,
        });
    }

    /// Count a skipped frame
    pub fn record_invalid_frame(&mut self) {
        self.stats.invalid_frames += 1;
    }

    /// Record an event handed to the sink
    pub fn record_event(&mut self, event: &DisturbanceEvent) {
        self.stats.events_detected += 1;
        if self.recent_events.len() >= self.max_events {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(event.clone());
    }

    /// Set discarded event counter (cumulative from the detector)
    pub fn set_events_discarded(&mut self, count: u64) {
        self.stats.events_discarded = count;
    }

    /// Set dropped frame counter (cumulative from engine)
    pub fn set_dropped_frames(&mut self, count: u64) {
        self.stats.dropped_frames = count;
    }

    /// Set writer counters (cumulative from recorder)
    pub fn set_sink_counters(&mut self, written: u64, failed: u64) {
        self.stats.events_written = written;
        self.stats.sink_failures = failed;
    }

    /// Set whether a disturbance is open
    pub fn set_active(&mut self, active: bool) {
        self.stats.disturbance_active = active;
    }

    /// Cache device information from the engine
    pub fn set_device_info(&mut self, device_name: Option<String>, sample_rate: u32) {
        self.stats.device_name = device_name;
        self.stats.sample_rate = sample_rate;
    }

    /// Get running statistics
    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    /// Most recent events, oldest first
    pub fn recent_events(&self) -> &VecDeque<DisturbanceEvent> {
        &self.recent_events
    }

    /// Seconds since [`StatsStore::start`], 0 before start
    pub fn uptime_seconds(&self, now: Timestamp) -> u64 {
        self.stats
            .started_at
            .map(|start| (now - start).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// One-line status for the console
    pub fn status_line(&self) -> String {
        let level = match self.stats.current_level {
            Some(level) => format!("{:>6.1} dB", level),
            None => "     - dB".to_string(),
        };
        let state = if self.stats.disturbance_active {
            "NOISE"
        } else {
            "quiet"
        };
        format!(
            "Level: {} | State: {} | Events: {:>3} | Dropped: {:>4} | Invalid: {:>4}",
            level,
            state,
            self.stats.events_detected,
            self.stats.dropped_frames,
            self.stats.invalid_frames
        )
    }

    /// Multi-line summary printed on shutdown
    pub fn summary(&self, now: Timestamp) -> String {
        let peak = self
            .stats
            .peak_level
            .map(format_level)
            .unwrap_or_else(|| "-".to_string());
        let mut lines = vec![
            format!("Monitored for:     {}", format_duration(self.uptime_seconds(now) as i64)),
            format!("Frames processed:  {}", self.stats.frames_processed),
            format!("Frames skipped:    {}", self.stats.invalid_frames),
            format!("Frames dropped:    {}", self.stats.dropped_frames),
            format!("Peak level:        {}", peak),
            format!("Disturbances:      {}", self.stats.events_detected),
            format!("Written to log:    {}", self.stats.events_written),
            format!("Write failures:    {}", self.stats.sink_failures),
            format!("Discarded:         {}", self.stats.events_discarded),
        ];
        if let Some(last) = self.recent_events.back() {
            lines.push(format!(
                "Last disturbance:  {} ({}, {})",
                last.start_time().format("%d.%m.%Y %H:%M:%S"),
                format_duration(last.duration().num_seconds()),
                format_level(last.mean_level())
            ));
        }
        lines.join("\n")
    }

    /// Clear all counters and history
    pub fn clear(&mut self) {
        self.stats = RunningStats::default();
        self.recent_events.clear();
    }
}

impl Default for StatsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeDelta, TimeZone};

    fn base() -> Timestamp {
        Local.with_ymd_and_hms(2024, 6, 2, 23, 15, 0).unwrap()
    }

    fn event(offset: i64) -> DisturbanceEvent {
        let start = base() + TimeDelta::seconds(offset);
        DisturbanceEvent::new(start, start + TimeDelta::seconds(7), -6.5)
    }

    #[test]
    fn test_store_creation() {
        let store = StatsStore::new();
        assert_eq!(store.stats().frames_processed, 0);
        assert!(store.stats().peak_level.is_none());
        assert!(store.recent_events().is_empty());
    }

    #[test]
    fn test_record_level_tracks_peak() {
        let mut store = StatsStore::new();

        store.record_level(-30.0);
        store.record_level(-8.5);
        store.record_level(-22.0);

        assert_eq!(store.stats().frames_processed, 3);
        assert_eq!(store.stats().current_level, Some(-22.0));
        assert_eq!(store.stats().peak_level, Some(-8.5));
    }

    #[test]
    fn test_recent_events_bounded() {
        let mut store = StatsStore::new();
        for i in 0..(MAX_RECENT_EVENTS as i64 + 5) {
            store.record_event(&event(i * 60));
        }

        assert_eq!(store.recent_events().len(), MAX_RECENT_EVENTS);
        assert_eq!(store.stats().events_detected, MAX_RECENT_EVENTS as u64 + 5);
        assert_eq!(store.recent_events().front(), Some(&event(5 * 60)));
    }

    #[test]
    fn test_uptime() {
        let mut store = StatsStore::new();
        assert_eq!(store.uptime_seconds(base()), 0);

        store.start(base());
        assert_eq!(store.uptime_seconds(base() + TimeDelta::seconds(90)), 90);
        assert_eq!(store.uptime_seconds(base() - TimeDelta::seconds(5)), 0);
    }

    #[test]
    fn test_status_line() {
        let mut store = StatsStore::new();
        assert!(store.status_line().contains("- dB"));

        store.record_level(-12.34);
        store.set_active(true);
        store.record_invalid_frame();
        let line = store.status_line();
        assert!(line.contains("-12.3 dB"), "line was {}", line);
        assert!(line.contains("NOISE"));
        assert!(line.contains("Invalid:    1"));
    }

    #[test]
    fn test_summary() {
        let mut store = StatsStore::new();
        store.start(base());
        store.record_level(-4.0);
        store.record_event(&event(10));
        store.set_sink_counters(1, 0);
        store.set_events_discarded(2);

        let summary = store.summary(base() + TimeDelta::seconds(125));
        assert!(summary.contains("Monitored for:     02:05"));
        assert!(summary.contains("Peak level:        -4.0 dB"));
        assert!(summary.contains("Written to log:    1"));
        assert!(summary.contains("Discarded:         2"));
        assert!(summary.contains("02.06.2024 23:15:10 (00:07, -6.5 dB)"));
    }

    #[test]
    fn test_clear() {
        let mut store = StatsStore::new();
        store.record_level(-1.0);
        store.record_event(&event(0));
        store.clear();

        assert_eq!(store.stats().frames_processed, 0);
        assert!(store.recent_events().is_empty());
    }
}
