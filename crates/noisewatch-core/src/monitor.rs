//! Frame-to-event pipeline
//!
//! [`Monitor`] is the single owner of the detector. It turns each captured
//! frame into a loudness reading, feeds the reading to the
//! [`DisturbanceMachine`] and hands finished events to a caller-supplied
//! callback (normally a [`RecorderHandle`](crate::sink::recorder::RecorderHandle)).

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::audio::engine::Frame;
use crate::audio::level::frame_level_db;
use crate::config::MonitorConfig;
use crate::detection::event::{DisturbanceEvent, LoudnessSample};
use crate::detection::machine::DisturbanceMachine;
use crate::stats::store::StatsStore;

/// How long to wait for a frame before re-checking the running flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often the tick callback runs while monitoring
const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Why [`Monitor::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The running flag was cleared
    Interrupted,
    /// The frame source went away
    SourceClosed,
}

/// Drives the detector from a stream of frames
#[derive(Debug)]
pub struct Monitor {
    machine: DisturbanceMachine,
    stats: StatsStore,
    flush_on_shutdown: bool,
}

impl Monitor {
    /// Create a monitor from configuration
    pub fn new(config: &MonitorConfig) -> Self {
        Self::with_machine(
            DisturbanceMachine::from_config(config),
            config.flush_on_shutdown,
        )
    }

    /// Create a monitor around an existing detector
    pub fn with_machine(machine: DisturbanceMachine, flush_on_shutdown: bool) -> Self {
        Self {
            machine,
            stats: StatsStore::new(),
            flush_on_shutdown,
        }
    }

    /// Process one frame
    ///
    /// Invalid frames are logged, counted and skipped without touching the
    /// detector.
    ///
    /// # Returns
    /// The event closed by this frame, if any
    pub fn process_frame(&mut self, frame: &Frame) -> Option<DisturbanceEvent> {
        let level = match frame_level_db(&frame.samples) {
            Ok(level) => level,
            Err(e) => {
                self.stats.record_invalid_frame();
                tracing::warn!(error = %e, captured_at = %frame.captured_at, "Skipping invalid frame");
                return None;
            }
        };

        tracing::debug!(level_db = level, time = %frame.captured_at, "Frame level");
        self.stats.record_level(level);

        let event = self
            .machine
            .observe(LoudnessSample::new(level, frame.captured_at));
        self.sync_stats(event.as_ref());
        event
    }

    /// Apply the shutdown policy to a still-open disturbance
    ///
    /// # Returns
    /// The flushed event when flushing is enabled and the open disturbance
    /// has positive duration
    pub fn shutdown(&mut self) -> Option<DisturbanceEvent> {
        if !self.flush_on_shutdown {
            if self.machine.is_active() {
                tracing::info!(
                    start = ?self.machine.event_start(),
                    "Open disturbance not recorded at shutdown"
                );
            }
            return None;
        }

        let event = self.machine.flush();
        self.sync_stats(event.as_ref());
        event
    }

    /// Consume frames until `running` is cleared or the source closes
    ///
    /// `on_event` receives every finished event, including one flushed at
    /// shutdown. `on_tick` runs roughly every half second with the current
    /// statistics and may update engine or writer counters.
    pub fn run<E, T>(
        &mut self,
        frames: &Receiver<Frame>,
        running: &AtomicBool,
        mut on_event: E,
        mut on_tick: T,
    ) -> StopReason
    where
        E: FnMut(DisturbanceEvent),
        T: FnMut(&mut StatsStore),
    {
        let mut last_tick = Instant::now();

        let reason = loop {
            if !running.load(Ordering::SeqCst) {
                break StopReason::Interrupted;
            }

            match frames.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => {
                    if let Some(event) = self.process_frame(&frame) {
                        on_event(event);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break StopReason::SourceClosed,
            }

            if last_tick.elapsed() >= TICK_INTERVAL {
                on_tick(&mut self.stats);
                last_tick = Instant::now();
            }
        };

        tracing::info!(reason = ?reason, "Monitoring loop stopped");

        if let Some(event) = self.shutdown() {
            on_event(event);
        }
        on_tick(&mut self.stats);

        reason
    }

    fn sync_stats(&mut self, event: Option<&DisturbanceEvent>) {
        if let Some(event) = event {
            self.stats.record_event(event);
        }
        self.stats.set_active(self.machine.is_active());
        self.stats
            .set_events_discarded(self.machine.discarded_events());
    }

    /// The detector
    pub fn machine(&self) -> &DisturbanceMachine {
        &self.machine
    }

    /// Session statistics
    pub fn stats(&self) -> &StatsStore {
        &self.stats
    }

    /// Mutable session statistics
    pub fn stats_mut(&mut self) -> &mut StatsStore {
        &mut self.stats
    }
}
