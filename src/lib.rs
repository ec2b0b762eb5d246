//! Noisewatch - unattended noise disturbance monitor
//!
//! This library re-exports the detection, capture and logging functionality
//! from `noisewatch-core` for the binary and the end-to-end tests.

pub use noisewatch_core::audio;
pub use noisewatch_core::config;
pub use noisewatch_core::detection;
pub use noisewatch_core::monitor;
pub use noisewatch_core::sink;
pub use noisewatch_core::stats;

pub use noisewatch_core::{
    frame_level_db, AudioEngine, CsvEventSink, DisturbanceEvent, DisturbanceMachine, EventRecorder,
    EventSink, Frame, LoudnessSample, Monitor, MonitorConfig, RecorderHandle, RetryingSink,
    RollingBuffer, SinkError, StatsStore, StopReason, Timestamp,
};
pub use noisewatch_core::{
    AVERAGING_PERIOD_SECS, BUILD_DATE, DEFAULT_LOG_PATH, DEFAULT_MAX_TIME_BETWEEN_NOISE,
    DEFAULT_NOISE_LEVEL_THRESHOLD, SAMPLE_RATE, VERSION,
};
