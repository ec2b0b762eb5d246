//! Noisewatch Core - Disturbance detection, level estimation and event logging
//!
//! This library provides the core functionality for unattended environmental
//! noise monitoring. Audio frames are reduced to a single loudness reading,
//! contiguous loud readings are merged into disturbance events (tolerating
//! short lulls), and every finished event is appended to a CSV log.

pub mod audio;
pub mod config;
pub mod detection;
pub mod monitor;
pub mod sink;
pub mod stats;

pub use audio::{
    engine::{AudioEngine, Frame},
    level::frame_level_db,
};
pub use config::MonitorConfig;
pub use detection::{
    buffer::RollingBuffer,
    event::{DisturbanceEvent, LoudnessSample, Timestamp},
    machine::DisturbanceMachine,
};
pub use monitor::{Monitor, StopReason};
pub use sink::{
    csv::CsvEventSink,
    recorder::{EventRecorder, RecorderHandle},
    retry::RetryingSink,
    EventSink, SinkError,
};
pub use stats::store::StatsStore;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Capture sample rate in Hz
pub const SAMPLE_RATE: u32 = 44100;

/// Window over which loudness readings are averaged (seconds)
pub const AVERAGING_PERIOD_SECS: f64 = 0.4;

/// Samples per analysis frame
pub const DEFAULT_FRAME_SIZE: usize = 1024;

/// Level above which a frame counts as noisy (dB)
pub const DEFAULT_NOISE_LEVEL_THRESHOLD: i32 = -18;

/// Longest quiet gap (seconds) that still belongs to the same disturbance
pub const DEFAULT_MAX_TIME_BETWEEN_NOISE: u64 = 5;

/// Relative path of the disturbance log
pub const DEFAULT_LOG_PATH: &str = "disturbance_log.csv";
