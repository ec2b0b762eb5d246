//! Audio processing module
//!
//! This module contains the audio-facing side of the monitor:
//! - Input device management and frame delivery ([`engine`])
//! - Per-frame loudness estimation ([`level`])

pub mod engine;
pub mod level;
