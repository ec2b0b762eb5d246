//! Disturbance detection
//!
//! Contains:
//! - Sample and event types ([`event`])
//! - Bounded loudness history used for averaging ([`buffer`])
//! - The streaming hysteresis state machine ([`machine`])

pub mod buffer;
pub mod event;
pub mod machine;
