//! Session statistics for the running monitor

pub mod store;
