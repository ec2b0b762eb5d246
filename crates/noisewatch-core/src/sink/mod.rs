//! Durable storage of finished disturbances
//!
//! Contains:
//! - The [`EventSink`] trait and its error type
//! - Append-only CSV log ([`csv`])
//! - Bounded retry with backoff around any sink ([`retry`])
//! - Background writer thread fed by the monitor ([`recorder`])

pub mod csv;
pub mod recorder;
pub mod retry;

use std::path::PathBuf;
use thiserror::Error;

use crate::detection::event::DisturbanceEvent;

/// Errors that can occur while persisting an event
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to write disturbance log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode row for disturbance log {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: ::csv::Error,
    },
}

/// Destination for finished disturbance events
///
/// Each call is independent: the event is either fully recorded or not at all.
pub trait EventSink {
    /// Persist one event
    fn record(&mut self, event: &DisturbanceEvent) -> Result<(), SinkError>;
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn record(&mut self, event: &DisturbanceEvent) -> Result<(), SinkError> {
        (**self).record(event)
    }
}
