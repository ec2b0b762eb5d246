//! Background event writer
//!
//! Finished events are handed to a dedicated thread over a bounded channel so
//! that slow or failing disk writes never stall frame processing. A write
//! that still fails after the sink's own retries is logged and the event is
//! dropped.

use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::EventSink;
use crate::detection::event::DisturbanceEvent;

/// Events that may wait for the writer before new ones are dropped
const QUEUE_CAPACITY: usize = 64;

/// Handle returned by [`EventRecorder::start`]
///
/// Dropping the handle closes the queue and waits for pending writes.
pub struct RecorderHandle {
    sender: Option<Sender<DisturbanceEvent>>,
    /// Events durably written, updated by the writer thread
    written: Arc<AtomicU64>,
    /// Events the sink rejected
    failed: Arc<AtomicU64>,
    /// Events dropped because the queue was full or closed
    rejected: AtomicU64,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl RecorderHandle {
    /// Queue an event for writing without blocking
    ///
    /// # Returns
    /// `false` if the event was dropped because the queue is full or closed
    pub fn submit(&self, event: DisturbanceEvent) -> bool {
        let Some(sender) = self.sender.as_ref() else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    start = %event.start_time(),
                    end = %event.end_time(),
                    "Event queue full, disturbance dropped"
                );
                false
            }
            Err(TrySendError::Disconnected(event)) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    start = %event.start_time(),
                    end = %event.end_time(),
                    "Event writer stopped, disturbance dropped"
                );
                false
            }
        }
    }

    /// Close the queue and wait until every queued event has been handled
    pub fn finish(&mut self) {
        self.sender = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Event writer thread panicked");
            }
        }
    }

    /// Events written so far
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Events lost to sink errors or a full queue
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed) + self.rejected.load(Ordering::Relaxed)
    }
}

impl Drop for RecorderHandle {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Owns a sink until it is moved onto the writer thread
pub struct EventRecorder<S> {
    sink: S,
}

impl<S: EventSink + Send + 'static> EventRecorder<S> {
    /// Create a recorder writing to `sink`
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Spawn the writer thread
    pub fn start(self) -> std::io::Result<RecorderHandle> {
        let (sender, receiver) = crossbeam_channel::bounded::<DisturbanceEvent>(QUEUE_CAPACITY);
        let written = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));
        let written_clone = Arc::clone(&written);
        let failed_clone = Arc::clone(&failed);
        let mut sink = self.sink;

        let thread = std::thread::Builder::new()
            .name("event-writer".into())
            .spawn(move || {
                for event in receiver.iter() {
                    match sink.record(&event) {
                        Ok(()) => {
                            written_clone.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            failed_clone.fetch_add(1, Ordering::Relaxed);
                            tracing::error!(
                                error = %e,
                                start = %event.start_time(),
                                end = %event.end_time(),
                                mean_level = %format!("{:.1}", event.mean_level()),
                                "Failed to log disturbance, event dropped"
                            );
                        }
                    }
                }
                tracing::info!("Event writer stopped");
            })?;

        Ok(RecorderHandle {
            sender: Some(sender),
            written,
            failed,
            rejected: AtomicU64::new(0),
            thread: Some(thread),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkError;
    use chrono::{Local, TimeDelta, TimeZone};
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct SharedSink {
        recorded: Arc<Mutex<Vec<DisturbanceEvent>>>,
        fail: bool,
    }

    impl EventSink for SharedSink {
        fn record(&mut self, event: &DisturbanceEvent) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Io {
                    path: PathBuf::from("readonly.csv"),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                });
            }
            self.recorded.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn event(offset: i64) -> DisturbanceEvent {
        let start = Local.with_ymd_and_hms(2024, 8, 9, 21, 0, 0).unwrap() + TimeDelta::seconds(offset);
        DisturbanceEvent::new(start, start + TimeDelta::seconds(3), -9.5)
    }

    #[test]
    fn test_events_written_in_order() {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let sink = SharedSink {
            recorded: Arc::clone(&recorded),
            fail: false,
        };
        let mut handle = EventRecorder::new(sink).start().unwrap();

        for i in 0..5 {
            assert!(handle.submit(event(i * 60)));
        }
        handle.finish();

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.len(), 5);
        assert_eq!(recorded[0], event(0));
        assert_eq!(recorded[4], event(240));
        assert_eq!(handle.written(), 5);
        assert_eq!(handle.failed(), 0);
    }

    #[test]
    fn test_failures_counted_not_fatal() {
        let sink = SharedSink {
            recorded: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        };
        let mut handle = EventRecorder::new(sink).start().unwrap();

        assert!(handle.submit(event(0)));
        assert!(handle.submit(event(60)));
        handle.finish();

        assert_eq!(handle.written(), 0);
        assert_eq!(handle.failed(), 2);
    }

    #[test]
    fn test_submit_after_finish_rejected() {
        let sink = SharedSink {
            recorded: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        };
        let mut handle = EventRecorder::new(sink).start().unwrap();
        handle.finish();

        assert!(!handle.submit(event(0)));
        assert_eq!(handle.failed(), 1);
    }
}
