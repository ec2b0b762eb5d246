//! Append-only CSV disturbance log
//!
//! ## File Format
//!
//! UTF-8, comma-separated, one header row followed by one row per event:
//!
//! ```text
//! day,start time,end time,duration,mean noise level
//! 05.03.2024,14:30:00,14:31:05,01:05,-12.3 dB
//! ```
//!
//! Duration is `MM:SS` with minutes allowed past 59. Rows are encoded with
//! the `csv` writer into memory, appended with a single `write_all` and
//! synced before `record` returns. A failed append is truncated back to the
//! previous length so the file never ends in a partial row.

use csv::{Terminator, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{EventSink, SinkError};
use crate::detection::event::DisturbanceEvent;

/// Column names of the disturbance log
pub const HEADER_FIELDS: [&str; 5] = [
    "day",
    "start time",
    "end time",
    "duration",
    "mean noise level",
];

/// Header row of the disturbance log, as it appears in the file
pub const HEADER: &str = "day,start time,end time,duration,mean noise level";

/// Unit label appended to the mean level
pub const LEVEL_UNIT: &str = "dB";

/// CSV file sink
#[derive(Debug)]
pub struct CsvEventSink {
    path: PathBuf,
}

impl CsvEventSink {
    /// Open the log at `path`, creating it with a header row if absent
    ///
    /// Creation uses create-new semantics so the header is written exactly
    /// once even if another process creates the file concurrently.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        ensure_header(&path)?;
        Ok(Self { path })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl EventSink for CsvEventSink {
    fn record(&mut self, event: &DisturbanceEvent) -> Result<(), SinkError> {
        let row = encode_record(&row_fields(event)).map_err(|source| SinkError::Encode {
            path: self.path.clone(),
            source,
        })?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        append_row(&mut file, &row).map_err(|e| self.io_error(e))?;

        tracing::debug!(
            path = %self.path.display(),
            row = %String::from_utf8_lossy(&row).trim_end(),
            "Disturbance logged"
        );
        Ok(())
    }
}

/// File operations needed to append a row and undo a failed append
trait LogFile: Write {
    fn len(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Append `row` in one write and sync it
///
/// On failure the file is cut back to its length before the call, so a
/// retry starts from a clean row boundary.
fn append_row<F: LogFile>(file: &mut F, row: &[u8]) -> io::Result<()> {
    let previous_len = file.len()?;

    let result = file.write_all(row).and_then(|_| file.sync());
    if let Err(e) = result {
        match file.truncate(previous_len).and_then(|_| file.sync()) {
            Ok(()) => tracing::warn!(error = %e, "Append failed, partial row removed"),
            Err(undo) => {
                tracing::error!(error = %e, truncate_error = %undo, "Append failed and could not be undone")
            }
        }
        return Err(e);
    }
    Ok(())
}

fn ensure_header(path: &Path) -> Result<(), SinkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }

    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            let header = encode_record(&HEADER_FIELDS).map_err(|source| SinkError::Encode {
                path: path.to_path_buf(),
                source,
            })?;
            append_row(&mut file, &header).map_err(|source| SinkError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::info!(path = %path.display(), "Created disturbance log");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            tracing::info!(path = %path.display(), "Appending to existing disturbance log");
            Ok(())
        }
        Err(source) => Err(SinkError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Encode one record, `\n`-terminated, into a buffer
fn encode_record<I, T>(fields: I) -> Result<Vec<u8>, csv::Error>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Column values of one event, in header order
pub fn row_fields(event: &DisturbanceEvent) -> [String; 5] {
    let start = event.start_time();
    let end = event.end_time();
    [
        start.format("%d.%m.%Y").to_string(),
        start.format("%H:%M:%S").to_string(),
        end.format("%H:%M:%S").to_string(),
        format_duration(event.duration().num_seconds()),
        format_level(event.mean_level()),
    ]
}

/// `MM:SS`, minutes are not wrapped into hours
pub fn format_duration(total_secs: i64) -> String {
    let total_secs = total_secs.max(0);
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Level with one decimal and unit label, e.g. `-12.3 dB`
pub fn format_level(level: f64) -> String {
    format!("{:.1} {}", level, LEVEL_UNIT)
}
