//! Session transcript sink.
//!
//! The transcript is an artifact of the run, not telemetry: it is what a
//! human reads to audit how the search reached its conclusion, and where
//! per-trial debug blobs end up. Operational diagnostics of the adapters
//! go through `tracing` instead.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// Receives the session transcript and named debug blobs.
pub trait Tracer {
    /// Appends one line to the session transcript.
    fn log(&self, msg: fmt::Arguments<'_>);

    /// Persists a debug blob under `name`.
    fn save_file(&self, name: &str, data: &[u8]);
}

/// Discards all output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTracer;

impl Tracer for NullTracer {
    fn log(&self, _msg: fmt::Arguments<'_>) {}

    fn save_file(&self, _name: &str, _data: &[u8]) {}
}

/// Writes the transcript to `log.txt` and blobs into the same directory.
#[derive(Debug)]
pub struct FileTracer {
    log: Mutex<File>,
    dir: PathBuf,
}

impl FileTracer {
    /// Creates `dir` if needed and opens `dir/log.txt` for appending.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory or log file cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("log.txt"))?;
        Ok(Self {
            log: Mutex::new(log),
            dir,
        })
    }
}

impl Tracer for FileTracer {
    fn log(&self, msg: fmt::Arguments<'_>) {
        let mut file = self.log.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(err) = writeln!(file, "{msg}") {
            tracing::warn!(error = %err, "failed to append to bisection log");
        }
    }

    fn save_file(&self, name: &str, data: &[u8]) {
        let path = self.dir.join(name);
        if let Err(err) = fs::write(&path, data) {
            tracing::warn!(error = %err, path = %path.display(), "failed to save debug blob");
        }
    }
}
