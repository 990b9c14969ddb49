//! One line per handled request, flushed as soon as it is written.

use std::{
    fmt,
    fs::File,
    io::{self, Write},
    path::Path,
    sync::{Mutex, PoisonError},
};

use crate::status::Status;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub method: String,
    /// Path without its leading `/`.
    pub path: String,
    pub status: Status,
    pub request_id: u64,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},/{},{},{}",
            self.method,
            self.path,
            self.status.code(),
            self.request_id
        )
    }
}

pub struct AuditLog {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl AuditLog {
    pub fn new(sink: Box<dyn Write + Send>) -> AuditLog {
        AuditLog {
            sink: Mutex::new(sink),
        }
    }

    pub fn stderr() -> AuditLog {
        AuditLog::new(Box::new(io::stderr()))
    }

    /// Creates or truncates the file at `path`.
    pub fn create(path: &Path) -> io::Result<AuditLog> {
        Ok(AuditLog::new(Box::new(File::create(path)?)))
    }

    /// Writes `record` as a single line. Records from concurrent workers never
    /// interleave.
    pub fn record(&self, record: &LogRecord) {
        let line = format!("{record}\n");
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = sink.write_all(line.as_bytes()).and_then(|_| sink.flush()) {
            log::error!("Failed to write audit record {record}: {e}");
        }
    }

    pub fn flush(&self) -> io::Result<()> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}
