//! Append-only task log, flushed once on shutdown (spec §4.4, C8).
//!
//! Grounded on the teacher's `ll::reply` buffer, which accumulates
//! fixed-shape records into a growable backing store and only touches the
//! outside world (the kernel fd there, a file here) once the buffer is
//! handed off.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Mutex;

const INITIAL_CAPACITY: usize = 64;

/// One non-boundary log row: `file_name dataset_name base_addr
/// file_elem_offset elem_count mem_elem_offset` (spec §4.4/§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub file_name: String,
    pub dataset_name: String,
    pub base_addr: u64,
    pub file_elem_offset: u64,
    pub elem_count: u64,
    pub mem_elem_offset: u64,
}

enum LogEntry {
    Record(LogRecord),
    Boundary,
}

/// In-memory, auto-growing record table (C8). One instance lives for the
/// lifetime of the connector; nothing touches disk until
/// [`Logger::flush_to`] is called at terminate.
pub struct Logger {
    entries: Mutex<Vec<LogEntry>>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(INITIAL_CAPACITY)),
        }
    }

    /// Append one record for an emitted task. Called once per `Task`, in
    /// emission order (spec: "Logger record order is the task-emission
    /// order").
    pub fn append_record(&self, record: LogRecord) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() == entries.capacity() {
            let additional = entries.capacity().max(1);
            entries.reserve(additional);
        }
        entries.push(LogEntry::Record(record));
    }

    /// Append a boundary marking the end of one request. In pool mode the
    /// dispatcher calls this once per completed bypassable read; in
    /// serial mode it's called once, at terminate, regardless of how many
    /// requests ran (spec §4.4).
    pub fn append_boundary(&self) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() == entries.capacity() {
            let additional = entries.capacity().max(1);
            entries.reserve(additional);
        }
        entries.push(LogEntry::Boundary);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the whole table to `path`, one record per line, and a
    /// literal `###` for each boundary (spec §6 "Log file"). Called
    /// exactly once, on connector terminate.
    pub fn flush_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let entries = self.entries.lock().unwrap();
        let mut out = String::with_capacity(entries.len() * 32);
        for entry in entries.iter() {
            match entry {
                LogEntry::Record(r) => {
                    out.push_str(&format!(
                        "{} {} {} {} {} {}\n",
                        r.file_name,
                        r.dataset_name,
                        r.base_addr,
                        r.file_elem_offset,
                        r.elem_count,
                        r.mem_elem_offset
                    ));
                }
                LogEntry::Boundary => out.push_str("###\n"),
            }
        }
        fs::write(path, out)
    }
}
