//! In-memory ring of recent log lines shown under the status table.

use std::{
    collections::VecDeque,
    io::{self, Write},
    sync::{Arc, Mutex, PoisonError},
};

/// Lines kept when no capacity is given.
pub const DEFAULT_LOG_LINES: usize = 8;

/// Shared ring buffer written by the tracing console layer.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogBuffer {
    /// Create a ring holding at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self { lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))), capacity }
    }

    /// Append a line, evicting the oldest when full.
    pub fn push(&self, line: String) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Copy of the buffered lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }

    /// Writer factory for `tracing_subscriber::fmt::layer().with_writer(..)`.
    pub fn make_writer(&self) -> LogMakeWriter {
        LogMakeWriter { buffer: self.clone() }
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_LINES)
    }
}

/// Per-event writer splitting formatted output into lines.
#[derive(Debug)]
pub struct LogWriter {
    buffer: LogBuffer,
    pending: String,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.push_str(&String::from_utf8_lossy(buf));

        while let Some(end) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=end).collect();
            let line = line.trim_end();
            if !line.is_empty() {
                self.buffer.push(line.to_string());
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.buffer.push(line);
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// `MakeWriter` handing out [`LogWriter`]s for one [`LogBuffer`].
#[derive(Debug, Clone)]
pub struct LogMakeWriter {
    buffer: LogBuffer,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogMakeWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter { buffer: self.buffer.clone(), pending: String::new() }
    }
}
