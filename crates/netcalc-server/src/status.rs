//! Live connection table.
//!
//! A dedicated OS thread redraws the table whenever the registry changes, and
//! at least once per refresh interval so the elapsed column keeps moving.

use std::{
    fmt::Write as _,
    io::{self, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    log_buffer::LogBuffer,
    registry::{ConnectionRegistry, SessionInfo},
};

/// Default redraw floor, in milliseconds.
pub const DEFAULT_REFRESH_MS: u64 = 500;

const IP_WIDTH: usize = 15;
const PORT_WIDTH: usize = 5;
const OPS_WIDTH: usize = 6;
const TIME_WIDTH: usize = 5;

/// Clear screen and home the cursor.
const CLEAR: &str = "\x1b[2J\x1b[H";

/// Render the table and the recent log lines.
pub fn render_table(entries: &[SessionInfo], now: Instant, logs: &[String]) -> String {
    let mut out = String::new();
    let border = |left: char, mid: char, right: char| {
        format!(
            "{left}{}{mid}{}{mid}{}{mid}{}{right}\n",
            "─".repeat(IP_WIDTH + 2),
            "─".repeat(PORT_WIDTH + 2),
            "─".repeat(OPS_WIDTH + 2),
            "─".repeat(TIME_WIDTH + 2),
        )
    };

    let _ = writeln!(out, " Active connections: {}", entries.len());
    out.push_str(&border('┌', '┬', '┐'));
    let _ = writeln!(
        out,
        "│ {:<IP_WIDTH$} │ {:<PORT_WIDTH$} │ {:<OPS_WIDTH$} │ {:<TIME_WIDTH$} │",
        "IP", "Port", "Op num", "Time"
    );
    out.push_str(&border('├', '┼', '┤'));

    for entry in entries {
        let _ = writeln!(
            out,
            "│ {:<IP_WIDTH$} │ {:>PORT_WIDTH$} │ {:>OPS_WIDTH$} │ {:>TIME_WIDTH$} │",
            entry.peer.ip(),
            entry.peer.port(),
            entry.operations,
            entry.connected_for(now).as_secs(),
        );
    }
    out.push_str(&border('└', '┴', '┘'));

    if !logs.is_empty() {
        out.push_str(" Recent log:\n");
        for line in logs {
            let _ = writeln!(out, "  {line}");
        }
    }
    out
}

/// Handle to the display thread.
#[derive(Debug)]
pub struct StatusDisplay {
    stop: Arc<AtomicBool>,
    registry: Arc<ConnectionRegistry>,
    handle: Option<JoinHandle<()>>,
}

impl StatusDisplay {
    /// Start redrawing onto `writer`.
    pub fn spawn<W>(
        registry: Arc<ConnectionRegistry>,
        logs: LogBuffer,
        interval: Duration,
        mut writer: W,
    ) -> io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));

        let handle = thread::Builder::new().name("status-display".to_string()).spawn({
            let stop = Arc::clone(&stop);
            let registry = Arc::clone(&registry);
            move || {
                while !stop.load(Ordering::Acquire) {
                    let seen = registry.generation();
                    let frame = render_table(&registry.snapshot(), Instant::now(), &logs.lines());
                    let drawn = writer
                        .write_all(CLEAR.as_bytes())
                        .and_then(|()| writer.write_all(frame.as_bytes()))
                        .and_then(|()| writer.flush());
                    if drawn.is_err() {
                        break;
                    }
                    registry.wait_for_change_since(seen, interval);
                }
            }
        })?;

        Ok(Self { stop, registry, handle: Some(handle) })
    }

    /// Stop redrawing and join the thread.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.registry.wake();

        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("status display thread panicked");
        }
    }
}

impl Drop for StatusDisplay {
    fn drop(&mut self) {
        self.halt();
    }
}
