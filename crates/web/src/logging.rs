//! Routing `tracing` output to the browser console
//!
//! A page has no Rust caller to install a subscriber, so the crate installs
//! one itself: each event is formatted as one line and handed to an `Emit`
//! function (on wasm32, `console.error` / `console.warn` / `console.log`).

use std::io;
use tracing::{Level, Metadata, Subscriber};
use tracing_subscriber::fmt::MakeWriter;

/// Sink for one formatted log line
pub type Emit = fn(Level, &str);

/// `MakeWriter` delivering every event to `emit` as a single line
#[derive(Clone, Copy)]
pub struct LineMakeWriter {
    emit: Emit,
}

/// Buffers one event, emitting it when dropped
pub struct LineWriter {
    level: Level,
    emit: Emit,
    buf: Vec<u8>,
}

impl io::Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buf);
        let line = text.trim_end();
        if !line.is_empty() {
            (self.emit)(self.level, line);
        }
    }
}

impl<'a> MakeWriter<'a> for LineMakeWriter {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            level: Level::INFO,
            emit: self.emit,
            buf: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        LineWriter {
            level: *meta.level(),
            emit: self.emit,
            buf: Vec::new(),
        }
    }
}

/// Plain-text subscriber (no timestamps, no colors) writing through `emit`
pub fn subscriber(emit: Emit, max_level: Level) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_writer(LineMakeWriter { emit })
        .with_max_level(max_level)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .finish()
}

/// Install the console subscriber as the global default
///
/// Returns false if a global subscriber was already set.
pub fn install(emit: Emit, max_level: Level) -> bool {
    tracing::subscriber::set_global_default(subscriber(emit, max_level)).is_ok()
}
