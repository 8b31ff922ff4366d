//! Routes `tracing` output to the browser console.

use std::io;
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Installs the global subscriber. Calling it again is a no-op.
///
/// Unknown level names fall back to `info`.
pub fn init(level: Option<&str>) {
    let level = parse_level(level);

    // wasm32-unknown-unknown has no clock, so timestamps are off
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(ConsoleMakeWriter)
        .without_time()
        .with_target(false)
        .try_init();
}

fn parse_level(level: Option<&str>) -> Level {
    level
        .and_then(|l| Level::from_str(l).ok())
        .unwrap_or(Level::INFO)
}

struct ConsoleMakeWriter;

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter::default()
    }
}

/// Buffers one formatted event and emits it as a single console line on drop.
#[derive(Default)]
struct ConsoleWriter {
    buf: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let line = String::from_utf8_lossy(&self.buf);
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        let value = wasm_bindgen::JsValue::from_str(line);
        let level = line.trim_start();
        if level.starts_with("ERROR") {
            web_sys::console::error_1(&value);
        } else if level.starts_with("WARN") {
            web_sys::console::warn_1(&value);
        } else {
            web_sys::console::log_1(&value);
        }
    }
}
