//! `MakeWriter` that turns formatted log output into spool records.

use std::io::{self, Write};

use tokio::sync::mpsc;
use tracing_subscriber::fmt::MakeWriter;

/// `tracing_subscriber` writer that forwards each log line to the spooler.
///
/// Sending never blocks; if the spooler is gone the record is dropped.
#[derive(Debug, Clone)]
pub struct SpoolMakeWriter {
    sender: mpsc::UnboundedSender<String>,
}

impl SpoolMakeWriter {
    pub(crate) fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self { sender }
    }
}

impl<'a> MakeWriter<'a> for SpoolMakeWriter {
    type Writer = SpoolWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SpoolWriter {
            sender: self.sender.clone(),
            buffer: LineBuffer::default(),
        }
    }
}

/// Writer for one formatted event; flushes any partial line on drop.
pub struct SpoolWriter {
    sender: mpsc::UnboundedSender<String>,
    buffer: LineBuffer,
}

impl SpoolWriter {
    fn emit(&self, line: String) {
        if !line.is_empty() {
            let _ = self.sender.send(line);
        }
    }
}

impl Write for SpoolWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for line in self.buffer.push(buf) {
            self.emit(line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SpoolWriter {
    fn drop(&mut self) {
        if let Some(line) = self.buffer.finish() {
            self.emit(line);
        }
    }
}

#[derive(Default)]
struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        self.drain_complete_lines()
    }

    fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = trim_line(&String::from_utf8_lossy(&self.buffer));
        self.buffer.clear();
        Some(line)
    }

    fn drain_complete_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.buffer.drain(..=last_newline).collect();
        complete
            .split(|&b| b == b'\n')
            .map(|line| trim_line(&String::from_utf8_lossy(line)))
            .filter(|line| !line.is_empty())
            .collect()
    }
}

fn trim_line(line: &str) -> String {
    line.trim_end_matches(['\r', '\n']).to_string()
}
