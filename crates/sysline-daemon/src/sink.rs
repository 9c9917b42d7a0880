//! Standard output sink.

use std::io::{self, Write};
use sysline_core::{DisplayLine, DisplaySink};

/// Writes each line to stdout and flushes, so pipes see it immediately.
pub struct StdoutSink {
    out: io::Stdout,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }

    pub fn write(&mut self, line: &DisplayLine) -> io::Result<()> {
        let mut out = self.out.lock();
        writeln!(out, "{}", line)?;
        out.flush()
    }
}

impl DisplaySink for StdoutSink {
    fn publish(&mut self, line: &DisplayLine) -> sysline_core::Result<()> {
        Ok(self.write(line)?)
    }
}
