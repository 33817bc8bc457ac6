//! Plain-text parameter log
//!
//! One space-separated line per time step, preceded by a header naming the
//! columns. Floats are written in shortest round-trip exponent form so the log
//! loses no precision.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::{LogSink, OutputError};
use crate::diagnostics::DiagnosticSnapshot;

/// Text log writer over any byte sink
pub struct ParameterLog<W: Write> {
    /// `None` once closed
    writer: Option<BufWriter<W>>,
    lines: usize,
}

impl ParameterLog<File> {
    /// Create (truncating) a log file
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Io`] if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, OutputError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> ParameterLog<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(BufWriter::new(writer)),
            lines: 0,
        }
    }

    /// Number of lines written so far, header included
    pub fn lines_written(&self) -> usize {
        self.lines
    }

    /// Append a raw line
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Closed`] after [`LogSink::close`], or
    /// [`OutputError::Io`] on write failure.
    pub fn log_str(&mut self, line: &str) -> Result<(), OutputError> {
        let writer = self.writer.as_mut().ok_or(OutputError::Closed)?;
        writeln!(writer, "{line}")?;
        self.lines += 1;
        Ok(())
    }

    /// Render a snapshot in column order
    pub fn format_snapshot(snapshot: &DiagnosticSnapshot) -> String {
        let mut line = snapshot.timestep.to_string();
        for value in snapshot.values() {
            // Writing into a String cannot fail
            let _ = write!(line, " {value:e}");
        }
        line
    }
}

impl<W: Write> LogSink for ParameterLog<W> {
    fn write_header(&mut self) -> Result<(), OutputError> {
        self.log_str(&DiagnosticSnapshot::COLUMNS.join(" "))
    }

    fn append(&mut self, snapshot: &DiagnosticSnapshot) -> Result<(), OutputError> {
        self.log_str(&Self::format_snapshot(snapshot))
    }

    fn close(&mut self) -> Result<(), OutputError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl<W: Write> Drop for ParameterLog<W> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
