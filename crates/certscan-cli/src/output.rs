//! Rendering scan events
//!
//! Text output keeps certificates on stdout and diagnostics on stderr. JSON
//! output writes one object per event to stdout.

use std::io::Write;

use certscan::{CertificateRecord, Diagnostic, ScanEvent};
use clap::ValueEnum;
use serde::Serialize;

use crate::Result;

/// Output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One sentence per certificate (default)
    #[default]
    Text,
    /// JSON lines
    Json,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum JsonEvent<'a> {
    Certificate(&'a CertificateRecord),
    Diagnostic {
        namespace: &'a str,
        gateway: &'a str,
        secret: Option<&'a str>,
        error: String,
    },
}

impl<'a> From<&'a ScanEvent> for JsonEvent<'a> {
    fn from(event: &'a ScanEvent) -> Self {
        match event {
            ScanEvent::Certificate(record) => JsonEvent::Certificate(record),
            ScanEvent::Diagnostic(diag) => JsonEvent::Diagnostic {
                namespace: diag.namespace(),
                gateway: diag.gateway(),
                secret: diag.secret(),
                error: diag.cause(),
            },
        }
    }
}

/// Writes scan events in the selected format
pub struct Printer<W: Write, E: Write> {
    format: OutputFormat,
    out: W,
    err: E,
}

impl<W: Write, E: Write> Printer<W, E> {
    pub fn new(format: OutputFormat, out: W, err: E) -> Self {
        Self { format, out, err }
    }

    /// Write one event
    pub fn print(&mut self, event: &ScanEvent) -> Result<()> {
        match self.format {
            OutputFormat::Text => match event {
                ScanEvent::Certificate(record) => writeln!(self.out, "{}", record)?,
                ScanEvent::Diagnostic(diag) => self.print_diagnostic(diag)?,
            },
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, &JsonEvent::from(event))?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    fn print_diagnostic(&mut self, diag: &Diagnostic) -> Result<()> {
        writeln!(self.err, "{}", diag)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        self.err.flush()?;
        Ok(())
    }

    /// Consume the printer, returning its writers
    pub fn into_inner(self) -> (W, E) {
        (self.out, self.err)
    }
}
