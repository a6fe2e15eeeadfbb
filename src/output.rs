//! Command output: pretty JSON with `--json`, otherwise plain tables and
//! key/value listings.

use crate::error::{CliError, Result};
use comfy_table::{Row, Table, presets::NOTHING};
use serde::Serialize;
use std::io::Write;

/// Renders command results to a writer.
pub struct Printer<W: Write> {
    json: bool,
    out: W,
}

impl Printer<std::io::Stdout> {
    /// Printer writing to stdout.
    pub fn stdout(json: bool) -> Self {
        Self::new(json, std::io::stdout())
    }
}

impl<W: Write> Printer<W> {
    /// Printer writing to `out`; `json` selects JSON rendering.
    pub fn new(json: bool, out: W) -> Self {
        Self { json, out }
    }

    /// Whether `--json` output was requested.
    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Write `value` as pretty JSON followed by a newline.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let body = serde_json::to_string_pretty(value)
            .map_err(|e| CliError::Internal(format!("encode output: {e}")))?;
        writeln!(self.out, "{body}")?;
        Ok(())
    }

    /// Write a borderless table.
    pub fn table<H, R>(&mut self, headers: H, rows: R) -> Result<()>
    where
        H: Into<Row>,
        R: IntoIterator,
        R::Item: Into<Row>,
    {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_header(headers);
        for row in rows {
            table.add_row(row);
        }
        writeln!(self.out, "{table}")?;
        Ok(())
    }

    /// Write `key: value` lines with the values aligned.
    pub fn kv(&mut self, pairs: &[(&str, String)]) -> Result<()> {
        let width = pairs.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in pairs {
            writeln!(self.out, "{:<width$}  {value}", format!("{key}:"), width = width + 1)?;
        }
        Ok(())
    }

    /// Write a single line.
    pub fn line(&mut self, text: impl std::fmt::Display) -> Result<()> {
        writeln!(self.out, "{text}")?;
        Ok(())
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}
