//! Output formatting for extracted pairs.
//!
//! Supports the plain `<fingerprint> <bandwidth>` listing, CSV and JSON Lines.

use anyhow::Result;
use clap::ValueEnum;
use csv::WriterBuilder;
use std::io::{self, Write};
use tracing::debug;

use crate::parser::{ExtractError, Pair};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One `<fingerprint> <bandwidth>` line per pair
    #[default]
    Plain,
    /// CSV with a `fingerprint,bandwidth` header
    Csv,
    /// One JSON object per line
    Json,
}

enum Sink<W: Write> {
    Plain(W),
    Csv(csv::Writer<W>),
    Json(W),
}

/// Streams pairs to a writer in one [`OutputFormat`].
///
/// A single writer can take pairs from several files; CSV gets one header.
pub struct PairWriter<W: Write> {
    sink: Sink<W>,
    count: usize,
}

impl<W: Write> PairWriter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        let sink = match format {
            OutputFormat::Plain => Sink::Plain(writer),
            OutputFormat::Csv => {
                Sink::Csv(WriterBuilder::new().has_headers(true).from_writer(writer))
            }
            OutputFormat::Json => Sink::Json(writer),
        };
        Self { sink, count: 0 }
    }

    pub fn write(&mut self, pair: &Pair) -> Result<()> {
        match &mut self.sink {
            Sink::Plain(w) => writeln!(w, "{} {}", pair.fingerprint, pair.bandwidth)?,
            Sink::Csv(w) => w.serialize(pair)?,
            Sink::Json(w) => writeln!(w, "{}", serde_json::to_string(pair)?)?,
        }
        self.count += 1;
        Ok(())
    }

    /// Writes everything `pairs` yields, stopping at the first extraction error.
    pub fn write_all<I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<Pair, ExtractError>>,
    {
        for pair in pairs {
            self.write(&pair?)?;
        }
        Ok(())
    }

    /// Flushes the underlying writer and returns how many pairs were written.
    pub fn finish(mut self) -> Result<usize> {
        match &mut self.sink {
            Sink::Plain(w) | Sink::Json(w) => w.flush()?,
            Sink::Csv(w) => w.flush()?,
        }
        debug!(count = self.count, "Pairs written");
        Ok(self.count)
    }
}

/// Writes every pair to `writer`, stopping at the first extraction error.
///
/// Returns the number of pairs written.
pub fn write_pairs<W, I>(writer: W, pairs: I, format: OutputFormat) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = Result<Pair, ExtractError>>,
{
    let mut out = PairWriter::new(writer, format);
    out.write_all(pairs)?;
    out.finish()
}

/// True if the error chain bottoms out in a closed pipe on the consumer side.
pub fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(e) = cause.downcast_ref::<io::Error>() {
            return e.kind() == io::ErrorKind::BrokenPipe;
        }
        if let Some(e) = cause.downcast_ref::<csv::Error>() {
            return matches!(e.kind(), csv::ErrorKind::Io(inner) if inner.kind() == io::ErrorKind::BrokenPipe);
        }
        false
    })
}
