//! Streaming ledger reader
//!
//! Wraps any `BufRead` and yields valid records. Malformed lines are logged and
//! skipped; only I/O failures end the stream with an error.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::error::{io_err, Phase, Result};
use crate::record::{self, Record};

/// Line counters for one pass over a ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadStats {
    /// Physical lines seen, including blank and malformed ones
    pub lines: u64,
    /// Lines accepted as records
    pub records: u64,
    /// Lines rejected by the codec
    pub malformed: u64,
    /// Whitespace-only lines
    pub blank: u64,
}

pub struct LedgerReader<R> {
    inner: R,
    source: PathBuf,
    buf: Vec<u8>,
    stats: ReadStats,
    failed: bool,
}

impl<R: BufRead> LedgerReader<R> {
    /// `source` names the input in diagnostics and errors
    pub fn new(inner: R, source: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            source: source.into(),
            buf: Vec::new(),
            stats: ReadStats::default(),
            failed: false,
        }
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    fn read_record(&mut self) -> Result<Option<Record>> {
        loop {
            self.buf.clear();
            let n = self
                .inner
                .read_until(b'\n', &mut self.buf)
                .map_err(io_err(Phase::Read, &self.source))?;
            if n == 0 {
                return Ok(None);
            }
            self.stats.lines += 1;

            let Ok(text) = std::str::from_utf8(&self.buf) else {
                self.stats.malformed += 1;
                warn!(
                    source = %self.source.display(),
                    line_no = self.stats.lines,
                    "Skipping ledger line that is not valid UTF-8: {}",
                    String::from_utf8_lossy(&self.buf).trim_end_matches(['\n', '\r'])
                );
                continue;
            };

            let line = text.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                self.stats.blank += 1;
                continue;
            }

            match record::parse(line) {
                Ok(record) => {
                    self.stats.records += 1;
                    return Ok(Some(record));
                }
                Err(reason) => {
                    self.stats.malformed += 1;
                    warn!(
                        source = %self.source.display(),
                        line_no = self.stats.lines,
                        %reason,
                        "Skipping invalid ledger line: {}",
                        line
                    );
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for LedgerReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = self.read_record();
        if next.is_err() {
            self.failed = true;
        }
        next.transpose()
    }
}
