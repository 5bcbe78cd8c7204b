//! External merge sort for ledger records
//!
//! Produces a globally key-ordered stream of canonical lines from an input of
//! any size, using a fixed memory budget and temporary spill files.
//!
//! ## Strategy
//!
//! 1. **Partition**: buffer `chunk_size` records, sort by key, spill to `chunk_<n>.run`
//! 2. **Merge**: k-way merge of the chunks through a min-heap, deleting each
//!    chunk once exhausted
//!
//! The `System` backend replaces both phases with the `sort` executable.
//!
//! ## Memory Usage
//!
//! Partition holds one chunk of records; merge holds one line per chunk.

pub mod merge;
pub mod partition;
pub mod system;

pub use merge::{KWayMerge, MergeState};
pub use partition::{partition, PartitionStats, SpillDir};
pub use system::{system_sort, SortedFile};

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::config::{SortBackend, SummaryOptions};
use crate::error::{io_err, Phase, Result};
use crate::reader::{LedgerReader, ReadStats};
use crate::record::Record;

/// Globally sorted canonical lines, from either backend
pub enum SortedLines {
    Merge(KWayMerge),
    File(SortedFile),
}

impl Iterator for SortedLines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SortedLines::Merge(merge) => merge.next(),
            SortedLines::File(file) => file.next(),
        }
    }
}

/// Sort `records` with the configured backend.
///
/// Returns the sorted stream and the number of spill chunks written (0 for
/// the system backend). Spill files live under `options.temp_dir` and are gone
/// once the stream is exhausted or dropped.
pub fn sort_records<I>(records: I, options: &SummaryOptions) -> Result<(SortedLines, usize)>
where
    I: Iterator<Item = Result<Record>>,
{
    let mut spill = SpillDir::create_in(&options.temp_dir)?;
    match options.sort_backend {
        SortBackend::InProcess => {
            let stats = partition(records, options.chunk_size, &mut spill)?;
            info!(
                records = stats.records,
                chunks = stats.chunks,
                chunk_size = options.chunk_size,
                "partitioned input into sorted chunks"
            );
            Ok((SortedLines::Merge(KWayMerge::new(spill)), stats.chunks))
        }
        SortBackend::System => {
            let (sorted, _) = system_sort(records, spill)?;
            Ok((SortedLines::File(sorted), 0))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SortReport {
    pub read: ReadStats,
    pub spill_chunks: usize,
    pub lines_written: u64,
}

/// Sort a raw ledger file into a file of canonical lines ordered by key.
///
/// The output is written to a temporary file next to `output` and renamed
/// into place only after the merge completes.
pub fn sort_ledger_file(input: &Path, output: &Path, options: &SummaryOptions) -> Result<SortReport> {
    options.validate()?;

    let file = File::open(input).map_err(io_err(Phase::Read, input))?;
    let mut ledger = LedgerReader::new(BufReader::with_capacity(1024 * 1024, file), input);
    let (sorted, spill_chunks) = sort_records(&mut ledger, options)?;

    let mut tmp = crate::summary::partial_output(output)?;
    let mut lines_written = 0u64;
    {
        let mut writer = BufWriter::with_capacity(1024 * 1024, tmp.as_file_mut());
        for line in sorted {
            let line = line?;
            writer
                .write_all(line.as_bytes())
                .and_then(|_| writer.write_all(b"\n"))
                .map_err(io_err(Phase::Output, output))?;
            lines_written += 1;
        }
        writer.flush().map_err(io_err(Phase::Output, output))?;
    }
    crate::summary::finalize_output(tmp, output)?;

    Ok(SortReport {
        read: ledger.stats(),
        spill_chunks,
        lines_written,
    })
}
