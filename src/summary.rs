//! Summary driver
//!
//! `run_summary` wires reader → (in-memory | external sort → batcher →
//! run-length aggregator) → output file. The output is written to a
//! `.partial` temp file in the destination directory and renamed over the
//! target only when every stage succeeded.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use crate::aggregate::{aggregate_batch, aggregate_in_memory};
use crate::batch::BoundaryBatcher;
use crate::config::{Strategy, SummaryOptions};
use crate::error::{io_err, Phase, Result};
use crate::reader::{LedgerReader, ReadStats};
use crate::sort_merge::sort_records;

const IO_BUFFER: usize = 1024 * 1024;

/// Counters for one summary run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Strategy actually used (never `Auto`)
    pub strategy: Strategy,
    pub read: ReadStats,
    pub spill_chunks: usize,
    pub batches: usize,
    pub oversized_batches: usize,
    pub summary_rows: u64,
}

/// Summarize the ledger at `input` into `output`.
///
/// On success `output` holds one `debtor,creditor,total` line per distinct
/// key. On failure `output` is left untouched and no temporary files remain.
pub fn run_summary(input: &Path, output: &Path, options: &SummaryOptions) -> Result<RunReport> {
    options.validate()?;
    let start = Instant::now();

    let input_len = std::fs::metadata(input).map_err(io_err(Phase::Read, input))?.len();
    let strategy = options
        .strategy
        .resolve(Some(input_len), options.in_memory_threshold);

    info!(
        input = %input.display(),
        output = %output.display(),
        bytes = input_len,
        ?strategy,
        "summarizing ledger"
    );

    let file = File::open(input).map_err(io_err(Phase::Read, input))?;
    let reader = LedgerReader::new(BufReader::with_capacity(IO_BUFFER, file), input);

    let mut tmp = partial_output(output)?;
    let report = {
        let mut writer = BufWriter::with_capacity(IO_BUFFER, tmp.as_file_mut());
        let report = summarize_with(reader, &mut writer, output, strategy, options)?;
        writer.flush().map_err(io_err(Phase::Output, output))?;
        report
    };
    finalize_output(tmp, output)?;

    info!(
        rows = report.summary_rows,
        malformed = report.read.malformed,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "summary written"
    );
    Ok(report)
}

/// Same pipeline over arbitrary endpoints. `Strategy::Auto` resolves to
/// external here since the input size is unknown.
pub fn summarize_reader<R, W>(reader: R, writer: &mut W, options: &SummaryOptions) -> Result<RunReport>
where
    R: BufRead,
    W: Write,
{
    options.validate()?;
    let strategy = options.strategy.resolve(None, options.in_memory_threshold);
    let reader = LedgerReader::new(reader, "<input>");
    summarize_with(reader, writer, Path::new("<output>"), strategy, options)
}

fn summarize_with<R, W>(
    mut reader: LedgerReader<R>,
    writer: &mut W,
    output: &Path,
    strategy: Strategy,
    options: &SummaryOptions,
) -> Result<RunReport>
where
    R: BufRead,
    W: Write,
{
    let mut report = RunReport {
        strategy,
        ..Default::default()
    };

    match strategy {
        Strategy::InMemory => {
            report.summary_rows = aggregate_in_memory(&mut reader, writer, output)?;
        }
        Strategy::External | Strategy::Auto => {
            let (sorted, spill_chunks) = sort_records(&mut reader, options)?;
            report.spill_chunks = spill_chunks;

            let mut batcher = BoundaryBatcher::new(sorted, options.max_batch_bytes);
            for batch in &mut batcher {
                report.summary_rows += aggregate_batch(&batch?, writer, output)?;
            }
            report.batches = batcher.emitted();
            report.oversized_batches = batcher.oversized();
        }
    }

    report.read = reader.stats();
    Ok(report)
}

/// Temp file next to `output` that becomes `output` on `finalize_output`
pub(crate) fn partial_output(output: &Path) -> Result<NamedTempFile> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".debt-summary-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(io_err(Phase::Output, output))
}

pub(crate) fn finalize_output(tmp: NamedTempFile, output: &Path) -> Result<()> {
    tmp.as_file().sync_all().map_err(io_err(Phase::Output, output))?;
    tmp.persist(output)
        .map_err(|e| io_err(Phase::Output, output)(e.error))?;
    Ok(())
}
