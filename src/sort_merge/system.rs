//! Out-of-process sort backend
//!
//! Normalizes the ledger to canonical lines, then hands the file to the system
//! `sort` with byte collation and a stable sort on fields 1-2. That is the same
//! total order the in-process partition + merge produces.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::Command;

use tracing::info;

use super::partition::SpillDir;
use crate::error::{io_err, Phase, Result, SummaryError};
use crate::record::Record;

/// Sorted canonical file, kept alive by the spill dir that contains it
pub struct SortedFile {
    reader: BufReader<File>,
    path: PathBuf,
    _spill: SpillDir,
    failed: bool,
}

impl SortedFile {
    fn open(path: PathBuf, spill: SpillDir) -> Result<Self> {
        let file = File::open(&path).map_err(io_err(Phase::SortCommand, &path))?;
        Ok(Self {
            reader: BufReader::with_capacity(1024 * 1024, file),
            path,
            _spill: spill,
            failed: false,
        })
    }
}

impl Iterator for SortedFile {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                }
                Some(Ok(line))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(io_err(Phase::Merge, &self.path)(e)))
            }
        }
    }
}

/// Write `records` as canonical lines and sort them with the system `sort`.
///
/// Returns the sorted file and the number of records written.
pub fn system_sort<I>(records: I, spill: SpillDir) -> Result<(SortedFile, u64)>
where
    I: Iterator<Item = Result<Record>>,
{
    let unsorted = spill.path().join("canonical.unsorted");
    let sorted = spill.path().join("canonical.sorted");

    let file = File::create(&unsorted).map_err(io_err(Phase::Partition, &unsorted))?;
    let mut writer = BufWriter::with_capacity(1024 * 1024, file);
    let mut count = 0u64;
    for record in records {
        let record = record?;
        writeln!(writer, "{}", record.to_line()).map_err(io_err(Phase::Partition, &unsorted))?;
        count += 1;
    }
    writer.flush().map_err(io_err(Phase::Partition, &unsorted))?;
    drop(writer);

    let sort_bin = which::which("sort")
        .map_err(|e| SummaryError::SortCommand(format!("`sort` not found in PATH: {}", e)))?;

    info!(records = count, sort = %sort_bin.display(), "running system sort");

    let output = Command::new(&sort_bin)
        .env("LC_ALL", "C")
        .arg("-s")
        .arg("-t")
        .arg(",")
        .arg("-k1,2")
        .arg("-T")
        .arg(spill.path())
        .arg("-o")
        .arg(&sorted)
        .arg(&unsorted)
        .output()
        .map_err(io_err(Phase::SortCommand, &sort_bin))?;

    if !output.status.success() {
        return Err(SummaryError::SortCommand(format!(
            "{} exited with {:?}: {}",
            sort_bin.display(),
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let _ = std::fs::remove_file(&unsorted);
    Ok((SortedFile::open(sorted, spill)?, count))
}
