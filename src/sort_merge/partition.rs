//! Phase 1 of the external sort: sorted spill chunks
//!
//! Records are buffered `chunk_size` at a time, sorted by key and written as
//! canonical lines to `chunk_<n>.run` inside a private spill directory.
//! Peak memory is one chunk of records.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::{io_err, Phase, Result};
use crate::record::Record;

const SPILL_WRITE_BUFFER: usize = 1024 * 1024;

/// Private directory owning the spill chunks of one sort.
///
/// Dropping it removes the directory and every chunk still in it, which is
/// what cleans up after both successful and failed runs.
#[derive(Debug)]
pub struct SpillDir {
    // Field order is drop order: the spill dir goes before its created parents
    dir: TempDir,
    chunks: Vec<PathBuf>,
    _parents: CreatedDirs,
}

/// Ancestors of a spill dir that did not exist before it, deepest first.
/// Removed on drop if still empty.
#[derive(Debug, Default)]
struct CreatedDirs(Vec<PathBuf>);

impl CreatedDirs {
    fn create_all(path: &Path) -> Result<Self> {
        let missing: Vec<PathBuf> = path
            .ancestors()
            .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
            .map(Path::to_path_buf)
            .collect();
        fs::create_dir_all(path).map_err(io_err(Phase::Partition, path))?;
        Ok(Self(missing))
    }
}

impl Drop for CreatedDirs {
    fn drop(&mut self) {
        for dir in &self.0 {
            // fails (and stops) once a directory is shared with someone else
            if fs::remove_dir(dir).is_err() {
                break;
            }
        }
    }
}

impl SpillDir {
    /// Create a fresh `.ledger-spill-*` directory under `parent`.
    ///
    /// Missing parents are created and removed again when the spill dir is
    /// dropped, as long as nothing else was put in them.
    pub fn create_in(parent: &Path) -> Result<Self> {
        let parents = CreatedDirs::create_all(parent)?;
        let dir = tempfile::Builder::new()
            .prefix(".ledger-spill-")
            .tempdir_in(parent)
            .map_err(io_err(Phase::Partition, parent))?;
        Ok(Self {
            dir,
            chunks: Vec::new(),
            _parents: parents,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Chunk files in creation order; the index is the merge tie-breaker
    pub fn chunk_paths(&self) -> &[PathBuf] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Sort `lines` by key and persist them as the next chunk
    fn spill(&mut self, lines: &mut Vec<SpillLine>) -> Result<()> {
        // stable: equal keys keep input order
        lines.sort_by(|a, b| a.key().cmp(b.key()));

        let path = self.dir.path().join(format!("chunk_{}.run", self.chunks.len()));
        let file = File::create(&path).map_err(io_err(Phase::Partition, &path))?;
        let mut writer = BufWriter::with_capacity(SPILL_WRITE_BUFFER, file);
        for line in lines.iter() {
            writer
                .write_all(line.line.as_bytes())
                .and_then(|_| writer.write_all(b"\n"))
                .map_err(io_err(Phase::Partition, &path))?;
        }
        writer.flush().map_err(io_err(Phase::Partition, &path))?;

        debug!(chunk = self.chunks.len(), records = lines.len(), "spilled sorted chunk");
        self.chunks.push(path);
        lines.clear();
        Ok(())
    }
}

/// Canonical line plus the length of its key prefix
#[derive(Debug)]
struct SpillLine {
    line: String,
    key_len: usize,
}

impl SpillLine {
    fn key(&self) -> &str {
        &self.line[..self.key_len]
    }
}

impl From<&Record> for SpillLine {
    fn from(record: &Record) -> Self {
        Self {
            line: record.to_line(),
            key_len: record.key_len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionStats {
    pub chunks: usize,
    pub records: u64,
    pub largest_chunk: usize,
}

/// Split `records` into sorted spill chunks of at most `chunk_size` records.
///
/// Empty input creates no chunk. Any error leaves `spill` holding whatever
/// was written; dropping it removes those files.
pub fn partition<I>(records: I, chunk_size: usize, spill: &mut SpillDir) -> Result<PartitionStats>
where
    I: Iterator<Item = Result<Record>>,
{
    let chunk_size = chunk_size.max(1);
    let mut buffer: Vec<SpillLine> = Vec::with_capacity(chunk_size.min(1 << 16));
    let mut stats = PartitionStats::default();

    for record in records {
        let record = record?;
        buffer.push(SpillLine::from(&record));
        stats.records += 1;

        if buffer.len() == chunk_size {
            stats.largest_chunk = stats.largest_chunk.max(buffer.len());
            spill.spill(&mut buffer)?;
        }
    }

    if !buffer.is_empty() {
        stats.largest_chunk = stats.largest_chunk.max(buffer.len());
        spill.spill(&mut buffer)?;
    }

    stats.chunks = spill.len();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse;

    fn records(lines: &[&str]) -> Vec<Result<Record>> {
        lines.iter().map(|l| Ok(parse(l).unwrap())).collect()
    }

    #[test]
    fn test_chunks_are_sorted_and_numbered() {
        let tmp = tempfile::tempdir().unwrap();
        let mut spill = SpillDir::create_in(tmp.path()).unwrap();

        let input = records(&["c,d,1", "a,b,2", "b,a,3", "a,b,4", "z,z,5"]);
        let stats = partition(input.into_iter(), 2, &mut spill).unwrap();

        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.records, 5);
        assert_eq!(stats.largest_chunk, 2);

        let names: Vec<String> = spill
            .chunk_paths()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["chunk_0.run", "chunk_1.run", "chunk_2.run"]);

        let chunk0 = fs::read_to_string(&spill.chunk_paths()[0]).unwrap();
        assert_eq!(chunk0, "a,b,2\nc,d,1\n");
        let chunk1 = fs::read_to_string(&spill.chunk_paths()[1]).unwrap();
        assert_eq!(chunk1, "a,b,4\nb,a,3\n");
        let chunk2 = fs::read_to_string(&spill.chunk_paths()[2]).unwrap();
        assert_eq!(chunk2, "z,z,5\n");
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let mut spill = SpillDir::create_in(tmp.path()).unwrap();

        let input = records(&["b,b,1", "a,a,3", "b,b,2", "a,a,1"]);
        partition(input.into_iter(), 100, &mut spill).unwrap();

        let chunk = fs::read_to_string(&spill.chunk_paths()[0]).unwrap();
        assert_eq!(chunk, "a,a,3\na,a,1\nb,b,1\nb,b,2\n");
    }

    #[test]
    fn test_empty_input_creates_no_chunk() {
        let tmp = tempfile::tempdir().unwrap();
        let mut spill = SpillDir::create_in(tmp.path()).unwrap();
        let stats = partition(std::iter::empty(), 10, &mut spill).unwrap();
        assert_eq!(stats, PartitionStats::default());
        assert!(spill.is_empty());
    }

    #[test]
    fn test_drop_removes_spill_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut spill = SpillDir::create_in(tmp.path()).unwrap();
        partition(records(&["a,b,1"]).into_iter(), 1, &mut spill).unwrap();
        let dir = spill.path().to_path_buf();
        assert!(dir.exists());

        drop(spill);
        assert!(!dir.exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_created_temp_dir_is_removed_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let parent = tmp.path().join("spill").join("nested");
        let mut spill = SpillDir::create_in(&parent).unwrap();
        partition(records(&["a,b,1"]).into_iter(), 1, &mut spill).unwrap();
        assert!(parent.exists());

        drop(spill);
        assert!(!tmp.path().join("spill").exists());
    }

    #[test]
    fn test_existing_temp_dir_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let spill = SpillDir::create_in(tmp.path()).unwrap();
        drop(spill);
        assert!(tmp.path().exists());
    }

    #[test]
    fn test_shared_created_dir_survives_until_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let parent = tmp.path().join("shared");
        let first = SpillDir::create_in(&parent).unwrap();
        let second = SpillDir::create_in(&parent).unwrap();

        drop(first);
        assert!(parent.exists());
        assert!(second.path().exists());
        drop(second);
        assert!(parent.exists());
    }
}
