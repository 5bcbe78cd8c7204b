//! Phase 2 of the external sort: k-way merge of spill chunks
//!
//! One buffered cursor per chunk, one heap entry per live cursor. The heap is
//! ordered by `(key, chunk_idx)` so equal keys come out in chunk order, which
//! makes the merged stream a stable sort of the original input.
//!
//! Chunks are deleted as soon as their cursor is exhausted. Anything left when
//! the merge is dropped (early error, abandoned iterator) goes with the
//! `SpillDir`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::partition::SpillDir;
use crate::error::{io_err, Phase, Result, SummaryError};
use crate::record;

const CURSOR_READ_BUFFER: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Idle,
    Initializing,
    Merging,
    Draining,
    Complete,
}

struct ChunkCursor {
    reader: BufReader<File>,
    path: PathBuf,
}

impl ChunkCursor {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(io_err(Phase::Merge, path))?;
        Ok(Self {
            reader: BufReader::with_capacity(CURSOR_READ_BUFFER, file),
            path: path.to_path_buf(),
        })
    }

    fn read_next(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .map_err(io_err(Phase::Merge, &self.path))?;
        if n == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
        }
        Ok(Some(line))
    }
}

// Wrapper for heap ordering (min-heap by key, then chunk index)
#[derive(Debug, Eq, PartialEq)]
struct HeapItem {
    line: String,
    key_len: usize,
    chunk_idx: usize,
}

impl HeapItem {
    fn new(line: String, chunk_idx: usize) -> Result<Self> {
        let key_len = match record::key_of(&line) {
            Some(key) => key.len(),
            None => {
                return Err(SummaryError::CorruptLine {
                    phase: Phase::Merge,
                    line,
                })
            }
        };
        Ok(Self {
            line,
            key_len,
            chunk_idx,
        })
    }

    fn key(&self) -> &str {
        &self.line[..self.key_len]
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap
        other
            .key()
            .cmp(self.key())
            .then_with(|| other.chunk_idx.cmp(&self.chunk_idx))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pull-based k-way merge over the chunks of a `SpillDir`.
///
/// Yields canonical lines in key order. Nothing is read until the first
/// `next()`, and each call reads at most one line from one chunk.
pub struct KWayMerge {
    spill: SpillDir,
    cursors: Vec<Option<ChunkCursor>>,
    heap: BinaryHeap<HeapItem>,
    state: MergeState,
    emitted: u64,
}

impl KWayMerge {
    pub fn new(spill: SpillDir) -> Self {
        Self {
            spill,
            cursors: Vec::new(),
            heap: BinaryHeap::new(),
            state: MergeState::Idle,
            emitted: 0,
        }
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    /// Lines emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Number of chunks being merged
    pub fn chunk_count(&self) -> usize {
        self.spill.len()
    }

    fn initialize(&mut self) -> Result<()> {
        self.state = MergeState::Initializing;
        info!(chunks = self.spill.len(), "merging sorted chunks");

        let paths = self.spill.chunk_paths().to_vec();
        self.cursors.reserve(paths.len());
        for (idx, path) in paths.iter().enumerate() {
            let mut cursor = ChunkCursor::open(path)?;
            match cursor.read_next()? {
                Some(line) => {
                    self.heap.push(HeapItem::new(line, idx)?);
                    self.cursors.push(Some(cursor));
                }
                None => {
                    let _ = fs::remove_file(path);
                    self.cursors.push(None);
                }
            }
        }

        self.state = MergeState::Merging;
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<String>> {
        if self.state == MergeState::Idle {
            self.initialize()?;
        }
        if self.state == MergeState::Complete {
            return Ok(None);
        }

        let Some(item) = self.heap.pop() else {
            self.finish();
            return Ok(None);
        };

        let slot = &mut self.cursors[item.chunk_idx];
        if let Some(cursor) = slot.as_mut() {
            match cursor.read_next()? {
                Some(next) => self.heap.push(HeapItem::new(next, item.chunk_idx)?),
                None => {
                    // Chunk exhausted - delete it to free disk space
                    if let Some(cursor) = slot.take() {
                        let _ = fs::remove_file(&cursor.path);
                        debug!(chunk = item.chunk_idx, "chunk exhausted");
                    }
                }
            }
        }

        self.emitted += 1;
        Ok(Some(item.line))
    }

    fn finish(&mut self) {
        self.state = MergeState::Draining;
        for cursor in self.cursors.iter_mut().filter_map(Option::take) {
            let _ = fs::remove_file(&cursor.path);
        }
        debug!(lines = self.emitted, "merge complete");
        self.state = MergeState::Complete;
    }
}

impl Iterator for KWayMerge {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(line) => line.map(Ok),
            Err(e) => {
                // Not resumable; the spill dir is removed when we're dropped
                self.heap.clear();
                self.cursors.clear();
                self.state = MergeState::Complete;
                Some(Err(e))
            }
        }
    }
}
