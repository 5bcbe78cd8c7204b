//! Boundary-aware batching of a key-sorted stream
//!
//! Batches are closed only between two different keys, so a run of equal keys
//! always lands in a single batch. A run larger than `max_batch_bytes` makes
//! its batch exceed the bound; such batches are counted as oversized.

use std::iter::Fuse;

use tracing::debug;

use crate::error::{Phase, Result, SummaryError};
use crate::record;

/// Bytes a line occupies on disk, newline included
pub fn line_bytes(line: &str) -> usize {
    line.len() + 1
}

/// Consecutive sorted canonical lines holding complete key runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    lines: Vec<String>,
    bytes: usize,
}

impl Batch {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn last_key(&self) -> Option<&str> {
        self.lines.last().and_then(|line| record::key_of(line))
    }

    fn push(&mut self, line: String) {
        self.bytes += line_bytes(&line);
        self.lines.push(line);
    }
}

pub struct BoundaryBatcher<I: Iterator> {
    lines: Fuse<I>,
    max_batch_bytes: usize,
    current: Batch,
    emitted: usize,
    oversized: usize,
}

impl<I> BoundaryBatcher<I>
where
    I: Iterator<Item = Result<String>>,
{
    pub fn new(lines: I, max_batch_bytes: usize) -> Self {
        Self {
            lines: lines.fuse(),
            max_batch_bytes: max_batch_bytes.max(1),
            current: Batch::default(),
            emitted: 0,
            oversized: 0,
        }
    }

    /// Batches handed out so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Batches that exceeded `max_batch_bytes` because of one long run
    pub fn oversized(&self) -> usize {
        self.oversized
    }

    fn take_current(&mut self) -> Batch {
        let batch = std::mem::take(&mut self.current);
        self.emitted += 1;
        if batch.bytes > self.max_batch_bytes {
            self.oversized += 1;
            debug!(
                bytes = batch.bytes,
                max_batch_bytes = self.max_batch_bytes,
                lines = batch.len(),
                "batch exceeds byte bound to keep a key run whole"
            );
        }
        batch
    }
}

impl<I> Iterator for BoundaryBatcher<I>
where
    I: Iterator<Item = Result<String>>,
{
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Some(Err(e)),
                None if self.current.is_empty() => return None,
                None => return Some(Ok(self.take_current())),
            };

            let Some(key) = record::key_of(&line) else {
                return Some(Err(SummaryError::CorruptLine {
                    phase: Phase::Aggregate,
                    line,
                }));
            };

            let over = self.current.bytes + line_bytes(&line) > self.max_batch_bytes;
            if !self.current.is_empty() && over && self.current.last_key() != Some(key) {
                let done = self.take_current();
                self.current.push(line);
                return Some(Ok(done));
            }
            self.current.push(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batches(lines: &[&str], max: usize) -> Vec<Vec<String>> {
        let input = lines.iter().map(|l| Ok(l.to_string()));
        BoundaryBatcher::new(input, max)
            .map(|b| b.unwrap().lines().to_vec())
            .collect()
    }

    #[test]
    fn test_closes_batch_between_keys() {
        // every line is 6 bytes with its newline
        let out = batches(&["a,a,1", "a,b,1", "b,b,1", "c,c,1"], 12);
        assert_eq!(out, vec![vec!["a,a,1", "a,b,1"], vec!["b,b,1", "c,c,1"]]);
    }

    #[test]
    fn test_never_splits_a_run() {
        let out = batches(&["a,a,1", "k,k,1", "k,k,2", "k,k,3", "k,k,4", "z,z,1"], 6);
        assert_eq!(
            out,
            vec![
                vec!["a,a,1"],
                vec!["k,k,1", "k,k,2", "k,k,3", "k,k,4"],
                vec!["z,z,1"]
            ]
        );
    }

    #[test]
    fn test_counts_oversized_batches() {
        let input = ["k,k,1", "k,k,2", "k,k,3", "z,z,1"].map(|l| Ok(l.to_string()));
        let mut batcher = BoundaryBatcher::new(input.into_iter(), 10);
        let all: Vec<Batch> = batcher.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].bytes(), 18);
        assert_eq!(batcher.emitted(), 2);
        assert_eq!(batcher.oversized(), 1);
    }

    #[test]
    fn test_large_bound_gives_single_batch() {
        let out = batches(&["a,a,1", "b,b,1", "c,c,1"], usize::MAX);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 3);
    }

    #[test]
    fn test_empty_stream_gives_no_batches() {
        assert!(batches(&[], 10).is_empty());
    }

    #[test]
    fn test_rejects_line_without_key() {
        let input = vec![Ok("garbage".to_string())];
        let mut batcher = BoundaryBatcher::new(input.into_iter(), 10);
        assert!(matches!(
            batcher.next(),
            Some(Err(SummaryError::CorruptLine { .. }))
        ));
    }
}
