//! Summing amounts per `(debtor, creditor)` key
//!
//! Two paths:
//! - [`RunLength`]: folds adjacent equal keys of one sorted batch (bounded memory)
//! - [`aggregate_in_memory`]: one map entry per distinct key (small inputs)
//!
//! Both produce rows in key order.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use rust_decimal::Decimal;

use crate::batch::Batch;
use crate::error::{io_err, Phase, Result, SummaryError};
use crate::record::{self, Record, SummaryRecord};

/// Lazy run-length fold over one batch.
///
/// The batch must be key-sorted and hold every line of each key it contains,
/// which `BoundaryBatcher` guarantees.
pub struct RunLength<'a> {
    lines: std::slice::Iter<'a, String>,
    pending: Option<(&'a str, Decimal)>,
}

impl<'a> RunLength<'a> {
    pub fn new(batch: &'a Batch) -> Self {
        Self {
            lines: batch.lines().iter(),
            pending: None,
        }
    }

    fn step(&mut self) -> Result<Option<SummaryRecord>> {
        for line in self.lines.by_ref() {
            let (key, amount) = record::split_canonical(line).ok_or_else(|| SummaryError::CorruptLine {
                phase: Phase::Aggregate,
                line: line.clone(),
            })?;

            match self.pending.as_mut() {
                Some((current, total)) if *current == key => {
                    *total = total
                        .checked_add(amount)
                        .ok_or_else(|| SummaryError::Overflow { key: key.to_string() })?;
                }
                _ => {
                    if let Some(done) = self.pending.replace((key, amount)) {
                        return Ok(Some(summary_row(done)?));
                    }
                }
            }
        }

        self.pending.take().map(summary_row).transpose()
    }
}

impl Iterator for RunLength<'_> {
    type Item = Result<SummaryRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step().transpose()
    }
}

fn summary_row((key, total): (&str, Decimal)) -> Result<SummaryRecord> {
    let total = record::round_total(total).ok_or_else(|| SummaryError::Overflow { key: key.to_string() })?;
    SummaryRecord::from_key(key, total).ok_or_else(|| SummaryError::CorruptLine {
        phase: Phase::Aggregate,
        line: key.to_string(),
    })
}

/// Fold one batch and write its rows to `sink`; returns rows written
pub fn aggregate_batch<W: Write>(batch: &Batch, sink: &mut W, sink_path: &Path) -> Result<u64> {
    let mut rows = 0u64;
    for row in RunLength::new(batch) {
        let row = row?;
        writeln!(sink, "{}", row).map_err(io_err(Phase::Output, sink_path))?;
        rows += 1;
    }
    Ok(rows)
}

/// Group every record in memory and write one row per key; returns rows written
pub fn aggregate_in_memory<I, W>(records: I, sink: &mut W, sink_path: &Path) -> Result<u64>
where
    I: Iterator<Item = Result<Record>>,
    W: Write,
{
    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    for record in records {
        let record = record?;
        let key = record.key();
        let total = totals.entry(key).or_insert(Decimal::ZERO);
        *total = total
            .checked_add(record.amount)
            .ok_or_else(|| SummaryError::Overflow { key: record.key() })?;
    }

    let mut rows = 0u64;
    for (key, total) in &totals {
        let row = summary_row((key.as_str(), *total))?;
        writeln!(sink, "{}", row).map_err(io_err(Phase::Output, sink_path))?;
        rows += 1;
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BoundaryBatcher;
    use crate::record::parse;

    fn batch_of(lines: &[&str]) -> Batch {
        let input = lines.iter().map(|l| Ok(l.to_string()));
        let mut batcher = BoundaryBatcher::new(input, usize::MAX);
        batcher.next().unwrap().unwrap()
    }

    fn rows(lines: &[&str]) -> Vec<String> {
        RunLength::new(&batch_of(lines))
            .map(|r| r.unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_folds_adjacent_equal_keys() {
        assert_eq!(
            rows(&["Alex,Dan,45.27", "Alex,Dan,50.35", "Alex,Dan,23"]),
            ["Alex,Dan,118.62"]
        );
    }

    #[test]
    fn test_direction_is_preserved() {
        assert_eq!(
            rows(&["A,B,10", "B,A,5"]),
            ["A,B,10.00", "B,A,5.00"]
        );
    }

    #[test]
    fn test_single_line_runs() {
        assert_eq!(
            rows(&["a,a,1", "a,b,2", "a,b,3", "b,a,-1.005"]),
            ["a,a,1.00", "a,b,5.00", "b,a,-1.01"]
        );
    }

    #[test]
    fn test_no_float_drift() {
        let lines = vec!["x,y,0.1"; 1000];
        assert_eq!(rows(&lines), ["x,y,100.00"]);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let max = Decimal::MAX.to_string();
        let a = format!("a,b,{}", max);
        let batch = batch_of(&[&a, &a]);
        let result: Result<Vec<_>> = RunLength::new(&batch).collect();
        assert!(matches!(result, Err(SummaryError::Overflow { key }) if key == "a,b"));
    }

    #[test]
    fn test_total_without_room_for_cents_is_overflow() {
        let line = format!("a,b,1{}", "0".repeat(27));
        let batch = batch_of(&[&line]);
        let result: Result<Vec<_>> = RunLength::new(&batch).collect();
        assert!(matches!(result, Err(SummaryError::Overflow { key }) if key == "a,b"));

        let records = std::iter::once(Ok(parse("a,b,1e27").unwrap()));
        let err = aggregate_in_memory(records, &mut Vec::new(), Path::new("<mem>")).unwrap_err();
        assert!(matches!(err, SummaryError::Overflow { .. }));
    }

    #[test]
    fn test_corrupt_line_is_an_error() {
        let batch = batch_of(&["a,b,1", "a,b,x"]);
        let result: Result<Vec<_>> = RunLength::new(&batch).collect();
        assert!(matches!(result, Err(SummaryError::CorruptLine { .. })));
    }

    #[test]
    fn test_in_memory_matches_run_length() {
        let raw = ["b,a,5", "a,b,1.5", "a,b,2.25", "b,a,0.5", "c,c,7"];
        let records = raw.iter().map(|l| Ok(parse(l).unwrap()));
        let mut out = Vec::new();
        let n = aggregate_in_memory(records, &mut out, Path::new("<mem>")).unwrap();
        assert_eq!(n, 3);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "a,b,3.75\nb,a,5.50\nc,c,7.00\n"
        );
    }

    #[test]
    fn test_aggregate_batch_writes_rows() {
        let batch = batch_of(&["a,b,1", "a,b,2", "c,d,3"]);
        let mut out = Vec::new();
        let n = aggregate_batch(&batch, &mut out, Path::new("<mem>")).unwrap();
        assert_eq!(n, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "a,b,3.00\nc,d,3.00\n");
    }
}
