//! Sortedness check for canonical ledger files
//!
//! Much cheaper than re-sorting: one streaming pass comparing each key with
//! the previous one.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;

use crate::error::{io_err, Phase, Result, SummaryError};
use crate::record;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub lines: u64,
    /// Key changes seen; equals distinct keys when the file is sorted
    pub runs: u64,
    /// 1-based line number of the first line whose key sorts before its predecessor
    pub first_unsorted: Option<u64>,
}

impl VerifyReport {
    pub fn is_sorted(&self) -> bool {
        self.first_unsorted.is_none()
    }
}

pub fn verify_sorted(path: &Path) -> Result<VerifyReport> {
    let file = File::open(path).map_err(io_err(Phase::Verify, path))?;
    verify_lines(BufReader::with_capacity(1024 * 1024, file), path)
}

pub fn verify_lines<R: BufRead>(reader: R, source: &Path) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();
    let mut prev_key: Option<String> = None;

    for line in reader.lines() {
        let line = line.map_err(io_err(Phase::Verify, source))?;
        report.lines += 1;

        let key = record::key_of(&line).ok_or_else(|| SummaryError::CorruptLine {
            phase: Phase::Verify,
            line: line.clone(),
        })?;

        match prev_key.as_deref() {
            Some(prev) if prev == key => continue,
            Some(prev) if prev > key && report.first_unsorted.is_none() => {
                report.first_unsorted = Some(report.lines);
            }
            _ => {}
        }
        report.runs += 1;
        prev_key = Some(key.to_string());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn check(input: &str) -> VerifyReport {
        verify_lines(Cursor::new(input), Path::new("<test>")).unwrap()
    }

    #[test]
    fn test_sorted_file() {
        let report = check("a,a,1\na,a,2\na,b,1\nb,a,3\n");
        assert!(report.is_sorted());
        assert_eq!(report.lines, 4);
        assert_eq!(report.runs, 3);
    }

    #[test]
    fn test_reports_first_unsorted_line() {
        let report = check("a,a,1\nc,c,1\nb,b,1\na,a,2\n");
        assert_eq!(report.first_unsorted, Some(3));
        assert_eq!(report.lines, 4);
    }

    #[test]
    fn test_empty_file_is_sorted() {
        assert_eq!(check(""), VerifyReport::default());
    }

    #[test]
    fn test_line_without_key() {
        let err = verify_lines(Cursor::new("a,a,1\nnothing\n"), Path::new("<test>")).unwrap_err();
        assert_eq!(err.phase(), Phase::Verify);
    }
}
