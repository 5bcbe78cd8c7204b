//! Property tests for the sort, batching and aggregation invariants

use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;

use debt_summary::batch::BoundaryBatcher;
use debt_summary::record::key_of;
use debt_summary::sort_merge::{partition, KWayMerge, SpillDir};
use debt_summary::{parse, serialize_key, summarize_reader, Record, Strategy as SummaryStrategy, SummaryOptions};
use proptest::prelude::*;
use rust_decimal::Decimal;
use tempfile::TempDir;

fn arb_record() -> impl Strategy<Value = Record> {
    ("[a-d]{1,3}", "[a-d]{1,3}", -100_000i64..100_000).prop_map(|(debtor, creditor, cents)| Record {
        debtor,
        creditor,
        amount: Decimal::new(cents, 2),
    })
}

fn ledger_of(records: &[Record]) -> String {
    records
        .iter()
        .map(|r| format!("{},{},{}\n", r.debtor, r.creditor, r.amount))
        .collect()
}

fn merge(records: &[Record], chunk_size: usize, temp: &TempDir) -> Vec<String> {
    let mut spill = SpillDir::create_in(temp.path()).unwrap();
    partition(records.iter().cloned().map(Ok), chunk_size, &mut spill).unwrap();
    KWayMerge::new(spill).collect::<Result<_, _>>().unwrap()
}

proptest! {
    #[test]
    fn prop_key_is_stable(record in arb_record()) {
        let line = format!("{},{},{}", record.debtor, record.creditor, record.amount);
        let first = serialize_key(&parse(&line).unwrap());
        let second = serialize_key(&parse(&line).unwrap());
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first, format!("{},{}", record.debtor, record.creditor));
    }

    #[test]
    fn prop_merge_equals_stable_sort(
        records in prop::collection::vec(arb_record(), 0..200),
        chunk_size in 1usize..40,
    ) {
        let temp = TempDir::new().unwrap();
        let merged = merge(&records, chunk_size, &temp);

        let mut expected = records.clone();
        expected.sort_by_key(|r| r.key());
        let expected: Vec<String> = expected.iter().map(|r| r.to_line()).collect();

        prop_assert_eq!(merged, expected);
        prop_assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn prop_no_key_spans_two_batches(
        records in prop::collection::vec(arb_record(), 0..200),
        max_batch_bytes in 1usize..120,
    ) {
        let temp = TempDir::new().unwrap();
        let sorted = merge(&records, 16, &temp);
        let batches: Vec<_> = BoundaryBatcher::new(sorted.into_iter().map(Ok), max_batch_bytes)
            .collect::<Result<_, _>>()
            .unwrap();

        let mut seen: HashSet<String> = HashSet::new();
        let mut total_lines = 0;
        for batch in &batches {
            prop_assert!(!batch.is_empty());
            total_lines += batch.len();
            let keys: HashSet<String> = batch
                .lines()
                .iter()
                .map(|l| key_of(l).unwrap().to_string())
                .collect();
            for key in keys {
                prop_assert!(seen.insert(key.clone()), "key {} split across batches", key);
            }
        }
        prop_assert_eq!(total_lines, records.len());
    }

    #[test]
    fn prop_totals_match_per_key_sums(
        records in prop::collection::vec(arb_record(), 0..150),
        chunk_size in 1usize..20,
        max_batch_bytes in 1usize..64,
    ) {
        let mut expected: BTreeMap<String, Decimal> = BTreeMap::new();
        for r in &records {
            *expected.entry(r.key()).or_insert(Decimal::ZERO) += r.amount;
        }

        let temp = TempDir::new().unwrap();
        let ledger = ledger_of(&records);
        let mut outputs = Vec::new();
        for strategy in [SummaryStrategy::InMemory, SummaryStrategy::External] {
            let options = SummaryOptions {
                chunk_size,
                max_batch_bytes,
                temp_dir: temp.path().to_path_buf(),
                strategy,
                ..Default::default()
            };
            let mut out = Vec::new();
            summarize_reader(Cursor::new(ledger.as_str()), &mut out, &options).unwrap();
            outputs.push(String::from_utf8(out).unwrap());
        }
        prop_assert_eq!(&outputs[0], &outputs[1]);

        let mut actual: BTreeMap<String, Decimal> = BTreeMap::new();
        for line in outputs[0].lines() {
            let (key, total) = line.rsplit_once(',').unwrap();
            let total: Decimal = total.parse().unwrap();
            prop_assert_eq!(total.scale(), 2);
            prop_assert!(actual.insert(key.to_string(), total).is_none(), "duplicate row for {}", key);
        }
        prop_assert_eq!(actual, expected);
    }
}
