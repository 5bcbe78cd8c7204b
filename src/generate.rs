//! Synthetic ledger generation for tests and benchmarks
//!
//! Rows look like `qwhdbxe,pmtkzoaf,4.37`: a 7-letter debtor, an 8-letter
//! creditor and an amount in `[1.00, 10.00)`. With a name pool, names are drawn
//! from a fixed set so keys repeat and the summary actually compacts.

use std::io::{self, Write};

use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DEBTOR_LEN: usize = 7;
const CREDITOR_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorOptions {
    pub rows: u64,
    /// Draw debtors and creditors from this many names each; `None` = fresh names per row
    pub name_pool: Option<usize>,
}

pub fn random_name<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Amount in `[1.00, 10.00)` with two decimals
pub fn random_amount<R: Rng + ?Sized>(rng: &mut R) -> Decimal {
    Decimal::new(rng.gen_range(100..1000), 2)
}

pub fn generate_ledger<W, R>(writer: &mut W, options: &GeneratorOptions, rng: &mut R) -> io::Result<()>
where
    W: Write,
    R: Rng + ?Sized,
{
    let pools = options.name_pool.map(|size| {
        let size = size.max(1);
        let debtors: Vec<String> = (0..size).map(|_| random_name(rng, DEBTOR_LEN)).collect();
        let creditors: Vec<String> = (0..size).map(|_| random_name(rng, CREDITOR_LEN)).collect();
        (debtors, creditors)
    });

    for _ in 0..options.rows {
        let amount = random_amount(rng);
        match &pools {
            Some((debtors, creditors)) => {
                // pools are never empty
                let debtor = debtors.choose(rng).map(String::as_str).unwrap_or("debtor");
                let creditor = creditors.choose(rng).map(String::as_str).unwrap_or("creditor");
                writeln!(writer, "{},{},{}", debtor, creditor, amount)?;
            }
            None => {
                let debtor = random_name(rng, DEBTOR_LEN);
                let creditor = random_name(rng, CREDITOR_LEN);
                writeln!(writer, "{},{},{}", debtor, creditor, amount)?;
            }
        }
    }
    Ok(())
}
