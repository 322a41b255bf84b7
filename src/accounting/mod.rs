//! Bookkeeping core: parsing user input into journal entries, recording
//! them, and deriving ledgers, statements and tax estimates from them.

pub mod engine;
pub mod ledger;
pub mod parse;
pub mod reports;
pub mod tax;

pub use engine::{AccountingEngine, AccountingError, EntryError};

/// Format whole yen with thousands separators ("1,234,567").
pub fn format_yen(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
