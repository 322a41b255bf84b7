//! Bookkeeping data model: accounts, users, journal entries and periods.

pub mod account;
pub mod entry;
pub mod period;
pub mod user;

pub use account::{AccountType, TaxCategory};
pub use entry::{EntrySource, JournalEntry, TransactionDraft, TransactionKind};
pub use period::{DateRange, YearMonth};
pub use user::User;
