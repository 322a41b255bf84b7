//! Journal entries and the drafts they are recorded from.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::account::TaxCategory;

/// Channel an entry was created from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntrySource {
    #[default]
    Line,
    Receipt,
    Voice,
}

impl EntrySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySource::Line => "LINE",
            EntrySource::Receipt => "RECEIPT",
            EntrySource::Voice => "VOICE",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "LINE" => Some(EntrySource::Line),
            "RECEIPT" => Some(EntrySource::Receipt),
            "VOICE" => Some(EntrySource::Voice),
            _ => None,
        }
    }
}

/// A double-entry journal line. Amounts are whole yen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub debit_account: String,
    pub debit_amount: i64,
    pub credit_account: String,
    pub credit_amount: i64,
    pub description: String,
    pub project: Option<String>,
    pub tax_type: TaxCategory,
    /// Consumption tax contained in the amount
    pub tax_amount: i64,
    pub receipt_image: Option<String>,
    pub source: EntrySource,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Whether either side of the entry posts to `account`
    pub fn touches(&self, account: &str) -> bool {
        self.debit_account == account || self.credit_account == account
    }
}

/// Kind of transaction the analyzer recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    #[default]
    Expense,
    Income,
    Transfer,
}

/// Structured reading of a user's message, prior to validation.
///
/// This is the JSON shape the language model is asked to produce, so every
/// field is lenient: missing values fall back to defaults and are checked
/// when the draft is recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionDraft {
    pub transaction_type: TransactionKind,
    /// Date as written by the analyzer ("YYYY-MM-DD", "昨日", ...)
    pub date: Option<String>,
    #[serde(deserialize_with = "lenient_amount")]
    pub amount: Option<i64>,
    pub debit_account: String,
    pub credit_account: String,
    pub description: String,
    pub client: Option<String>,
    pub project: Option<String>,
    /// Unrecognised labels read as `None` and take the recording default
    #[serde(deserialize_with = "lenient_tax_type")]
    pub tax_type: Option<TaxCategory>,
    pub confidence: f64,
    pub clarification_needed: bool,
    pub clarification_question: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Whole(i64),
    Fractional(f64),
    Text(String),
}

/// Whole yen from an integer, a float (truncated) or a string like "3,200円".
fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawAmount>::deserialize(deserializer)? {
        None => None,
        Some(RawAmount::Whole(n)) => Some(n),
        Some(RawAmount::Fractional(f)) if f.is_finite() && f.abs() < i64::MAX as f64 => {
            Some(f.trunc() as i64)
        }
        Some(RawAmount::Fractional(_)) => None,
        Some(RawAmount::Text(text)) => crate::accounting::parse::parse_amount(&text),
    })
}

fn lenient_tax_type<'de, D>(deserializer: D) -> Result<Option<TaxCategory>, D::Error>
where
    D: Deserializer<'de>,
{
    let label = Option::<String>::deserialize(deserializer)?;
    Ok(label.and_then(|l| match l.parse() {
        Ok(category) => Some(category),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring tax type from analyzer");
            None
        }
    }))
}
