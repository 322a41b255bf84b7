use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use super::parse::parse_date;
use crate::models::{DateRange, EntrySource, JournalEntry, TaxCategory, TransactionDraft, User};
use crate::store::{LedgerStore, StoreError};

/// A reason a journal entry cannot be recorded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryError {
    #[error("金額が入力されていません")]
    MissingAmount,

    #[error("金額は1円以上である必要があります（{0}円）")]
    NonPositiveAmount(i64),

    #[error("貸借が一致しません（借方 {debit}円 / 貸方 {credit}円）")]
    Unbalanced { debit: i64, credit: i64 },

    #[error("借方の勘定科目が指定されていません")]
    MissingDebitAccount,

    #[error("貸方の勘定科目が指定されていません")]
    MissingCreditAccount,
}

/// The fields of an entry that validation looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryCandidate {
    pub debit_account: String,
    pub debit_amount: Option<i64>,
    pub credit_account: String,
    pub credit_amount: Option<i64>,
}

impl EntryCandidate {
    fn from_draft(draft: &TransactionDraft) -> Self {
        Self {
            debit_account: draft.debit_account.trim().to_string(),
            debit_amount: draft.amount,
            credit_account: draft.credit_account.trim().to_string(),
            credit_amount: draft.amount,
        }
    }
}

/// Check double-entry rules. An empty result means the entry is valid.
pub fn validate_entry(candidate: &EntryCandidate) -> Vec<EntryError> {
    let mut errors = Vec::new();

    match (candidate.debit_amount, candidate.credit_amount) {
        (Some(debit), Some(credit)) => {
            if debit != credit {
                errors.push(EntryError::Unbalanced { debit, credit });
            }
            if debit <= 0 {
                errors.push(EntryError::NonPositiveAmount(debit));
            }
        }
        _ => errors.push(EntryError::MissingAmount),
    }

    if candidate.debit_account.trim().is_empty() {
        errors.push(EntryError::MissingDebitAccount);
    }
    if candidate.credit_account.trim().is_empty() {
        errors.push(EntryError::MissingCreditAccount);
    }

    errors
}

/// Consumption tax contained in a tax-inclusive amount, rounded down.
pub fn calculate_tax(amount: i64, category: TaxCategory) -> i64 {
    match category.rate_percent() {
        Some(rate) => {
            (i128::from(amount) * i128::from(rate)).div_euclid(i128::from(100 + rate)) as i64
        }
        None => 0,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccountingError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid journal entry: {}", InvalidList(.0))]
    Invalid(Vec<EntryError>),
}

struct InvalidList<'a>(&'a [EntryError]);

impl fmt::Display for InvalidList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

/// Records and retrieves journal entries on behalf of LINE users.
#[derive(Clone)]
pub struct AccountingEngine {
    store: Arc<dyn LedgerStore>,
}

impl AccountingEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Look up a user by LINE ID, registering them on first contact.
    pub async fn get_or_create_user(&self, line_user_id: &str) -> Result<User, AccountingError> {
        if let Some(user) = self.store.find_user(line_user_id).await? {
            return Ok(user);
        }

        let user = User::new(line_user_id);
        match self.store.insert_user(&user).await {
            Ok(()) => {
                tracing::info!(user_id = %user.id, "New user created");
                Ok(user)
            }
            // Another worker registered the same user first
            Err(StoreError::DuplicateUser(_)) => self
                .store
                .find_user(line_user_id)
                .await?
                .ok_or_else(|| StoreError::Corrupt(format!("user {} vanished", line_user_id)).into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Validate a draft and persist it as a journal entry.
    ///
    /// Relative dates in the draft are resolved against `today`; a draft
    /// without a tax category is treated as standard-rate taxable.
    pub async fn record_draft(
        &self,
        line_user_id: &str,
        draft: &TransactionDraft,
        source: EntrySource,
        today: NaiveDate,
    ) -> Result<JournalEntry, AccountingError> {
        self.record(line_user_id, draft, source, None, today).await
    }

    /// Same as [`record_draft`](Self::record_draft) for a photographed receipt.
    pub async fn record_receipt(
        &self,
        line_user_id: &str,
        draft: &TransactionDraft,
        image_ref: String,
        today: NaiveDate,
    ) -> Result<JournalEntry, AccountingError> {
        self.record(line_user_id, draft, EntrySource::Receipt, Some(image_ref), today)
            .await
    }

    async fn record(
        &self,
        line_user_id: &str,
        draft: &TransactionDraft,
        source: EntrySource,
        receipt_image: Option<String>,
        today: NaiveDate,
    ) -> Result<JournalEntry, AccountingError> {
        let candidate = EntryCandidate::from_draft(draft);
        let errors = validate_entry(&candidate);
        if !errors.is_empty() {
            tracing::warn!(errors = ?errors, "Rejected journal entry");
            return Err(AccountingError::Invalid(errors));
        }

        let user = self.get_or_create_user(line_user_id).await?;
        let amount = candidate.debit_amount.unwrap_or_default();
        let tax_type = draft.tax_type.unwrap_or_default();
        let date = draft
            .date
            .as_deref()
            .map(|d| parse_date(d, today))
            .unwrap_or(today);

        let entry = JournalEntry {
            id: Uuid::new_v4(),
            user_id: user.id,
            date,
            debit_account: candidate.debit_account,
            debit_amount: amount,
            credit_account: candidate.credit_account,
            credit_amount: amount,
            description: draft.description.trim().to_string(),
            project: draft.project.clone().filter(|p| !p.trim().is_empty()),
            tax_type,
            tax_amount: calculate_tax(amount, tax_type),
            receipt_image,
            source,
            created_at: Utc::now(),
        };

        self.store.insert_entry(&entry).await?;
        tracing::info!(
            user_id = %user.id,
            entry_id = %entry.id,
            amount,
            source = entry.source.as_str(),
            "Journal entry recorded"
        );
        Ok(entry)
    }

    /// Entries of `user` within `range`, oldest first
    pub async fn entries_between(
        &self,
        user: &User,
        range: DateRange,
    ) -> Result<Vec<JournalEntry>, AccountingError> {
        Ok(self.store.entries_for_user(user.id, range).await?)
    }

    /// The latest `limit` entries, newest first
    pub async fn recent_entries(
        &self,
        user: &User,
        limit: usize,
    ) -> Result<Vec<JournalEntry>, AccountingError> {
        let mut entries = self.store.entries_for_user(user.id, DateRange::all()).await?;
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }

    pub async fn delete_entry(&self, user: &User, entry_id: Uuid) -> Result<bool, AccountingError> {
        let deleted = self.store.delete_entry(user.id, entry_id).await?;
        if deleted {
            tracing::info!(user_id = %user.id, entry_id = %entry_id, "Journal entry deleted");
        }
        Ok(deleted)
    }

    /// Delete the entry the user recorded most recently, if any.
    pub async fn delete_latest_entry(
        &self,
        user: &User,
    ) -> Result<Option<JournalEntry>, AccountingError> {
        let entries = self.store.entries_for_user(user.id, DateRange::all()).await?;
        let Some(latest) = entries.into_iter().max_by_key(|e| e.created_at) else {
            return Ok(None);
        };
        if self.delete_entry(user, latest.id).await? {
            Ok(Some(latest))
        } else {
            Ok(None)
        }
    }
}
