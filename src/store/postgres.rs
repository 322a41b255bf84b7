use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use super::{LedgerStore, StoreError};
use crate::accounting::tax::ConsumptionTaxMethod;
use crate::models::{DateRange, EntrySource, JournalEntry, TaxCategory, User};

/// Schema, applied idempotently at startup
const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        line_user_id VARCHAR(100) NOT NULL UNIQUE,
        business_name VARCHAR(100),
        business_type VARCHAR(50) NOT NULL,
        fiscal_year_end VARCHAR(5) NOT NULL,
        tax_method VARCHAR(20) NOT NULL,
        blue_return_eligible BOOLEAN NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS journal_entries (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        entry_date DATE NOT NULL,
        debit_account VARCHAR(50) NOT NULL,
        debit_amount BIGINT NOT NULL,
        credit_account VARCHAR(50) NOT NULL,
        credit_amount BIGINT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        project VARCHAR(100),
        tax_type VARCHAR(20) NOT NULL,
        tax_amount BIGINT NOT NULL DEFAULT 0,
        receipt_image TEXT,
        source VARCHAR(20) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS journal_entries_user_date
        ON journal_entries (user_id, entry_date)",
];

const USER_COLUMNS: &str = "id, line_user_id, business_name, business_type, fiscal_year_end, \
                            tax_method, blue_return_eligible, created_at";

const ENTRY_COLUMNS: &str = "id, user_id, entry_date, debit_account, debit_amount, credit_account, \
                             credit_amount, description, project, tax_type, tax_amount, \
                             receipt_image, source, created_at";

/// PostgreSQL-backed store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn create_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Database tables ready");
        Ok(())
    }
}

fn tax_method_from_column(value: &str) -> Result<ConsumptionTaxMethod, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("users.tax_method = {}", value)))
}

fn tax_type_from_column(value: &str) -> Result<TaxCategory, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("journal_entries.tax_type = {}", value)))
}

fn source_from_column(value: &str) -> Result<EntrySource, StoreError> {
    EntrySource::from_db(value)
        .ok_or_else(|| StoreError::Corrupt(format!("journal_entries.source = {}", value)))
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let tax_method: String = row.try_get("tax_method")?;
    Ok(User {
        id: row.try_get("id")?,
        line_user_id: row.try_get("line_user_id")?,
        business_name: row.try_get("business_name")?,
        business_type: row.try_get("business_type")?,
        fiscal_year_end: row.try_get("fiscal_year_end")?,
        tax_method: tax_method_from_column(&tax_method)?,
        blue_return_eligible: row.try_get("blue_return_eligible")?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<JournalEntry, StoreError> {
    let tax_type: String = row.try_get("tax_type")?;
    let source: String = row.try_get("source")?;
    Ok(JournalEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        date: row.try_get("entry_date")?,
        debit_account: row.try_get("debit_account")?,
        debit_amount: row.try_get("debit_amount")?,
        credit_account: row.try_get("credit_account")?,
        credit_amount: row.try_get("credit_amount")?,
        description: row.try_get("description")?,
        project: row.try_get("project")?,
        tax_type: tax_type_from_column(&tax_type)?,
        tax_amount: row.try_get("tax_amount")?,
        receipt_image: row.try_get("receipt_image")?,
        source: source_from_column(&source)?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn find_user(&self, line_user_id: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE line_user_id = $1", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(line_user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (id, line_user_id, business_name, business_type, fiscal_year_end, \
             tax_method, blue_return_eligible, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(user.id)
        .bind(&user.line_user_id)
        .bind(&user.business_name)
        .bind(&user.business_type)
        .bind(&user.fiscal_year_end)
        .bind(user.tax_method.label())
        .bind(user.blue_return_eligible)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateUser(user.line_user_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at", USER_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn insert_entry(&self, entry: &JournalEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO journal_entries (id, user_id, entry_date, debit_account, debit_amount, \
             credit_account, credit_amount, description, project, tax_type, tax_amount, \
             receipt_image, source, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.date)
        .bind(&entry.debit_account)
        .bind(entry.debit_amount)
        .bind(&entry.credit_account)
        .bind(entry.credit_amount)
        .bind(&entry.description)
        .bind(&entry.project)
        .bind(entry.tax_type.label())
        .bind(entry.tax_amount)
        .bind(&entry.receipt_image)
        .bind(entry.source.as_str())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn entries_for_user(
        &self,
        user_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<JournalEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM journal_entries \
             WHERE user_id = $1 \
               AND ($2::date IS NULL OR entry_date >= $2) \
               AND ($3::date IS NULL OR entry_date <= $3) \
             ORDER BY entry_date, created_at",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn delete_entry(&self, user_id: Uuid, entry_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM journal_entries WHERE id = $1 AND user_id = $2")
            .bind(entry_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
