//! Books derived from journal entries: journal, trial balance, general
//! ledger, cash book and the monthly expense summary.
//!
//! Everything here is a pure function over entries already loaded from the
//! store, so the same code serves both backends.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::format_yen;
use crate::models::account::{find_account, CASH, EXPENSE_SUMMARY_ACCOUNTS};
use crate::models::{DateRange, JournalEntry, YearMonth};

/// Entries within `range` in date order
pub fn journal(entries: &[JournalEntry], range: DateRange) -> Vec<&JournalEntry> {
    let mut rows: Vec<&JournalEntry> = entries.iter().filter(|e| range.contains(e.date)).collect();
    rows.sort_by_key(|e| (e.date, e.created_at));
    rows
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialBalanceRow {
    pub account: String,
    pub debit_total: i64,
    pub credit_total: i64,
    pub debit_balance: i64,
    pub credit_balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialBalance {
    pub as_of: NaiveDate,
    pub rows: Vec<TrialBalanceRow>,
}

impl TrialBalance {
    pub fn total_debit(&self) -> i64 {
        self.rows.iter().map(|r| r.debit_total).sum()
    }

    pub fn total_credit(&self) -> i64 {
        self.rows.iter().map(|r| r.credit_total).sum()
    }

    pub fn total_debit_balance(&self) -> i64 {
        self.rows.iter().map(|r| r.debit_balance).sum()
    }

    pub fn total_credit_balance(&self) -> i64 {
        self.rows.iter().map(|r| r.credit_balance).sum()
    }

    /// Debit side equals credit side
    pub fn is_balanced(&self) -> bool {
        self.total_debit() == self.total_credit()
    }

    /// Balance of one account (debit positive), zero when it never moved
    pub fn balance_of(&self, account: &str) -> i64 {
        self.rows
            .iter()
            .find(|r| r.account == account)
            .map(|r| r.debit_balance - r.credit_balance)
            .unwrap_or(0)
    }
}

/// Sort key placing known accounts in chart order and unknown ones after
fn chart_order(account: &str) -> (u8, &str, &str) {
    match find_account(account) {
        Some(def) => (0, def.code, account),
        None => (1, "", account),
    }
}

/// Per-account totals of every entry dated on or before `as_of`.
pub fn trial_balance(entries: &[JournalEntry], as_of: NaiveDate) -> TrialBalance {
    let mut totals: HashMap<&str, (i64, i64)> = HashMap::new();
    for entry in entries.iter().filter(|e| e.date <= as_of) {
        totals.entry(entry.debit_account.as_str()).or_default().0 += entry.debit_amount;
        totals.entry(entry.credit_account.as_str()).or_default().1 += entry.credit_amount;
    }

    let mut accounts: Vec<&str> = totals.keys().copied().collect();
    accounts.sort_by(|a, b| chart_order(a).cmp(&chart_order(b)));

    let rows = accounts
        .into_iter()
        .map(|account| {
            let (debit, credit) = totals[account];
            let balance = debit - credit;
            TrialBalanceRow {
                account: account.to_string(),
                debit_total: debit,
                credit_total: credit,
                debit_balance: balance.max(0),
                credit_balance: (-balance).max(0),
            }
        })
        .collect();

    TrialBalance { as_of, rows }
}

/// One line of an account ledger. `debit`/`credit` are from the account's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRow {
    pub date: NaiveDate,
    pub description: String,
    pub counterpart: String,
    pub debit: i64,
    pub credit: i64,
    pub balance: i64,
}

fn ledger_rows<'a>(
    entries: impl Iterator<Item = &'a JournalEntry>,
    account: &str,
    opening: i64,
) -> Vec<LedgerRow> {
    let mut balance = opening;
    entries
        .filter(|e| e.touches(account))
        .map(|e| {
            // An entry posting to the account on both sides nets to zero
            let debit = if e.debit_account == account { e.debit_amount } else { 0 };
            let credit = if e.credit_account == account { e.credit_amount } else { 0 };
            balance += debit - credit;
            let counterpart = if e.debit_account == account {
                &e.credit_account
            } else {
                &e.debit_account
            };
            LedgerRow {
                date: e.date,
                description: e.description.clone(),
                counterpart: counterpart.clone(),
                debit,
                credit,
                balance,
            }
        })
        .collect()
}

/// General ledger for `account` over `range`, with a running balance from zero.
pub fn general_ledger(entries: &[JournalEntry], account: &str, range: DateRange) -> Vec<LedgerRow> {
    ledger_rows(journal(entries, range).into_iter(), account, 0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CashBookRow {
    pub date: NaiveDate,
    pub description: String,
    pub counterpart: String,
    pub income: i64,
    pub expense: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashBook {
    pub month: YearMonth,
    /// Cash balance brought forward from earlier months
    pub opening_balance: i64,
    pub rows: Vec<CashBookRow>,
}

impl CashBook {
    pub fn closing_balance(&self) -> i64 {
        self.rows.last().map(|r| r.balance).unwrap_or(self.opening_balance)
    }
}

/// Cash movements during `month`. Entries before the month only feed the
/// opening balance.
pub fn cash_book(entries: &[JournalEntry], month: YearMonth) -> CashBook {
    let opening_balance = entries
        .iter()
        .filter(|e| e.date < month.first_day())
        .map(|e| {
            let mut delta = 0;
            if e.debit_account == CASH {
                delta += e.debit_amount;
            }
            if e.credit_account == CASH {
                delta -= e.credit_amount;
            }
            delta
        })
        .sum();

    let rows = ledger_rows(
        journal(entries, DateRange::month(month)).into_iter(),
        CASH,
        opening_balance,
    )
    .into_iter()
    .map(|row| CashBookRow {
        date: row.date,
        description: row.description,
        counterpart: row.counterpart,
        income: row.debit,
        expense: row.credit,
        balance: row.balance,
    })
    .collect();

    CashBook {
        month,
        opening_balance,
        rows,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseSummary {
    pub month: YearMonth,
    /// Every summary account in fixed order, zero when unused
    pub lines: Vec<(&'static str, i64)>,
}

impl ExpenseSummary {
    pub fn total(&self) -> i64 {
        self.lines.iter().map(|(_, amount)| amount).sum()
    }
}

/// Debit totals of the selling and administrative expense accounts in `month`.
pub fn expense_summary(entries: &[JournalEntry], month: YearMonth) -> ExpenseSummary {
    let lines = EXPENSE_SUMMARY_ACCOUNTS
        .iter()
        .map(|&account| {
            let total = entries
                .iter()
                .filter(|e| month.contains(e.date) && e.debit_account == account)
                .map(|e| e.debit_amount)
                .sum();
            (account, total)
        })
        .collect();
    ExpenseSummary { month, lines }
}

/// LINE rendering of the first `limit` journal rows.
pub fn format_journal_for_line(entries: &[&JournalEntry], limit: usize) -> String {
    if entries.is_empty() {
        return "取引データがありません。".to_string();
    }

    let mut text = String::from("【仕訳帳】\n");
    for entry in entries.iter().take(limit) {
        text.push_str(&format!(
            "\n{}\n  {} {}円\n  　/ {} {}円\n",
            entry.date.format("%Y-%m-%d"),
            entry.debit_account,
            format_yen(entry.debit_amount),
            entry.credit_account,
            format_yen(entry.credit_amount),
        ));
        if !entry.description.is_empty() {
            text.push_str(&format!("  摘要: {}\n", entry.description));
        }
    }
    if entries.len() > limit {
        text.push_str(&format!("\n…他{}件", entries.len() - limit));
    }
    text
}

/// LINE rendering of accounts with a non-zero balance.
pub fn format_trial_balance_for_line(trial: &TrialBalance) -> String {
    let rows: Vec<&TrialBalanceRow> = trial
        .rows
        .iter()
        .filter(|r| r.debit_balance > 0 || r.credit_balance > 0)
        .collect();
    if rows.is_empty() {
        return "データがありません。".to_string();
    }

    let mut text = format!(
        "【残高試算表】{}時点\n科目 | 借方 | 貸方\n{}\n",
        trial.as_of.format("%Y-%m-%d"),
        "-".repeat(30)
    );
    for row in rows {
        text.push_str(&format!(
            "{}: 借方 {}円 / 貸方 {}円\n",
            row.account,
            format_yen(row.debit_balance),
            format_yen(row.credit_balance)
        ));
    }
    text.push_str(&format!(
        "{}\n合計: 借方 {}円 / 貸方 {}円",
        "-".repeat(30),
        format_yen(trial.total_debit_balance()),
        format_yen(trial.total_credit_balance())
    ));
    text
}

/// LINE rendering of the monthly expense summary, skipping unused accounts.
pub fn format_expense_summary_for_line(summary: &ExpenseSummary) -> String {
    let mut text = format!(
        "【経費一覧】{}年{}月\n\n",
        summary.month.year(),
        summary.month.month()
    );
    let used: Vec<_> = summary.lines.iter().filter(|(_, amount)| *amount > 0).collect();
    if used.is_empty() {
        text.push_str("経費の記録はありません。");
        return text;
    }
    for (account, amount) in used {
        text.push_str(&format!("{}: {}円\n", account, format_yen(*amount)));
    }
    text.push_str(&format!("\n合計: {}円", format_yen(summary.total())));
    text
}
