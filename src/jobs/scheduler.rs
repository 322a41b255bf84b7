//! Periodic reports and reminders pushed to every user.
//!
//! The scheduler wakes once a minute and runs every task due in the local
//! minutes since its previous tick, so a slow tick or a short stall does not
//! skip a report. Catch-up is capped at one day.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::accounting::ledger::trial_balance;
use crate::accounting::reports::{mid_month_report, month_end_report, quarter_of, quarterly_report};
use crate::accounting::{format_yen, AccountingEngine, AccountingError};
use crate::config::{SCHEDULER_MAX_CATCHUP_MINUTES, SCHEDULER_TICK_SECS};
use crate::models::account::ACCOUNTS_RECEIVABLE;
use crate::models::{DateRange, User, YearMonth};
use crate::services::line::{reminder_text, report_text, Messenger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduledTask {
    /// 15th, 09:00
    MidMonthReport,
    /// Last day of the month, 18:00
    MonthEndReport,
    /// Last day of March, June, September and December, 19:00
    QuarterlyReport,
    /// Mondays of January to March, 09:00
    TaxFilingReminder,
    /// March 1st to 10th, 09:00
    ConsumptionTaxReminder,
    /// 5th, 15th and 25th, 10:00, only for users with open receivables
    ReceivablesReminder,
}

fn is_last_day_of_month(date: NaiveDate) -> bool {
    date.succ_opt().is_none_or(|next| next.month() != date.month())
}

impl ScheduledTask {
    pub const ALL: [ScheduledTask; 6] = [
        ScheduledTask::MidMonthReport,
        ScheduledTask::MonthEndReport,
        ScheduledTask::QuarterlyReport,
        ScheduledTask::TaxFilingReminder,
        ScheduledTask::ConsumptionTaxReminder,
        ScheduledTask::ReceivablesReminder,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScheduledTask::MidMonthReport => "mid_month_report",
            ScheduledTask::MonthEndReport => "month_end_report",
            ScheduledTask::QuarterlyReport => "quarterly_report",
            ScheduledTask::TaxFilingReminder => "tax_filing_reminder",
            ScheduledTask::ConsumptionTaxReminder => "consumption_tax_reminder",
            ScheduledTask::ReceivablesReminder => "receivables_reminder",
        }
    }

    /// Whether the task fires at local time `at`
    pub fn is_due(self, at: NaiveDateTime) -> bool {
        if at.minute() != 0 {
            return false;
        }
        let date = at.date();
        let hour = at.hour();
        match self {
            ScheduledTask::MidMonthReport => date.day() == 15 && hour == 9,
            ScheduledTask::MonthEndReport => is_last_day_of_month(date) && hour == 18,
            ScheduledTask::QuarterlyReport => {
                date.month() % 3 == 0 && is_last_day_of_month(date) && hour == 19
            }
            ScheduledTask::TaxFilingReminder => {
                (1..=3).contains(&date.month()) && date.weekday() == Weekday::Mon && hour == 9
            }
            ScheduledTask::ConsumptionTaxReminder => {
                date.month() == 3 && date.day() <= 10 && hour == 9
            }
            ScheduledTask::ReceivablesReminder => {
                matches!(date.day(), 5 | 15 | 25) && hour == 10
            }
        }
    }
}

/// Tasks due in the local minutes after `after` up to and including `until`,
/// oldest first. Only the last day before `until` is considered.
pub fn due_between(after: NaiveDateTime, until: NaiveDateTime) -> Vec<(NaiveDateTime, ScheduledTask)> {
    let earliest = until - ChronoDuration::minutes(SCHEDULER_MAX_CATCHUP_MINUTES);
    let mut minute = truncate_to_minute(after.max(earliest)) + ChronoDuration::minutes(1);
    let mut due = Vec::new();
    while minute <= until {
        due.extend(
            ScheduledTask::ALL
                .iter()
                .filter(|task| task.is_due(minute))
                .map(|task| (minute, *task)),
        );
        minute += ChronoDuration::minutes(1);
    }
    due
}

fn truncate_to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// Outcome of one task run across all users
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub sent: usize,
    /// Users the task did not apply to
    pub skipped: usize,
    pub failed: usize,
}

pub struct Scheduler {
    engine: AccountingEngine,
    messenger: Arc<dyn Messenger>,
    tz: Tz,
}

impl Scheduler {
    pub fn new(engine: AccountingEngine, messenger: Arc<dyn Messenger>, tz: Tz) -> Self {
        Self {
            engine,
            messenger,
            tz,
        }
    }

    fn local_now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.tz).naive_local()
    }

    /// Tick forever. The caller aborts the task on shutdown.
    pub async fn run(self) {
        tracing::info!(timezone = %self.tz, "Scheduler started");
        let mut last = truncate_to_minute(self.local_now());
        let mut interval = tokio::time::interval(Duration::from_secs(SCHEDULER_TICK_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let now = truncate_to_minute(self.local_now());
            for (at, task) in due_between(last, now) {
                if let Err(e) = self.run_task(task, at).await {
                    tracing::error!(task = task.name(), error = %e, "Scheduled task failed");
                }
            }
            last = last.max(now);
        }
    }

    /// Send `task` to every user as of local time `at`.
    pub async fn run_task(
        &self,
        task: ScheduledTask,
        at: NaiveDateTime,
    ) -> Result<TaskSummary, AccountingError> {
        let users = self.engine.store().list_users().await?;
        let mut summary = TaskSummary::default();

        for user in &users {
            let text = match self.message_for(task, user, at.date()).await {
                Ok(Some(text)) => text,
                Ok(None) => {
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(task = task.name(), user_id = %user.id, error = %e, "Failed to build message");
                    summary.failed += 1;
                    continue;
                }
            };
            match self.messenger.push_text(&user.line_user_id, &text).await {
                Ok(()) => summary.sent += 1,
                Err(e) => {
                    tracing::error!(task = task.name(), user_id = %user.id, error = %e, "Failed to send message");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            task = task.name(),
            sent = summary.sent,
            skipped = summary.skipped,
            failed = summary.failed,
            "Scheduled task finished"
        );
        Ok(summary)
    }

    async fn message_for(
        &self,
        task: ScheduledTask,
        user: &User,
        date: NaiveDate,
    ) -> Result<Option<String>, AccountingError> {
        let month = YearMonth::of(date);
        let text = match task {
            ScheduledTask::MidMonthReport => {
                let entries = self.engine.entries_between(user, DateRange::month(month)).await?;
                report_text(&mid_month_report(&entries, date))
            }
            ScheduledTask::MonthEndReport => {
                let entries = self.engine.entries_between(user, DateRange::month(month)).await?;
                report_text(&month_end_report(&entries, month))
            }
            ScheduledTask::QuarterlyReport => {
                let quarter = quarter_of(date.month());
                let start = YearMonth::new(date.year(), (quarter - 1) * 3 + 1)
                    .map(|m| m.first_day())
                    .unwrap_or(date);
                let entries = self
                    .engine
                    .entries_between(user, DateRange::between(start, date))
                    .await?;
                match quarterly_report(&entries, date.year(), quarter) {
                    Ok(body) => report_text(&body),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping quarterly report");
                        return Ok(None);
                    }
                }
            }
            ScheduledTask::TaxFilingReminder => reminder_text(
                "確定申告の準備",
                "確定申告の期限が近づいています。\n帳簿の入力漏れがないか確認しましょう。\n「試算表」で残高を確認できます。",
                &format!("{}年3月15日", date.year()),
            ),
            ScheduledTask::ConsumptionTaxReminder => reminder_text(
                "消費税の申告・納付",
                "消費税の申告・納付期限が近づいています。\n課税売上と仕入の記録を確認しましょう。",
                &format!("{}年3月31日", date.year()),
            ),
            ScheduledTask::ReceivablesReminder => {
                let entries = self.engine.entries_between(user, DateRange::until(date)).await?;
                let outstanding = trial_balance(&entries, date).balance_of(ACCOUNTS_RECEIVABLE);
                if outstanding <= 0 {
                    return Ok(None);
                }
                reminder_text(
                    "売掛金の回収確認",
                    &format!(
                        "未回収の売掛金が {}円 あります。\n入金状況を確認しましょう。",
                        format_yen(outstanding)
                    ),
                    "各取引先の支払期日",
                )
            }
        };
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::processor::tests::RecordingMessenger;
    use crate::models::{EntrySource, TaxCategory, TransactionDraft, TransactionKind};
    use crate::store::MemoryStore;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn due_tasks(time: NaiveDateTime) -> Vec<ScheduledTask> {
        ScheduledTask::ALL
            .into_iter()
            .filter(|t| t.is_due(time))
            .collect()
    }

    #[test]
    fn test_schedule_rules() {
        assert_eq!(due_tasks(at(2024, 5, 15, 9, 0)), vec![ScheduledTask::MidMonthReport]);
        assert!(due_tasks(at(2024, 5, 15, 9, 1)).is_empty());
        // Month end only on the true last day
        assert!(due_tasks(at(2024, 4, 29, 18, 0)).is_empty());
        assert_eq!(due_tasks(at(2024, 4, 30, 18, 0)), vec![ScheduledTask::MonthEndReport]);
        assert_eq!(due_tasks(at(2024, 2, 29, 18, 0)), vec![ScheduledTask::MonthEndReport]);
        assert_eq!(due_tasks(at(2024, 6, 30, 19, 0)), vec![ScheduledTask::QuarterlyReport]);
        assert!(due_tasks(at(2024, 5, 31, 19, 0)).is_empty());
        // 2024-01-08 is a Monday
        assert_eq!(due_tasks(at(2024, 1, 8, 9, 0)), vec![ScheduledTask::TaxFilingReminder]);
        assert!(due_tasks(at(2024, 4, 1, 9, 0)).is_empty());
        // 2024-03-04 is a Monday in the consumption tax window
        assert_eq!(
            due_tasks(at(2024, 3, 4, 9, 0)),
            vec![ScheduledTask::TaxFilingReminder, ScheduledTask::ConsumptionTaxReminder]
        );
        assert_eq!(due_tasks(at(2024, 3, 12, 9, 0)), Vec::<ScheduledTask>::new());
        assert_eq!(due_tasks(at(2024, 7, 25, 10, 0)), vec![ScheduledTask::ReceivablesReminder]);
        assert_eq!(due_tasks(at(2024, 7, 15, 10, 0)), vec![ScheduledTask::ReceivablesReminder]);
    }

    #[test]
    fn test_due_between_replays_missed_minutes() {
        let due = due_between(at(2024, 5, 15, 8, 58), at(2024, 5, 15, 10, 0));
        assert_eq!(
            due,
            vec![
                (at(2024, 5, 15, 9, 0), ScheduledTask::MidMonthReport),
                (at(2024, 5, 15, 10, 0), ScheduledTask::ReceivablesReminder),
            ]
        );
        // The previous tick's minute is not replayed
        assert!(due_between(at(2024, 5, 15, 9, 0), at(2024, 5, 15, 9, 0)).is_empty());
        assert!(due_between(at(2024, 5, 15, 9, 0), at(2024, 5, 15, 9, 1)).is_empty());
    }

    #[test]
    fn test_due_between_caps_catch_up() {
        let due = due_between(at(2024, 1, 1, 0, 0), at(2024, 5, 16, 8, 0));
        assert_eq!(
            due,
            vec![
                (at(2024, 5, 15, 9, 0), ScheduledTask::MidMonthReport),
                (at(2024, 5, 15, 10, 0), ScheduledTask::ReceivablesReminder),
            ]
        );
    }

    async fn record(engine: &AccountingEngine, user: &str, debit: &str, credit: &str, amount: i64, date: &str) {
        let draft = TransactionDraft {
            transaction_type: TransactionKind::Income,
            date: Some(date.to_string()),
            amount: Some(amount),
            debit_account: debit.to_string(),
            credit_account: credit.to_string(),
            description: "test".to_string(),
            tax_type: Some(TaxCategory::Taxable10),
            ..TransactionDraft::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        engine
            .record_draft(user, &draft, EntrySource::Line, today)
            .await
            .unwrap();
    }

    fn scheduler() -> (Scheduler, AccountingEngine, Arc<RecordingMessenger>) {
        let engine = AccountingEngine::new(Arc::new(MemoryStore::new()));
        let messenger = Arc::new(RecordingMessenger::default());
        let scheduler = Scheduler::new(engine.clone(), messenger.clone(), chrono_tz::Asia::Tokyo);
        (scheduler, engine, messenger)
    }

    #[tokio::test]
    async fn test_reports_sent_to_every_user() {
        let (scheduler, engine, messenger) = scheduler();
        record(&engine, "U1", "普通預金", "売上高", 300_000, "2024-06-10").await;
        engine.get_or_create_user("U2").await.unwrap();

        let summary = scheduler
            .run_task(ScheduledTask::MonthEndReport, at(2024, 6, 30, 18, 0))
            .await
            .unwrap();
        assert_eq!(summary, TaskSummary { sent: 2, skipped: 0, failed: 0 });

        let u1 = messenger.texts_for("U1");
        assert!(u1[0].starts_with("📊 【月次決算レポート 2024-06】"));
        assert!(u1[0].contains("売上高: 300,000円"));

        scheduler
            .run_task(ScheduledTask::QuarterlyReport, at(2024, 6, 30, 19, 0))
            .await
            .unwrap();
        assert!(messenger.texts_for("U1")[1].contains("【第2四半期レポート 2024年】"));
    }

    #[tokio::test]
    async fn test_receivables_reminder_only_for_open_balances() {
        let (scheduler, engine, messenger) = scheduler();
        record(&engine, "U1", "売掛金", "売上高", 50_000, "2024-07-01").await;
        record(&engine, "U2", "売掛金", "売上高", 20_000, "2024-07-01").await;
        record(&engine, "U2", "普通預金", "売掛金", 20_000, "2024-07-10").await;

        let summary = scheduler
            .run_task(ScheduledTask::ReceivablesReminder, at(2024, 7, 15, 10, 0))
            .await
            .unwrap();
        assert_eq!(summary, TaskSummary { sent: 1, skipped: 1, failed: 0 });
        assert!(messenger.texts_for("U1")[0].contains("50,000円"));
        assert!(messenger.texts_for("U2").is_empty());
    }

    #[tokio::test]
    async fn test_reminder_text() {
        let (scheduler, engine, messenger) = scheduler();
        engine.get_or_create_user("U1").await.unwrap();
        scheduler
            .run_task(ScheduledTask::TaxFilingReminder, at(2025, 2, 3, 9, 0))
            .await
            .unwrap();
        let text = messenger.last_text();
        assert!(text.starts_with("⏰ 【リマインダー】"));
        assert!(text.ends_with("期限: 2025年3月15日"));
    }
}
