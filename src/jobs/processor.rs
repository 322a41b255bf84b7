//! Handles queued LINE events: commands, transaction messages, receipts
//! and voice notes.

use std::sync::Arc;

use async_channel::Receiver;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tracing::instrument;

use super::queue::Job;
use crate::accounting::ledger::{
    cash_book, expense_summary, format_expense_summary_for_line, format_journal_for_line,
    format_trial_balance_for_line, journal, trial_balance,
};
use crate::accounting::parse::parse_amount;
use crate::accounting::reports::{profit_and_loss, ProfitAndLoss};
use crate::accounting::{format_yen, AccountingEngine, AccountingError};
use crate::models::{DateRange, EntrySource, JournalEntry, YearMonth};
use crate::services::analyzer::{Analysis, TransactionAnalyzer, ERROR_QUESTION};
use crate::services::line::{confirmation_text, Messenger};
use crate::services::ocr::{parse_receipt, receipt_to_draft, TextRecognizer};
use crate::services::speech::{Transcriber, LINE_AUDIO_FORMAT};
use crate::services::ServiceError;

pub const HELP_TEXT: &str = "【使い方】

経費登録:
「タクシー3200円」
「スタバでコーヒー550円」

売上登録:
「A社から50万円入金」
「コンサル料10万円」

レシート:
レシートの写真を送ると自動で登録します

帳簿・レポート:
「今月の売上」「経費一覧」
「帳簿表示」「試算表」「現金出納帳」

訂正:
「取り消し」で直前の取引を削除

質問:
「消費税の計算方法は？」";

const WELCOME_TEXT: &str = "友だち追加ありがとうございます！\n\
取引をメッセージで送るだけで帳簿をつけられます。";

/// Quick reply shortcuts offered with the help text
const MENU_OPTIONS: [&str; 5] = ["今月の売上", "経費一覧", "帳簿表示", "試算表", "取り消し"];

const JOURNAL_DISPLAY_LIMIT: usize = 10;

const OCR_UNAVAILABLE: &str = "レシート画像を受け取りました。OCR機能は準備中です。";
const SPEECH_UNAVAILABLE: &str = "音声メッセージを受け取りました。音声認識機能は準備中です。";
const RECEIPT_UNREADABLE: &str =
    "レシートから金額を読み取れませんでした。「タクシー3200円」のように入力してください。";
const SPEECH_UNRECOGNIZED: &str = "音声を認識できませんでした。もう一度お試しください。";
const NOTHING_TO_UNDO: &str = "取り消せる取引がありません。";

/// What a text message asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    MonthlySales,
    ExpenseList,
    Journal,
    TrialBalance,
    CashBook,
    Undo,
    TaxQuestion(String),
    Transaction(String),
}

impl Command {
    pub fn parse(text: &str) -> Command {
        let text = text.trim();
        let lower = text.to_lowercase();
        // Report keywords inside a message with an amount describe a transaction
        let has_amount = parse_amount(text).is_some();

        if matches!(lower.as_str(), "help" | "ヘルプ" | "使い方") {
            Command::Help
        } else if matches!(text, "取り消し" | "取消" | "取消し" | "取り消して") {
            Command::Undo
        } else if has_amount {
            Self::question_or_transaction(text)
        } else if text.contains("今月の売上") || text.contains("損益") {
            Command::MonthlySales
        } else if text.contains("経費一覧") {
            Command::ExpenseList
        } else if text.contains("帳簿表示") || text.contains("仕訳帳") {
            Command::Journal
        } else if text.contains("試算表") {
            Command::TrialBalance
        } else if text.contains("現金出納帳") {
            Command::CashBook
        } else {
            Self::question_or_transaction(text)
        }
    }

    fn question_or_transaction(text: &str) -> Command {
        if text.ends_with('?') || text.ends_with('？') {
            Command::TaxQuestion(text.to_string())
        } else {
            Command::Transaction(text.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Accounting(#[from] AccountingError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

fn monthly_sales_text(pl: &ProfitAndLoss) -> String {
    format!(
        "【{}年{}月の損益】\n\n売上高: {}円\n売上原価: {}円\n経費合計: {}円\n\n営業利益: {}円\n利益率: {:.1}%",
        pl.month.year(),
        pl.month.month(),
        format_yen(pl.sales),
        format_yen(pl.cost_of_sales),
        format_yen(pl.total_expenses()),
        format_yen(pl.operating_profit()),
        pl.profit_margin(),
    )
}

fn undo_text(entry: &JournalEntry) -> String {
    format!(
        "直前の取引を取り消しました。\n\n{} {} / {} {}円\n摘要: {}",
        entry.date.format("%Y-%m-%d"),
        entry.debit_account,
        entry.credit_account,
        format_yen(entry.debit_amount),
        entry.description,
    )
}

fn rejected_text(errors: &[crate::accounting::EntryError]) -> String {
    let reasons: Vec<String> = errors.iter().map(|e| format!("・{}", e)).collect();
    format!("取引を登録できませんでした。\n\n{}", reasons.join("\n"))
}

fn cash_book_text(book: &crate::accounting::ledger::CashBook) -> String {
    let mut text = format!(
        "【現金出納帳】{}年{}月\n\n前月繰越: {}円\n",
        book.month.year(),
        book.month.month(),
        format_yen(book.opening_balance)
    );
    for row in book.rows.iter().rev().take(JOURNAL_DISPLAY_LIMIT).rev() {
        text.push_str(&format!(
            "{} {} 入金 {}円 / 出金 {}円 残高 {}円\n",
            row.date.format("%m/%d"),
            row.description,
            format_yen(row.income),
            format_yen(row.expense),
            format_yen(row.balance),
        ));
    }
    text.push_str(&format!("\n残高: {}円", format_yen(book.closing_balance())));
    text
}

/// Turns jobs into ledger changes and replies
pub struct MessageProcessor {
    engine: AccountingEngine,
    analyzer: Arc<dyn TransactionAnalyzer>,
    messenger: Arc<dyn Messenger>,
    ocr: Option<Arc<dyn TextRecognizer>>,
    speech: Option<Arc<dyn Transcriber>>,
    tz: Tz,
}

impl MessageProcessor {
    pub fn new(
        engine: AccountingEngine,
        analyzer: Arc<dyn TransactionAnalyzer>,
        messenger: Arc<dyn Messenger>,
        tz: Tz,
    ) -> Self {
        Self {
            engine,
            analyzer,
            messenger,
            ocr: None,
            speech: None,
            tz,
        }
    }

    pub fn with_ocr(mut self, ocr: Option<Arc<dyn TextRecognizer>>) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn with_speech(mut self, speech: Option<Arc<dyn Transcriber>>) -> Self {
        self.speech = speech;
        self
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    /// Handle a job; on failure the user gets an apology instead of silence.
    #[instrument(name = "jobs.process", skip_all, fields(kind = job.kind()))]
    pub async fn process(&self, job: Job) {
        if let Err(e) = self.handle(&job).await {
            tracing::error!(error = %e, user_id = job.user_id(), "Failed to process job");
            if let Err(e) = self.messenger.push_text(job.user_id(), ERROR_QUESTION).await {
                tracing::warn!(error = %e, "Could not deliver error message");
            }
        }
    }

    pub async fn handle(&self, job: &Job) -> Result<(), ProcessError> {
        match job {
            Job::Text { user_id, text } => self.handle_text(user_id, text, EntrySource::Line).await,
            Job::Image {
                user_id,
                message_id,
            } => self.handle_image(user_id, message_id).await,
            Job::Audio {
                user_id,
                message_id,
            } => self.handle_audio(user_id, message_id).await,
            Job::Follow { user_id } => {
                self.engine.get_or_create_user(user_id).await?;
                self.messenger.push_text(user_id, WELCOME_TEXT).await?;
                self.push_help(user_id).await
            }
        }
    }

    async fn push_help(&self, user_id: &str) -> Result<(), ProcessError> {
        let options: Vec<String> = MENU_OPTIONS.iter().map(|o| o.to_string()).collect();
        self.messenger
            .push_quick_reply(user_id, HELP_TEXT, &options)
            .await?;
        Ok(())
    }

    async fn handle_text(
        &self,
        user_id: &str,
        text: &str,
        source: EntrySource,
    ) -> Result<(), ProcessError> {
        let command = Command::parse(text);
        tracing::debug!(command = ?command, "Parsed message");
        let today = self.today();

        let reply = match command {
            Command::Help => return self.push_help(user_id).await,
            Command::MonthlySales => {
                let month = YearMonth::of(today);
                let entries = self.month_entries(user_id, month).await?;
                monthly_sales_text(&profit_and_loss(&entries, month))
            }
            Command::ExpenseList => {
                let month = YearMonth::of(today);
                let entries = self.month_entries(user_id, month).await?;
                format_expense_summary_for_line(&expense_summary(&entries, month))
            }
            Command::Journal => {
                let month = YearMonth::of(today);
                let entries = self.month_entries(user_id, month).await?;
                let rows = journal(&entries, DateRange::month(month));
                format_journal_for_line(&rows, JOURNAL_DISPLAY_LIMIT)
            }
            Command::TrialBalance => {
                let user = self.engine.get_or_create_user(user_id).await?;
                let entries = self
                    .engine
                    .entries_between(&user, DateRange::until(today))
                    .await?;
                format_trial_balance_for_line(&trial_balance(&entries, today))
            }
            Command::CashBook => {
                let user = self.engine.get_or_create_user(user_id).await?;
                let month = YearMonth::of(today);
                let entries = self
                    .engine
                    .entries_between(&user, DateRange::until(month.last_day()))
                    .await?;
                cash_book_text(&cash_book(&entries, month))
            }
            Command::Undo => {
                let user = self.engine.get_or_create_user(user_id).await?;
                match self.engine.delete_latest_entry(&user).await? {
                    Some(entry) => undo_text(&entry),
                    None => NOTHING_TO_UNDO.to_string(),
                }
            }
            Command::TaxQuestion(question) => self.analyzer.answer_tax_question(&question).await,
            Command::Transaction(text) => match self.analyzer.analyze(&text, today).await {
                Analysis::Clarify(question) => question,
                Analysis::Draft(draft) => {
                    match self.engine.record_draft(user_id, &draft, source, today).await {
                        Ok(entry) => confirmation_text(&entry),
                        Err(AccountingError::Invalid(errors)) => rejected_text(&errors),
                        Err(e) => return Err(e.into()),
                    }
                }
            },
        };

        self.messenger.push_text(user_id, &reply).await?;
        Ok(())
    }

    async fn month_entries(
        &self,
        user_id: &str,
        month: YearMonth,
    ) -> Result<Vec<JournalEntry>, ProcessError> {
        let user = self.engine.get_or_create_user(user_id).await?;
        Ok(self
            .engine
            .entries_between(&user, DateRange::month(month))
            .await?)
    }

    async fn handle_image(&self, user_id: &str, message_id: &str) -> Result<(), ProcessError> {
        let Some(ocr) = &self.ocr else {
            self.messenger.push_text(user_id, OCR_UNAVAILABLE).await?;
            return Ok(());
        };

        let image = self.messenger.message_content(message_id).await?;
        let text = ocr.extract_text(&image).await?;
        let receipt = parse_receipt(&text);
        let today = self.today();

        let reply = match receipt_to_draft(&receipt, today) {
            None => RECEIPT_UNREADABLE.to_string(),
            Some(draft) => {
                let image_ref = format!("line:{}", message_id);
                match self
                    .engine
                    .record_receipt(user_id, &draft, image_ref, today)
                    .await
                {
                    Ok(entry) => confirmation_text(&entry),
                    Err(AccountingError::Invalid(errors)) => rejected_text(&errors),
                    Err(e) => return Err(e.into()),
                }
            }
        };
        self.messenger.push_text(user_id, &reply).await?;
        Ok(())
    }

    async fn handle_audio(&self, user_id: &str, message_id: &str) -> Result<(), ProcessError> {
        let Some(speech) = &self.speech else {
            self.messenger.push_text(user_id, SPEECH_UNAVAILABLE).await?;
            return Ok(());
        };

        let audio = self.messenger.message_content(message_id).await?;
        let text = speech.transcribe(audio, LINE_AUDIO_FORMAT).await?;
        if text.is_empty() {
            self.messenger.push_text(user_id, SPEECH_UNRECOGNIZED).await?;
            return Ok(());
        }

        tracing::debug!(transcript = %text, "Voice message transcribed");
        self.messenger
            .push_text(user_id, &format!("🎤 「{}」", text))
            .await?;
        self.handle_text(user_id, &text, EntrySource::Voice).await
    }
}

/// Worker task pulling jobs off the shared queue
struct Worker {
    id: usize,
    jobs: Receiver<Job>,
    processor: Arc<MessageProcessor>,
}

impl Worker {
    #[instrument(name = "jobs.worker", skip(self), fields(worker_id = self.id))]
    async fn run(self) {
        tracing::debug!("Worker starting");
        while let Ok(job) = self.jobs.recv().await {
            self.processor.process(job).await;
        }
        tracing::debug!("Queue closed, worker stopping");
    }
}

/// Spawn `count` workers; they exit once the queue is closed and drained.
pub fn spawn_workers(
    count: usize,
    jobs: Receiver<Job>,
    processor: Arc<MessageProcessor>,
) -> Vec<JoinHandle<()>> {
    let handles = (0..count.max(1))
        .map(|id| {
            let worker = Worker {
                id,
                jobs: jobs.clone(),
                processor: processor.clone(),
            };
            tokio::spawn(worker.run())
        })
        .collect::<Vec<_>>();
    tracing::info!(count = handles.len(), "Spawned message workers");
    handles
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::jobs::JobQueue;
    use crate::models::User;
    use crate::services::analyzer::{RuleBasedAnalyzer, AMOUNT_QUESTION};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Messenger that keeps everything it is asked to send
    #[derive(Default)]
    pub(crate) struct RecordingMessenger {
        pub texts: Mutex<Vec<(String, String)>>,
        pub quick_replies: Mutex<Vec<(String, String, Vec<String>)>>,
    }

    impl RecordingMessenger {
        pub fn texts_for(&self, user_id: &str) -> Vec<String> {
            self.texts
                .lock()
                .unwrap()
                .iter()
                .filter(|(u, _)| u == user_id)
                .map(|(_, t)| t.clone())
                .collect()
        }

        pub fn last_text(&self) -> String {
            self.texts
                .lock()
                .unwrap()
                .last()
                .map(|(_, t)| t.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn push_text(&self, user_id: &str, text: &str) -> Result<(), ServiceError> {
            self.texts
                .lock()
                .unwrap()
                .push((user_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn push_quick_reply(
            &self,
            user_id: &str,
            question: &str,
            options: &[String],
        ) -> Result<(), ServiceError> {
            self.quick_replies.lock().unwrap().push((
                user_id.to_string(),
                question.to_string(),
                options.to_vec(),
            ));
            Ok(())
        }

        async fn message_content(&self, message_id: &str) -> Result<Vec<u8>, ServiceError> {
            Ok(format!("content-{}", message_id).into_bytes())
        }
    }

    struct FixedText(Result<String, &'static str>);

    #[async_trait]
    impl TextRecognizer for FixedText {
        async fn extract_text(&self, image: &[u8]) -> Result<String, ServiceError> {
            assert_eq!(image, b"content-m1");
            self.0.clone().map_err(|message| ServiceError::Response {
                service: "test",
                message: message.to_string(),
            })
        }
    }

    struct FixedTranscript(&'static str);

    #[async_trait]
    impl Transcriber for FixedTranscript {
        async fn transcribe(&self, _audio: Vec<u8>, extension: &str) -> Result<String, ServiceError> {
            assert_eq!(extension, "m4a");
            Ok(self.0.to_string())
        }
    }

    struct Fixture {
        engine: AccountingEngine,
        messenger: Arc<RecordingMessenger>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                engine: AccountingEngine::new(Arc::new(MemoryStore::new())),
                messenger: Arc::new(RecordingMessenger::default()),
            }
        }

        fn processor(&self) -> MessageProcessor {
            MessageProcessor::new(
                self.engine.clone(),
                Arc::new(RuleBasedAnalyzer),
                self.messenger.clone(),
                chrono_tz::Asia::Tokyo,
            )
        }

        async fn user(&self) -> User {
            self.engine.get_or_create_user("U1").await.unwrap()
        }

        async fn entries(&self) -> Vec<JournalEntry> {
            let user = self.user().await;
            self.engine
                .entries_between(&user, DateRange::all())
                .await
                .unwrap()
        }
    }

    fn text(text: &str) -> Job {
        Job::Text {
            user_id: "U1".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse(" HELP "), Command::Help);
        assert_eq!(Command::parse("ヘルプ"), Command::Help);
        assert_eq!(Command::parse("使い方"), Command::Help);
        assert_eq!(Command::parse("今月の売上"), Command::MonthlySales);
        assert_eq!(Command::parse("今月の損益を教えて"), Command::MonthlySales);
        assert_eq!(Command::parse("経費一覧"), Command::ExpenseList);
        assert_eq!(Command::parse("帳簿表示"), Command::Journal);
        assert_eq!(Command::parse("仕訳帳"), Command::Journal);
        assert_eq!(Command::parse("試算表"), Command::TrialBalance);
        assert_eq!(Command::parse("現金出納帳"), Command::CashBook);
        assert_eq!(Command::parse("取り消し"), Command::Undo);
        assert_eq!(Command::parse("取消"), Command::Undo);
        assert_eq!(
            Command::parse("消費税の計算方法は？"),
            Command::TaxQuestion("消費税の計算方法は？".to_string())
        );
        assert_eq!(
            Command::parse("タクシー3200円"),
            Command::Transaction("タクシー3200円".to_string())
        );
    }

    #[test]
    fn test_command_parse_report_words_with_amount() {
        assert_eq!(
            Command::parse("今月の売上30万円を入金"),
            Command::Transaction("今月の売上30万円を入金".to_string())
        );
        assert_eq!(
            Command::parse("損益5万円の修正"),
            Command::Transaction("損益5万円の修正".to_string())
        );
        assert_eq!(
            Command::parse("売上1000万円を超えたら試算表は必要？"),
            Command::TaxQuestion("売上1000万円を超えたら試算表は必要？".to_string())
        );
        assert_eq!(Command::parse("1月の損益"), Command::MonthlySales);
    }

    #[tokio::test]
    async fn test_sales_message_with_amount_is_recorded() {
        let fx = Fixture::new();
        fx.processor().process(text("今月の売上30万円を入金")).await;

        let entries = fx.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].credit_account, "売上高");
        assert_eq!(entries[0].credit_amount, 300_000);
    }

    #[tokio::test]
    async fn test_text_message_records_entry() {
        let fx = Fixture::new();
        fx.processor().process(text("タクシー3200円")).await;

        let entries = fx.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].debit_account, "旅費交通費");
        assert_eq!(entries[0].debit_amount, 3200);
        assert_eq!(entries[0].source, EntrySource::Line);

        let reply = fx.messenger.last_text();
        assert!(reply.contains("取引を登録しました"));
        assert!(reply.contains("3,200"));
    }

    #[tokio::test]
    async fn test_missing_amount_asks_question() {
        let fx = Fixture::new();
        fx.processor().process(text("タクシーに乗った")).await;

        assert!(fx.entries().await.is_empty());
        assert_eq!(fx.messenger.last_text(), AMOUNT_QUESTION);
    }

    #[tokio::test]
    async fn test_help_and_follow_send_menu() {
        let fx = Fixture::new();
        let processor = fx.processor();
        processor.process(text("help")).await;
        processor
            .process(Job::Follow {
                user_id: "U2".to_string(),
            })
            .await;

        let quick = fx.messenger.quick_replies.lock().unwrap().clone();
        assert_eq!(quick.len(), 2);
        assert_eq!(quick[0].1, HELP_TEXT);
        assert_eq!(quick[0].2.len(), MENU_OPTIONS.len());
        assert_eq!(quick[1].0, "U2");
        assert_eq!(fx.messenger.texts_for("U2"), vec![WELCOME_TEXT.to_string()]);
        assert!(fx.engine.store().find_user("U2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_undo_latest_entry() {
        let fx = Fixture::new();
        let processor = fx.processor();
        processor.process(text("取り消し")).await;
        assert_eq!(fx.messenger.last_text(), NOTHING_TO_UNDO);

        processor.process(text("タクシー3200円")).await;
        processor.process(text("コーヒー550円")).await;
        processor.process(text("取り消し")).await;

        let entries = fx.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].debit_amount, 3200);
        assert!(fx.messenger.last_text().contains("取り消しました"));
    }

    #[tokio::test]
    async fn test_reports_over_recorded_entries() {
        let fx = Fixture::new();
        let processor = fx.processor();
        processor.process(text("タクシー3200円")).await;
        processor.process(text("A社から10万円入金")).await;

        processor.process(text("今月の売上")).await;
        let sales = fx.messenger.last_text();
        assert!(sales.contains("売上高: 100,000円"));
        assert!(sales.contains("営業利益: 96,800円"));

        processor.process(text("経費一覧")).await;
        assert!(fx.messenger.last_text().contains("旅費交通費: 3,200円"));

        processor.process(text("帳簿表示")).await;
        assert!(fx.messenger.last_text().starts_with("【仕訳帳】"));

        processor.process(text("試算表")).await;
        let trial = fx.messenger.last_text();
        assert!(trial.contains("【残高試算表】"));
        assert!(trial.contains("合計: 借方 103,200円 / 貸方 103,200円"));

        processor.process(text("現金出納帳")).await;
        assert!(fx.messenger.last_text().contains("【現金出納帳】"));
    }

    #[tokio::test]
    async fn test_tax_question_without_api_key() {
        let fx = Fixture::new();
        fx.processor().process(text("青色申告とは？")).await;
        assert!(fx.messenger.last_text().contains("Claude APIキー"));
    }

    #[tokio::test]
    async fn test_image_without_ocr() {
        let fx = Fixture::new();
        fx.processor()
            .process(Job::Image {
                user_id: "U1".to_string(),
                message_id: "m1".to_string(),
            })
            .await;
        assert_eq!(fx.messenger.last_text(), OCR_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_receipt_recorded() {
        let fx = Fixture::new();
        let processor = fx
            .processor()
            .with_ocr(Some(Arc::new(FixedText(Ok(
                "日本交通タクシー\n2024/01/15\n合計 ¥2,400\nクレジット".to_string(),
            )))));
        processor
            .process(Job::Image {
                user_id: "U1".to_string(),
                message_id: "m1".to_string(),
            })
            .await;

        let entries = fx.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].debit_account, "旅費交通費");
        assert_eq!(entries[0].credit_account, "未払金");
        assert_eq!(entries[0].date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(entries[0].source, EntrySource::Receipt);
        assert_eq!(entries[0].receipt_image.as_deref(), Some("line:m1"));
    }

    #[tokio::test]
    async fn test_ocr_failure_sends_apology() {
        let fx = Fixture::new();
        let processor = fx.processor().with_ocr(Some(Arc::new(FixedText(Err("boom")))));
        processor
            .process(Job::Image {
                user_id: "U1".to_string(),
                message_id: "m1".to_string(),
            })
            .await;
        assert_eq!(fx.messenger.last_text(), ERROR_QUESTION);
        assert!(fx.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_voice_message_becomes_entry() {
        let fx = Fixture::new();
        let audio = |id: &str| Job::Audio {
            user_id: "U1".to_string(),
            message_id: id.to_string(),
        };

        fx.processor().process(audio("a0")).await;
        assert_eq!(fx.messenger.last_text(), SPEECH_UNAVAILABLE);

        let processor = fx
            .processor()
            .with_speech(Some(Arc::new(FixedTranscript("電車代480円"))));
        processor.process(audio("a1")).await;

        let entries = fx.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].debit_amount, 480);
        assert_eq!(entries[0].source, EntrySource::Voice);
        let texts = fx.messenger.texts_for("U1");
        assert!(texts.iter().any(|t| t == "🎤 「電車代480円」"));
    }

    #[tokio::test]
    async fn test_workers_drain_queue() {
        let fx = Fixture::new();
        let queue = JobQueue::new(16);
        let handles = spawn_workers(2, queue.receiver(), Arc::new(fx.processor()));

        for amount in [100, 200, 300] {
            queue
                .submit(None, text(&format!("文房具{}円", amount)))
                .await
                .unwrap();
        }
        queue.close();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(fx.entries().await.len(), 3);
    }
}
