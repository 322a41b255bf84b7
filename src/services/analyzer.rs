//! Turning a user's message into a transaction draft.
//!
//! `ClaudeAnalyzer` asks the Anthropic Messages API to fill in the draft.
//! `RuleBasedAnalyzer` is the keyword fallback used when no API key is set.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{check_status, http_client, ServiceError};
use crate::accounting::parse::{
    infer_credit_account, infer_debit_account, infer_receiving_account, is_income, parse_amount,
    parse_date,
};
use crate::config::{ClaudeConfig, ANTHROPIC_VERSION, CLAUDE_TAX_ANSWER_MAX_TOKENS};
use crate::models::account::{find_account, SALES};
use crate::models::{TaxCategory, TransactionDraft, TransactionKind};

/// Asked when a reply could not be understood
pub const RETRY_QUESTION: &str = "もう一度詳しく教えていただけますか？";

/// Asked when the analysis service failed
pub const ERROR_QUESTION: &str = "エラーが発生しました。もう一度お試しください。";

/// Asked by the rule-based analyzer when no amount was found
pub const AMOUNT_QUESTION: &str = "金額を教えてください。（例: タクシー3200円）";

const TAX_ANSWER_FAILED: &str = "申し訳ございません。回答の生成に失敗しました。";

const TAX_ANSWER_UNAVAILABLE: &str =
    "税務相談機能を使用するにはClaude APIキーの設定が必要です。";

/// Longest description kept from the raw message
const DESCRIPTION_MAX_CHARS: usize = 50;

const TRANSACTION_SYSTEM_PROMPT: &str = r#"あなたは個人事業主向けの経理アシスタントです。
ユーザーの入力から取引を読み取り、次のJSONオブジェクトだけを出力してください。

{
  "transaction_type": "expense" | "income" | "transfer",
  "date": "YYYY-MM-DD",
  "amount": 金額(整数、円),
  "debit_account": "借方勘定科目",
  "credit_account": "貸方勘定科目",
  "description": "摘要",
  "client": "取引先名" | null,
  "project": "プロジェクト名" | null,
  "tax_type": "課税10%" | "課税8%" | "非課税" | "不課税",
  "confidence": 0から1の確信度,
  "clarification_needed": true | false,
  "clarification_question": "確認したい内容" | null
}

勘定科目の目安:
- タクシー、電車、バス、Uber、ホテル、宿泊 → 旅費交通費
- 取引先とのカフェ・会食 → 接待交際費
- Amazon、文房具、事務用品 → 消耗品費
- 広告、SNS広告 → 広告宣伝費
- サーバー、ドメイン、SaaS、携帯 → 通信費
- 家賃、駐車場、倉庫 → 地代家賃
- 電気、ガス、水道 → 水道光熱費
- セミナー、研修 → 研修費
- 書籍、Kindle、教材 → 新聞図書費
- 外注、業務委託 → 外注費
- 振込手数料 → 支払手数料
- 税金、印紙 → 租税公課
- 売上、報酬、コンサル料 → 売上高 (借方は普通預金、現金払いなら現金)
- 利息、配当 → 受取利息

消費税区分: 飲食料品(外食除く)と定期購読の新聞は課税8%、住宅家賃・切手は非課税、給与・寄付・海外取引は不課税、それ以外は課税10%。
日付: 「今日」「さっき」は今日、「昨日」は前日、「○日」は今月の○日、記載がなければ今日。
金額: 「3,200円」は3200、「50万」は500000。金額や科目が判断できない場合は clarification_needed を true にして質問を入れてください。"#;

const TAX_SYSTEM_PROMPT: &str = "あなたは日本の税務に詳しい経理アシスタントです。\
税法に基づいて正確に、わかりやすく回答してください。\
判断が難しい場合は税理士への相談を勧めてください。";

/// Result of analysing one message
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    Draft(TransactionDraft),
    /// Ask the user this before anything can be recorded
    Clarify(String),
}

#[async_trait]
pub trait TransactionAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str, today: NaiveDate) -> Analysis;

    /// Free-form answer to a tax question
    async fn answer_tax_question(&self, question: &str) -> String;

    /// Name for logs
    fn name(&self) -> &'static str;
}

/// Pick the analyzer the configuration allows
pub fn analyzer_from_config(
    config: &ClaudeConfig,
) -> Result<Arc<dyn TransactionAnalyzer>, ServiceError> {
    match &config.api_key {
        Some(key) => Ok(Arc::new(ClaudeAnalyzer::new(config, key.clone())?)),
        None => {
            tracing::warn!("Claude API key not configured, using rule-based analysis");
            Ok(Arc::new(RuleBasedAnalyzer))
        }
    }
}

/// Take the outermost JSON object out of a model reply that may carry prose
/// or code fences around it.
pub fn extract_json(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}

/// Read a model reply into an analysis
pub fn interpret_reply(reply: &str) -> Analysis {
    let draft = extract_json(reply).and_then(|json| serde_json::from_str::<TransactionDraft>(json).ok());
    match draft {
        Some(draft) if draft.clarification_needed => Analysis::Clarify(
            draft
                .clarification_question
                .filter(|q| !q.trim().is_empty())
                .unwrap_or_else(|| RETRY_QUESTION.to_string()),
        ),
        Some(draft) => Analysis::Draft(draft),
        None => {
            tracing::warn!(reply_len = reply.len(), "Could not parse analyzer reply");
            Analysis::Clarify(RETRY_QUESTION.to_string())
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Anthropic Messages API client
pub struct ClaudeAnalyzer {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
}

impl ClaudeAnalyzer {
    pub fn new(config: &ClaudeConfig, api_key: String) -> Result<Self, ServiceError> {
        Ok(Self {
            http: http_client()?,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, ServiceError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;
        let response: MessagesResponse = check_status("Claude", response).await?.json().await?;

        let text: String = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(ServiceError::Response {
                service: "Claude",
                message: "no text content".to_string(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl TransactionAnalyzer for ClaudeAnalyzer {
    async fn analyze(&self, text: &str, today: NaiveDate) -> Analysis {
        let prompt = format!(
            "今日の日付: {}\n\nユーザー入力: {}\n\n上記の入力から取引情報を抽出し、JSON形式で出力してください。",
            today.format("%Y-%m-%d"),
            text
        );

        match self
            .complete(TRANSACTION_SYSTEM_PROMPT, &prompt, self.max_tokens)
            .await
        {
            Ok(reply) => {
                tracing::debug!(reply = %reply, "Claude analysis");
                interpret_reply(&reply)
            }
            Err(e) => {
                tracing::error!(error = %e, "Claude analysis failed");
                Analysis::Clarify(ERROR_QUESTION.to_string())
            }
        }
    }

    async fn answer_tax_question(&self, question: &str) -> String {
        match self
            .complete(TAX_SYSTEM_PROMPT, question, CLAUDE_TAX_ANSWER_MAX_TOKENS)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, "Tax consultation failed");
                TAX_ANSWER_FAILED.to_string()
            }
        }
    }

    fn name(&self) -> &'static str {
        "claude"
    }
}

/// Keyword-based analysis without any external service
pub struct RuleBasedAnalyzer;

#[async_trait]
impl TransactionAnalyzer for RuleBasedAnalyzer {
    async fn analyze(&self, text: &str, today: NaiveDate) -> Analysis {
        let Some(amount) = parse_amount(text) else {
            return Analysis::Clarify(AMOUNT_QUESTION.to_string());
        };

        let (kind, debit, credit) = if is_income(text) {
            (TransactionKind::Income, infer_receiving_account(text), SALES)
        } else {
            (
                TransactionKind::Expense,
                infer_debit_account(text),
                infer_credit_account(text),
            )
        };
        // Tax follows the profit-and-loss side of the entry
        let pl_account = if kind == TransactionKind::Income { credit } else { debit };
        let tax_type = find_account(pl_account)
            .map(|a| a.tax_default)
            .unwrap_or(TaxCategory::Taxable10);

        Analysis::Draft(TransactionDraft {
            transaction_type: kind,
            date: Some(parse_date(text, today).format("%Y-%m-%d").to_string()),
            amount: Some(amount),
            debit_account: debit.to_string(),
            credit_account: credit.to_string(),
            description: text.trim().chars().take(DESCRIPTION_MAX_CHARS).collect(),
            tax_type: Some(tax_type),
            confidence: 0.7,
            ..TransactionDraft::default()
        })
    }

    async fn answer_tax_question(&self, _question: &str) -> String {
        TAX_ANSWER_UNAVAILABLE.to_string()
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;
    use axum::{http::HeaderMap, routing::post, Json, Router};
    use serde_json::{json, Value};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 20).unwrap()
    }

    #[test]
    fn test_extract_json_from_fenced_reply() {
        let reply = "はい。\n```json\n{\"amount\": 1000}\n```";
        assert_eq!(extract_json(reply), Some("{\"amount\": 1000}"));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} {"), None);
    }

    #[test]
    fn test_interpret_reply() {
        let draft = interpret_reply(
            r#"{"transaction_type":"expense","amount":3200,"debit_account":"旅費交通費","credit_account":"現金","clarification_needed":false}"#,
        );
        match draft {
            Analysis::Draft(d) => assert_eq!(d.amount, Some(3200)),
            other => panic!("expected draft, got {:?}", other),
        }

        let clarify = interpret_reply(
            r#"{"clarification_needed":true,"clarification_question":"金額はいくらですか？"}"#,
        );
        assert_eq!(clarify, Analysis::Clarify("金額はいくらですか？".to_string()));

        assert_eq!(
            interpret_reply("I cannot help with that"),
            Analysis::Clarify(RETRY_QUESTION.to_string())
        );
    }

    #[test]
    fn test_interpret_reply_tolerates_loose_fields() {
        let analysis = interpret_reply(
            r#"{"transaction_type":"expense","amount":3200.0,"debit_account":"旅費交通費","credit_account":"現金","tax_type":"課税","clarification_needed":false}"#,
        );
        let Analysis::Draft(draft) = analysis else {
            panic!("expected draft, got {:?}", analysis);
        };
        assert_eq!(draft.amount, Some(3200));
        assert!(draft.tax_type.is_none());
    }

    #[tokio::test]
    async fn test_rule_based_expense() {
        let analysis = RuleBasedAnalyzer.analyze("昨日タクシー3,200円", today()).await;
        let Analysis::Draft(draft) = analysis else {
            panic!("expected draft");
        };
        assert_eq!(draft.transaction_type, TransactionKind::Expense);
        assert_eq!(draft.amount, Some(3200));
        assert_eq!(draft.debit_account, "旅費交通費");
        assert_eq!(draft.credit_account, "現金");
        assert_eq!(draft.date.as_deref(), Some("2024-03-19"));
        assert_eq!(draft.tax_type, Some(TaxCategory::Taxable10));
    }

    #[tokio::test]
    async fn test_rule_based_income() {
        let analysis = RuleBasedAnalyzer.analyze("A社から10万円振り込まれた", today()).await;
        let Analysis::Draft(draft) = analysis else {
            panic!("expected draft");
        };
        assert_eq!(draft.transaction_type, TransactionKind::Income);
        assert_eq!(draft.amount, Some(100_000));
        assert_eq!(draft.debit_account, "普通預金");
        assert_eq!(draft.credit_account, "売上高");
    }

    #[tokio::test]
    async fn test_rule_based_uses_account_tax_default() {
        let Analysis::Draft(draft) = RuleBasedAnalyzer.analyze("今月の家賃80000円", today()).await
        else {
            panic!("expected draft");
        };
        assert_eq!(draft.debit_account, "地代家賃");
        assert_eq!(draft.tax_type, Some(TaxCategory::Exempt));
    }

    #[tokio::test]
    async fn test_rule_based_asks_for_amount() {
        assert_eq!(
            RuleBasedAnalyzer.analyze("タクシーに乗った", today()).await,
            Analysis::Clarify(AMOUNT_QUESTION.to_string())
        );
        assert_eq!(
            RuleBasedAnalyzer.answer_tax_question("消費税とは？").await,
            TAX_ANSWER_UNAVAILABLE
        );
    }

    fn claude_config(api_base: String) -> ClaudeConfig {
        ClaudeConfig {
            api_base,
            ..ClaudeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_claude_analyzer_against_stub() {
        let router = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["x-api-key"], "test-key");
                assert_eq!(headers["anthropic-version"], ANTHROPIC_VERSION);
                assert!(body["messages"][0]["content"]
                    .as_str()
                    .unwrap()
                    .contains("2024-03-20"));
                Json(json!({
                    "content": [{
                        "type": "text",
                        "text": "{\"transaction_type\":\"expense\",\"date\":\"2024-03-20\",\"amount\":550,\"debit_account\":\"接待交際費\",\"credit_account\":\"現金\",\"description\":\"スタバ\",\"tax_type\":\"課税10%\",\"confidence\":0.9,\"clarification_needed\":false}"
                    }]
                }))
            }),
        );
        let base = testing::serve(router).await;
        let analyzer = ClaudeAnalyzer::new(&claude_config(base), "test-key".to_string()).unwrap();

        let Analysis::Draft(draft) = analyzer.analyze("スタバ550円", today()).await else {
            panic!("expected draft");
        };
        assert_eq!(draft.amount, Some(550));
        assert_eq!(draft.debit_account, "接待交際費");
    }

    #[tokio::test]
    async fn test_claude_analyzer_error_asks_again() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = testing::serve(router).await;
        let analyzer = ClaudeAnalyzer::new(&claude_config(base), "k".to_string()).unwrap();

        assert_eq!(
            analyzer.analyze("スタバ550円", today()).await,
            Analysis::Clarify(ERROR_QUESTION.to_string())
        );
        assert_eq!(analyzer.answer_tax_question("質問？").await, TAX_ANSWER_FAILED);
    }
}
