//! Receipt reading: Google Vision text detection plus a parser that pulls
//! store, date, total, tax and payment method out of the recognised text.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use super::{check_status, http_client, ServiceError};
use crate::config::OcrConfig;
use crate::models::account::{find_account, ACCOUNTS_PAYABLE_OTHER, CASH, SUPPLIES};
use crate::models::{TaxCategory, TransactionDraft, TransactionKind};

/// Characters of the first line kept as the store name
const STORE_NAME_MAX_CHARS: usize = 50;

/// Image to text
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn extract_text(&self, image: &[u8]) -> Result<String, ServiceError>;
}

pub fn ocr_from_config(config: &OcrConfig) -> Result<Option<Arc<dyn TextRecognizer>>, ServiceError> {
    match &config.vision_api_key {
        Some(key) => Ok(Some(Arc::new(VisionClient::new(config, key.clone())?))),
        None => {
            tracing::warn!("Vision API key not configured, receipt OCR disabled");
            Ok(None)
        }
    }
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResult {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    #[serde(default)]
    error: Option<StatusMessage>,
}

#[derive(Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct StatusMessage {
    #[serde(default)]
    message: String,
}

/// Cloud Vision `images:annotate` client using an API key
pub struct VisionClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl VisionClient {
    pub fn new(config: &OcrConfig, api_key: String) -> Result<Self, ServiceError> {
        Ok(Self {
            http: http_client()?,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TextRecognizer for VisionClient {
    async fn extract_text(&self, image: &[u8]) -> Result<String, ServiceError> {
        let body = json!({
            "requests": [{
                "image": {"content": STANDARD.encode(image)},
                "features": [{"type": "TEXT_DETECTION"}]
            }]
        });
        let response = self
            .http
            .post(format!("{}/v1/images:annotate", self.api_base))
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await?;
        let response: AnnotateResponse = check_status("Vision", response).await?.json().await?;

        let Some(result) = response.responses.into_iter().next() else {
            return Ok(String::new());
        };
        if let Some(error) = result.error.filter(|e| !e.message.is_empty()) {
            return Err(ServiceError::Response {
                service: "Vision",
                message: error.message,
            });
        }
        // The first annotation holds the whole text block
        Ok(result
            .text_annotations
            .into_iter()
            .next()
            .map(|a| a.description)
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    ElectronicMoney,
    QrCode,
}

impl PaymentMethod {
    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "現金",
            PaymentMethod::CreditCard => "クレジットカード",
            PaymentMethod::ElectronicMoney => "電子マネー",
            PaymentMethod::QrCode => "QRコード",
        }
    }
}

/// Fields read from a receipt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiptData {
    pub store_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub total_amount: Option<i64>,
    pub tax_amount: Option<i64>,
    pub payment_method: Option<PaymentMethod>,
    pub raw_text: String,
}

static TOTAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"合計[:\s]*[¥￥]?\s*([0-9,]+)",
        r"計[:\s]*[¥￥]?\s*([0-9,]+)",
        r"(?i)TOTAL[:\s]*[¥￥]?\s*([0-9,]+)",
        r"お会計[:\s]*[¥￥]?\s*([0-9,]+)",
        r"お買上[:\s]*[¥￥]?\s*([0-9,]+)",
        r"小計[:\s]*[¥￥]?\s*([0-9,]+)",
        r"(?m)[¥￥]\s*([0-9,]+)\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("receipt total pattern is valid"))
    .collect()
});

static TAX_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"消費税[:\s]*[¥￥]?\s*([0-9,]+)",
        r"内税[:\s]*[¥￥]?\s*([0-9,]+)",
        r"外税[:\s]*[¥￥]?\s*([0-9,]+)",
        r"税[:\s]*[¥￥]?\s*([0-9,]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("receipt tax pattern is valid"))
    .collect()
});

static REIWA_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:R|令和)\s*(\d{1,2})\s*[./年]\s*(\d{1,2})\s*[./月]\s*(\d{1,2})")
        .expect("reiwa date pattern is valid")
});

static WESTERN_DATES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(\d{4})[/-](\d{1,2})[/-](\d{1,2})",
        r"(\d{4})年(\d{1,2})月(\d{1,2})日",
        r"(\d{2})[/-](\d{1,2})[/-](\d{1,2})",
        r"(\d{2})年(\d{1,2})月(\d{1,2})日",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("receipt date pattern is valid"))
    .collect()
});

const PAYMENT_KEYWORDS: [(PaymentMethod, &[&str]); 4] = [
    (PaymentMethod::Cash, &["現金", "cash"]),
    (PaymentMethod::CreditCard, &["クレジット", "credit", "card", "カード"]),
    (
        PaymentMethod::ElectronicMoney,
        &["電子マネー", "suica", "pasmo", "paypay", "楽天ペイ"],
    ),
    (PaymentMethod::QrCode, &["qr", "line pay", "d払い", "au pay"]),
];

const STORE_CATEGORIES: [(&str, &[&str]); 7] = [
    (
        "旅費交通費",
        &["タクシー", "jr", "電鉄", "バス", "駐車場", "コインパーキング", "ガソリン", "eneos", "出光"],
    ),
    ("接待交際費", &["レストラン", "居酒屋", "バー", "料亭", "飲食"]),
    (
        "新聞図書費",
        &["書店", "本屋", "紀伊國屋", "丸善", "ジュンク堂", "kindle"],
    ),
    (
        "消耗品費",
        &["文具", "オフィス", "amazon", "ヨドバシ", "ビックカメラ", "100均", "ダイソー"],
    ),
    ("通信費", &["ntt", "kddi", "ソフトバンク", "携帯", "インターネット"]),
    ("研修費", &["セミナー", "研修", "講座", "スクール"]),
    ("水道光熱費", &["電力", "ガス", "水道"]),
];

fn first_amount(patterns: &[Regex], text: &str) -> Option<i64> {
    patterns.iter().find_map(|re| {
        re.captures(text)
            .and_then(|caps| caps[1].replace(',', "").parse::<i64>().ok())
    })
}

fn ymd(year: i32, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?)
}

fn receipt_date(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = REIWA_DATE.captures(text) {
        // Reiwa 1 is 2019
        let year = 2018 + caps[1].parse::<i32>().ok()?;
        return ymd(year, &caps[2], &caps[3]);
    }
    WESTERN_DATES.iter().find_map(|re| {
        let caps = re.captures(text)?;
        let year = caps[1].parse::<i32>().ok()?;
        let year = if caps[1].len() == 2 { 2000 + year } else { year };
        ymd(year, &caps[2], &caps[3])
    })
}

fn payment_method(text: &str) -> Option<PaymentMethod> {
    let lower = text.to_lowercase();
    PAYMENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(method, _)| *method)
}

/// Read the fields of a receipt out of OCR text
pub fn parse_receipt(text: &str) -> ReceiptData {
    let mut receipt = ReceiptData {
        raw_text: text.to_string(),
        ..ReceiptData::default()
    };
    if text.trim().is_empty() {
        return receipt;
    }

    receipt.store_name = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(STORE_NAME_MAX_CHARS).collect());
    receipt.total_amount = first_amount(&TOTAL_PATTERNS, text);
    receipt.date = receipt_date(text);
    receipt.tax_amount = first_amount(&TAX_PATTERNS, text);
    receipt.payment_method = payment_method(text);
    receipt
}

/// Expense account suggested by the store name, 消耗品費 when nothing matches
pub fn infer_expense_category(store_name: &str) -> &'static str {
    let lower = store_name.to_lowercase();
    STORE_CATEGORIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(account, _)| *account)
        .unwrap_or(SUPPLIES)
}

/// Expense draft for a receipt; `None` when no total could be read.
pub fn receipt_to_draft(receipt: &ReceiptData, today: NaiveDate) -> Option<TransactionDraft> {
    let amount = receipt.total_amount.filter(|a| *a > 0)?;
    let store = receipt.store_name.as_deref().unwrap_or_default();
    let debit = infer_expense_category(store);
    let credit = match receipt.payment_method {
        Some(PaymentMethod::CreditCard) => ACCOUNTS_PAYABLE_OTHER,
        _ => CASH,
    };
    let description = if store.is_empty() {
        "レシート".to_string()
    } else {
        format!("{} レシート", store)
    };

    Some(TransactionDraft {
        transaction_type: TransactionKind::Expense,
        date: Some(receipt.date.unwrap_or(today).format("%Y-%m-%d").to_string()),
        amount: Some(amount),
        debit_account: debit.to_string(),
        credit_account: credit.to_string(),
        description,
        tax_type: Some(
            find_account(debit)
                .map(|a| a.tax_default)
                .unwrap_or(TaxCategory::Taxable10),
        ),
        confidence: 0.8,
        ..TransactionDraft::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;
    use axum::extract::Query;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;

    const RECEIPT: &str = "ファミリーマート 渋谷店\n2024/01/15 12:34\nおにぎり ¥150\nお茶 ¥130\n小計 ¥280\n消費税 ¥22\n合計 ¥302\nお預り 現金 ¥500\nお釣り ¥198";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_convenience_store_receipt() {
        let receipt = parse_receipt(RECEIPT);
        assert_eq!(receipt.store_name.as_deref(), Some("ファミリーマート 渋谷店"));
        assert_eq!(receipt.date, Some(date(2024, 1, 15)));
        assert_eq!(receipt.total_amount, Some(302));
        assert_eq!(receipt.tax_amount, Some(22));
        assert_eq!(receipt.payment_method, Some(PaymentMethod::Cash));
    }

    #[test]
    fn test_parse_date_variants() {
        assert_eq!(parse_receipt("店\nR6.01.15\n合計 100").date, Some(date(2024, 1, 15)));
        assert_eq!(parse_receipt("店\n令和6年3月1日").date, Some(date(2024, 3, 1)));
        assert_eq!(parse_receipt("店\n24/02/29").date, Some(date(2024, 2, 29)));
        assert_eq!(parse_receipt("店\n2023年12月31日").date, Some(date(2023, 12, 31)));
        assert_eq!(parse_receipt("店\n2023/02/30").date, None);
    }

    #[test]
    fn test_parse_total_fallbacks() {
        assert_eq!(parse_receipt("店\nTOTAL: 1,980").total_amount, Some(1980));
        assert_eq!(parse_receipt("店\nお会計 5,500").total_amount, Some(5500));
        assert_eq!(parse_receipt("店\nコーヒー\n¥ 480").total_amount, Some(480));
        assert_eq!(parse_receipt("店\nありがとうございました").total_amount, None);
    }

    #[test]
    fn test_parse_payment_methods() {
        assert_eq!(
            parse_receipt("店\nVISA CREDIT\n合計 1000").payment_method,
            Some(PaymentMethod::CreditCard)
        );
        assert_eq!(
            parse_receipt("店\nPayPay支払\n合計 1000").payment_method,
            Some(PaymentMethod::ElectronicMoney)
        );
        assert_eq!(parse_receipt("店\n合計 1000").payment_method, None);
    }

    #[test]
    fn test_empty_text() {
        let receipt = parse_receipt("  ");
        assert_eq!(receipt.store_name, None);
        assert_eq!(receipt.total_amount, None);
    }

    #[test]
    fn test_infer_expense_category() {
        assert_eq!(infer_expense_category("日本交通タクシー"), "旅費交通費");
        assert_eq!(infer_expense_category("ENEOS 新宿SS"), "旅費交通費");
        assert_eq!(infer_expense_category("居酒屋 とりあえず"), "接待交際費");
        assert_eq!(infer_expense_category("紀伊國屋書店"), "新聞図書費");
        assert_eq!(infer_expense_category("Amazon.co.jp"), "消耗品費");
        assert_eq!(infer_expense_category("東京電力"), "水道光熱費");
        assert_eq!(infer_expense_category(""), "消耗品費");
    }

    #[test]
    fn test_receipt_to_draft() {
        let today = date(2024, 1, 20);
        let draft = receipt_to_draft(&parse_receipt(RECEIPT), today).unwrap();
        assert_eq!(draft.amount, Some(302));
        assert_eq!(draft.debit_account, "消耗品費");
        assert_eq!(draft.credit_account, "現金");
        assert_eq!(draft.date.as_deref(), Some("2024-01-15"));
        assert!(draft.description.contains("ファミリーマート"));

        let card = parse_receipt("タクシー\nカード\n合計 2,400");
        let draft = receipt_to_draft(&card, today).unwrap();
        assert_eq!(draft.debit_account, "旅費交通費");
        assert_eq!(draft.credit_account, "未払金");
        assert_eq!(draft.date.as_deref(), Some("2024-01-20"));

        assert!(receipt_to_draft(&parse_receipt("店"), today).is_none());
    }

    #[tokio::test]
    async fn test_vision_client_against_stub() {
        let router = Router::new().route(
            "/v1/images:annotate",
            post(
                |Query(query): Query<HashMap<String, String>>, Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(query.get("key").map(String::as_str), Some("vision-key"));
                    assert_eq!(body["requests"][0]["image"]["content"], "aW1n");
                    Json(json!({"responses": [{"textAnnotations": [
                        {"description": "店\n合計 100"},
                        {"description": "店"}
                    ]}]}))
                },
            ),
        );
        let base = testing::serve(router).await;
        let config = OcrConfig {
            api_base: base,
            ..OcrConfig::default()
        };
        let client = VisionClient::new(&config, "vision-key".to_string()).unwrap();
        assert_eq!(client.extract_text(b"img").await.unwrap(), "店\n合計 100");
    }

    #[tokio::test]
    async fn test_vision_error_is_reported() {
        let router = Router::new().route(
            "/v1/images:annotate",
            post(|| async { Json(json!({"responses": [{"error": {"message": "bad image"}}]})) }),
        );
        let base = testing::serve(router).await;
        let config = OcrConfig {
            api_base: base,
            ..OcrConfig::default()
        };
        let client = VisionClient::new(&config, "k".to_string()).unwrap();
        assert!(matches!(
            client.extract_text(b"x").await,
            Err(ServiceError::Response { service: "Vision", .. })
        ));
    }

    #[test]
    fn test_ocr_disabled_without_key() {
        assert!(ocr_from_config(&OcrConfig::default()).unwrap().is_none());
    }
}
