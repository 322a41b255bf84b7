//! LINE Messaging API: webhook payloads, signature checks and outbound
//! push messages.

pub mod events;
pub mod signature;

pub use events::{Event, Message, WebhookPayload};
pub use signature::verify_signature;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{check_status, http_client, ServiceError};
use crate::accounting::format_yen;
use crate::config::{LineConfig, LINE_QUICK_REPLY_LABEL_MAX, LINE_QUICK_REPLY_MAX_ITEMS, LINE_TEXT_MAX_CHARS};
use crate::models::JournalEntry;

/// Outbound side of the conversation with a user
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn push_text(&self, user_id: &str, text: &str) -> Result<(), ServiceError>;

    /// Push a question with tappable answers
    async fn push_quick_reply(
        &self,
        user_id: &str,
        question: &str,
        options: &[String],
    ) -> Result<(), ServiceError>;

    /// Binary content (image, audio) of a received message
    async fn message_content(&self, message_id: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Text confirming a recorded entry
pub fn confirmation_text(entry: &JournalEntry) -> String {
    format!(
        "取引を登録しました。\n\n【仕訳内容】\n日付: {}\n借方: {} {}円\n貸方: {} {}円\n摘要: {}\n\n\
         間違いがあれば「取り消し」と入力してください。",
        entry.date.format("%Y-%m-%d"),
        entry.debit_account,
        format_yen(entry.debit_amount),
        entry.credit_account,
        format_yen(entry.credit_amount),
        entry.description,
    )
}

/// Periodic report as pushed to the user; `body` carries its own heading
pub fn report_text(body: &str) -> String {
    format!("📊 {}", body.trim_end())
}

pub fn reminder_text(title: &str, description: &str, due: &str) -> String {
    format!("⏰ 【リマインダー】\n\n{}\n\n{}\n\n期限: {}", title, description, due)
}

/// Quick reply items: at most 13, labels cut to 20 characters
pub fn quick_reply_items(options: &[String]) -> Vec<Value> {
    options
        .iter()
        .take(LINE_QUICK_REPLY_MAX_ITEMS)
        .map(|option| {
            let label: String = option.chars().take(LINE_QUICK_REPLY_LABEL_MAX).collect();
            json!({
                "type": "action",
                "action": {"type": "message", "label": label, "text": option}
            })
        })
        .collect()
}

fn truncate_text(text: &str) -> String {
    text.chars().take(LINE_TEXT_MAX_CHARS).collect()
}

/// Messaging API client. Without an access token, messages are only logged.
#[derive(Clone)]
pub struct LineClient {
    http: reqwest::Client,
    access_token: Option<String>,
    api_base: String,
    data_api_base: String,
}

impl LineClient {
    pub fn new(config: &LineConfig) -> Result<Self, ServiceError> {
        if config.channel_access_token.is_none() {
            tracing::warn!("LINE access token not configured, outgoing messages will only be logged");
        }
        Ok(Self {
            http: http_client()?,
            access_token: config.channel_access_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            data_api_base: config.data_api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.access_token.is_some()
    }

    async fn push(&self, user_id: &str, message: Value) -> Result<(), ServiceError> {
        let Some(token) = &self.access_token else {
            tracing::info!(user_id, message = %message, "LINE not configured, message not sent");
            return Ok(());
        };

        let response = self
            .http
            .post(format!("{}/v2/bot/message/push", self.api_base))
            .bearer_auth(token)
            .json(&json!({"to": user_id, "messages": [message]}))
            .send()
            .await?;
        check_status("LINE", response).await?;
        tracing::debug!(user_id, "Message pushed");
        Ok(())
    }
}

#[async_trait]
impl Messenger for LineClient {
    async fn push_text(&self, user_id: &str, text: &str) -> Result<(), ServiceError> {
        self.push(user_id, json!({"type": "text", "text": truncate_text(text)}))
            .await
    }

    async fn push_quick_reply(
        &self,
        user_id: &str,
        question: &str,
        options: &[String],
    ) -> Result<(), ServiceError> {
        self.push(
            user_id,
            json!({
                "type": "text",
                "text": truncate_text(question),
                "quickReply": {"items": quick_reply_items(options)}
            }),
        )
        .await
    }

    async fn message_content(&self, message_id: &str) -> Result<Vec<u8>, ServiceError> {
        let token = self
            .access_token
            .as_ref()
            .ok_or(ServiceError::NotConfigured("LINE"))?;
        let response = self
            .http
            .get(format!(
                "{}/v2/bot/message/{}/content",
                self.data_api_base, message_id
            ))
            .bearer_auth(token)
            .send()
            .await?;
        let bytes = check_status("LINE", response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
