//! Voice message transcription through the OpenAI Whisper API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use super::{check_status, http_client, ServiceError};
use crate::config::SpeechConfig;

/// Audio formats the transcription endpoint accepts
pub const SUPPORTED_FORMATS: [&str; 9] = [
    "m4a", "mp3", "wav", "webm", "mp4", "mpeg", "mpga", "oga", "ogg",
];

/// LINE delivers voice messages as m4a
pub const LINE_AUDIO_FORMAT: &str = "m4a";

const WHISPER_MODEL: &str = "whisper-1";

pub fn is_supported(extension: &str) -> bool {
    SUPPORTED_FORMATS
        .iter()
        .any(|f| f.eq_ignore_ascii_case(extension.trim_start_matches('.')))
}

/// Audio to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe `audio` in the given container format; an empty string
    /// means nothing intelligible was said.
    async fn transcribe(&self, audio: Vec<u8>, extension: &str) -> Result<String, ServiceError>;
}

pub fn speech_from_config(
    config: &SpeechConfig,
) -> Result<Option<Arc<dyn Transcriber>>, ServiceError> {
    match &config.openai_api_key {
        Some(key) => Ok(Some(Arc::new(WhisperClient::new(config, key.clone())?))),
        None => {
            tracing::warn!("OpenAI API key not configured, voice transcription disabled");
            Ok(None)
        }
    }
}

pub struct WhisperClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl WhisperClient {
    pub fn new(config: &SpeechConfig, api_key: String) -> Result<Self, ServiceError> {
        Ok(Self {
            http: http_client()?,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio: Vec<u8>, extension: &str) -> Result<String, ServiceError> {
        if !is_supported(extension) {
            return Err(ServiceError::Response {
                service: "Whisper",
                message: format!("unsupported audio format: {}", extension),
            });
        }

        let file = Part::bytes(audio).file_name(format!("voice.{}", extension));
        let form = Form::new()
            .text("model", WHISPER_MODEL)
            .text("language", "ja")
            .text("response_format", "text")
            .part("file", file);

        let response = self
            .http
            .post(format!("{}/v1/audio/transcriptions", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let text = check_status("Whisper", response).await?.text().await?;
        Ok(text.trim().to_string())
    }
}
