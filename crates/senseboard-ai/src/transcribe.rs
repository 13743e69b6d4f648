//! Pluggable audio → text transcription.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::provider::ProviderError;

#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub text: String,
    pub provider: String,
}

#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(&self, audio: Vec<u8>, mime: &str) -> Result<Transcription, ProviderError>;

    /// Credentials check mirroring [`crate::provider::DiagramProvider::preflight`].
    async fn preflight(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Stub transcriber for offline runs and tests: accepts the audio, returns
/// no text. The transport still exercises the full accept/reject path.
pub struct DeterministicTranscriber;

#[async_trait]
impl TranscriptionProvider for DeterministicTranscriber {
    fn name(&self) -> &str {
        "deterministic"
    }

    async fn transcribe(
        &self,
        _audio: Vec<u8>,
        _mime: &str,
    ) -> Result<Transcription, ProviderError> {
        Ok(Transcription {
            text: String::new(),
            provider: self.name().to_string(),
        })
    }
}

/// Hosted ASR through the OpenAI transcriptions endpoint.
pub struct OpenAiTranscriber {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout_ms: u64,
}

impl OpenAiTranscriber {
    pub fn new(api_key: String, model: String, timeout_ms: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: "https://api.openai.com".to_string(),
            timeout_ms,
        }
    }
}

#[async_trait]
impl TranscriptionProvider for OpenAiTranscriber {
    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(&self, audio: Vec<u8>, mime: &str) -> Result<Transcription, ProviderError> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        debug!(model = %self.model, bytes = audio.len(), "transcribing audio chunk");

        let file_name = match mime {
            "audio/wav" | "audio/x-wav" => "chunk.wav",
            "audio/mpeg" => "chunk.mp3",
            "audio/ogg" => "chunk.ogg",
            _ => "chunk.webm",
        };
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        ms: self.timeout_ms,
                    }
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "transcription API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let text = value
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(Transcription {
            text,
            provider: self.name().to_string(),
        })
    }

    async fn preflight(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::Unavailable(
                "openai api key not configured".to_string(),
            ));
        }
        Ok(())
    }
}
