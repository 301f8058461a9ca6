//! **Speech-to-text** — convert recorded audio into utterance text.
//!
//! The core treats STT failure as "no utterance": callers get an empty
//! string or an error they downgrade, never a crash.

use crate::error::{VoiceError, VoiceResult};
use std::time::Duration;

/// Backend for converting recorded audio (WAV bytes) to text.
pub trait SttBackend: Send {
    /// Transcribe one recording; return an empty string if nothing was said.
    fn transcribe(&self, wav: &[u8]) -> VoiceResult<String>;
}

/// Placeholder STT: returns a fixed string. Use for exercising the command
/// pipeline without a transcription service.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    /// If set, return this instead of an empty transcript.
    pub response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: String) -> Self {
        Self { response: Some(s) }
    }
}

impl SttBackend for PlaceholderStt {
    fn transcribe(&self, _wav: &[u8]) -> VoiceResult<String> {
        Ok(self.response.clone().unwrap_or_default())
    }
}

/// Production STT backend: OpenAI-compatible transcription API.
/// Uses `IRIS_STT_API_URL`, `IRIS_STT_API_KEY` and `IRIS_STT_MODEL`
/// (default whisper-1) with a Russian language hint.
#[derive(Debug, Clone)]
pub struct CloudStt {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Model: whisper-1, gpt-4o-transcribe, etc.
    pub model: String,
    /// ISO language hint sent with every request.
    pub language: String,
    client: reqwest::blocking::Client,
}

impl CloudStt {
    /// Build from environment: IRIS_STT_API_URL, IRIS_STT_API_KEY,
    /// IRIS_STT_MODEL, IRIS_STT_LANGUAGE.
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = std::env::var("IRIS_STT_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("IRIS_STT_API_KEY")
            .map_err(|_| VoiceError::Config("STT requires IRIS_STT_API_KEY".to_string()))?;
        let model = std::env::var("IRIS_STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        let language = std::env::var("IRIS_STT_LANGUAGE").unwrap_or_else(|_| "ru".to_string());
        Self::new(base_url, api_key, model, language)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        language: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            language: language.into(),
            client,
        })
    }
}

impl SttBackend for CloudStt {
    fn transcribe(&self, wav: &[u8]) -> VoiceResult<String> {
        if wav.is_empty() {
            return Ok(String::new());
        }
        let url = format!(
            "{}/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        );
        let part = reqwest::blocking::multipart::Part::bytes(wav.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", self.language.clone());
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {status}: {body}")));
        }
        let parsed: serde_json::Value = res.json().map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(parsed
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_returns_configured_response() {
        let stt = PlaceholderStt::with_response("ирис привет".to_string());
        assert_eq!(stt.transcribe(&[0u8; 4]).unwrap(), "ирис привет");
    }
}
