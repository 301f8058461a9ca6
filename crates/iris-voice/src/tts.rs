//! **Text-to-speech** — convert narration text into playable audio bytes.
//!
//! Implement `TtsBackend` for any OpenAI-compatible `/audio/speech` endpoint
//! or a local engine. The emotion hint maps to playback speed; backends that
//! cannot express it may ignore it.

use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Emotional register of a spoken line. Mapped to a speed multiplier for
/// backends with a speed knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Excited,
    Happy,
    Supportive,
    Tense,
    Gentle,
}

impl Emotion {
    /// Speech speed multiplier (1.0 = neutral).
    pub fn speed(self) -> f32 {
        match self {
            Emotion::Neutral => 1.0,
            Emotion::Excited => 1.15,
            Emotion::Happy => 1.1,
            Emotion::Supportive => 0.95,
            Emotion::Tense => 1.2,
            Emotion::Gentle => 0.85,
        }
    }
}

/// Backend that turns text into audio bytes (WAV/MP3). Return an empty vec
/// to skip playback.
pub trait TtsBackend: Send {
    fn synthesize(&self, text: &str, emotion: Emotion) -> VoiceResult<Vec<u8>>;
}

/// Placeholder TTS: returns empty audio so nothing plays. Use when no TTS
/// key is configured or in tests.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

impl TtsBackend for PlaceholderTts {
    fn synthesize(&self, _text: &str, _emotion: Emotion) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Production TTS backend: OpenAI-compatible speech API.
/// Uses `IRIS_TTS_API_URL` (e.g. https://api.openai.com/v1) and `IRIS_TTS_API_KEY`.
#[derive(Debug, Clone)]
pub struct CloudTts {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// TTS model: tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    /// Voice name (alloy, echo, fable, onyx, nova, shimmer, ...).
    pub voice: String,
    client: reqwest::blocking::Client,
}

impl CloudTts {
    /// Build from environment: IRIS_TTS_API_URL, IRIS_TTS_API_KEY,
    /// IRIS_TTS_MODEL, IRIS_TTS_VOICE.
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = std::env::var("IRIS_TTS_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("IRIS_TTS_API_KEY")
            .map_err(|_| VoiceError::Config("TTS requires IRIS_TTS_API_KEY".to_string()))?;
        let model = std::env::var("IRIS_TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        let voice = std::env::var("IRIS_TTS_VOICE").unwrap_or_else(|_| "shimmer".to_string());
        Self::new(base_url, api_key, model, voice)
    }

    /// Create with explicit config (e.g. for tests or non-env wiring).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            client,
        })
    }
}

impl TtsBackend for CloudTts {
    fn synthesize(&self, text: &str, emotion: Emotion) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "speed": emotion.speed(),
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {status}: {body}")));
        }
        let bytes = res.bytes().map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
