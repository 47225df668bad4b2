//! Speech-synthesis boundary (ElevenLabs).
//!
//! Two calls: voice creation from an audio sample (multipart upload,
//! returns a voice id) and text-to-speech (returns raw audio bytes, which
//! the handler base64-encodes for the client). Fixed timeouts, no retries.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io";
const VOICE_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const TTS_TIMEOUT: Duration = Duration::from_secs(60);
const TTS_MODEL: &str = "eleven_multilingual_v2";

#[derive(Deserialize)]
struct VoiceCreated {
    voice_id: String,
}

pub struct SpeechClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SpeechClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, ELEVENLABS_API_URL)
    }

    /// Point the client at a different API host (tests).
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a voice from an audio sample. Returns the provider's voice id.
    pub async fn create_voice(
        &self,
        name: &str,
        file_name: &str,
        audio: Vec<u8>,
    ) -> Result<String> {
        let sample = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("audio/wav")
            .context("invalid sample mime type")?;
        let form = reqwest::multipart::Form::new()
            .text("name", name.to_string())
            .text("description", "Cloned voice for storytelling".to_string())
            .part("files", sample);

        let response = self
            .http
            .post(format!("{}/v1/voices/add", self.base_url))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .timeout(VOICE_UPLOAD_TIMEOUT)
            .send()
            .await
            .context("failed to reach speech provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "no body".to_string());
            bail!("voice creation failed ({status}): {body}");
        }

        let created: VoiceCreated = response
            .json()
            .await
            .context("failed to parse voice creation response")?;
        Ok(created.voice_id)
    }

    /// Synthesize text with a previously created voice. Returns raw audio.
    pub async fn synthesize(&self, voice_id: &str, text: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .post(format!("{}/v1/text-to-speech/{voice_id}", self.base_url))
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": text,
                "model_id": TTS_MODEL,
                "voice_settings": {
                    "stability": 0.5,
                    "similarity_boost": 0.8,
                },
            }))
            .timeout(TTS_TIMEOUT)
            .send()
            .await
            .context("failed to reach speech provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "no body".to_string());
            bail!("speech synthesis failed ({status}): {body}");
        }

        let audio = response
            .bytes()
            .await
            .context("failed to read synthesized audio")?;
        Ok(audio.to_vec())
    }
}

// ============================================================================
// Tests
// ============================================================================
