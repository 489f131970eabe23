//! Streaming ASR client: wraps raw PCM in a WAV container and transcribes
//! via the OpenAI-compatible `audio/transcriptions` endpoint.

use async_trait::async_trait;
use std::io::Cursor;
use std::time::Duration;

use voice_agent_config::ClientsConfig;
use voice_agent_core::{pcm_rms, AsrClient};

use crate::http::OPENAI_BASE_URL;

const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(15);
const SILENCE_RMS_GATE: f64 = 0.002;

pub struct OpenAiAsrClient {
    http: reqwest::Client,
    config: ClientsConfig,
}

impl OpenAiAsrClient {
    pub fn new(http: reqwest::Client, config: ClientsConfig) -> Self {
        if !config.enabled() {
            tracing::warn!("OPENAI_API_KEY not set — ASR disabled, transcribe() will return None");
        }
        Self { http, config }
    }
}

/// Wrap little-endian 16-bit mono PCM in a minimal WAV container so the
/// upstream transcription API accepts it.
fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut buf, spec)
            .expect("WAV header for fixed mono/16-bit spec never fails to construct");
        for chunk in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer.write_sample(sample).ok();
        }
        writer.finalize().ok();
    }
    buf.into_inner()
}

#[async_trait]
impl AsrClient for OpenAiAsrClient {
    async fn transcribe(&self, pcm: &[u8], language: &str) -> Option<String> {
        if !self.config.enabled() || pcm.is_empty() {
            return None;
        }

        if pcm_rms(pcm) < SILENCE_RMS_GATE {
            tracing::debug!("skipping ASR call — audio is silent");
            return None;
        }

        let wav = pcm_to_wav(pcm, self.config.stt_sample_rate);
        let form = reqwest::multipart::Form::new()
            .text("model", "whisper-1")
            .text("language", language.to_string())
            .text("response_format", "text")
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .ok()?,
            );

        let request = self
            .http
            .post(format!("{OPENAI_BASE_URL}/audio/transcriptions"))
            .bearer_auth(self.config.openai_api_key.as_deref()?)
            .multipart(form)
            .send();

        match tokio::time::timeout(TRANSCRIBE_TIMEOUT, request).await {
            Ok(Ok(resp)) if resp.status().is_success() => {
                let text = resp.text().await.ok()?;
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Ok(Ok(resp)) => {
                tracing::warn!(status = %resp.status(), "ASR request failed");
                None
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "ASR transport error");
                None
            }
            Err(_) => {
                tracing::warn!("ASR timed out after 15s");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_pcm_with_valid_wav_header() {
        let pcm = vec![0u8; 3200];
        let wav = pcm_to_wav(&pcm, 16000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }

    #[tokio::test]
    async fn disabled_client_returns_none_without_network_call() {
        let client = OpenAiAsrClient::new(reqwest::Client::new(), ClientsConfig::default());
        let loud = {
            let mut pcm = Vec::new();
            for _ in 0..1000 {
                pcm.extend_from_slice(&i16::MAX.to_le_bytes());
            }
            pcm
        };
        assert!(client.transcribe(&loud, "en").await.is_none());
    }

    #[tokio::test]
    async fn silent_audio_is_rejected_before_any_call() {
        let mut config = ClientsConfig::default();
        config.openai_api_key = Some("sk-test".to_string());
        let client = OpenAiAsrClient::new(reqwest::Client::new(), config);
        let silence = vec![0u8; 3200];
        assert!(client.transcribe(&silence, "en").await.is_none());
    }
}
