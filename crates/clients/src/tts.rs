//! Streaming TTS client: splits text into sentences and synthesizes
//! sentence-by-sentence for minimum time-to-first-audio (spec.md §4.6).

use async_trait::async_trait;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::sync::mpsc;

use voice_agent_config::ClientsConfig;
use voice_agent_core::{CancelSignal, TtsClient};

use crate::http::OPENAI_BASE_URL;

const MIN_SENTENCE_CHARS: usize = 20;
const MAX_TTS_INPUT_CHARS: usize = 4096;

static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[.!?]|\n)\s+").expect("static pattern is valid"));

/// Split `text` into sentences for per-sentence TTS, merging trailing
/// fragments shorter than `MIN_SENTENCE_CHARS` into the previous one.
fn split_sentences(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let parts: Vec<&str> = SENTENCE_BOUNDARY.split(trimmed).collect();

    let mut merged = Vec::new();
    let mut buf = String::new();
    for part in parts {
        if !buf.is_empty() {
            buf.push(' ');
        }
        buf.push_str(part.trim());
        if buf.len() >= MIN_SENTENCE_CHARS {
            merged.push(std::mem::take(&mut buf));
        }
    }
    if !buf.is_empty() {
        if let Some(last) = merged.last_mut() {
            last.push(' ');
            last.push_str(&buf);
        } else {
            merged.push(buf);
        }
    }
    if merged.is_empty() {
        merged.push(trimmed.to_string());
    }
    merged
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

pub struct OpenAiTtsClient {
    http: reqwest::Client,
    config: ClientsConfig,
}

impl OpenAiTtsClient {
    pub fn new(http: reqwest::Client, config: ClientsConfig) -> Self {
        if !config.enabled() {
            tracing::warn!("OPENAI_API_KEY not set — TTS disabled, streams will be empty");
        }
        Self { http, config }
    }

    fn voice_for(&self, persona: &str) -> &str {
        match persona.to_lowercase().as_str() {
            "alice" => &self.config.tts_voice_alice,
            _ => &self.config.tts_voice_bob,
        }
    }

    async fn synthesize_sentence(
        &self,
        text: &str,
        voice: &str,
        cancel: &CancelSignal,
        tx: &mpsc::Sender<Vec<u8>>,
    ) -> bool {
        let Some(api_key) = self.config.openai_api_key.as_deref() else { return false };

        let truncated: String = text.chars().take(MAX_TTS_INPUT_CHARS).collect();
        let body = SpeechRequest {
            model: &self.config.tts_model,
            voice,
            input: &truncated,
            response_format: "mp3",
        };

        let response = match self
            .http
            .post(format!("{OPENAI_BASE_URL}/audio/speech"))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "TTS request failed");
                return true;
            }
            Err(err) => {
                tracing::warn!(error = %err, "TTS transport error");
                return true;
            }
        };

        let chunk_size = self.config.tts_chunk_size.max(1);
        let mut pending = Vec::with_capacity(chunk_size);
        let mut byte_stream = response.bytes_stream();

        while let Some(chunk) = byte_stream.next().await {
            if cancel.is_set() {
                return false;
            }
            let Ok(bytes) = chunk else { return true };
            pending.extend_from_slice(&bytes);
            while pending.len() >= chunk_size {
                let to_send: Vec<u8> = pending.drain(..chunk_size).collect();
                if cancel.is_set() || tx.send(to_send).await.is_err() {
                    return false;
                }
            }
        }
        if !pending.is_empty() && !cancel.is_set() {
            let _ = tx.send(pending).await;
        }
        true
    }
}

#[async_trait]
impl TtsClient for OpenAiTtsClient {
    async fn stream_chunks(&self, text: &str, persona: &str, cancel: CancelSignal, tx: mpsc::Sender<Vec<u8>>) {
        if !self.config.enabled() || text.trim().is_empty() {
            return;
        }
        let voice = self.voice_for(persona).to_string();

        for sentence in split_sentences(text) {
            if cancel.is_set() {
                return;
            }
            if !self.synthesize_sentence(&sentence, &voice, &cancel, &tx).await {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_sentence_boundaries() {
        let text = "First sentence here. Second sentence follows! Short. Final one.";
        let sentences = split_sentences(text);
        assert!(sentences.len() >= 2);
        for s in &sentences {
            assert!(s.len() >= MIN_SENTENCE_CHARS || sentences.len() == 1);
        }
    }

    #[test]
    fn merges_trailing_short_fragment() {
        let text = "This is a decently long first sentence. Ok.";
        let sentences = split_sentences(text);
        // The trailing "Ok." fragment is too short on its own and is merged.
        assert_eq!(sentences.len(), 1);
        assert!(sentences[0].contains("Ok."));
    }

    #[test]
    fn empty_text_yields_no_sentences() {
        assert!(split_sentences("   ").is_empty());
    }

    #[tokio::test]
    async fn disabled_client_streams_nothing() {
        let client = OpenAiTtsClient::new(reqwest::Client::new(), ClientsConfig::default());
        let (tx, mut rx) = mpsc::channel(8);
        client.stream_chunks("hello there friend", "bob", CancelSignal::new(), tx).await;
        assert!(rx.recv().await.is_none());
    }
}
