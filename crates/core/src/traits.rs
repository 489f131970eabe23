//! Capability contracts for the streaming ASR/LLM/TTS/moderation clients
//! (spec §4.6). These are the only things the orchestration core knows about
//! its upstream collaborators — concrete providers live in
//! `voice-agent-clients` and are swappable behind these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::error::Result;

/// Chat message role, mirrored 1:1 against the OpenAI-compatible chat API
/// the default clients speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// An edge-triggered, cheaply cloneable cancellation flag. Cancellation
/// checks happen immediately before every emission into the outbound queue
/// and immediately after every suspension point inside the pipeline
/// (spec §5, §9).
#[derive(Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Streaming, cancellable automatic speech recognition.
#[async_trait]
pub trait AsrClient: Send + Sync {
    /// Transcribe a complete utterance buffer. Returns `None` on near-silent
    /// audio, timeout, or upstream failure — all of which are graceful
    /// no-transcript outcomes per spec §7.
    async fn transcribe(&self, pcm: &[u8], language: &str) -> Option<String>;
}

/// Non-streaming and streaming chat completion.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Short, deterministic utility call (state extraction, title-style
    /// tasks). 8s timeout per spec §5.
    async fn complete(
        &self,
        messages: &[Message],
        model: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Option<String>;

    /// Stream response tokens to `tx`, checking `cancel` before every
    /// delta. Returns once the stream ends, is cancelled, or errors — all
    /// silently (caller observes via `tx` being dropped / no more tokens).
    async fn stream_tokens(
        &self,
        messages: &[Message],
        model: &str,
        max_tokens: u32,
        temperature: f32,
        cancel: CancelSignal,
        tx: mpsc::Sender<String>,
    );
}

/// Streaming, cancellable text-to-speech.
#[async_trait]
pub trait TtsClient: Send + Sync {
    /// Synthesize `text` in `persona`'s voice, sending audio byte chunks to
    /// `tx` as they are produced. Implementations split `text` into
    /// sentences for minimum time-to-first-audio (spec §4.6).
    async fn stream_chunks(&self, text: &str, persona: &str, cancel: CancelSignal, tx: mpsc::Sender<Vec<u8>>);
}

#[derive(Debug, Clone, Default)]
pub struct ModerationResult {
    pub ok: bool,
    pub category: Option<String>,
    pub confidence: f32,
    pub reason: Option<String>,
}

impl ModerationResult {
    pub fn allow() -> Self {
        Self { ok: true, ..Default::default() }
    }
}

/// Remote content-moderation check, 2s hard timeout, fail-open (spec §4.5,
/// §7, property P8).
#[async_trait]
pub trait ModerationClient: Send + Sync {
    async fn check(&self, text: &str) -> ModerationResult;
}

/// Not part of the public trait object set above, but re-exported so callers
/// don't need to depend on `tokio` just to spell the timeout helper.
pub async fn with_timeout<F, T>(duration: std::time::Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| crate::error::Error::Timeout(duration))
}
