//! Streaming client wrappers over the external ASR/LLM/TTS/moderation
//! collaborators (spec.md §4.6). Concrete providers speak the
//! OpenAI-compatible HTTP surface (chat completions, audio transcriptions,
//! audio speech, moderations). Absent `OPENAI_API_KEY` every client
//! degrades to a no-op that announces itself disabled once at construction
//! and thereafter returns the graceful "no result" outcome for its capability.

pub mod asr;
pub mod http;
pub mod llm;
pub mod moderation;
pub mod tts;

pub use asr::OpenAiAsrClient;
pub use llm::OpenAiLlmClient;
pub use moderation::OpenAiModerationClient;
pub use tts::OpenAiTtsClient;

use std::sync::Arc;
use voice_agent_config::ClientsConfig;
use voice_agent_core::{AsrClient, LlmClient, ModerationClient, TtsClient};

/// Process-wide, stateless-over-requests client handles (spec.md §5
/// "shared resources"). Constructed once and shared via `Arc` across
/// sessions.
pub struct ClientsBundle {
    pub asr: Arc<dyn AsrClient>,
    pub llm: Arc<dyn LlmClient>,
    pub tts: Arc<dyn TtsClient>,
    pub moderation: Arc<dyn ModerationClient>,
}

impl ClientsBundle {
    pub fn from_config(config: &ClientsConfig) -> Self {
        let http = http::build_http_client();
        Self {
            asr: Arc::new(OpenAiAsrClient::new(http.clone(), config.clone())),
            llm: Arc::new(OpenAiLlmClient::new(http.clone(), config.clone())),
            tts: Arc::new(OpenAiTtsClient::new(http.clone(), config.clone())),
            moderation: Arc::new(OpenAiModerationClient::new(http, config.clone())),
        }
    }
}
