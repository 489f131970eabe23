//! Main settings module.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Streaming-client configuration: model names, voices, thresholds, and the
/// `OPENAI_API_KEY` gate that degrades every client to a no-op when unset
/// (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientsConfig {
    /// Presence of this flag (not the key itself, which we never log) gates
    /// whether real upstream calls are attempted.
    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_llm_temperature")]
    pub llm_temperature: f32,

    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_tts_voice_bob")]
    pub tts_voice_bob: String,
    #[serde(default = "default_tts_voice_alice")]
    pub tts_voice_alice: String,
    #[serde(default = "default_tts_chunk_size")]
    pub tts_chunk_size: usize,

    #[serde(default = "default_stt_sample_rate")]
    pub stt_sample_rate: u32,

    #[serde(default = "default_guardrail_enabled")]
    pub guardrail_enabled: bool,
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_temperature() -> f32 {
    0.7
}
fn default_tts_model() -> String {
    "tts-1".to_string()
}
fn default_tts_voice_bob() -> String {
    "alloy".to_string()
}
fn default_tts_voice_alice() -> String {
    "shimmer".to_string()
}
fn default_tts_chunk_size() -> usize {
    4096
}
fn default_stt_sample_rate() -> u32 {
    16000
}
fn default_guardrail_enabled() -> bool {
    true
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            llm_model: default_llm_model(),
            llm_temperature: default_llm_temperature(),
            tts_model: default_tts_model(),
            tts_voice_bob: default_tts_voice_bob(),
            tts_voice_alice: default_tts_voice_alice(),
            tts_chunk_size: default_tts_chunk_size(),
            stt_sample_rate: default_stt_sample_rate(),
            guardrail_enabled: default_guardrail_enabled(),
        }
    }
}

impl ClientsConfig {
    pub fn enabled(&self) -> bool {
        self.openai_api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// VAD / barge-in tunables (spec.md §4.1, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_vad_speech_threshold")]
    pub vad_speech_threshold: f64,
    #[serde(default = "default_vad_silence_ms")]
    pub vad_silence_ms: f64,
    #[serde(default = "default_vad_min_speech_ms")]
    pub vad_min_speech_ms: f64,
    #[serde(default = "default_barge_in_rms_gate")]
    pub barge_in_rms_gate: f64,
    #[serde(default = "default_tts_deaf_secs")]
    pub tts_deaf_secs: f64,
    #[serde(default = "default_startup_deaf_secs")]
    pub startup_deaf_secs: f64,
    #[serde(default = "default_pre_roll_bytes")]
    pub pre_roll_bytes: usize,
    #[serde(default = "default_min_audio_bytes")]
    pub min_audio_bytes: usize,
    #[serde(default = "default_max_audio_bytes")]
    pub max_audio_bytes: usize,
    #[serde(default = "default_inactivity_secs")]
    pub inactivity_secs: f64,
}

fn default_vad_speech_threshold() -> f64 {
    0.015
}
fn default_vad_silence_ms() -> f64 {
    500.0
}
fn default_vad_min_speech_ms() -> f64 {
    150.0
}
fn default_barge_in_rms_gate() -> f64 {
    0.04
}
fn default_tts_deaf_secs() -> f64 {
    0.7
}
fn default_startup_deaf_secs() -> f64 {
    8.0
}
fn default_pre_roll_bytes() -> usize {
    9600
}
fn default_min_audio_bytes() -> usize {
    8000
}
fn default_max_audio_bytes() -> usize {
    400_000
}
fn default_inactivity_secs() -> f64 {
    30.0
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vad_speech_threshold: default_vad_speech_threshold(),
            vad_silence_ms: default_vad_silence_ms(),
            vad_min_speech_ms: default_vad_min_speech_ms(),
            barge_in_rms_gate: default_barge_in_rms_gate(),
            tts_deaf_secs: default_tts_deaf_secs(),
            startup_deaf_secs: default_startup_deaf_secs(),
            pre_roll_bytes: default_pre_roll_bytes(),
            min_audio_bytes: default_min_audio_bytes(),
            max_audio_bytes: default_max_audio_bytes(),
            inactivity_secs: default_inactivity_secs(),
        }
    }
}

/// HTTP/WebSocket server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_ws_coalesce_ms")]
    pub ws_coalesce_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_ws_coalesce_ms() -> u64 {
    25
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ws_coalesce_ms: default_ws_coalesce_ms(),
        }
    }
}

/// Top-level application settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub clients: ClientsConfig,
}

/// Load settings from an optional config file plus `VOICE_AGENT_`-prefixed
/// environment variables, falling back to built-in defaults when neither is
/// present. Keys are namespaced as `VOICE_AGENT_<SECTION>__<FIELD>` (e.g.
/// `VOICE_AGENT_CLIENTS__LLM_MODEL`), not the bare field name. `OPENAI_API_KEY`
/// is read without the `VOICE_AGENT_` prefix since it's a widely-recognized
/// external convention.
pub fn load_settings(config_path: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = config_path {
        builder = builder.add_source(File::with_name(path).required(false));
    }
    builder = builder.add_source(
        Environment::with_prefix("VOICE_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let raw = builder
        .build()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    let mut settings: Settings = raw
        .try_deserialize()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    if settings.clients.openai_api_key.is_none() {
        settings.clients.openai_api_key = std::env::var("OPENAI_API_KEY").ok();
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let s = Settings::default();
        assert_eq!(s.clients.llm_model, "gpt-4o-mini");
        assert_eq!(s.clients.tts_voice_bob, "alloy");
        assert_eq!(s.clients.tts_voice_alice, "shimmer");
        assert_eq!(s.pipeline.vad_speech_threshold, 0.015);
        assert_eq!(s.pipeline.vad_silence_ms, 500.0);
        assert_eq!(s.server.ws_coalesce_ms, 25);
        assert!(!s.clients.enabled());
    }
}
