//! Configuration management for the voice agent.
//!
//! Settings load from an optional `config/default.{toml,yaml}` file layered
//! with `VOICE_AGENT_`-prefixed environment variables, mirroring the
//! teacher's `config::Config` + `Environment` layering. Every key has a
//! typed field with a default matching the spec's stated value, but the
//! external env-var surface is namespaced under `VOICE_AGENT_<SECTION>__<FIELD>`
//! (e.g. `VOICE_AGENT_CLIENTS__LLM_MODEL`), not the bare field name — only
//! `OPENAI_API_KEY` is read unprefixed, as a widely-recognized external
//! convention, matching the teacher's own settings layering.

pub mod settings;

pub use settings::{load_settings, ClientsConfig, PipelineConfig, ServerConfig, Settings};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}
