//! Core types and traits shared by the voice agent crates.
//!
//! This crate provides foundational types used across the pipeline, clients,
//! agent and server crates:
//! - PCM audio framing
//! - Inbound/outbound wire event shapes
//! - Capability traits for streaming ASR/LLM/TTS/moderation backends
//! - A shared error type

pub mod audio;
pub mod error;
pub mod events;
pub mod traits;

pub use audio::{pcm_rms, SampleRate};
pub use error::{Error, Result};
pub use events::{InboundMessage, OutboundEvent};
pub use traits::{
    AsrClient, CancelSignal, LlmClient, Message, ModerationClient, ModerationResult, Role, TtsClient,
};
