//! Wire shapes for the control channel: inbound frames from the client and
//! outbound events emitted by a session. Grounded on the teacher's
//! `server::websocket::WsMessage` enum, generalized to the frame set this
//! spec requires.

use serde::{Deserialize, Serialize};

/// Frames the client may send on the control channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Base64-encoded PCM chunk, appended to the session's audio buffer.
    AudioChunk {
        data: String,
        #[serde(default)]
        turn_id: Option<u64>,
    },
    /// Advisory end-of-audio marker. Server-side VAD is authoritative.
    EndOfAudio {
        #[serde(default)]
        turn_id: Option<u64>,
    },
    /// Manual barge-in trigger.
    BargeIn {
        #[serde(default)]
        turn_id: Option<u64>,
    },
    /// Treat as a completed utterance; bypasses ASR.
    TextInput {
        text: String,
        #[serde(default)]
        turn_id: Option<u64>,
    },
    Ping {},
    /// Client finished playing queued audio.
    TtsPlaybackDone {},
    /// Real-time media negotiation offer.
    WebrtcOffer { sdp: String },
    /// ICE candidate relay.
    IceCandidate {
        candidate: String,
        #[serde(rename = "sdpMid", default)]
        sdp_mid: Option<String>,
        #[serde(rename = "sdpMLineIndex", default)]
        sdp_mline_index: Option<u32>,
    },
}

/// Events emitted to the client. Every variant that is turn-scoped carries a
/// `turn_id` so the client can discard stale events from a cancelled turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Connected {
        session_id: String,
        agent: String,
    },
    SttProcessing {
        turn_id: u64,
    },
    FinalTranscript {
        text: String,
        turn_id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        latency_ms: Option<u64>,
    },
    LlmToken {
        token: String,
        turn_id: u64,
    },
    TtsChunk {
        audio: String,
        turn_id: u64,
    },
    TtsDone {
        turn_id: u64,
    },
    AgentChange {
        agent: String,
        from_agent: String,
        handoff_message: String,
        turn_id: u64,
    },
    CheckpointSaved {
        partial: String,
        turn_id: u64,
    },
    CheckpointRestored {
        partial: String,
        turn_id: u64,
    },
    StateUpdate {
        state: serde_json::Value,
        turn_id: u64,
    },
    BargeInAck {
        turn_id: u64,
    },
    GuardrailBlocked {
        reason: String,
        turn_id: u64,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        turn_id: Option<u64>,
    },
    Log {
        level: String,
        logger: String,
        message: String,
        ts: String,
    },
    WebrtcAnswer {
        sdp: String,
    },
    Pong {},
}

impl OutboundEvent {
    /// The `turn_id` this event is scoped to, if any. Session-level events
    /// (`connected`, `pong`, `log`, `webrtc_answer`) have no turn scope.
    pub fn turn_id(&self) -> Option<u64> {
        match self {
            OutboundEvent::SttProcessing { turn_id }
            | OutboundEvent::FinalTranscript { turn_id, .. }
            | OutboundEvent::LlmToken { turn_id, .. }
            | OutboundEvent::TtsChunk { turn_id, .. }
            | OutboundEvent::TtsDone { turn_id }
            | OutboundEvent::AgentChange { turn_id, .. }
            | OutboundEvent::CheckpointSaved { turn_id, .. }
            | OutboundEvent::CheckpointRestored { turn_id, .. }
            | OutboundEvent::StateUpdate { turn_id, .. }
            | OutboundEvent::BargeInAck { turn_id }
            | OutboundEvent::GuardrailBlocked { turn_id, .. } => Some(*turn_id),
            OutboundEvent::Error { turn_id, .. } => *turn_id,
            _ => None,
        }
    }
}
