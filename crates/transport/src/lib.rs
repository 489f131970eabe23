//! Capability contract for a bidirectional real-time media track
//! (spec.md §1, §6 `webrtc_offer`/`webrtc_answer`). Everything beyond this
//! interface — SDP negotiation, ICE, jitter buffering, Opus framing — is
//! out of scope for the default build and lives behind the `webrtc`
//! feature.

use async_trait::async_trait;
use thiserror::Error;

#[cfg(feature = "webrtc")]
pub mod webrtc_track;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),
    #[error("track already closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A bidirectional PCM audio track negotiated out-of-band (e.g. via
/// `webrtc_offer`/`webrtc_answer` control frames). Inbound audio arrives
/// already resampled to 16-bit little-endian mono PCM at the session's
/// configured sample rate; outbound audio is written in the same format.
#[async_trait]
pub trait MediaTrack: Send + Sync {
    /// Negotiate the track from a client SDP offer, returning the answer.
    async fn negotiate(&self, offer_sdp: &str) -> Result<String>;

    /// Receive the next chunk of resampled, decoded PCM audio from the
    /// remote peer. Returns `None` once the track is closed.
    async fn recv_pcm(&self) -> Option<Vec<u8>>;

    /// Send a chunk of PCM audio to the remote peer.
    async fn send_pcm(&self, pcm: &[u8]) -> Result<()>;

    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unimplemented;
    #[async_trait]
    impl MediaTrack for Unimplemented {
        async fn negotiate(&self, _offer_sdp: &str) -> Result<String> {
            Err(TransportError::NegotiationFailed("no media stack compiled in".to_string()))
        }
        async fn recv_pcm(&self) -> Option<Vec<u8>> {
            None
        }
        async fn send_pcm(&self, _pcm: &[u8]) -> Result<()> {
            Err(TransportError::Closed)
        }
        async fn close(&self) {}
    }

    #[tokio::test]
    async fn default_build_exposes_the_contract_without_a_media_stack() {
        let track = Unimplemented;
        assert!(track.negotiate("v=0").await.is_err());
        assert!(track.recv_pcm().await.is_none());
    }
}
