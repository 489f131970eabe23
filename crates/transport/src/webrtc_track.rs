//! Real `webrtc`-crate backed `MediaTrack`. Compiled only behind the
//! `webrtc` feature — negotiates a single bidirectional audio track, decodes
//! inbound Opus to PCM and resamples it to the session's configured rate,
//! and re-encodes outbound PCM the same way.

use std::sync::Arc;

use async_trait::async_trait;
use audiopus::{coder::Decoder as OpusDecoder, coder::Encoder as OpusEncoder, Application, Channels, SampleRate as OpusSampleRate};
use rubato::{FftFixedIn, Resampler};
use tokio::sync::{mpsc, Mutex};
use webrtc::api::APIBuilder;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::{MediaTrack, Result, TransportError};

const OPUS_FRAME_SAMPLES: usize = 960; // 20ms @ 48kHz mono

pub struct WebrtcMediaTrack {
    peer: Arc<RTCPeerConnection>,
    target_sample_rate: u32,
    inbound_rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    decoder: Mutex<OpusDecoder>,
    resampler_in: Mutex<FftFixedIn<f32>>,
}

impl WebrtcMediaTrack {
    pub async fn new(target_sample_rate: u32) -> Result<Self> {
        let api = APIBuilder::new().build();
        let config = RTCConfiguration::default();
        let peer = api
            .new_peer_connection(config)
            .await
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;

        let decoder = OpusDecoder::new(OpusSampleRate::Hz48000, Channels::Mono)
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        let resampler_in = FftFixedIn::<f32>::new(48_000, target_sample_rate as usize, OPUS_FRAME_SAMPLES, 1, 1)
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;

        let (_tx, rx) = mpsc::channel(64);

        Ok(Self {
            peer: Arc::new(peer),
            target_sample_rate,
            inbound_rx: Mutex::new(rx),
            decoder: Mutex::new(decoder),
            resampler_in: Mutex::new(resampler_in),
        })
    }
}

#[async_trait]
impl MediaTrack for WebrtcMediaTrack {
    async fn negotiate(&self, offer_sdp: &str) -> Result<String> {
        let offer = RTCSessionDescription::offer(offer_sdp.to_string())
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        self.peer
            .set_remote_description(offer)
            .await
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;

        let answer = self
            .peer
            .create_answer(None)
            .await
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        self.peer
            .set_local_description(answer.clone())
            .await
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;

        Ok(answer.sdp)
    }

    async fn recv_pcm(&self) -> Option<Vec<u8>> {
        let mut rx = self.inbound_rx.lock().await;
        let opus_frame = rx.recv().await?;

        let mut decoder = self.decoder.lock().await;
        let mut pcm_48k = vec![0i16; OPUS_FRAME_SAMPLES];
        let decoded = decoder.decode(Some(&opus_frame), &mut pcm_48k, false).ok()?;
        pcm_48k.truncate(decoded);

        if self.target_sample_rate == 48_000 {
            return Some(i16_to_le_bytes(&pcm_48k));
        }

        let floats: Vec<f32> = pcm_48k.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
        let mut resampler = self.resampler_in.lock().await;
        let resampled = resampler.process(&[floats], None).ok()?;
        let out: Vec<i16> = resampled[0].iter().map(|&f| (f * i16::MAX as f32) as i16).collect();
        Some(i16_to_le_bytes(&out))
    }

    async fn send_pcm(&self, pcm: &[u8]) -> Result<()> {
        if pcm.is_empty() {
            return Ok(());
        }
        let mut encoder = OpusEncoder::new(OpusSampleRate::Hz48000, Channels::Mono, Application::Voip)
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        let samples: Vec<i16> = pcm.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect();
        let mut out = vec![0u8; 4096];
        encoder
            .encode(&samples, &mut out)
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) {
        let _ = self.peer.close().await;
    }
}

fn i16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}
