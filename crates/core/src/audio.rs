//! PCM audio framing utilities.
//!
//! The wire format is fixed by the spec: 16-bit little-endian PCM, mono,
//! 16 kHz. Real-time media tracks carry Opus and are decoded to this format
//! at the transport boundary (see `voice-agent-transport`).

use serde::{Deserialize, Serialize};

/// Supported PCM sample rates. The orchestration core only ever speaks
/// 16 kHz internally; other rates exist so the transport layer can describe
/// what it resampled *from*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleRate {
    Hz8000,
    #[default]
    Hz16000,
    Hz48000,
}

impl SampleRate {
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz48000 => 48000,
        }
    }
}

/// Compute normalized RMS energy of a little-endian 16-bit PCM buffer.
///
/// Returns a value in `[0.0, 1.0]`. Buffers shorter than one sample (2
/// bytes) are treated as silence.
pub fn pcm_rms(pcm: &[u8]) -> f64 {
    if pcm.len() < 2 {
        return 0.0;
    }
    let n = pcm.len() / 2;
    let mut sum_sq: f64 = 0.0;
    for chunk in pcm.chunks_exact(2).take(n) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]) as f64;
        sum_sq += sample * sample;
    }
    let mean_sq = sum_sq / n as f64;
    mean_sq.sqrt() / 32768.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_zero_rms() {
        let silence = vec![0u8; 320];
        assert_eq!(pcm_rms(&silence), 0.0);
    }

    #[test]
    fn full_scale_tone_is_near_one() {
        let mut pcm = Vec::new();
        for _ in 0..160 {
            pcm.extend_from_slice(&i16::MAX.to_le_bytes());
        }
        let rms = pcm_rms(&pcm);
        assert!(rms > 0.99 && rms <= 1.0, "rms={rms}");
    }

    #[test]
    fn odd_length_buffer_ignores_trailing_byte() {
        let mut pcm = i16::MAX.to_le_bytes().to_vec();
        pcm.push(0xFF);
        assert!(pcm_rms(&pcm) > 0.9);
    }
}
