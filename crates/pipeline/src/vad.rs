//! Energy-based voice activity detection.
//!
//! Classifies fixed-size 16-bit little-endian mono PCM chunks as speech or
//! silence, detects end-of-utterance, and exposes a barge-in query. Mirrors
//! the hysteresis in the source VAD: a burst of speech that never reaches
//! `min_speech_ms` is discarded as noise rather than producing
//! `END_OF_UTTERANCE`.

use std::time::Instant;

use voice_agent_core::pcm_rms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    Silence,
    Speech,
    EndOfUtterance,
}

#[derive(Debug, Clone, Copy)]
pub struct VadResult {
    pub state: VadState,
    pub rms: f64,
    pub in_utterance: bool,
    pub speech_duration_ms: f64,
    pub silence_duration_ms: f64,
}

/// Per-session VAD state. Not `Sync` by design — owned exclusively by the
/// session that drives it, as spec.md §5 requires for session-mutating
/// state.
pub struct VadProcessor {
    speech_threshold: f64,
    silence_threshold_ms: f64,
    min_speech_ms: f64,

    in_speech: bool,
    speech_start: Option<Instant>,
    silence_start: Option<Instant>,
    speech_duration_ms: f64,
    silence_duration_ms: f64,
}

impl VadProcessor {
    pub fn new(speech_threshold: f64, silence_threshold_ms: f64, min_speech_ms: f64) -> Self {
        Self {
            speech_threshold,
            silence_threshold_ms,
            min_speech_ms,
            in_speech: false,
            speech_start: None,
            silence_start: None,
            speech_duration_ms: 0.0,
            silence_duration_ms: 0.0,
        }
    }

    /// Process one PCM chunk and return the current classification.
    pub fn process_chunk(&mut self, pcm: &[u8]) -> VadResult {
        let rms = pcm_rms(pcm);
        let now = Instant::now();
        let is_speech = rms >= self.speech_threshold;

        if is_speech {
            if !self.in_speech {
                self.in_speech = true;
                self.speech_start = Some(now);
                self.silence_start = None;
                self.silence_duration_ms = 0.0;
            }
            if let Some(start) = self.speech_start {
                self.speech_duration_ms = now.duration_since(start).as_secs_f64() * 1000.0;
            }
            return VadResult {
                state: VadState::Speech,
                rms,
                in_utterance: self.in_speech,
                speech_duration_ms: self.speech_duration_ms,
                silence_duration_ms: 0.0,
            };
        }

        // Silence.
        if self.in_speech {
            if self.silence_start.is_none() {
                self.silence_start = Some(now);
            }
            if let Some(start) = self.silence_start {
                self.silence_duration_ms = now.duration_since(start).as_secs_f64() * 1000.0;
            }

            if self.silence_duration_ms >= self.silence_threshold_ms {
                if self.speech_duration_ms >= self.min_speech_ms {
                    let result = VadResult {
                        state: VadState::EndOfUtterance,
                        rms,
                        in_utterance: false,
                        speech_duration_ms: self.speech_duration_ms,
                        silence_duration_ms: self.silence_duration_ms,
                    };
                    self.reset();
                    return result;
                }
                // Too short to be real speech — discard as noise.
                self.reset();
            }
        }

        VadResult {
            state: VadState::Silence,
            rms,
            in_utterance: self.in_speech,
            speech_duration_ms: 0.0,
            silence_duration_ms: self.silence_duration_ms,
        }
    }

    /// Whether `rms` alone constitutes a barge-in candidate. Callers add a
    /// higher RMS gate and a TTS-deaf window on top of this (spec §4.1).
    pub fn is_barge_in(&self, rms: f64) -> bool {
        rms >= self.speech_threshold
    }

    fn reset(&mut self) {
        self.in_speech = false;
        self.speech_start = None;
        self.silence_start = None;
        self.speech_duration_ms = 0.0;
        self.silence_duration_ms = 0.0;
    }

    /// Public reset — call at the start of each new turn.
    pub fn reset_for_new_turn(&mut self) {
        self.reset();
    }
}

impl Default for VadProcessor {
    fn default() -> Self {
        Self::new(0.015, 500.0, 150.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(rms_fraction: f64, n_samples: usize) -> Vec<u8> {
        let amplitude = (i16::MAX as f64 * rms_fraction) as i16;
        let mut pcm = Vec::with_capacity(n_samples * 2);
        for _ in 0..n_samples {
            pcm.extend_from_slice(&amplitude.to_le_bytes());
        }
        pcm
    }

    fn silence(n_samples: usize) -> Vec<u8> {
        vec![0u8; n_samples * 2]
    }

    #[test]
    fn quiet_chunk_is_silence() {
        let mut vad = VadProcessor::default();
        let result = vad.process_chunk(&silence(160));
        assert_eq!(result.state, VadState::Silence);
        assert!(!result.in_utterance);
    }

    #[test]
    fn loud_chunk_is_speech() {
        let mut vad = VadProcessor::default();
        let result = vad.process_chunk(&tone(0.5, 160));
        assert_eq!(result.state, VadState::Speech);
        assert!(result.in_utterance);
    }

    /// P9: a burst shorter than min_speech_ms never produces END_OF_UTTERANCE.
    #[test]
    fn short_burst_never_triggers_end_of_utterance() {
        let mut vad = VadProcessor::new(0.015, 50.0, 150.0);
        // One speech chunk (short), then silence long enough to cross the
        // threshold — but total speech time is far under min_speech_ms.
        let r1 = vad.process_chunk(&tone(0.5, 160));
        assert_eq!(r1.state, VadState::Speech);
        std::thread::sleep(std::time::Duration::from_millis(60));
        let r2 = vad.process_chunk(&silence(160));
        assert_ne!(r2.state, VadState::EndOfUtterance);
    }

    #[test]
    fn sustained_speech_then_silence_ends_utterance() {
        let mut vad = VadProcessor::new(0.015, 30.0, 10.0);
        vad.process_chunk(&tone(0.5, 160));
        std::thread::sleep(std::time::Duration::from_millis(15));
        vad.process_chunk(&tone(0.5, 160));
        std::thread::sleep(std::time::Duration::from_millis(40));
        let result = vad.process_chunk(&silence(160));
        assert_eq!(result.state, VadState::EndOfUtterance);
    }

    #[test]
    fn is_barge_in_matches_speech_threshold() {
        let vad = VadProcessor::new(0.04, 500.0, 150.0);
        assert!(vad.is_barge_in(0.05));
        assert!(!vad.is_barge_in(0.01));
    }
}
