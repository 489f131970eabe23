//! Audio pipeline: energy-based voice activity detection.
//!
//! The spec's VAD (§4.1) is a lightweight RMS classifier used both for
//! end-of-utterance endpointing and, with a caller-supplied higher gate, for
//! barge-in detection. No ML model is involved.

pub mod vad;

pub use vad::{VadProcessor, VadResult, VadState};
