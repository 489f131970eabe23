//! Per-connection session state: turn sequencing, the live audio buffer,
//! and the cancellation signals that let barge-in interrupt an in-flight
//! turn (spec.md §3, §4.9). Grounded on the original `Session` dataclass
//! (`streaming/session.py`) — `new_turn`/`cancel_all` map directly onto
//! that file's methods of the same name, realized here with `CancelSignal`
//! and a `JoinHandle` in place of `asyncio.Event`/`asyncio.Task`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;

use voice_agent_agent::{PipelineDeps, TurnOutcome};
use voice_agent_core::CancelSignal;
use voice_agent_pipeline::VadProcessor;

#[cfg(feature = "webrtc")]
use voice_agent_transport::MediaTrack;

pub struct Session {
    pub id: String,
    pub deps: Arc<tokio::sync::Mutex<PipelineDeps>>,
    pub vad: VadProcessor,

    pub turn_id: u64,
    pub audio_buffer: Vec<u8>,

    pub pipeline_cancel: CancelSignal,
    pub tts_cancel: CancelSignal,
    pub tts_playing: Arc<AtomicBool>,
    pub tts_deaf_until: Option<Instant>,

    pub pipeline_task: Option<JoinHandle<TurnOutcome>>,

    pub turn_start: Instant,
    pub session_start: Instant,
    pub last_activity: Instant,
    pub inactivity_notified: bool,

    #[cfg(feature = "webrtc")]
    pub webrtc_track: Option<Arc<dyn MediaTrack>>,
}

impl Session {
    pub fn new(id: impl Into<String>, starting_persona: impl Into<String>, vad: VadProcessor) -> Self {
        let now = Instant::now();
        Self {
            id: id.into(),
            deps: Arc::new(tokio::sync::Mutex::new(PipelineDeps::new(starting_persona))),
            vad,
            turn_id: 0,
            audio_buffer: Vec::new(),
            pipeline_cancel: CancelSignal::new(),
            tts_cancel: CancelSignal::new(),
            tts_playing: Arc::new(AtomicBool::new(false)),
            tts_deaf_until: None,
            pipeline_task: None,
            turn_start: now,
            session_start: now,
            last_activity: now,
            inactivity_notified: false,
            #[cfg(feature = "webrtc")]
            webrtc_track: None,
        }
    }

    /// Start a new turn: supersede any in-flight pipeline task and re-arm
    /// fresh cancellation signals for the turn about to run. The old
    /// signals stay set so a task still holding them observes cancellation
    /// cooperatively; the hard `abort()` is a backstop for one that's stuck.
    pub fn new_turn(&mut self) -> u64 {
        self.turn_id += 1;
        self.pipeline_cancel.set();
        self.tts_cancel.set();
        if let Some(task) = self.pipeline_task.take() {
            if !task.is_finished() {
                task.abort();
            }
        }
        self.pipeline_cancel = CancelSignal::new();
        self.tts_cancel = CancelSignal::new();
        self.audio_buffer.clear();
        self.tts_playing.store(false, Ordering::SeqCst);
        self.vad.reset_for_new_turn();
        self.turn_start = Instant::now();
        self.turn_id
    }

    /// Soft cancellation: signal the in-flight turn to stop so it can save
    /// its own checkpoint (P3), without force-aborting it.
    pub fn barge_in(&mut self) {
        self.pipeline_cancel.set();
        self.tts_cancel.set();
    }

    pub fn cancel_all(&mut self) {
        self.pipeline_cancel.set();
        self.tts_cancel.set();
        if let Some(task) = self.pipeline_task.take() {
            task.abort();
        }
    }

    pub fn latency_ms(&self) -> u64 {
        self.turn_start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vad() -> VadProcessor {
        VadProcessor::new(0.015, 500.0, 150.0)
    }

    #[test]
    fn new_turn_increments_id_and_resets_buffer() {
        let mut session = Session::new("s1", "bob", vad());
        session.audio_buffer = vec![1, 2, 3];
        session.tts_playing.store(true, Ordering::SeqCst);

        let turn_id = session.new_turn();

        assert_eq!(turn_id, 1);
        assert!(session.audio_buffer.is_empty());
        assert!(!session.tts_playing.load(Ordering::SeqCst));
    }

    #[test]
    fn new_turn_re_arms_cancel_signals() {
        let mut session = Session::new("s1", "bob", vad());
        let old_cancel = session.pipeline_cancel.clone();
        old_cancel.set();

        session.new_turn();

        assert!(old_cancel.is_set());
        assert!(!session.pipeline_cancel.is_set());
    }

    #[test]
    fn barge_in_sets_both_signals_without_bumping_turn_id() {
        let mut session = Session::new("s1", "bob", vad());
        session.barge_in();

        assert_eq!(session.turn_id, 0);
        assert!(session.pipeline_cancel.is_set());
        assert!(session.tts_cancel.is_set());
    }
}
