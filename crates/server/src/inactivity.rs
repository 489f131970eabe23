//! Inactivity nudge policy (spec.md §4.9): after sustained silence with no
//! turn in flight and no TTS playing, synthesize a system turn asking if
//! the user is still there. Grounded on `streaming/server.py`'s
//! `_inactivity_monitor`; the "is anything currently busy" check is done by
//! the caller in `websocket.rs` since it needs live access to the session's
//! pipeline task and `tts_playing` flag — this module only owns the
//! silence-duration decision, which is what's worth testing in isolation.

use std::time::{Duration, Instant};

/// The literal transcript text the client sees for a synthesized
/// inactivity turn (spec.md §8 scenario 5).
pub const INACTIVITY_TRANSCRIPT: &str = "[User inactive for 30 seconds]";

/// The verbose instruction actually fed to the LLM as the turn's input.
pub const INACTIVITY_PROMPT: &str =
    "[System: The user has been silent for a while. Gently check in and ask if they're still there or need more time.]";

/// Whether the inactivity nudge should fire, given that nothing is
/// currently running for this session.
pub fn should_nudge(last_activity: Instant, already_notified: bool, threshold: Duration) -> bool {
    !already_notified && last_activity.elapsed() >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_after_threshold_when_idle() {
        let long_ago = Instant::now() - Duration::from_secs(31);
        assert!(should_nudge(long_ago, false, Duration::from_secs(30)));
    }

    #[test]
    fn does_not_fire_before_threshold() {
        let recent = Instant::now() - Duration::from_secs(5);
        assert!(!should_nudge(recent, false, Duration::from_secs(30)));
    }

    #[test]
    fn does_not_fire_twice() {
        let long_ago = Instant::now() - Duration::from_secs(31);
        assert!(!should_nudge(long_ago, true, Duration::from_secs(30)));
    }
}
