//! End-to-end property tests that exercise `run_turn` across more than one
//! turn, using fake streaming clients under the orchestrator's control.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use voice_agent_agent::orchestrator::{run_turn, PipelineDeps, TurnOutcome};
use voice_agent_agent::GuardrailFilter;
use voice_agent_clients::ClientsBundle;
use voice_agent_core::{
    AsrClient, CancelSignal, LlmClient, Message, ModerationClient, ModerationResult, OutboundEvent, TtsClient,
};

/// Streams a fixed sentence one word at a time, waiting on a barrier after
/// the first word so the test can set the cancel signal mid-stream.
struct InterruptibleLlm {
    release: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl LlmClient for InterruptibleLlm {
    async fn complete(&self, _messages: &[Message], _model: &str, _max_tokens: u32, _temperature: f32) -> Option<String> {
        Some("{}".to_string())
    }

    async fn stream_tokens(
        &self,
        _messages: &[Message],
        _model: &str,
        _max_tokens: u32,
        _temperature: f32,
        cancel: CancelSignal,
        tx: mpsc::Sender<String>,
    ) {
        if tx.send("Here's the plan so far: ".to_string()).await.is_err() {
            return;
        }
        self.release.notified().await;
        if cancel.is_set() {
            return;
        }
        let _ = tx.send("tear out the old cabinets first.".to_string()).await;
    }
}

struct SilentTts;
#[async_trait]
impl TtsClient for SilentTts {
    async fn stream_chunks(&self, text: &str, _persona: &str, _cancel: CancelSignal, tx: mpsc::Sender<Vec<u8>>) {
        if !text.is_empty() {
            let _ = tx.send(vec![1, 2, 3]).await;
        }
    }
}

struct NoAsr;
#[async_trait]
impl AsrClient for NoAsr {
    async fn transcribe(&self, _pcm: &[u8], _language: &str) -> Option<String> {
        None
    }
}

struct AllowModeration;
#[async_trait]
impl ModerationClient for AllowModeration {
    async fn check(&self, _text: &str) -> ModerationResult {
        ModerationResult::allow()
    }
}

/// P3 (barge-in preservation): the partial response saved on cancellation
/// reappears as a bracketed `[INTERRUPTED — …]` transcript entry once the
/// next turn's messages are built.
#[tokio::test]
async fn checkpoint_survives_into_next_turns_messages() {
    let release = Arc::new(tokio::sync::Notify::new());
    let clients = ClientsBundle {
        asr: Arc::new(NoAsr),
        llm: Arc::new(InterruptibleLlm { release: release.clone() }),
        tts: Arc::new(SilentTts),
        moderation: Arc::new(AllowModeration),
    };
    let guardrail = GuardrailFilter::new(true, Arc::new(AllowModeration));
    let mut deps = PipelineDeps::new("bob");
    let (tx, mut rx) = mpsc::channel(64);
    let pipeline_cancel = CancelSignal::new();

    let release_for_task = release.clone();
    let handle = tokio::spawn(async move {
        release_for_task.notified().await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    });

    let run_future = run_turn(
        &mut deps,
        &clients,
        &guardrail,
        &tx,
        pipeline_cancel.clone(),
        CancelSignal::new(),
        Arc::new(AtomicBool::new(false)),
        "what should I do first?",
        1,
        "gpt-4o-mini",
        0.7,
        25,
    );

    tokio::pin!(run_future);
    tokio::select! {
        _ = &mut run_future => panic!("turn completed before barge-in was injected"),
        _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {
            pipeline_cancel.set();
            release.notify_one();
        }
    }
    let outcome = run_future.await;
    let _ = handle.await;

    assert_eq!(outcome, TurnOutcome::Cancelled);
    assert_eq!(deps.checkpoint.as_deref(), Some("Here's the plan so far:"));

    let mut saw_checkpoint_saved = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, OutboundEvent::CheckpointSaved { .. }) {
            saw_checkpoint_saved = true;
        }
    }
    assert!(saw_checkpoint_saved);

    // Next turn: checkpoint restoration should surface the interrupted text
    // in the transcript before messages are rebuilt.
    let clients2 = ClientsBundle {
        asr: Arc::new(NoAsr),
        llm: Arc::new(EchoOnceLlm),
        tts: Arc::new(SilentTts),
        moderation: Arc::new(AllowModeration),
    };
    let (tx2, mut rx2) = mpsc::channel(64);
    let outcome2 = run_turn(
        &mut deps,
        &clients2,
        &guardrail,
        &tx2,
        CancelSignal::new(),
        CancelSignal::new(),
        Arc::new(AtomicBool::new(false)),
        "go ahead",
        2,
        "gpt-4o-mini",
        0.7,
        25,
    )
    .await;
    assert_eq!(outcome2, TurnOutcome::Completed);

    let state = deps.state.lock().await;
    assert!(state
        .transcript_tail
        .iter()
        .any(|t| t.text.contains("[INTERRUPTED — was saying: Here's the plan so far:]")));
    drop(state);

    let mut saw_restored = false;
    while let Ok(event) = rx2.try_recv() {
        if let OutboundEvent::CheckpointRestored { partial, .. } = event {
            assert_eq!(partial, "Here's the plan so far:");
            saw_restored = true;
        }
    }
    assert!(saw_restored);
}

struct EchoOnceLlm;
#[async_trait]
impl LlmClient for EchoOnceLlm {
    async fn complete(&self, _messages: &[Message], _model: &str, _max_tokens: u32, _temperature: f32) -> Option<String> {
        Some("{}".to_string())
    }
    async fn stream_tokens(
        &self,
        _messages: &[Message],
        _model: &str,
        _max_tokens: u32,
        _temperature: f32,
        _cancel: CancelSignal,
        tx: mpsc::Sender<String>,
    ) {
        let _ = tx.send("Sure, let's continue.".to_string()).await;
    }
}
