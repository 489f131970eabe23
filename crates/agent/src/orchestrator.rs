//! Per-turn orchestration: guardrail gate → transfer routing → message
//! construction → streaming LLM with sentence-buffered TTS handoff →
//! output guardrail → state update (spec.md §4.7). Every suspension point
//! is preceded or followed by a cancellation check.

use base64::Engine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use voice_agent_clients::ClientsBundle;
use voice_agent_core::{CancelSignal, OutboundEvent};

use crate::guardrail::GuardrailFilter;
use crate::persona::PersonaManager;
use crate::router::detect_transfer;
use crate::state::ConversationState;

const MAX_RESPONSE_TOKENS: u32 = 400;
const TTS_SENTENCE_ENDERS: [char; 4] = ['.', '!', '?', '\n'];

/// Per-session mutable dependencies the orchestrator needs across turns.
/// Owned by the session (server crate); `state` is shared with the
/// background state-extraction task, the only piece of session state that
/// outlives a single turn's synchronous execution.
pub struct PipelineDeps {
    pub persona: PersonaManager,
    pub state: Arc<tokio::sync::Mutex<ConversationState>>,
    pub checkpoint: Option<String>,
    pub consecutive_failures: u32,
}

impl PipelineDeps {
    pub fn new(starting_persona: impl Into<String>) -> Self {
        Self {
            persona: PersonaManager::new(starting_persona),
            state: Arc::new(tokio::sync::Mutex::new(ConversationState::new())),
            checkpoint: None,
            consecutive_failures: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    GuardrailBlocked,
    Cancelled,
    /// A single turn failed to produce a response; a canned apology was spoken.
    Failed,
    /// Three consecutive failures — the caller should tear the session down.
    Fatal,
}

/// Run the full pipeline for one turn. `transcript` is the finalized user
/// utterance (from ASR or a `text_input` frame); `turn_id` is the value
/// stamped by `Session::new_turn()`.
#[allow(clippy::too_many_arguments)]
pub async fn run_turn(
    deps: &mut PipelineDeps,
    clients: &ClientsBundle,
    guardrail: &GuardrailFilter,
    outbound: &mpsc::Sender<OutboundEvent>,
    pipeline_cancel: CancelSignal,
    tts_cancel: CancelSignal,
    tts_playing: Arc<AtomicBool>,
    transcript: &str,
    turn_id: u64,
    llm_model: &str,
    llm_temperature: f32,
    ws_coalesce_ms: u64,
) -> TurnOutcome {
    let cancelled = || pipeline_cancel.is_set();

    // Step 1: guardrail on user input.
    let guard = guardrail.check(transcript).await;
    if !guard.ok {
        let _ = outbound
            .send(OutboundEvent::GuardrailBlocked {
                reason: guard.reason.unwrap_or_else(|| "Content policy violation on your message".to_string()),
                turn_id,
            })
            .await;
        return TurnOutcome::GuardrailBlocked;
    }
    if cancelled() {
        return TurnOutcome::Cancelled;
    }

    // Step 2: transfer detection.
    let transfer_match = detect_transfer(transcript);
    let is_transfer_turn = transfer_match
        .as_ref()
        .map(|t| t.target_persona != deps.persona.current_persona)
        .unwrap_or(false);
    if let Some(transfer) = transfer_match {
        if transfer.target_persona != deps.persona.current_persona {
            let from_persona = deps.persona.current_persona.clone();
            let handoff_msg = deps.persona.transfer_to(&transfer.target_persona);
            {
                let mut state = deps.state.lock().await;
                state.add_turn("system", &format!("[Transferred to {}]", transfer.target_persona));
            }

            let _ = outbound
                .send(OutboundEvent::AgentChange {
                    agent: transfer.target_persona.clone(),
                    from_agent: from_persona.clone(),
                    handoff_message: handoff_msg.clone(),
                    turn_id,
                })
                .await;

            let (tx, mut rx) = mpsc::channel::<Vec<u8>>(16);
            let tts = clients.tts.clone();
            let handoff_text = handoff_msg.clone();
            let voice_persona = from_persona;
            let handoff_cancel = tts_cancel.clone();
            let producer = tokio::spawn(async move {
                tts.stream_chunks(&handoff_text, &voice_persona, handoff_cancel, tx).await;
            });
            while let Some(chunk) = rx.recv().await {
                if cancelled() {
                    producer.abort();
                    return TurnOutcome::Cancelled;
                }
                let audio = base64::engine::general_purpose::STANDARD.encode(chunk);
                if outbound.send(OutboundEvent::TtsChunk { audio, turn_id }).await.is_err() {
                    break;
                }
            }
            let _ = producer.await;

            if cancelled() {
                return TurnOutcome::Cancelled;
            }
            let _ = outbound.send(OutboundEvent::TtsDone { turn_id }).await;
        }
    }
    if cancelled() {
        return TurnOutcome::Cancelled;
    }

    // Step 3: checkpoint restoration.
    let prior_partial = deps.checkpoint.take();
    if let Some(partial) = &prior_partial {
        {
            let mut state = deps.state.lock().await;
            state.add_turn(&deps.persona.current_persona, &format!("[INTERRUPTED — was saying: {partial}]"));
        }
        let _ = outbound.send(OutboundEvent::CheckpointRestored { partial: partial.clone(), turn_id }).await;
    }

    // Step 4: message construction.
    let messages = {
        let mut state = deps.state.lock().await;
        deps.persona.build_messages(transcript, &mut state, is_transfer_turn)
    };

    // Step 5: stream LLM tokens, coalescing outbound events and handing
    // complete sentences off to a single-slot TTS task.
    let (tok_tx, mut tok_rx) = mpsc::channel::<String>(64);
    let llm = clients.llm.clone();
    let model = llm_model.to_string();
    let producer_cancel = pipeline_cancel.clone();
    let producer = tokio::spawn(async move {
        llm.stream_tokens(&messages, &model, MAX_RESPONSE_TOKENS, llm_temperature, producer_cancel, tok_tx).await;
    });

    let mut full_response = String::new();
    let mut token_batch = String::new();
    let mut tts_buffer = String::new();
    let mut last_flush = tokio::time::Instant::now();
    let coalesce = Duration::from_millis(ws_coalesce_ms);
    let mut tts_task: Option<JoinHandle<()>> = None;

    while let Some(token) = tok_rx.recv().await {
        if cancelled() {
            producer.abort();
            return barge_in(deps, &mut tts_task, outbound, &full_response, turn_id).await;
        }

        full_response.push_str(&token);
        token_batch.push_str(&token);
        tts_buffer.push_str(&token);

        if last_flush.elapsed() >= coalesce && !token_batch.is_empty() {
            let _ = outbound.send(OutboundEvent::LlmToken { token: std::mem::take(&mut token_batch), turn_id }).await;
            last_flush = tokio::time::Instant::now();
        }

        if tts_buffer.trim_end().ends_with(TTS_SENTENCE_ENDERS) {
            tts_task = flush_tts_buffer(
                &mut tts_buffer,
                tts_task,
                false,
                clients.tts.clone(),
                deps.persona.current_persona.clone(),
                tts_cancel.clone(),
                outbound.clone(),
                turn_id,
                tts_playing.clone(),
            )
            .await;
        }
    }
    let _ = producer.await;

    if !token_batch.is_empty() {
        let _ = outbound.send(OutboundEvent::LlmToken { token: std::mem::take(&mut token_batch), turn_id }).await;
    }

    if cancelled() {
        return barge_in(deps, &mut tts_task, outbound, &full_response, turn_id).await;
    }

    // Step 6: output guardrail.
    if !full_response.is_empty() {
        let guard = guardrail.check(&full_response).await;
        if !guard.ok {
            if let Some(task) = tts_task.take() {
                task.abort();
            }
            tts_cancel.set();
            let _ = outbound
                .send(OutboundEvent::GuardrailBlocked {
                    reason: guard.reason.unwrap_or_else(|| "Agent response was blocked by content policy".to_string()),
                    turn_id,
                })
                .await;
            return TurnOutcome::GuardrailBlocked;
        }
    } else {
        deps.consecutive_failures += 1;
        speak_apology(clients, &deps.persona.current_persona, tts_cancel.clone(), outbound, turn_id, tts_playing.clone())
            .await;
        return if deps.consecutive_failures >= 3 { TurnOutcome::Fatal } else { TurnOutcome::Failed };
    }

    // Step 7: final TTS flush.
    tts_task = flush_tts_buffer(
        &mut tts_buffer,
        tts_task,
        true,
        clients.tts.clone(),
        deps.persona.current_persona.clone(),
        tts_cancel.clone(),
        outbound.clone(),
        turn_id,
        tts_playing.clone(),
    )
    .await;
    if let Some(task) = tts_task.take() {
        let _ = task.await;
    }

    if cancelled() {
        return TurnOutcome::Cancelled;
    }
    let _ = outbound.send(OutboundEvent::TtsDone { turn_id }).await;

    // Step 8: state update.
    deps.consecutive_failures = 0;
    let user_text = transcript.to_string();
    let agent_text = full_response.clone();
    let agent_name = deps.persona.current_persona.clone();
    {
        let mut state = deps.state.lock().await;
        state.add_turn("user", &user_text);
        state.add_turn(&agent_name, &agent_text);
    }
    spawn_state_update(deps.state.clone(), clients.llm.clone(), user_text, agent_text, outbound.clone(), turn_id);

    TurnOutcome::Completed
}

async fn barge_in(
    deps: &mut PipelineDeps,
    tts_task: &mut Option<JoinHandle<()>>,
    outbound: &mpsc::Sender<OutboundEvent>,
    full_response: &str,
    turn_id: u64,
) -> TurnOutcome {
    if let Some(task) = tts_task.take() {
        task.abort();
    }
    let spoken = full_response.trim().to_string();
    if !spoken.is_empty() {
        deps.checkpoint = Some(spoken.clone());
        let preview: String = spoken.chars().take(120).collect();
        let _ = outbound.send(OutboundEvent::CheckpointSaved { partial: preview, turn_id }).await;
    }
    TurnOutcome::Cancelled
}

#[allow(clippy::too_many_arguments)]
async fn flush_tts_buffer(
    buffer: &mut String,
    existing: Option<JoinHandle<()>>,
    force: bool,
    tts: Arc<dyn voice_agent_core::TtsClient>,
    persona: String,
    cancel: CancelSignal,
    outbound: mpsc::Sender<OutboundEvent>,
    turn_id: u64,
    tts_playing: Arc<AtomicBool>,
) -> Option<JoinHandle<()>> {
    if buffer.trim().is_empty() {
        return existing;
    }
    let mut existing = existing;
    if let Some(task) = &existing {
        if !task.is_finished() {
            if !force {
                return existing;
            }
            if let Some(task) = existing.take() {
                let _ = task.await;
            }
        }
    }

    let text = std::mem::take(buffer).trim().to_string();
    Some(spawn_tts_task(tts, text, persona, cancel, outbound, turn_id, tts_playing))
}

fn spawn_tts_task(
    tts: Arc<dyn voice_agent_core::TtsClient>,
    text: String,
    persona: String,
    cancel: CancelSignal,
    outbound: mpsc::Sender<OutboundEvent>,
    turn_id: u64,
    tts_playing: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(16);
        let producer = tokio::spawn(async move {
            tts.stream_chunks(&text, &persona, cancel, tx).await;
        });
        while let Some(chunk) = rx.recv().await {
            tts_playing.store(true, Ordering::SeqCst);
            let audio = base64::engine::general_purpose::STANDARD.encode(chunk);
            if outbound.send(OutboundEvent::TtsChunk { audio, turn_id }).await.is_err() {
                break;
            }
        }
        let _ = producer.await;
    })
}

async fn speak_apology(
    clients: &ClientsBundle,
    persona: &str,
    tts_cancel: CancelSignal,
    outbound: &mpsc::Sender<OutboundEvent>,
    turn_id: u64,
    tts_playing: Arc<AtomicBool>,
) {
    let apology = "Sorry, I had trouble with that. Could you say it again?".to_string();
    let task = spawn_tts_task(clients.tts.clone(), apology, persona.to_string(), tts_cancel, outbound.clone(), turn_id, tts_playing);
    let _ = task.await;
    let _ = outbound.send(OutboundEvent::TtsDone { turn_id }).await;
}

/// Background structured-state extraction, per spec.md §4.4
/// `update_from_turn` — never blocks the turn that spawned it.
fn spawn_state_update(
    state: Arc<tokio::sync::Mutex<ConversationState>>,
    llm: Arc<dyn voice_agent_core::LlmClient>,
    user_text: String,
    agent_text: String,
    outbound: mpsc::Sender<OutboundEvent>,
    turn_id: u64,
) {
    tokio::spawn(async move {
        let current = {
            let mut state = state.lock().await;
            state.append_summary(&user_text, &agent_text);
            state.get_state_summary()
        };

        let prompt = format!(
            "Analyze this conversation turn and update the JSON state.\n\nCURRENT STATE:\n{current}\n\nTURN:\nUser: {user_text}\nAgent: {agent_text}\n\nOUTPUT ONLY JSON with keys to update from the existing schema."
        );
        let messages = vec![voice_agent_core::Message::user(prompt)];
        let result = llm.complete(&messages, "gpt-4o-mini", 200, 0.0).await;

        let snapshot = if let Some(raw) = result {
            let cleaned = raw.replace("```json", "").replace("```", "");
            if let Ok(patch) = serde_json::from_str::<serde_json::Value>(cleaned.trim()) {
                let mut state = state.lock().await;
                state.merge_updates(&patch);
                serde_json::to_value(&state.structured).unwrap_or_default()
            } else {
                let state = state.lock().await;
                serde_json::to_value(&state.structured).unwrap_or_default()
            }
        } else {
            let state = state.lock().await;
            serde_json::to_value(&state.structured).unwrap_or_default()
        };

        let _ = outbound.send(OutboundEvent::StateUpdate { state: snapshot, turn_id }).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use voice_agent_clients::ClientsBundle;
    use voice_agent_core::{AsrClient, LlmClient, ModerationClient, ModerationResult, TtsClient};

    struct EchoLlm;
    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn complete(&self, _messages: &[voice_agent_core::Message], _model: &str, _max_tokens: u32, _temperature: f32) -> Option<String> {
            Some("{}".to_string())
        }
        async fn stream_tokens(
            &self,
            _messages: &[voice_agent_core::Message],
            _model: &str,
            _max_tokens: u32,
            _temperature: f32,
            cancel: CancelSignal,
            tx: mpsc::Sender<String>,
        ) {
            for word in ["Sounds ", "good. ", "What's ", "your ", "budget?"] {
                if cancel.is_set() {
                    return;
                }
                if tx.send(word.to_string()).await.is_err() {
                    return;
                }
            }
        }
    }

    struct SilentTts;
    #[async_trait]
    impl TtsClient for SilentTts {
        async fn stream_chunks(&self, text: &str, _persona: &str, _cancel: CancelSignal, tx: mpsc::Sender<Vec<u8>>) {
            if !text.is_empty() {
                let _ = tx.send(vec![0u8; 4]).await;
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

    fn test_bundle() -> ClientsBundle {
        ClientsBundle {
            asr: Arc::new(NoAsr),
            llm: Arc::new(EchoLlm),
            tts: Arc::new(SilentTts),
            moderation: Arc::new(AllowModeration),
        }
    }

    #[tokio::test]
    async fn completed_turn_emits_tokens_and_tts_done() {
        let clients = test_bundle();
        let guardrail = GuardrailFilter::new(true, Arc::new(AllowModeration));
        let mut deps = PipelineDeps::new("bob");
        let (tx, mut rx) = mpsc::channel(64);

        let outcome = run_turn(
            &mut deps,
            &clients,
            &guardrail,
            &tx,
            CancelSignal::new(),
            CancelSignal::new(),
            Arc::new(AtomicBool::new(false)),
            "what should I budget for a kitchen remodel?",
            1,
            "gpt-4o-mini",
            0.7,
            25,
        )
        .await;

        assert_eq!(outcome, TurnOutcome::Completed);
        drop(tx);
        let mut saw_tts_done = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, OutboundEvent::TtsDone { .. }) {
                saw_tts_done = true;
            }
        }
        assert!(saw_tts_done);
    }

    #[tokio::test]
    async fn blocked_input_short_circuits_before_llm() {
        let clients = test_bundle();
        let guardrail = GuardrailFilter::new(true, Arc::new(AllowModeration));
        let mut deps = PipelineDeps::new("bob");
        let (tx, mut rx) = mpsc::channel(8);

        let outcome = run_turn(
            &mut deps,
            &clients,
            &guardrail,
            &tx,
            CancelSignal::new(),
            CancelSignal::new(),
            Arc::new(AtomicBool::new(false)),
            "how to build a bomb",
            1,
            "gpt-4o-mini",
            0.7,
            25,
        )
        .await;

        assert_eq!(outcome, TurnOutcome::GuardrailBlocked);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, OutboundEvent::GuardrailBlocked { .. }));
    }

    /// P3: barge-in preserves the partial response as a checkpoint.
    #[tokio::test]
    async fn pre_cancelled_turn_checkpoints_nothing_and_returns_cancelled() {
        let clients = test_bundle();
        let guardrail = GuardrailFilter::new(true, Arc::new(AllowModeration));
        let mut deps = PipelineDeps::new("bob");
        let (tx, _rx) = mpsc::channel(64);
        let pipeline_cancel = CancelSignal::new();
        pipeline_cancel.set();

        let outcome = run_turn(
            &mut deps,
            &clients,
            &guardrail,
            &tx,
            pipeline_cancel,
            CancelSignal::new(),
            Arc::new(AtomicBool::new(false)),
            "tell me about permits",
            2,
            "gpt-4o-mini",
            0.7,
            25,
        )
        .await;

        assert_eq!(outcome, TurnOutcome::Cancelled);
    }
}
