//! The control-channel WebSocket handler: VAD-driven endpointing and
//! barge-in, turn dispatch into `voice_agent_agent::run_turn`, and the
//! per-connection event loop. Grounded on `streaming/server.py`'s
//! `ws_endpoint` / `_process_pcm_chunk` / `_process_audio_turn`, realized
//! the Rust way as a single task that owns its `Session` exclusively and
//! races reads, an inactivity tick, and the active turn's completion
//! inside one `tokio::select!` loop rather than sharing `Session` across
//! spawned tasks.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use axum::http::StatusCode;

use voice_agent_agent::{run_turn, GuardrailFilter, PipelineDeps, TurnOutcome};
use voice_agent_clients::ClientsBundle;
use voice_agent_core::{CancelSignal, InboundMessage, OutboundEvent};
use voice_agent_pipeline::VadState;

use crate::error::ServerError;
use crate::inactivity;
use crate::sender;
use crate::session::Session;
use crate::state::AppState;

const GREETING: &str = "Hi, I'm Bob! I help plan home renovation projects. What are you working on?";
const MAX_SESSION_ID_LEN: usize = 128;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
        return Err(ServerError::InvalidRequest("session_id must be 1-128 characters".to_string()).into());
    }
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, session_id, state)))
}

async fn handle_socket(socket: WebSocket, session_id: String, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundEvent>(256);
    let coalesce = Duration::from_millis(state.settings.server.ws_coalesce_ms);
    state.log_registry.register(session_id.clone(), outbound_tx.clone());
    let sender_task = tokio::spawn(sender::run(ws_sender, outbound_rx, coalesce));

    let vad = voice_agent_pipeline::VadProcessor::new(
        state.settings.pipeline.vad_speech_threshold,
        state.settings.pipeline.vad_silence_ms,
        state.settings.pipeline.vad_min_speech_ms,
    );
    let mut session = Session::new(session_id.clone(), "bob", vad);

    let agent_name = { session.deps.lock().await.persona.current_persona.clone() };
    let _ = outbound_tx
        .send(OutboundEvent::Connected { session_id: session_id.clone(), agent: agent_name })
        .await;
    speak_greeting(&session, &state, &outbound_tx).await;

    let mut inactivity_ticker = tokio::time::interval(Duration::from_secs(1));
    inactivity_ticker.tick().await;

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&text, &mut session, &state, &outbound_tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::warn!(session_id = %session.id, error = %err, "websocket read error");
                        break;
                    }
                    _ => {}
                }
            }
            _ = inactivity_ticker.tick() => {
                maybe_nudge_inactivity(&mut session, &state, &outbound_tx).await;
            }
            outcome = poll_pipeline_task(&mut session.pipeline_task), if session.pipeline_task.is_some() => {
                if outcome == Some(TurnOutcome::Fatal) {
                    tracing::warn!(session_id = %session.id, "tearing down session after repeated pipeline failures");
                    break;
                }
            }
            pcm = poll_webrtc(&webrtc_track_ref(&session)), if webrtc_active(&session) => {
                match pcm {
                    Some(pcm) => process_pcm_chunk(&mut session, &state, &outbound_tx, pcm).await,
                    None => clear_webrtc_track(&mut session),
                }
            }
        }
    }

    session.cancel_all();
    close_webrtc_track(&session).await;
    state.log_registry.unregister(&session_id);
    sender_task.abort();
}

async fn handle_inbound(raw: &str, session: &mut Session, state: &AppState, outbound: &mpsc::Sender<OutboundEvent>) {
    let inbound: InboundMessage = match serde_json::from_str(raw) {
        Ok(m) => m,
        Err(err) => {
            tracing::debug!(session_id = %session.id, error = %err, "ignoring malformed frame");
            return;
        }
    };

    match inbound {
        InboundMessage::Ping {} => {
            let _ = outbound.send(OutboundEvent::Pong {}).await;
        }
        InboundMessage::AudioChunk { data, .. } => match base64::engine::general_purpose::STANDARD.decode(data) {
            Ok(pcm) => {
                if !webrtc_active(session) {
                    process_pcm_chunk(session, state, outbound, pcm).await;
                }
            }
            Err(err) => tracing::debug!(session_id = %session.id, error = %err, "bad base64 audio chunk"),
        },
        InboundMessage::EndOfAudio { .. } => {
            // advisory only; server-side VAD is authoritative.
        }
        InboundMessage::BargeIn { .. } => {
            do_barge_in(session, state, outbound).await;
        }
        InboundMessage::TextInput { text, .. } => {
            let text = text.trim().to_string();
            if !text.is_empty() {
                let turn_id = session.new_turn();
                let _ = outbound
                    .send(OutboundEvent::FinalTranscript { text: text.clone(), turn_id, latency_ms: None })
                    .await;
                spawn_text_turn(session, state, outbound, text, turn_id);
            }
        }
        InboundMessage::TtsPlaybackDone {} => {
            session.tts_playing.store(false, Ordering::SeqCst);
            session.tts_deaf_until = Some(Instant::now() + Duration::from_secs_f64(state.settings.pipeline.tts_deaf_secs));
        }
        InboundMessage::WebrtcOffer { sdp } => {
            handle_webrtc_offer(session, state, outbound, sdp).await;
        }
        InboundMessage::IceCandidate { .. } => {
            tracing::debug!(session_id = %session.id, "ignoring ICE candidate; only non-trickle SDP negotiation is supported");
        }
    }
}

async fn do_barge_in(session: &mut Session, state: &AppState, outbound: &mpsc::Sender<OutboundEvent>) {
    session.barge_in();
    session.tts_playing.store(false, Ordering::SeqCst);
    session.tts_deaf_until = Some(Instant::now() + Duration::from_secs_f64(state.settings.pipeline.tts_deaf_secs));
    let _ = outbound.send(OutboundEvent::BargeInAck { turn_id: session.turn_id }).await;
}

async fn process_pcm_chunk(session: &mut Session, state: &AppState, outbound: &mpsc::Sender<OutboundEvent>, chunk: Vec<u8>) {
    session.audio_buffer.extend_from_slice(&chunk);
    let pipeline_cfg = &state.settings.pipeline;
    let result = session.vad.process_chunk(&chunk);

    if result.in_utterance {
        session.last_activity = Instant::now();
        session.inactivity_notified = false;
    }

    let deaf_elapsed = session.tts_deaf_until.map(|until| Instant::now() >= until).unwrap_or(true);
    if session.tts_playing.load(Ordering::SeqCst)
        && deaf_elapsed
        && result.rms >= pipeline_cfg.barge_in_rms_gate
        && session.vad.is_barge_in(result.rms)
    {
        tracing::info!(session_id = %session.id, rms = result.rms, "barge-in detected from live audio");
        do_barge_in(session, state, outbound).await;
        session.audio_buffer.clear();
        session.vad.reset_for_new_turn();
        return;
    }

    match result.state {
        VadState::EndOfUtterance => {
            let audio = std::mem::take(&mut session.audio_buffer);
            let turn_id = session.new_turn();
            let since_start = session.session_start.elapsed().as_secs_f64();
            if since_start < pipeline_cfg.startup_deaf_secs {
                tracing::debug!(session_id = %session.id, turn_id, "dropping end-of-utterance inside startup deaf window");
            } else if audio.len() < pipeline_cfg.min_audio_bytes {
                tracing::debug!(session_id = %session.id, turn_id, bytes = audio.len(), "utterance too short, dropping");
            } else if audio.len() > pipeline_cfg.max_audio_bytes {
                tracing::debug!(session_id = %session.id, turn_id, bytes = audio.len(), "utterance too long, dropping");
            } else {
                spawn_audio_turn(session, state, outbound, audio, turn_id);
            }
        }
        VadState::Silence if !result.in_utterance => {
            if session.audio_buffer.len() > pipeline_cfg.pre_roll_bytes {
                let excess = session.audio_buffer.len() - pipeline_cfg.pre_roll_bytes;
                session.audio_buffer.drain(..excess);
            }
        }
        _ => {}
    }
}

fn spawn_audio_turn(session: &mut Session, state: &AppState, outbound: &mpsc::Sender<OutboundEvent>, audio: Vec<u8>, turn_id: u64) {
    let deps = session.deps.clone();
    let clients = state.clients.clone();
    let guardrail = state.guardrail.clone();
    let outbound = outbound.clone();
    let pipeline_cancel = session.pipeline_cancel.clone();
    let tts_cancel = session.tts_cancel.clone();
    let tts_playing = session.tts_playing.clone();
    let model = state.settings.clients.llm_model.clone();
    let temperature = state.settings.clients.llm_temperature;
    let coalesce_ms = state.settings.server.ws_coalesce_ms;
    let asr = state.clients.asr.clone();
    let session_id = session.id.clone();

    let handle = tokio::spawn(async move {
        let transcript = asr.transcribe(&audio, "en").await.filter(|t| !t.trim().is_empty());
        let text = match transcript {
            Some(t) => t,
            None => {
                let has_checkpoint = deps.lock().await.checkpoint.is_some();
                if !has_checkpoint {
                    tracing::debug!(session_id = %session_id, turn_id, "empty transcript with no checkpoint to resume, skipping turn");
                    return TurnOutcome::Cancelled;
                }
                "[System: You were accidentally interrupted by background noise. Naturally continue your previous sentence exactly where you left off.]".to_string()
            }
        };
        run_pipeline_turn(deps, clients, guardrail, outbound, pipeline_cancel, tts_cancel, tts_playing, text, turn_id, model, temperature, coalesce_ms).await
    });
    session.pipeline_task = Some(handle);
}

fn spawn_text_turn(session: &mut Session, state: &AppState, outbound: &mpsc::Sender<OutboundEvent>, text: String, turn_id: u64) {
    let deps = session.deps.clone();
    let clients = state.clients.clone();
    let guardrail = state.guardrail.clone();
    let outbound = outbound.clone();
    let pipeline_cancel = session.pipeline_cancel.clone();
    let tts_cancel = session.tts_cancel.clone();
    let tts_playing = session.tts_playing.clone();
    let model = state.settings.clients.llm_model.clone();
    let temperature = state.settings.clients.llm_temperature;
    let coalesce_ms = state.settings.server.ws_coalesce_ms;

    let handle = tokio::spawn(run_pipeline_turn(
        deps, clients, guardrail, outbound, pipeline_cancel, tts_cancel, tts_playing, text, turn_id, model, temperature, coalesce_ms,
    ));
    session.pipeline_task = Some(handle);
}

#[allow(clippy::too_many_arguments)]
async fn run_pipeline_turn(
    deps: Arc<tokio::sync::Mutex<PipelineDeps>>,
    clients: Arc<ClientsBundle>,
    guardrail: Arc<GuardrailFilter>,
    outbound: mpsc::Sender<OutboundEvent>,
    pipeline_cancel: CancelSignal,
    tts_cancel: CancelSignal,
    tts_playing: Arc<std::sync::atomic::AtomicBool>,
    text: String,
    turn_id: u64,
    model: String,
    temperature: f32,
    coalesce_ms: u64,
) -> TurnOutcome {
    if pipeline_cancel.is_set() {
        return TurnOutcome::Cancelled;
    }
    let mut deps = deps.lock().await;
    run_turn(
        &mut deps, &clients, &guardrail, &outbound, pipeline_cancel, tts_cancel, tts_playing, &text, turn_id, &model, temperature, coalesce_ms,
    )
    .await
}

async fn poll_pipeline_task(task: &mut Option<JoinHandle<TurnOutcome>>) -> Option<TurnOutcome> {
    match task.take() {
        Some(handle) => handle.await.ok(),
        None => None,
    }
}

async fn maybe_nudge_inactivity(session: &mut Session, state: &AppState, outbound: &mpsc::Sender<OutboundEvent>) {
    let pipeline_running = session.pipeline_task.as_ref().is_some_and(|t| !t.is_finished());
    let tts_playing = session.tts_playing.load(Ordering::SeqCst);
    if pipeline_running || tts_playing {
        session.last_activity = Instant::now();
        session.inactivity_notified = false;
        return;
    }

    if session.session_start.elapsed().as_secs_f64() < state.settings.pipeline.startup_deaf_secs {
        return;
    }

    let threshold = Duration::from_secs_f64(state.settings.pipeline.inactivity_secs);
    if !inactivity::should_nudge(session.last_activity, session.inactivity_notified, threshold) {
        return;
    }

    session.inactivity_notified = true;
    let turn_id = session.new_turn();
    let _ = outbound
        .send(OutboundEvent::FinalTranscript {
            text: inactivity::INACTIVITY_TRANSCRIPT.to_string(),
            turn_id,
            latency_ms: None,
        })
        .await;
    spawn_text_turn(session, state, outbound, inactivity::INACTIVITY_PROMPT.to_string(), turn_id);
}

async fn speak_greeting(session: &Session, state: &AppState, outbound: &mpsc::Sender<OutboundEvent>) {
    let persona = { session.deps.lock().await.persona.current_persona.clone() };
    let _ = outbound.send(OutboundEvent::LlmToken { token: GREETING.to_string(), turn_id: 0 }).await;

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(16);
    let tts = state.clients.tts.clone();
    let cancel = session.tts_cancel.clone();
    let producer = tokio::spawn(async move {
        tts.stream_chunks(GREETING, &persona, cancel, tx).await;
    });
    while let Some(chunk) = rx.recv().await {
        session.tts_playing.store(true, Ordering::SeqCst);
        let audio = base64::engine::general_purpose::STANDARD.encode(chunk);
        if outbound.send(OutboundEvent::TtsChunk { audio, turn_id: 0 }).await.is_err() {
            break;
        }
    }
    let _ = producer.await;
    let _ = outbound.send(OutboundEvent::TtsDone { turn_id: 0 }).await;
}

#[cfg(feature = "webrtc")]
async fn handle_webrtc_offer(session: &mut Session, state: &AppState, outbound: &mpsc::Sender<OutboundEvent>, sdp: String) {
    use voice_agent_transport::webrtc_track::WebrtcMediaTrack;
    use voice_agent_transport::MediaTrack;

    let sample_rate = state.settings.clients.stt_sample_rate;
    let track = match WebrtcMediaTrack::new(sample_rate).await {
        Ok(t) => t,
        Err(err) => {
            tracing::warn!(session_id = %session.id, error = %err, "webrtc track setup failed");
            let _ = outbound.send(OutboundEvent::Error { message: "WebRTC negotiation failed".to_string(), turn_id: None }).await;
            return;
        }
    };

    match track.negotiate(&sdp).await {
        Ok(answer) => {
            let _ = outbound.send(OutboundEvent::WebrtcAnswer { sdp: answer }).await;
            session.webrtc_track = Some(Arc::new(track));
        }
        Err(err) => {
            tracing::warn!(session_id = %session.id, error = %err, "webrtc negotiation failed");
            let _ = outbound.send(OutboundEvent::Error { message: "WebRTC negotiation failed".to_string(), turn_id: None }).await;
        }
    }
}

#[cfg(not(feature = "webrtc"))]
async fn handle_webrtc_offer(session: &Session, _state: &AppState, outbound: &mpsc::Sender<OutboundEvent>, _sdp: String) {
    tracing::debug!(session_id = %session.id, "webrtc offer received but the webrtc feature is not enabled on this build");
    let _ = outbound.send(OutboundEvent::Error { message: "WebRTC is not enabled on this server".to_string(), turn_id: None }).await;
}

#[cfg(feature = "webrtc")]
fn webrtc_active(session: &Session) -> bool {
    session.webrtc_track.is_some()
}
#[cfg(not(feature = "webrtc"))]
fn webrtc_active(_session: &Session) -> bool {
    false
}

#[cfg(feature = "webrtc")]
fn webrtc_track_ref(session: &Session) -> Option<Arc<dyn voice_agent_transport::MediaTrack>> {
    session.webrtc_track.clone()
}
#[cfg(not(feature = "webrtc"))]
fn webrtc_track_ref(_session: &Session) -> Option<()> {
    None
}

#[cfg(feature = "webrtc")]
async fn poll_webrtc(track: &Option<Arc<dyn voice_agent_transport::MediaTrack>>) -> Option<Vec<u8>> {
    match track {
        Some(t) => t.recv_pcm().await,
        None => std::future::pending().await,
    }
}
#[cfg(not(feature = "webrtc"))]
async fn poll_webrtc(_track: &Option<()>) -> Option<Vec<u8>> {
    std::future::pending().await
}

#[cfg(feature = "webrtc")]
fn clear_webrtc_track(session: &mut Session) {
    session.webrtc_track = None;
}
#[cfg(not(feature = "webrtc"))]
fn clear_webrtc_track(_session: &mut Session) {}

#[cfg(feature = "webrtc")]
async fn close_webrtc_track(session: &Session) {
    if let Some(track) = &session.webrtc_track {
        track.close().await;
    }
}
#[cfg(not(feature = "webrtc"))]
async fn close_webrtc_track(_session: &Session) {}
