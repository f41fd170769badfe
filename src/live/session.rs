//! Realtime session lifecycle and message dispatch.
//!
//! Owns at most one bidirectional connection to the remote conversational
//! model. Lifecycle: `Idle → Connecting → Open → Closing → Idle`, with
//! `Error` reachable from `Connecting` or `Open`; every path out of `Error`
//! runs the same teardown back to `Idle`. At-most-one session is enforced by
//! guarded transitions on a shared state slot, not a lock around the whole
//! manager.

use crate::audio::capture::CpalCapture;
use crate::audio::playback::{CpalPlayback, PlaybackHandle};
use crate::audio::{AudioFrame, decode_pcm_chunk};
use crate::auth::Identity;
use crate::config::AppConfig;
use crate::error::{BridgeError, Result};
use crate::live::protocol::{self, ServerMessage};
use crate::store::{SnapshotCache, TaskRepository};
use crate::tools::ToolCallExecutor;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// User-visible message for acquisition failures, matching the product's
/// operator language.
const CONNECT_FAILED_MSG: &str = "Mikrofon veya bağlantı başlatılamadı.";
/// User-visible message for transport failures.
const TRANSPORT_FAILED_MSG: &str = "Bağlantı hatası oluştu. Lütfen tekrar deneyin.";

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Error,
}

/// Events surfaced to the frontend (console, UI).
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// Session opened; audio is flowing.
    Connected,
    /// Session torn down (user-initiated or remote close).
    Disconnected,
    /// Synthesized speech playback started/stopped.
    Speaking(bool),
    /// User-visible error condition.
    Error(String),
}

struct ActiveSession {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the (at most one) live session and mediates all its messages.
pub struct SessionManager {
    config: AppConfig,
    repo: Arc<dyn TaskRepository>,
    cache: SnapshotCache,
    identity: Option<Identity>,
    state: Arc<Mutex<SessionState>>,
    event_tx: broadcast::Sender<BridgeEvent>,
    active: Option<ActiveSession>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        config: AppConfig,
        repo: Arc<dyn TaskRepository>,
        cache: SnapshotCache,
        identity: Option<Identity>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            config,
            repo,
            cache,
            identity,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            event_tx,
            active: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.event_tx.subscribe()
    }

    /// Open a session: acquire the microphone and playback device, then
    /// connect to the remote model and start streaming.
    ///
    /// # Errors
    ///
    /// Returns an error if a session is already live, if either audio device
    /// cannot be acquired (the session is then never opened), or if the API
    /// key is missing. Transport failures after this returns are surfaced as
    /// [`BridgeEvent::Error`] followed by teardown.
    pub fn connect(&mut self) -> Result<()> {
        if self.state() != SessionState::Idle {
            return Err(BridgeError::Session("session already active".into()));
        }
        set_state(&self.state, SessionState::Connecting);

        let api_key = match self.config.api_key() {
            Ok(key) => key,
            Err(e) => {
                self.fail_connect(&e.to_string());
                return Err(e);
            }
        };

        // Acquisition failures are fatal to the connect attempt: the remote
        // session is never opened.
        let capture = match CpalCapture::new(&self.config.audio) {
            Ok(c) => c,
            Err(e) => {
                self.fail_connect(CONNECT_FAILED_MSG);
                return Err(e);
            }
        };
        let playback = match CpalPlayback::new(&self.config.audio) {
            Ok(p) => p,
            Err(e) => {
                self.fail_connect(CONNECT_FAILED_MSG);
                return Err(e);
            }
        };

        let executor = ToolCallExecutor::new(
            Arc::clone(&self.repo),
            self.cache.clone(),
            self.identity.clone(),
        );

        let url = format!("{}?key={}", self.config.live.endpoint, api_key);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_session(SessionTask {
            config: self.config.clone(),
            url,
            capture,
            playback,
            executor,
            state: Arc::clone(&self.state),
            event_tx: self.event_tx.clone(),
            cancel: cancel.clone(),
        }));

        self.active = Some(ActiveSession { cancel, task });
        Ok(())
    }

    /// Tear the session down. Idempotent: a no-op when already `Idle`.
    pub async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        if self.state() == SessionState::Idle {
            // Remote already tore it down; nothing left to stop.
            return;
        }
        set_state(&self.state, SessionState::Closing);
        active.cancel.cancel();
        if let Err(e) = active.task.await {
            warn!("session task join failed: {e}");
        }
        // run_session leaves the slot at Idle; enforce it for early aborts.
        set_state(&self.state, SessionState::Idle);
    }

    fn fail_connect(&self, message: &str) {
        set_state(&self.state, SessionState::Idle);
        let _ = self.event_tx.send(BridgeEvent::Error(message.to_owned()));
    }
}

fn lock(state: &Arc<Mutex<SessionState>>) -> std::sync::MutexGuard<'_, SessionState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn set_state(state: &Arc<Mutex<SessionState>>, next: SessionState) {
    *lock(state) = next;
}

/// Everything the background session task owns.
struct SessionTask {
    config: AppConfig,
    url: String,
    capture: CpalCapture,
    playback: CpalPlayback,
    executor: ToolCallExecutor,
    state: Arc<Mutex<SessionState>>,
    event_tx: broadcast::Sender<BridgeEvent>,
    cancel: CancellationToken,
}

/// Run one session from connect to teardown.
async fn run_session(task: SessionTask) {
    let SessionTask {
        config,
        url,
        capture,
        playback,
        executor,
        state,
        event_tx,
        cancel,
    } = task;

    let playback_handle = playback.handle();

    // Capture starts before the handshake completes; frames buffer in the
    // unbounded channel and drain once the socket resolves. Delayed, never
    // silently lost.
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<AudioFrame>();
    // Stream setup can fail inside the stage (permission denial surfaces at
    // build/play, not at device lookup); failures tear the session down.
    let (fail_tx, mut fail_rx) = mpsc::unbounded_channel::<&'static str>();
    let capture_handle = spawn_stage("capture", fail_tx.clone(), {
        let cancel = cancel.child_token();
        async move { capture.run(frame_tx, cancel).await }
    });
    let playback_task = spawn_stage("playback", fail_tx, {
        let cancel = cancel.child_token();
        async move { playback.run(cancel).await }
    });

    // Forward the speaking indicator as session events.
    let speaking_task = {
        let mut speaking_rx = playback_handle.speaking();
        let event_tx = event_tx.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    changed = speaking_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let speaking = *speaking_rx.borrow_and_update();
                        let _ = event_tx.send(BridgeEvent::Speaking(speaking));
                    }
                }
            }
        })
    };

    let teardown = |final_event: Option<BridgeEvent>| {
        cancel.cancel();
        set_state(&state, SessionState::Idle);
        if let Some(ev) = final_event {
            let _ = event_tx.send(ev);
        }
        let _ = event_tx.send(BridgeEvent::Disconnected);
    };

    let ws_stream = match tokio_tungstenite::connect_async(&url).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            error!("realtime connect failed: {e}");
            set_state(&state, SessionState::Error);
            teardown(Some(BridgeEvent::Error(TRANSPORT_FAILED_MSG.to_owned())));
            join_stages(capture_handle, playback_task, speaking_task).await;
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let setup = protocol::setup_message(&config.live);
    if let Err(e) = write.send(Message::Text(setup.to_string())).await {
        error!("setup send failed: {e}");
        set_state(&state, SessionState::Error);
        teardown(Some(BridgeEvent::Error(TRANSPORT_FAILED_MSG.to_owned())));
        join_stages(capture_handle, playback_task, speaking_task).await;
        return;
    }

    set_state(&state, SessionState::Open);
    let _ = event_tx.send(BridgeEvent::Connected);
    // Playback clock starts from zero for this session.
    playback_handle.reset();
    info!("realtime session open (model: {})", config.live.model);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                set_state(&state, SessionState::Closing);
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            // Outbound: capture frames, in capture order.
            Some(frame) = frame_rx.recv() => {
                let msg = protocol::realtime_input(&frame);
                if let Err(e) = write.send(Message::Text(msg.to_string())).await {
                    error!("frame send failed: {e}");
                    set_state(&state, SessionState::Error);
                    teardown(Some(BridgeEvent::Error(TRANSPORT_FAILED_MSG.to_owned())));
                    join_stages(capture_handle, playback_task, speaking_task).await;
                    return;
                }
            }
            // An audio stage died: the session is deaf or mute, tear it down.
            Some(msg) = fail_rx.recv() => {
                set_state(&state, SessionState::Error);
                teardown(Some(BridgeEvent::Error(msg.to_owned())));
                join_stages(capture_handle, playback_task, speaking_task).await;
                return;
            }
            // Inbound: tool calls and/or audio, both handled when present.
            inbound = read.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) =
                            handle_server_text(&text, &executor, &playback_handle, &mut write).await
                        {
                            error!("inbound dispatch failed: {e}");
                            set_state(&state, SessionState::Error);
                            teardown(Some(BridgeEvent::Error(TRANSPORT_FAILED_MSG.to_owned())));
                            join_stages(capture_handle, playback_task, speaking_task).await;
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        // Some deployments deliver JSON frames as binary.
                        if let Ok(text) = String::from_utf8(bytes)
                            && let Err(e) =
                                handle_server_text(&text, &executor, &playback_handle, &mut write).await
                        {
                            error!("inbound dispatch failed: {e}");
                            set_state(&state, SessionState::Error);
                            teardown(Some(BridgeEvent::Error(TRANSPORT_FAILED_MSG.to_owned())));
                            join_stages(capture_handle, playback_task, speaking_task).await;
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("realtime session closed by remote");
                        set_state(&state, SessionState::Closing);
                        teardown(None);
                        join_stages(capture_handle, playback_task, speaking_task).await;
                        return;
                    }
                    Some(Err(e)) => {
                        error!("realtime read error: {e}");
                        set_state(&state, SessionState::Error);
                        teardown(Some(BridgeEvent::Error(TRANSPORT_FAILED_MSG.to_owned())));
                        join_stages(capture_handle, playback_task, speaking_task).await;
                        return;
                    }
                    _ => {} // Ping/Pong handled by tungstenite.
                }
            }
        }
    }

    // User-initiated close.
    teardown(None);
    join_stages(capture_handle, playback_task, speaking_task).await;
}

/// Dispatch one inbound message: execute any tool-call batch (answered as a
/// single response message, calls in received order) and schedule any audio
/// chunk. The two paths are independent.
async fn handle_server_text<S>(
    text: &str,
    executor: &ToolCallExecutor,
    playback: &PlaybackHandle,
    write: &mut S,
) -> Result<()>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let msg: ServerMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("ignoring unparseable server message: {e}");
            return Ok(());
        }
    };

    if let Some(tool_call) = &msg.tool_call
        && !tool_call.function_calls.is_empty()
    {
        let responses = executor.execute_batch(&tool_call.function_calls).await;
        let reply = protocol::tool_response(&responses);
        write
            .send(Message::Text(reply.to_string()))
            .await
            .map_err(|e| BridgeError::Transport(format!("tool response send failed: {e}")))?;
    }

    if let Some(payload) = msg.audio_payload() {
        match decode_pcm_chunk(payload) {
            Ok(samples) => playback.enqueue(samples),
            Err(e) => warn!("dropping undecodable audio chunk: {e}"),
        }
    }

    Ok(())
}

/// Run one audio stage to completion, reporting a failure as a user-visible
/// session fault.
fn spawn_stage<F>(
    label: &'static str,
    fail_tx: mpsc::UnboundedSender<&'static str>,
    stage: F,
) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = stage.await {
            error!("{label} stage error: {e}");
            let _ = fail_tx.send(CONNECT_FAILED_MSG);
        }
    })
}

async fn join_stages(
    capture: JoinHandle<()>,
    playback: JoinHandle<()>,
    speaking: JoinHandle<()>,
) {
    let _ = tokio::join!(capture, playback, speaking);
}
