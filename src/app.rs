// Application state and orchestration logic.
//
// The central event loop that coordinates feed events from the WebSocket
// client task, user commands from the TUI, pagination results from spawned
// fetch tasks, and the fixed-period playback throttle. Maintains the active
// ingestion session and pushes UI updates to the TUI render loop.

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::commentary::line::{normalize, CommentaryLine};
use crate::commentary::session::{HistoryOutcome, IngestionSession};
use crate::config::Config;
use crate::feed;
use crate::protocol::{
    ConnectionStatus, FeedEvent, MatchSummary, PageResult, StreamMessage, UiUpdate, UserCommand,
    VoiceRequest,
};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Whether the event loop should keep running after a command.
#[derive(Debug, PartialEq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The active ingestion session plus its feed task.
///
/// The generation stamps feed events and pagination results produced for
/// this connection; events carrying any other generation are discarded,
/// which covers both a torn-down stream and a pagination response landing
/// after a match switch.
pub struct LiveSession {
    pub session: IngestionSession,
    pub summary: MatchSummary,
    pub feed_task: tokio::task::JoinHandle<()>,
    pub generation: u64,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// The complete application state.
pub struct AppState {
    pub config: Config,
    pub api: ApiClient,
    pub matches: Vec<MatchSummary>,
    pub language: String,
    pub voice_enabled: bool,
    pub live: Option<LiveSession>,
    /// Monotonically increasing counter identifying the current connection.
    /// Incremented on every connect.
    pub generation: u64,
    /// At most one history fetch is in flight at a time.
    pub page_in_flight: bool,
    /// Sender handed to spawned feed tasks.
    pub feed_tx: mpsc::Sender<FeedEvent>,
    /// Sender handed to spawned pagination tasks.
    pub page_tx: mpsc::Sender<PageResult>,
    /// Queue into the voice worker.
    pub voice_tx: mpsc::Sender<VoiceRequest>,
}

impl AppState {
    pub fn new(
        config: Config,
        feed_tx: mpsc::Sender<FeedEvent>,
        page_tx: mpsc::Sender<PageResult>,
        voice_tx: mpsc::Sender<VoiceRequest>,
    ) -> Self {
        let api = ApiClient::new(config.feed.api_base_url.clone());
        let language = config.feed.default_language.clone();
        let voice_enabled = config.voice.enabled;
        AppState {
            config,
            api,
            matches: Vec::new(),
            language,
            voice_enabled,
            live: None,
            generation: 0,
            page_in_flight: false,
            feed_tx,
            page_tx,
            voice_tx,
        }
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Run the application event loop until the TUI quits or its channel closes.
pub async fn run(
    mut feed_rx: mpsc::Receiver<FeedEvent>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    mut page_rx: mpsc::Receiver<PageResult>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    let _ = ui_tx.send(UiUpdate::Language(state.language.clone())).await;
    let _ = ui_tx.send(UiUpdate::VoiceEnabled(state.voice_enabled)).await;
    refresh_matches(&mut state, &ui_tx).await;

    let mut throttle = tokio::time::interval(state.config.playback.throttle_period());
    throttle.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            Some(event) = feed_rx.recv() => {
                handle_feed_event(&mut state, event, &ui_tx).await;
            }
            Some(result) = page_rx.recv() => {
                handle_page_result(&mut state, result, &ui_tx).await;
            }
            maybe_command = cmd_rx.recv() => {
                match maybe_command {
                    Some(command) => {
                        if handle_command(&mut state, command, &ui_tx).await == Flow::Quit {
                            break;
                        }
                    }
                    // TUI dropped its sender: shut down.
                    None => break,
                }
            }
            _ = throttle.tick() => {
                handle_tick(&mut state, &ui_tx).await;
            }
        }
    }

    disconnect(&mut state, &ui_tx).await;
    info!("app loop exiting");
    Ok(())
}

// ---------------------------------------------------------------------------
// Match list
// ---------------------------------------------------------------------------

/// Fetch the match list. On success the matches error banner clears; on
/// failure the previous list is kept and the error is surfaced.
pub async fn refresh_matches(state: &mut AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    match state.api.fetch_matches().await {
        Ok(matches) => {
            info!(count = matches.len(), "fetched match list");
            state.matches = matches.clone();
            let _ = ui_tx.send(UiUpdate::Matches(matches)).await;
        }
        Err(e) => {
            warn!("match list fetch failed: {e:#}");
            let _ = ui_tx.send(UiUpdate::MatchesError(format!("{e:#}"))).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub async fn handle_command(
    state: &mut AppState,
    command: UserCommand,
    ui_tx: &mpsc::Sender<UiUpdate>,
) -> Flow {
    match command {
        UserCommand::Quit => return Flow::Quit,
        UserCommand::RefreshMatches => refresh_matches(state, ui_tx).await,
        UserCommand::SelectMatch(index) => {
            let Some(summary) = state.matches.get(index).cloned() else {
                debug!(index, "select out of range, ignoring");
                return Flow::Continue;
            };
            connect(state, summary, ui_tx).await;
        }
        UserCommand::LoadMore => start_pagination(state).await,
        UserCommand::SetLanguage(language) => {
            if !state.config.feed.languages.contains(&language) {
                warn!(%language, "language not offered by the feed, ignoring");
                return Flow::Continue;
            }
            if state.language == language {
                return Flow::Continue;
            }
            state.language = language.clone();
            let _ = ui_tx.send(UiUpdate::Language(language)).await;
            // Guarded transition: a language change while a session is
            // connected tears the stream down and reconnects.
            if let Some(live) = state.live.as_ref() {
                let summary = live.summary.clone();
                info!(match_id = %summary.id, language = %state.language, "language changed, reconnecting");
                connect(state, summary, ui_tx).await;
            }
        }
        UserCommand::ToggleVoice => {
            state.voice_enabled = !state.voice_enabled;
            info!(enabled = state.voice_enabled, "voice toggled");
            let _ = ui_tx.send(UiUpdate::VoiceEnabled(state.voice_enabled)).await;
        }
    }
    Flow::Continue
}

/// Open a commentary connection for `summary`, tearing down any existing
/// one first. Seen-keys, pending queue, and displayed lines all live in the
/// session, so a match switch resets them by construction.
pub async fn connect(
    state: &mut AppState,
    summary: MatchSummary,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    if let Some(old) = state.live.take() {
        old.feed_task.abort();
        info!(match_id = %old.summary.id, "closed previous commentary connection");
    }

    state.generation += 1;
    state.page_in_flight = false;
    let generation = state.generation;
    let is_live = summary.is_live;

    let session = IngestionSession::new(
        summary.id.clone(),
        state.language.clone(),
        state.config.playback.pending_queue_capacity,
    );
    let url = feed::stream_url(&state.config.feed.stream_base_url, &summary.id, &state.language);
    info!(match_id = %summary.id, language = %state.language, generation, "connecting commentary stream");

    let feed_tx = state.feed_tx.clone();
    let feed_task = tokio::spawn(async move {
        if let Err(e) = feed::run(url, feed_tx, generation).await {
            error!("feed task error: {e:#}");
        }
    });

    state.live = Some(LiveSession {
        session,
        summary,
        feed_task,
        generation,
    });

    let _ = ui_tx
        .send(UiUpdate::ConnectionStatus(ConnectionStatus::Connecting))
        .await;
    let _ = ui_tx
        .send(UiUpdate::Lines {
            lines: Vec::new(),
            is_live,
        })
        .await;
}

/// Close the active connection. Idempotent.
pub async fn disconnect(state: &mut AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    if let Some(old) = state.live.take() {
        old.feed_task.abort();
        info!(match_id = %old.summary.id, "commentary connection closed");
    }
    let _ = ui_tx
        .send(UiUpdate::ConnectionStatus(ConnectionStatus::Idle))
        .await;
}

// ---------------------------------------------------------------------------
// Feed events
// ---------------------------------------------------------------------------

pub async fn handle_feed_event(
    state: &mut AppState,
    event: FeedEvent,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    let generation = match &event {
        FeedEvent::Connected { generation }
        | FeedEvent::Message { generation, .. }
        | FeedEvent::Disconnected { generation }
        | FeedEvent::Error { generation, .. } => *generation,
    };
    if state.live.as_ref().map(|l| l.generation) != Some(generation) {
        debug!(generation, "discarding feed event from a previous connection");
        return;
    }

    match event {
        FeedEvent::Connected { .. } => {
            if let Some(live) = state.live.as_mut() {
                live.session.mark_live();
            }
            let _ = ui_tx
                .send(UiUpdate::ConnectionStatus(ConnectionStatus::Live))
                .await;
        }
        FeedEvent::Message { text, .. } => {
            handle_stream_message(state, &text, ui_tx).await;
        }
        FeedEvent::Error { message, .. } => {
            warn!("commentary stream error: {message}");
            if let Some(live) = state.live.as_mut() {
                live.session.mark_error();
            }
            let _ = ui_tx.send(UiUpdate::StreamError(message)).await;
            let _ = ui_tx
                .send(UiUpdate::ConnectionStatus(ConnectionStatus::Error))
                .await;
        }
        FeedEvent::Disconnected { .. } => {
            // No automatic retry: surface "not fetching" and wait for the
            // user to reselect the match.
            if let Some(live) = state.live.as_mut() {
                live.session.mark_error();
            }
            let _ = ui_tx
                .send(UiUpdate::StreamError(
                    "commentary stream disconnected, not fetching".into(),
                ))
                .await;
            let _ = ui_tx
                .send(UiUpdate::ConnectionStatus(ConnectionStatus::Error))
                .await;
        }
    }
}

/// Parse and apply one raw stream payload. Malformed payloads are logged
/// and skipped without touching session state or the connection.
async fn handle_stream_message(
    state: &mut AppState,
    text: &str,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    let message: StreamMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("malformed stream payload, skipping: {e}");
            return;
        }
    };

    match message {
        StreamMessage::Status(status) => {
            info!(%status, "stream status");
            let _ = ui_tx.send(UiUpdate::StreamStatus(status)).await;
        }
        StreamMessage::Error(payload) => {
            // In-band error: surfaced without closing the connection.
            warn!("stream reported error: {}", payload.error);
            let _ = ui_tx.send(UiUpdate::StreamError(payload.error)).await;
        }
        StreamMessage::Commentary(payload) => {
            let voice_enabled = state.voice_enabled;
            let Some(live) = state.live.as_mut() else {
                return;
            };
            let outcome = live.session.handle_payload(&payload);
            if outcome.enqueued > 0 {
                debug!(
                    enqueued = outcome.enqueued,
                    pending = live.session.pending_len(),
                    "enqueued commentary lines"
                );
            }
            if outcome.displayed_changed {
                send_lines(live, ui_tx).await;
            }
            if let Some(text) = outcome.voice_line {
                if voice_enabled {
                    queue_voice(&state.voice_tx, text, live.session.language());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Throttle
// ---------------------------------------------------------------------------

/// One throttle tick: release at most one pending line, refresh the UI,
/// and queue a voice read when voice is enabled. A no-op when no session is
/// active or the queue is empty.
pub async fn handle_tick(state: &mut AppState, ui_tx: &mpsc::Sender<UiUpdate>) {
    let voice_enabled = state.voice_enabled;
    let Some(live) = state.live.as_mut() else {
        return;
    };
    if let Some(line) = live.session.release_next() {
        send_lines(live, ui_tx).await;
        if voice_enabled {
            queue_voice(&state.voice_tx, line.text, live.session.language());
        }
    }
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Spawn a history fetch for lines older than the oldest displayed line.
/// Suppressed while a fetch is in flight or after history is exhausted.
pub async fn start_pagination(state: &mut AppState) {
    if state.page_in_flight {
        debug!("history fetch already in flight, ignoring");
        return;
    }
    let Some(live) = state.live.as_ref() else {
        debug!("no active session, ignoring load-more");
        return;
    };
    if live.session.no_more_history() {
        debug!("history exhausted, ignoring load-more");
        return;
    }
    let Some((innings, before_ts)) = live.session.pagination_cursor() else {
        debug!("nothing displayed yet, ignoring load-more");
        return;
    };

    state.page_in_flight = true;
    let api = state.api.clone();
    let page_tx = state.page_tx.clone();
    let generation = live.generation;
    let match_id = live.summary.id.clone();
    let innings_id = innings.unwrap_or_default();
    let language = state.language.clone();
    let page_size = state.config.feed.page_size;

    tokio::spawn(async move {
        let outcome = api
            .fetch_history(&match_id, &innings_id, before_ts, &language, page_size)
            .await
            .map_err(|e| format!("{e:#}"));
        let _ = page_tx
            .send(PageResult {
                generation,
                match_id,
                innings_id,
                before_ts,
                outcome,
            })
            .await;
    });
}

/// Apply a finished history fetch. Results tagged with a generation other
/// than the active session's (the match was switched while the request was
/// in flight) are discarded without touching state.
pub async fn handle_page_result(
    state: &mut AppState,
    result: PageResult,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    state.page_in_flight = false;

    let Some(live) = state.live.as_mut() else {
        debug!("discarding pagination result with no active session");
        return;
    };
    if live.generation != result.generation || live.summary.id != result.match_id {
        debug!(
            result_match = %result.match_id,
            "discarding pagination result for a previous session"
        );
        return;
    }

    match result.outcome {
        Ok(raw_lines) => {
            if raw_lines.is_empty() {
                // No older commentary: latch exhaustion until the next connect.
                live.session.apply_history(Vec::new());
                info!("commentary history exhausted");
                let _ = ui_tx.send(UiUpdate::HistoryApplied { exhausted: true }).await;
                return;
            }
            let lines: Vec<CommentaryLine> = raw_lines
                .iter()
                .filter_map(normalize)
                .filter(|l| l.origin_ts < result.before_ts)
                .collect();
            if lines.is_empty() {
                debug!("history page had no usable lines");
                let _ = ui_tx
                    .send(UiUpdate::HistoryApplied { exhausted: false })
                    .await;
                return;
            }
            match live.session.apply_history(lines) {
                HistoryOutcome::Exhausted => {
                    let _ = ui_tx.send(UiUpdate::HistoryApplied { exhausted: true }).await;
                }
                HistoryOutcome::Appended(count) => {
                    info!(count, "applied commentary history page");
                    let _ = ui_tx
                        .send(UiUpdate::HistoryApplied { exhausted: false })
                        .await;
                    send_lines(live, ui_tx).await;
                }
            }
        }
        Err(message) => {
            // Exhaustion latch untouched so the user can retry.
            warn!("history fetch failed: {message}");
            let _ = ui_tx.send(UiUpdate::PaginationError(message)).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Push the full displayed-line snapshot to the TUI.
async fn send_lines(live: &LiveSession, ui_tx: &mpsc::Sender<UiUpdate>) {
    let _ = ui_tx
        .send(UiUpdate::Lines {
            lines: live.session.displayed().to_vec(),
            is_live: live.summary.is_live,
        })
        .await;
}

/// Queue a speech request without blocking the event loop. Voice is
/// best-effort: a full queue drops the request.
fn queue_voice(voice_tx: &mpsc::Sender<VoiceRequest>, text: String, language: &str) {
    if let Err(e) = voice_tx.try_send(VoiceRequest {
        text,
        language: language.to_string(),
    }) {
        warn!("voice queue unavailable, dropping speech request: {e}");
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
