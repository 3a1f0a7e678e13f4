// Wire types consumed from the upstream cricket backend, plus the channel
// message types that connect the feed task, the app orchestrator, the voice
// worker, and the TUI.

use serde::Deserialize;
use serde_json::Value;

use crate::commentary::line::CommentaryLine;

// ---------------------------------------------------------------------------
// Stream messages (inbound over the commentary WebSocket)
// ---------------------------------------------------------------------------

/// One logical message from the commentary stream. Each WebSocket text frame
/// carries exactly one of these; there is no partial-message buffering.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamMessage {
    /// Informational status text (e.g. "innings break"). Produces no lines.
    Status(String),
    /// A batch of ball-by-ball commentary lines.
    Commentary(CommentaryPayload),
    /// An in-band error from the backend. Surfaced to the UI without
    /// closing the stream.
    Error(StreamErrorPayload),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentaryPayload {
    pub lines: Vec<RawLine>,
    /// Scoreboard passthrough blobs. Carried for display but never parsed
    /// beyond JSON validity.
    #[serde(default)]
    pub miniscore: Option<Value>,
    #[serde(default)]
    pub match_status_info: Option<Value>,
    #[serde(default)]
    pub score: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamErrorPayload {
    pub error: String,
}

/// One commentary line as sent by the backend, before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLine {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub over_number: Option<u32>,
    #[serde(default)]
    pub ball_number: Option<u32>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub runs: Option<u32>,
    #[serde(default)]
    pub wickets: Option<u32>,
    /// ISO-8601 event time, convertible to epoch millis.
    pub timestamp: String,
    #[serde(default)]
    pub metadata: Option<RawLineMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLineMetadata {
    #[serde(default)]
    pub innings_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Match list (inbound over REST)
// ---------------------------------------------------------------------------

/// One candidate match from the upstream match-list endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub id: String,
    pub display_name: String,
    pub status: String,
    pub series_name: String,
    pub is_live: bool,
    pub team1: String,
    pub team2: String,
}

// ---------------------------------------------------------------------------
// Channel types
// ---------------------------------------------------------------------------

/// Ingestion-session lifecycle, as shown in the status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No match selected.
    Idle,
    /// Stream connection in progress.
    Connecting,
    /// Stream open and delivering messages.
    Live,
    /// Stream failed or dropped; no automatic retry.
    Error,
}

/// Events emitted by the feed task to the app orchestrator.
///
/// Every event carries the generation of the connection that produced it so
/// events from a torn-down connection can be discarded after a match switch.
#[derive(Debug, PartialEq)]
pub enum FeedEvent {
    Connected { generation: u64 },
    Message { text: String, generation: u64 },
    Disconnected { generation: u64 },
    Error { message: String, generation: u64 },
}

/// Result of a spawned commentary-history fetch, tagged with the request's
/// session generation and match/innings key so a response that lands after a
/// match switch is discarded at apply time.
#[derive(Debug)]
pub struct PageResult {
    pub generation: u64,
    pub match_id: String,
    pub innings_id: String,
    pub before_ts: i64,
    pub outcome: Result<Vec<RawLine>, String>,
}

/// One speech-synthesis request for the voice worker. The worker drains its
/// queue one request at a time, which serializes synthesis calls.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceRequest {
    pub text: String,
    pub language: String,
}

/// Commands sent from the TUI to the app orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    RefreshMatches,
    SelectMatch(usize),
    LoadMore,
    SetLanguage(String),
    ToggleVoice,
    Quit,
}

/// Updates pushed from the app orchestrator to the TUI render loop.
#[derive(Debug, Clone)]
pub enum UiUpdate {
    /// Fresh match list; clears any match-list error banner.
    Matches(Vec<MatchSummary>),
    MatchesError(String),
    /// Full displayed-line snapshot for the active session.
    Lines {
        lines: Vec<CommentaryLine>,
        is_live: bool,
    },
    ConnectionStatus(ConnectionStatus),
    /// Informational status text from the stream.
    StreamStatus(String),
    StreamError(String),
    PaginationError(String),
    /// A history page was applied; clears any pagination error banner.
    HistoryApplied { exhausted: bool },
    VoiceEnabled(bool),
    Language(String),
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
