// Normalized commentary line model and raw-line normalization.

use chrono::{DateTime, NaiveDateTime};
use tracing::debug;

use crate::protocol::RawLine;

/// Classification of a ball event, used for display badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallEvent {
    Four,
    Six,
    Wicket,
    OverBreak,
    None,
}

/// One ball or informational event, normalized from a raw feed line.
///
/// The `key` is unique within a match session and is the de-duplication
/// identity. `origin_ts` is the event time embedded by the upstream feed
/// (epoch millis), used for ordering and as the pagination cursor; it is
/// distinct from arrival time at the client.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentaryLine {
    pub key: String,
    pub text: String,
    pub over_number: Option<u32>,
    pub ball_number: Option<u32>,
    pub event: BallEvent,
    pub runs: u32,
    pub is_wicket: bool,
    pub origin_ts: i64,
    pub innings_id: Option<String>,
}

/// Normalize a raw feed line into a [`CommentaryLine`].
///
/// Returns `None` (and logs at debug) when the line is unusable: empty id,
/// empty text, or a timestamp that cannot be converted to epoch millis.
/// Malformed lines are skipped without terminating the stream.
pub fn normalize(raw: &RawLine) -> Option<CommentaryLine> {
    let text = raw.text.trim();
    if raw.id.is_empty() || text.is_empty() {
        debug!(id = %raw.id, "skipping commentary line with empty id or text");
        return None;
    }

    let origin_ts = match parse_timestamp(&raw.timestamp) {
        Some(ts) => ts,
        None => {
            debug!(id = %raw.id, timestamp = %raw.timestamp, "skipping commentary line with unparseable timestamp");
            return None;
        }
    };

    let runs = raw.runs.unwrap_or(0);
    let is_wicket = raw.wickets.unwrap_or(0) > 0
        || raw
            .event_type
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case("wicket"));

    Some(CommentaryLine {
        key: raw.id.clone(),
        text: text.to_string(),
        over_number: raw.over_number,
        ball_number: raw.ball_number,
        event: classify(raw.event_type.as_deref(), runs, is_wicket),
        runs,
        is_wicket,
        origin_ts,
        innings_id: raw.metadata.as_ref().and_then(|m| m.innings_id.clone()),
    })
}

/// Convert an ISO-like timestamp to epoch millis.
///
/// Accepts RFC 3339 with offset, a bare `YYYY-MM-DDTHH:MM:SS[.fff]` treated
/// as UTC, or a plain epoch-millis integer string.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc().timestamp_millis());
    }
    raw.parse::<i64>().ok()
}

/// Derive the event classification from the feed's `event_type` string,
/// falling back to the run count and wicket flag when absent.
fn classify(event_type: Option<&str>, runs: u32, is_wicket: bool) -> BallEvent {
    if let Some(kind) = event_type {
        match kind.to_ascii_lowercase().as_str() {
            "four" => return BallEvent::Four,
            "six" => return BallEvent::Six,
            "wicket" => return BallEvent::Wicket,
            "over-break" | "over_break" => return BallEvent::OverBreak,
            _ => {}
        }
    }
    if is_wicket {
        BallEvent::Wicket
    } else if runs == 6 {
        BallEvent::Six
    } else if runs == 4 {
        BallEvent::Four
    } else {
        BallEvent::None
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
