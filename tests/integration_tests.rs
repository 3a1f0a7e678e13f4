// Integration tests for stumpcast.
//
// These tests exercise the commentary pipeline end-to-end using the library
// crate's public API: raw JSON stream payloads flow through the feed-event
// handler into the ingestion session, the throttle releases lines one tick
// at a time, and pagination results are applied (or discarded) the way the
// app orchestrator does it.

use std::time::Duration;

use stumpcast::app::{self, AppState};
use stumpcast::commentary::line::normalize;
use stumpcast::commentary::session::{IngestionSession, RETENTION_CAP};
use stumpcast::config::{Config, FeedConfig, PlaybackConfig, VoiceConfig};
use stumpcast::protocol::{
    CommentaryPayload, FeedEvent, MatchSummary, PageResult, RawLine, UiUpdate, VoiceRequest,
};

use chrono::DateTime;
use tokio::sync::mpsc;

// ===========================================================================
// Test helpers
// ===========================================================================

const BASE_TS: i64 = 1_773_482_400_000;

fn test_config() -> Config {
    Config {
        feed: FeedConfig {
            api_base_url: "https://api.test".into(),
            stream_base_url: "wss://stream.test".into(),
            languages: vec!["en".into(), "hi".into()],
            default_language: "en".into(),
            page_size: 20,
        },
        playback: PlaybackConfig {
            throttle_period_secs: 6,
            pending_queue_capacity: 256,
        },
        voice: VoiceConfig {
            enabled: false,
            speech_url: String::new(),
            voice: "v".into(),
            tone: "t".into(),
            timeout_secs: 10,
        },
    }
}

struct Harness {
    state: AppState,
    ui_tx: mpsc::Sender<UiUpdate>,
    ui_rx: mpsc::Receiver<UiUpdate>,
    voice_rx: mpsc::Receiver<VoiceRequest>,
    _feed_rx: mpsc::Receiver<FeedEvent>,
    _page_rx: mpsc::Receiver<PageResult>,
}

fn harness() -> Harness {
    let (feed_tx, feed_rx) = mpsc::channel(256);
    let (page_tx, page_rx) = mpsc::channel(16);
    let (voice_tx, voice_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);
    Harness {
        state: AppState::new(test_config(), feed_tx, page_tx, voice_tx),
        ui_tx,
        ui_rx,
        voice_rx,
        _feed_rx: feed_rx,
        _page_rx: page_rx,
    }
}

fn summary(id: &str) -> MatchSummary {
    MatchSummary {
        id: id.into(),
        display_name: format!("{id}: IND vs AUS"),
        status: "In Progress".into(),
        series_name: "Test Series".into(),
        is_live: true,
        team1: "IND".into(),
        team2: "AUS".into(),
    }
}

fn iso(ts_offset_secs: i64) -> String {
    DateTime::from_timestamp_millis(BASE_TS + ts_offset_secs * 1000)
        .unwrap()
        .to_rfc3339()
}

/// Build a commentary stream message from (id, text, ts_offset_secs) tuples.
fn commentary_json(lines: &[(&str, &str, i64)]) -> String {
    let lines: Vec<serde_json::Value> = lines
        .iter()
        .map(|(id, text, off)| {
            serde_json::json!({
                "id": id,
                "text": text,
                "timestamp": iso(*off),
                "metadata": {"innings_id": "inn1"}
            })
        })
        .collect();
    serde_json::json!({"type": "commentary", "data": {"lines": lines}}).to_string()
}

fn raw_line(id: &str, text: &str, ts_offset_secs: i64) -> RawLine {
    RawLine {
        id: id.into(),
        text: text.into(),
        over_number: None,
        ball_number: None,
        event_type: None,
        runs: None,
        wickets: None,
        timestamp: iso(ts_offset_secs),
        metadata: None,
    }
}

impl Harness {
    async fn connect(&mut self, match_id: &str) {
        app::connect(&mut self.state, summary(match_id), &self.ui_tx).await;
    }

    fn generation(&self) -> u64 {
        self.state.live.as_ref().unwrap().generation
    }

    async fn deliver(&mut self, text: String) {
        let generation = self.generation();
        app::handle_feed_event(
            &mut self.state,
            FeedEvent::Message { text, generation },
            &self.ui_tx,
        )
        .await;
    }

    async fn tick(&mut self) {
        app::handle_tick(&mut self.state, &self.ui_tx).await;
    }

    fn session(&self) -> &IngestionSession {
        &self.state.live.as_ref().unwrap().session
    }

    fn displayed_keys(&self) -> Vec<String> {
        self.session()
            .displayed()
            .iter()
            .map(|l| l.key.clone())
            .collect()
    }

    fn voice_calls(&mut self) -> Vec<VoiceRequest> {
        let mut calls = Vec::new();
        while let Ok(req) = self.voice_rx.try_recv() {
            calls.push(req);
        }
        calls
    }

    fn drain_ui(&mut self) {
        while self.ui_rx.try_recv().is_ok() {}
    }
}

// ===========================================================================
// First burst
// ===========================================================================

#[tokio::test]
async fn first_burst_displays_newest_twenty() {
    let mut h = harness();
    h.state.voice_enabled = true;
    h.connect("M1").await;

    let lines: Vec<(String, String, i64)> = (0..25)
        .map(|i| (format!("b{i}"), format!("Ball {i}."), i as i64))
        .collect();
    let refs: Vec<(&str, &str, i64)> = lines
        .iter()
        .map(|(id, text, off)| (id.as_str(), text.as_str(), *off))
        .collect();
    h.deliver(commentary_json(&refs)).await;

    // Exactly the 20 newest lines, newest first, throttle bypassed.
    let keys = h.displayed_keys();
    assert_eq!(keys.len(), 20);
    assert_eq!(keys[0], "b24");
    assert_eq!(keys[19], "b5");
    assert_eq!(h.session().pending_len(), 0);

    // Exactly one voice call, for the single newest line.
    let calls = h.voice_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].text, "Ball 24.");
    assert_eq!(calls[0].language, "en");
}

// ===========================================================================
// Steady trickle
// ===========================================================================

#[tokio::test]
async fn steady_trickle_releases_one_per_tick() {
    let mut h = harness();
    h.state.voice_enabled = true;
    h.connect("M1").await;

    let burst: Vec<(String, String, i64)> = (0..20)
        .map(|i| (format!("b{i}"), format!("Ball {i}."), i as i64))
        .collect();
    let refs: Vec<(&str, &str, i64)> = burst
        .iter()
        .map(|(id, text, off)| (id.as_str(), text.as_str(), *off))
        .collect();
    h.deliver(commentary_json(&refs)).await;
    h.voice_calls(); // discard the first-burst call

    // Three lines newer than everything displayed, delivered newest-first.
    h.deliver(commentary_json(&[
        ("n3", "Ball 22.", 22),
        ("n2", "Ball 21.", 21),
        ("n1", "Ball 20.", 20),
    ]))
    .await;
    assert_eq!(h.session().pending_len(), 3);
    // Not visible until released.
    assert!(!h.displayed_keys().contains(&"n1".to_string()));

    // FIFO: one line per tick, oldest first.
    h.tick().await;
    assert_eq!(h.displayed_keys()[0], "n1");
    h.tick().await;
    assert_eq!(h.displayed_keys()[0], "n2");
    h.tick().await;
    assert_eq!(h.displayed_keys()[0], "n3");
    assert_eq!(h.session().pending_len(), 0);

    // Exactly three additional voice calls, in release order.
    let calls = h.voice_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].text, "Ball 20.");
    assert_eq!(calls[2].text, "Ball 22.");

    // A fourth tick with an empty queue is a no-op.
    h.tick().await;
    assert_eq!(h.displayed_keys()[0], "n3");
    assert!(h.voice_calls().is_empty());
}

// ===========================================================================
// Text upgrades
// ===========================================================================

#[tokio::test]
async fn upgrade_lengthens_text_in_place() {
    let mut h = harness();
    h.connect("M1").await;

    h.deliver(commentary_json(&[
        ("1-1-2", "Driven to cover.", 2),
        ("1-1-1", "Good length ball.", 1),
    ]))
    .await;

    h.deliver(commentary_json(&[(
        "1-1-1",
        "Good length ball, defended solidly to mid-on.",
        1,
    )]))
    .await;

    let session = h.session();
    let upgraded = session
        .displayed()
        .iter()
        .find(|l| l.key == "1-1-1")
        .unwrap();
    assert_eq!(upgraded.text, "Good length ball, defended solidly to mid-on.");
    assert_eq!(upgraded.origin_ts, BASE_TS + 1000);
    // Position unchanged, nothing enqueued.
    assert_eq!(h.displayed_keys(), vec!["1-1-2", "1-1-1"]);
    assert_eq!(h.session().pending_len(), 0);
}

#[tokio::test]
async fn upgrade_monotonicity_text_never_shrinks() {
    let mut h = harness();
    h.connect("M1").await;

    h.deliver(commentary_json(&[(
        "1-1-1",
        "Good length ball, defended solidly to mid-on.",
        1,
    )]))
    .await;
    h.deliver(commentary_json(&[("1-1-1", "Good length ball.", 1)]))
        .await;

    assert_eq!(
        h.session().displayed()[0].text,
        "Good length ball, defended solidly to mid-on."
    );
}

// ===========================================================================
// Pagination exhaustion and reset
// ===========================================================================

#[tokio::test]
async fn exhaustion_latches_until_next_connect() {
    let mut h = harness();
    h.connect("M1").await;
    h.deliver(commentary_json(&[("b0", "Ball 0.", 0), ("b1", "Ball 1.", 1)]))
        .await;
    let generation = h.generation();

    // A page with results comes back first.
    let ui_tx = h.ui_tx.clone();
    app::handle_page_result(
        &mut h.state,
        PageResult {
            generation,
            match_id: "M1".into(),
            innings_id: "inn1".into(),
            before_ts: BASE_TS,
            outcome: Ok(vec![raw_line("h0", "Older ball.", -10)]),
        },
        &ui_tx,
    )
    .await;
    assert!(!h.session().no_more_history());
    assert_eq!(h.displayed_keys().last().unwrap(), "h0");

    // Then an empty page: exhaustion latches.
    app::handle_page_result(
        &mut h.state,
        PageResult {
            generation,
            match_id: "M1".into(),
            innings_id: "inn1".into(),
            before_ts: BASE_TS - 10_000,
            outcome: Ok(vec![]),
        },
        &ui_tx,
    )
    .await;
    assert!(h.session().no_more_history());

    // Further load-more requests are suppressed.
    app::start_pagination(&mut h.state).await;
    assert!(!h.state.page_in_flight);

    // A new connect resets the latch.
    h.connect("M2").await;
    assert!(!h.session().no_more_history());
}

#[tokio::test]
async fn pagination_cursor_decreases_across_pages() {
    let mut h = harness();
    h.connect("M1").await;
    h.deliver(commentary_json(&[("b0", "Ball 0.", 0)])).await;

    let (_, first_cursor) = h.session().pagination_cursor().unwrap();
    assert_eq!(first_cursor, BASE_TS);

    let generation = h.generation();
    let ui_tx = h.ui_tx.clone();
    app::handle_page_result(
        &mut h.state,
        PageResult {
            generation,
            match_id: "M1".into(),
            innings_id: "inn1".into(),
            before_ts: first_cursor,
            outcome: Ok(vec![
                raw_line("h1", "Older.", -1),
                raw_line("h2", "Oldest.", -2),
            ]),
        },
        &ui_tx,
    )
    .await;

    let (_, second_cursor) = h.session().pagination_cursor().unwrap();
    assert!(second_cursor < first_cursor);
    assert_eq!(second_cursor, BASE_TS - 2000);
    // All page lines are strictly older than the cursor they were fetched
    // under.
    assert!(h
        .session()
        .displayed()
        .iter()
        .filter(|l| l.key.starts_with('h'))
        .all(|l| l.origin_ts < first_cursor));
}

#[tokio::test]
async fn stale_pagination_result_after_match_switch_is_ignored() {
    let mut h = harness();
    h.connect("M1").await;
    h.deliver(commentary_json(&[("b0", "Ball 0.", 0)])).await;
    let old_generation = h.generation();

    // User switches matches while the fetch is in flight.
    h.connect("M2").await;
    let ui_tx = h.ui_tx.clone();
    app::handle_page_result(
        &mut h.state,
        PageResult {
            generation: old_generation,
            match_id: "M1".into(),
            innings_id: "inn1".into(),
            before_ts: BASE_TS,
            outcome: Ok(vec![raw_line("h0", "Stale history.", -10)]),
        },
        &ui_tx,
    )
    .await;

    assert!(h.session().displayed().is_empty());
    assert!(!h.session().no_more_history());
}

// ===========================================================================
// Malformed payloads
// ===========================================================================

#[tokio::test]
async fn malformed_payloads_are_skipped() {
    let mut h = harness();
    h.connect("M1").await;
    h.deliver(commentary_json(&[("b0", "Ball 0.", 0)])).await;
    h.drain_ui();

    // data.lines missing, not an array, and outright junk.
    h.deliver(r#"{"type":"commentary","data":{"miniscore":{}}}"#.into())
        .await;
    h.deliver(r#"{"type":"commentary","data":{"lines":"oops"}}"#.into())
        .await;
    h.deliver("{not json at all".into()).await;

    assert_eq!(h.displayed_keys(), vec!["b0"]);
    // No UI mutation was pushed for the malformed payloads.
    assert!(h.ui_rx.try_recv().is_err());
}

#[tokio::test]
async fn status_and_error_messages_produce_no_lines() {
    let mut h = harness();
    h.connect("M1").await;
    h.drain_ui();

    h.deliver(r#"{"type":"status","data":"Rain delay"}"#.into())
        .await;
    h.deliver(r#"{"type":"error","data":{"error":"upstream hiccup"}}"#.into())
        .await;

    assert!(h.session().displayed().is_empty());
    let mut saw_status = false;
    let mut saw_error = false;
    while let Ok(update) = h.ui_rx.try_recv() {
        match update {
            UiUpdate::StreamStatus(s) => {
                assert_eq!(s, "Rain delay");
                saw_status = true;
            }
            UiUpdate::StreamError(e) => {
                assert_eq!(e, "upstream hiccup");
                saw_error = true;
            }
            other => panic!("unexpected update {other:?}"),
        }
    }
    assert!(saw_status && saw_error);
    // The in-band error did not kill the session: lines still flow.
    h.deliver(commentary_json(&[("b0", "Ball 0.", 0)])).await;
    assert_eq!(h.displayed_keys(), vec!["b0"]);
}

// ===========================================================================
// Properties: de-duplication, rate bound, retention
// ===========================================================================

#[tokio::test]
async fn repeated_identities_display_exactly_once() {
    let mut h = harness();
    h.connect("M1").await;

    let payload = commentary_json(&[("b0", "Ball 0.", 0), ("b1", "Ball 1.", 1)]);
    for _ in 0..4 {
        h.deliver(payload.clone()).await;
    }
    h.tick().await;
    h.tick().await;
    for _ in 0..4 {
        h.deliver(payload.clone()).await;
    }

    let keys = h.displayed_keys();
    assert_eq!(keys.iter().filter(|k| *k == "b0").count(), 1);
    assert_eq!(keys.iter().filter(|k| *k == "b1").count(), 1);
    assert_eq!(h.session().pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn throttle_releases_at_most_one_line_per_period() {
    let mut h = harness();
    h.connect("M1").await;
    h.deliver(commentary_json(&[("b0", "Ball 0.", 0)])).await;

    // Ten pending lines arrive at once.
    let fresh: Vec<(String, String, i64)> = (1..=10)
        .map(|i| (format!("p{i}"), format!("Ball {i}."), i as i64))
        .collect();
    let refs: Vec<(&str, &str, i64)> = fresh
        .iter()
        .map(|(id, text, off)| (id.as_str(), text.as_str(), *off))
        .collect();
    h.deliver(commentary_json(&refs)).await;
    assert_eq!(h.session().pending_len(), 10);

    // Drive the same interval the app loop uses: across N ticks at most N
    // lines become visible, independent of arrival timing.
    let mut ticker = tokio::time::interval(Duration::from_secs(6));
    ticker.tick().await; // immediate first tick
    for released in 1..=3 {
        ticker.tick().await;
        h.tick().await;
        assert_eq!(h.displayed_keys().len(), 1 + released);
        assert_eq!(h.session().pending_len(), 10 - released);
    }
}

#[tokio::test]
async fn retention_cap_holds_across_many_releases() {
    let mut h = harness();
    h.connect("M1").await;

    let burst: Vec<(String, String, i64)> = (0..20)
        .map(|i| (format!("b{i}"), format!("Ball {i}."), i as i64))
        .collect();
    let refs: Vec<(&str, &str, i64)> = burst
        .iter()
        .map(|(id, text, off)| (id.as_str(), text.as_str(), *off))
        .collect();
    h.deliver(commentary_json(&refs)).await;

    for i in 20..100 {
        let id = format!("x{i}");
        let text = format!("Ball {i}.");
        h.deliver(commentary_json(&[(id.as_str(), text.as_str(), i)]))
            .await;
        h.tick().await;
        assert!(h.session().displayed().len() <= RETENTION_CAP);
    }
    assert_eq!(h.session().displayed().len(), RETENTION_CAP);
    assert_eq!(h.displayed_keys()[0], "x99");
}

#[tokio::test]
async fn match_switch_resets_seen_keys_and_queue() {
    let mut h = harness();
    h.connect("M1").await;
    h.deliver(commentary_json(&[("b0", "Ball 0.", 0), ("b1", "Ball 1.", 1)]))
        .await;
    h.deliver(commentary_json(&[("b2", "Ball 2.", 2)])).await;
    assert_eq!(h.session().pending_len(), 1);

    h.connect("M2").await;
    assert!(h.session().displayed().is_empty());
    assert_eq!(h.session().pending_len(), 0);

    // Identities from the previous match can be shown again.
    h.deliver(commentary_json(&[("b0", "Ball 0.", 0)])).await;
    assert_eq!(h.displayed_keys(), vec!["b0"]);
}

// ===========================================================================
// Direct session checks used by the pipeline above
// ===========================================================================

#[test]
fn normalize_drops_unusable_lines_only() {
    let ok = raw_line("a", "Fine.", 0);
    let empty_text = raw_line("b", "   ", 0);
    let mut bad_ts = raw_line("c", "Fine.", 0);
    bad_ts.timestamp = "not-a-time".into();

    let payload = CommentaryPayload {
        lines: vec![ok, empty_text, bad_ts],
        miniscore: None,
        match_status_info: None,
        score: None,
    };
    let mut session = IngestionSession::new("M1", "en", 256);
    let outcome = session.handle_payload(&payload);
    assert!(outcome.displayed_changed);
    assert_eq!(session.displayed().len(), 1);
    assert_eq!(session.displayed()[0].key, "a");
}

#[test]
fn normalize_parses_iso_timestamps_to_epoch_millis() {
    let line = normalize(&raw_line("a", "x", 5)).unwrap();
    assert_eq!(line.origin_ts, BASE_TS + 5000);
}
