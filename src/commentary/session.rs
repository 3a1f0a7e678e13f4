// Per-match ingestion session: de-duplication, text upgrades, the pending
// queue drained by the playback throttle, and pagination bookkeeping.
//
// One session is constructed per connect and discarded on disconnect or
// match switch, so two sessions can never corrupt each other's queue or
// seen-set. The session is pure state: the feed task, the throttle timer,
// and the pagination tasks all live in the app orchestrator, which calls
// into the session from a single event loop.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use crate::commentary::line::{normalize, CommentaryLine};
use crate::protocol::{CommentaryPayload, ConnectionStatus};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Lines shown immediately on first load, bypassing the throttle so the
/// user is not kept waiting through a tick per line.
pub const FIRST_BURST_LEN: usize = 20;

/// Most-recent lines retained for display after a throttle release.
pub const RETENTION_CAP: usize = 50;

/// How many of the most recently displayed lines are candidates for a text
/// upgrade when a later payload resends the same identity.
pub const UPGRADE_WINDOW: usize = 5;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What a commentary payload did to the session.
#[derive(Debug, Default, PartialEq)]
pub struct PayloadOutcome {
    /// The displayed list changed (first burst or a text upgrade) and the
    /// UI should be refreshed.
    pub displayed_changed: bool,
    /// Lines newly added to the pending queue.
    pub enqueued: usize,
    /// Text to read aloud immediately. Set only on first load, for the
    /// single newest line; steady-state lines are voiced on release.
    pub voice_line: Option<String>,
}

/// What a history page did to the session.
#[derive(Debug, PartialEq)]
pub enum HistoryOutcome {
    /// The page was empty: no older commentary exists. Further requests
    /// are suppressed until the next connect.
    Exhausted,
    /// Older lines were appended (count excludes duplicates).
    Appended(usize),
}

// ---------------------------------------------------------------------------
// IngestionSession
// ---------------------------------------------------------------------------

/// Ingestion and playback state for one match in one language.
#[derive(Debug)]
pub struct IngestionSession {
    match_id: String,
    language: String,
    phase: ConnectionStatus,
    /// Identities already surfaced to the user (displayed or enqueued).
    /// Grows monotonically for the life of the session.
    seen: HashSet<String>,
    /// Lines awaiting release, oldest at the front. Bounded: when full the
    /// oldest pending line is dropped, keeping the live-feed semantic of
    /// favoring recent play.
    pending: VecDeque<CommentaryLine>,
    pending_cap: usize,
    /// Displayed lines, newest first.
    displayed: Vec<CommentaryLine>,
    /// Latched when a history page comes back empty.
    no_more_history: bool,
}

impl IngestionSession {
    pub fn new(match_id: impl Into<String>, language: impl Into<String>, pending_cap: usize) -> Self {
        IngestionSession {
            match_id: match_id.into(),
            language: language.into(),
            phase: ConnectionStatus::Connecting,
            seen: HashSet::new(),
            pending: VecDeque::new(),
            pending_cap: pending_cap.max(1),
            displayed: Vec::new(),
            no_more_history: false,
        }
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn phase(&self) -> ConnectionStatus {
        self.phase
    }

    pub fn displayed(&self) -> &[CommentaryLine] {
        &self.displayed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn no_more_history(&self) -> bool {
        self.no_more_history
    }

    /// The pagination cursor: innings and origin timestamp of the oldest
    /// currently displayed line. Monotonically decreasing across successful
    /// pages, so a timestamp range is never re-requested in one session.
    pub fn pagination_cursor(&self) -> Option<(Option<String>, i64)> {
        self.displayed
            .last()
            .map(|l| (l.innings_id.clone(), l.origin_ts))
    }

    // -- lifecycle ----------------------------------------------------------

    /// The stream handshake completed.
    pub fn mark_live(&mut self) {
        if self.phase != ConnectionStatus::Connecting {
            debug!(match_id = %self.match_id, phase = ?self.phase, "unexpected live transition");
        }
        self.phase = ConnectionStatus::Live;
    }

    /// The stream failed or dropped. There is no automatic retry; the
    /// session stays in `Error` until it is discarded.
    pub fn mark_error(&mut self) {
        self.phase = ConnectionStatus::Error;
    }

    // -- ingestion ----------------------------------------------------------

    /// Ingest one commentary payload.
    ///
    /// First load (nothing displayed yet): the newest [`FIRST_BURST_LEN`]
    /// lines are displayed immediately and in full, all marked seen, and the
    /// single newest line is scheduled for one voice read.
    ///
    /// Steady state: text upgrades across the [`UPGRADE_WINDOW`] most
    /// recently displayed lines are applied first, then unseen lines newer
    /// than the newest displayed line are enqueued oldest-first. Identities
    /// are marked seen at enqueue time, not release time, so a line that
    /// reappears in a later payload before its release is not double-queued.
    pub fn handle_payload(&mut self, payload: &CommentaryPayload) -> PayloadOutcome {
        let mut batch: Vec<CommentaryLine> =
            payload.lines.iter().filter_map(normalize).collect();
        if batch.is_empty() {
            return PayloadOutcome::default();
        }
        // Newest first.
        batch.sort_by(|a, b| b.origin_ts.cmp(&a.origin_ts));

        if self.displayed.is_empty() {
            return self.first_burst(batch);
        }
        self.steady_trickle(batch)
    }

    fn first_burst(&mut self, batch: Vec<CommentaryLine>) -> PayloadOutcome {
        let burst: Vec<CommentaryLine> = batch
            .into_iter()
            .filter(|l| self.seen.insert(l.key.clone()))
            .take(FIRST_BURST_LEN)
            .collect();
        if burst.is_empty() {
            return PayloadOutcome::default();
        }
        let voice_line = burst.first().map(|l| l.text.clone());
        self.displayed = burst;
        PayloadOutcome {
            displayed_changed: true,
            enqueued: 0,
            voice_line,
        }
    }

    fn steady_trickle(&mut self, batch: Vec<CommentaryLine>) -> PayloadOutcome {
        let mut outcome = PayloadOutcome::default();

        // Upgrades before enqueueing, so an upgraded line is never also
        // treated as newly arrived.
        let window = self.displayed.len().min(UPGRADE_WINDOW);
        for shown in &mut self.displayed[..window] {
            if let Some(incoming) = batch.iter().find(|l| l.key == shown.key) {
                if incoming.text.len() > shown.text.len() {
                    debug!(key = %shown.key, "upgrading commentary text");
                    shown.text = incoming.text.clone();
                    outcome.displayed_changed = true;
                }
            }
        }

        let max_displayed_ts = self
            .displayed
            .iter()
            .map(|l| l.origin_ts)
            .max()
            .unwrap_or(i64::MIN);

        // Enqueue oldest-first so FIFO release preserves play order.
        let mut fresh: Vec<CommentaryLine> = batch
            .into_iter()
            .filter(|l| l.origin_ts > max_displayed_ts && !self.seen.contains(&l.key))
            .collect();
        fresh.sort_by(|a, b| a.origin_ts.cmp(&b.origin_ts));

        for line in fresh {
            self.seen.insert(line.key.clone());
            self.pending.push_back(line);
            outcome.enqueued += 1;
            if self.pending.len() > self.pending_cap {
                let dropped = self.pending.pop_front();
                warn!(
                    match_id = %self.match_id,
                    dropped = dropped.as_ref().map(|l| l.key.as_str()).unwrap_or(""),
                    "pending queue full, dropping oldest line"
                );
            }
        }

        outcome
    }

    // -- playback throttle --------------------------------------------------

    /// One throttle tick: release at most one pending line to the displayed
    /// list, truncating it to the [`RETENTION_CAP`] most recent entries.
    ///
    /// Returns the released line so the caller can voice it. An empty queue
    /// is a no-op, not an error.
    pub fn release_next(&mut self) -> Option<CommentaryLine> {
        let line = self.pending.pop_front()?;
        self.displayed.insert(0, line.clone());
        self.displayed.truncate(RETENTION_CAP);
        Some(line)
    }

    // -- pagination ---------------------------------------------------------

    /// Apply a page of older commentary.
    ///
    /// An empty page latches `no_more_history` until the next connect. A
    /// non-empty page is appended (duplicates by identity dropped), every
    /// identity marked seen, and the displayed list re-sorted newest first.
    /// Pagination does not truncate to the retention cap; only throttle
    /// releases do.
    pub fn apply_history(&mut self, lines: Vec<CommentaryLine>) -> HistoryOutcome {
        if lines.is_empty() {
            self.no_more_history = true;
            return HistoryOutcome::Exhausted;
        }
        let mut appended = 0;
        for line in lines {
            if self.seen.insert(line.key.clone()) {
                self.displayed.push(line);
                appended += 1;
            }
        }
        if appended > 0 {
            self.displayed.sort_by(|a, b| b.origin_ts.cmp(&a.origin_ts));
        }
        HistoryOutcome::Appended(appended)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
