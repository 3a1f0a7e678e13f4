// TUI dashboard: match selector, commentary feed, and status bars.
//
// The TUI owns a `ViewState` that mirrors relevant parts of the application
// state. The app orchestrator pushes `UiUpdate` messages over an mpsc
// channel; the TUI applies them to `ViewState` and re-renders on a fixed
// interval.

use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyModifiers};
use futures_util::StreamExt;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use tokio::sync::mpsc;

use crate::commentary::line::{BallEvent, CommentaryLine};
use crate::protocol::{ConnectionStatus, MatchSummary, UiUpdate, UserCommand};

/// Fewest displayed lines before the "load more" action is offered.
pub const LOAD_MORE_MIN_LINES: usize = 5;

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

/// TUI-local state that mirrors the application state for rendering.
///
/// Updated incrementally via `UiUpdate` messages from the app orchestrator.
pub struct ViewState {
    pub matches: Vec<MatchSummary>,
    /// Cursor into `matches`.
    pub selected: usize,
    /// Displayed commentary lines, newest first.
    pub lines: Vec<CommentaryLine>,
    pub connection_status: ConnectionStatus,
    /// Whether the selected match is live (drives the LIVE tag).
    pub is_live: bool,
    /// Latest informational status text from the stream.
    pub status_line: Option<String>,
    pub matches_error: Option<String>,
    pub stream_error: Option<String>,
    pub pagination_error: Option<String>,
    pub history_exhausted: bool,
    pub voice_enabled: bool,
    pub language: String,
    /// Languages offered for cycling with 'l'.
    pub languages: Vec<String>,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            matches: Vec::new(),
            selected: 0,
            lines: Vec::new(),
            connection_status: ConnectionStatus::Idle,
            is_live: false,
            status_line: None,
            matches_error: None,
            stream_error: None,
            pagination_error: None,
            history_exhausted: false,
            voice_enabled: false,
            language: String::new(),
            languages: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// UiUpdate processing
// ---------------------------------------------------------------------------

/// Apply a single UiUpdate to the ViewState.
///
/// Error banners clear only on a successful subsequent operation of the
/// same kind: a fresh match list clears the matches banner, an applied
/// history page clears the pagination banner, and new lines (or a live
/// handshake) clear the stream banner.
fn apply_ui_update(state: &mut ViewState, update: UiUpdate) {
    match update {
        UiUpdate::Matches(matches) => {
            state.matches = matches;
            state.matches_error = None;
            if state.selected >= state.matches.len() {
                state.selected = state.matches.len().saturating_sub(1);
            }
        }
        UiUpdate::MatchesError(message) => {
            state.matches_error = Some(message);
        }
        UiUpdate::Lines { lines, is_live } => {
            state.lines = lines;
            state.is_live = is_live;
            state.stream_error = None;
        }
        UiUpdate::ConnectionStatus(status) => {
            state.connection_status = status;
            if status == ConnectionStatus::Connecting {
                // New session: reset per-session view flags.
                state.history_exhausted = false;
                state.pagination_error = None;
                state.status_line = None;
            }
            if status == ConnectionStatus::Live {
                state.stream_error = None;
            }
        }
        UiUpdate::StreamStatus(status) => {
            state.status_line = Some(status);
        }
        UiUpdate::StreamError(message) => {
            state.stream_error = Some(message);
        }
        UiUpdate::PaginationError(message) => {
            state.pagination_error = Some(message);
        }
        UiUpdate::HistoryApplied { exhausted } => {
            state.pagination_error = None;
            if exhausted {
                state.history_exhausted = true;
            }
        }
        UiUpdate::VoiceEnabled(enabled) => {
            state.voice_enabled = enabled;
        }
        UiUpdate::Language(language) => {
            state.language = language;
        }
    }
}

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

/// Badge text for a line's event classification, if it deserves one.
pub fn badge(line: &CommentaryLine) -> Option<&'static str> {
    match line.event {
        BallEvent::Four => Some("FOUR"),
        BallEvent::Six => Some("SIX"),
        BallEvent::Wicket => Some("WICKET"),
        BallEvent::OverBreak => Some("OVER"),
        BallEvent::None => None,
    }
}

fn badge_style(event: BallEvent) -> Style {
    match event {
        BallEvent::Four => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        BallEvent::Six => Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        BallEvent::Wicket => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        BallEvent::OverBreak => Style::default().fg(Color::Cyan),
        BallEvent::None => Style::default(),
    }
}

/// Whether the "load more" action should be offered.
pub fn show_load_more(state: &ViewState) -> bool {
    state.lines.len() >= LOAD_MORE_MIN_LINES && !state.history_exhausted
}

/// "12.3" when both over and ball are known.
pub fn over_ball_label(line: &CommentaryLine) -> Option<String> {
    match (line.over_number, line.ball_number) {
        (Some(over), Some(ball)) => Some(format!("{over}.{ball}")),
        (Some(over), None) => Some(format!("{over}")),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

struct AppLayout {
    status_bar: Rect,
    matches: Rect,
    commentary: Rect,
    help_bar: Rect,
}

fn build_layout(area: Rect) -> AppLayout {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(36), Constraint::Min(0)])
        .split(rows[1]);
    AppLayout {
        status_bar: rows[0],
        matches: columns[0],
        commentary: columns[1],
        help_bar: rows[2],
    }
}

fn render_frame(frame: &mut Frame, state: &ViewState) {
    let layout = build_layout(frame.area());
    render_status_bar(frame, &layout, state);
    render_matches(frame, &layout, state);
    render_commentary(frame, &layout, state);
    render_help_bar(frame, &layout, state);
}

fn render_status_bar(frame: &mut Frame, layout: &AppLayout, state: &ViewState) {
    let conn_str = match state.connection_status {
        ConnectionStatus::Idle => "Idle",
        ConnectionStatus::Connecting => "Connecting",
        ConnectionStatus::Live => "Live",
        ConnectionStatus::Error => "Not fetching",
    };
    let voice = if state.voice_enabled { "on" } else { "off" };
    let text = format!(
        " {} | lang: {} | voice: {} | {} lines",
        conn_str,
        state.language,
        voice,
        state.lines.len()
    );
    let paragraph = Paragraph::new(Line::from(vec![Span::styled(
        text,
        Style::default().fg(Color::White),
    )]))
    .style(Style::default().bg(Color::DarkGray));
    frame.render_widget(paragraph, layout.status_bar);
}

fn render_matches(frame: &mut Frame, layout: &AppLayout, state: &ViewState) {
    let mut rows: Vec<Line> = Vec::new();
    if let Some(error) = &state.matches_error {
        rows.push(Line::from(Span::styled(
            format!("! {error}"),
            Style::default().fg(Color::Red),
        )));
    }
    if state.matches.is_empty() && state.matches_error.is_none() {
        rows.push(Line::from("No matches. Press 'r' to refresh."));
    }
    for (i, m) in state.matches.iter().enumerate() {
        let marker = if i == state.selected { "> " } else { "  " };
        let mut spans = vec![Span::raw(format!("{marker}{}", m.display_name))];
        if m.is_live {
            spans.push(Span::styled(
                " LIVE",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ));
        }
        let style = if i == state.selected {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        rows.push(Line::from(spans).style(style));
        rows.push(Line::from(Span::styled(
            format!("    {} | {}", m.series_name, m.status),
            Style::default().add_modifier(Modifier::DIM),
        )));
    }
    let paragraph =
        Paragraph::new(rows).block(Block::default().borders(Borders::ALL).title("Matches"));
    frame.render_widget(paragraph, layout.matches);
}

fn render_commentary(frame: &mut Frame, layout: &AppLayout, state: &ViewState) {
    let mut rows: Vec<Line> = Vec::new();
    if let Some(error) = &state.stream_error {
        rows.push(Line::from(Span::styled(
            format!("! {error}"),
            Style::default().fg(Color::Red),
        )));
    }
    if let Some(error) = &state.pagination_error {
        rows.push(Line::from(Span::styled(
            format!("! load more failed: {error}"),
            Style::default().fg(Color::Red),
        )));
    }
    if let Some(status) = &state.status_line {
        rows.push(Line::from(Span::styled(
            format!("* {status}"),
            Style::default().fg(Color::Cyan),
        )));
    }

    for (i, line) in state.lines.iter().enumerate() {
        let mut spans: Vec<Span> = Vec::new();
        if i == 0 && state.is_live && state.connection_status == ConnectionStatus::Live {
            spans.push(Span::styled(
                "LIVE ",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ));
        }
        if let Some(label) = over_ball_label(line) {
            spans.push(Span::styled(
                format!("{label:>5} "),
                Style::default().add_modifier(Modifier::DIM),
            ));
        }
        if let Some(tag) = badge(line) {
            spans.push(Span::styled(format!("[{tag}] "), badge_style(line.event)));
        }
        spans.push(Span::raw(line.text.clone()));
        rows.push(Line::from(spans));
    }

    if show_load_more(state) {
        rows.push(Line::from(Span::styled(
            "-- press 'm' for older commentary --",
            Style::default().add_modifier(Modifier::DIM),
        )));
    } else if state.history_exhausted {
        rows.push(Line::from(Span::styled(
            "-- no more commentary available --",
            Style::default().add_modifier(Modifier::DIM),
        )));
    }

    let paragraph =
        Paragraph::new(rows).block(Block::default().borders(Borders::ALL).title("Commentary"));
    frame.render_widget(paragraph, layout.commentary);
}

fn render_help_bar(frame: &mut Frame, layout: &AppLayout, state: &ViewState) {
    let load_more = if show_load_more(state) { " | m:More" } else { "" };
    let text = format!(" q:Quit | r:Refresh | Enter:Watch | l:Language | v:Voice{load_more}");
    let paragraph = Paragraph::new(Line::from(vec![Span::styled(
        text,
        Style::default().fg(Color::White).add_modifier(Modifier::DIM),
    )]))
    .style(Style::default().bg(Color::DarkGray));
    frame.render_widget(paragraph, layout.help_bar);
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Map one key event to view-state changes and/or a command.
async fn handle_key(key: KeyEvent, state: &mut ViewState, cmd_tx: &mpsc::Sender<UserCommand>) {
    match key.code {
        KeyCode::Char('r') => {
            let _ = cmd_tx.send(UserCommand::RefreshMatches).await;
        }
        KeyCode::Up | KeyCode::Char('k') => {
            state.selected = state.selected.saturating_sub(1);
        }
        KeyCode::Down | KeyCode::Char('j') => {
            if state.selected + 1 < state.matches.len() {
                state.selected += 1;
            }
        }
        KeyCode::Enter => {
            if state.selected < state.matches.len() {
                let _ = cmd_tx.send(UserCommand::SelectMatch(state.selected)).await;
            }
        }
        KeyCode::Char('m') => {
            if show_load_more(state) {
                let _ = cmd_tx.send(UserCommand::LoadMore).await;
            }
        }
        KeyCode::Char('v') => {
            let _ = cmd_tx.send(UserCommand::ToggleVoice).await;
        }
        KeyCode::Char('l') => {
            if let Some(next) = next_language(&state.languages, &state.language) {
                let _ = cmd_tx.send(UserCommand::SetLanguage(next)).await;
            }
        }
        _ => {}
    }
}

/// The language after `current` in the offered list, wrapping around.
pub fn next_language(languages: &[String], current: &str) -> Option<String> {
    if languages.len() < 2 {
        return None;
    }
    let index = languages.iter().position(|l| l == current)?;
    Some(languages[(index + 1) % languages.len()].clone())
}

// ---------------------------------------------------------------------------
// Main TUI loop
// ---------------------------------------------------------------------------

/// Run the TUI event loop.
///
/// Initializes the terminal, installs a panic hook that restores it on
/// crash, then runs an async select loop over UI updates, keyboard input,
/// and render ticks. Returns when the user quits or the app loop closes
/// its update channel.
pub async fn run(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
    languages: Vec<String>,
) -> anyhow::Result<()> {
    let mut terminal = ratatui::init();

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = ratatui::restore();
        original_hook(panic_info);
    }));

    let mut view_state = ViewState {
        languages,
        ..ViewState::default()
    };

    let mut event_stream = EventStream::new();

    let mut render_tick = tokio::time::interval(Duration::from_millis(250));
    render_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            update = ui_rx.recv() => {
                match update {
                    Some(ui_update) => apply_ui_update(&mut view_state, ui_update),
                    // Channel closed: app is shutting down.
                    None => break,
                }
            }

            maybe_event = event_stream.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key_event))) => {
                        if key_event.code == KeyCode::Char('c')
                            && key_event.modifiers.contains(KeyModifiers::CONTROL)
                        {
                            let _ = cmd_tx.send(UserCommand::Quit).await;
                            break;
                        }
                        if key_event.code == KeyCode::Char('q') {
                            let _ = cmd_tx.send(UserCommand::Quit).await;
                            break;
                        }
                        handle_key(key_event, &mut view_state, &cmd_tx).await;
                    }
                    Some(Ok(_)) => {
                        // Mouse events, resize events, etc.
                    }
                    Some(Err(_)) | None => break,
                }
            }

            _ = render_tick.tick() => {
                terminal.draw(|frame| render_frame(frame, &view_state))?;
            }
        }
    }

    ratatui::restore();
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
