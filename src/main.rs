// Stumpcast entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Create mpsc channels
// 4. Spawn the voice worker task
// 5. Spawn the app orchestrator task
// 6. Run the TUI event loop (blocking until the user quits)
// 7. Cleanup on exit

use stumpcast::app;
use stumpcast::config;
use stumpcast::protocol;
use stumpcast::tui;
use stumpcast::voice;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("Stumpcast starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: api={}, stream={}, throttle={}s",
        config.feed.api_base_url, config.feed.stream_base_url, config.playback.throttle_period_secs
    );

    let (feed_tx, feed_rx) = mpsc::channel::<protocol::FeedEvent>(256);
    let (cmd_tx, cmd_rx) = mpsc::channel::<protocol::UserCommand>(64);
    let (ui_tx, ui_rx) = mpsc::channel::<protocol::UiUpdate>(256);
    let (page_tx, page_rx) = mpsc::channel::<protocol::PageResult>(16);
    let (voice_tx, voice_rx) = mpsc::channel::<protocol::VoiceRequest>(32);

    let voice_client = voice::VoiceClient::from_config(&config);
    match &voice_client {
        voice::VoiceClient::Active(_) => info!("Voice client initialized"),
        voice::VoiceClient::Disabled => info!("Voice client disabled (no speech endpoint)"),
    }
    let voice_handle = tokio::spawn(voice::run_worker(voice_client, voice_rx));

    let languages = config.feed.languages.clone();
    let app_state = app::AppState::new(config, feed_tx, page_tx, voice_tx);

    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(feed_rx, cmd_rx, page_rx, ui_tx, app_state).await {
            error!("Application loop error: {e:#}");
        }
    });

    // The TUI consumes ui_rx and sends commands through cmd_tx.
    // It blocks until the user presses 'q' or Ctrl+C.
    if let Err(e) = tui::run(ui_rx, cmd_tx, languages).await {
        error!("TUI error: {e:#}");
    }

    // Cleanup: wait for the app task to finish (with timeout).
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    // The voice worker exits once all request senders are dropped; abort in
    // case a synthesis call is still in flight.
    voice_handle.abort();

    info!("Stumpcast shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (not the terminal, which is used by
/// the TUI).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("stumpcast.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stumpcast=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
