// WebSocket client for the live commentary stream.
//
// One feed task per ingestion session. The task connects, forwards text
// frames to the app orchestrator, and reports connection loss. There is no
// automatic retry: a dropped stream is surfaced to the UI and the user
// reselects the match.

use futures_util::stream::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::protocol::FeedEvent;

/// Build the stream URL for one match in one language.
pub fn stream_url(base: &str, match_id: &str, language: &str) -> String {
    format!("{}/{match_id}?language={language}", base.trim_end_matches('/'))
}

/// Run the feed task for one connection attempt, forwarding events
/// through `tx`.
///
/// Connects to `url`, emits [`FeedEvent::Connected`], then pumps incoming
/// messages until the stream closes or errors. Always ends with
/// [`FeedEvent::Disconnected`]. The `generation` stamps every event so the
/// orchestrator can discard events from a torn-down connection.
pub async fn run(url: String, tx: mpsc::Sender<FeedEvent>, generation: u64) -> anyhow::Result<()> {
    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            warn!(%url, "commentary stream connect failed: {e}");
            let _ = tx
                .send(FeedEvent::Error {
                    message: format!("failed to open commentary stream: {e}"),
                    generation,
                })
                .await;
            let _ = tx.send(FeedEvent::Disconnected { generation }).await;
            return Ok(());
        }
    };
    info!(%url, generation, "commentary stream connected");

    if tx.send(FeedEvent::Connected { generation }).await.is_err() {
        return Ok(());
    }

    let (_write, read) = ws_stream.split();
    let _ = process_message_stream(read, &tx, generation).await;

    let _ = tx.send(FeedEvent::Disconnected { generation }).await;
    Ok(())
}

/// Pump raw WebSocket [`Message`] items from any [`Stream`], forwarding text
/// payloads through `tx`. This is a pure-logic function that requires no I/O
/// and is the primary unit-test target.
///
/// Returns `Err(())` if the channel is closed (receiver dropped), signalling
/// the caller to stop.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<FeedEvent>,
    generation: u64,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if tx
                    .send(FeedEvent::Message {
                        text: text.to_string(),
                        generation,
                    })
                    .await
                    .is_err()
                {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!(generation, "commentary stream sent close frame");
                break;
            }
            Err(e) => {
                warn!(generation, "commentary stream error: {e}");
                if tx
                    .send(FeedEvent::Error {
                        message: format!("commentary stream error: {e}"),
                        generation,
                    })
                    .await
                    .is_err()
                {
                    return Err(());
                }
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(())
}
