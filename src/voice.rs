// Speech-synthesis capability for spoken commentary playback.
//
// Voice is best-effort: synthesis failures and timeouts are logged and
// swallowed, never blocking the display path. A dedicated worker task drains
// the request queue one item at a time, so a line's speech completes (or
// fails) before the next line's speech starts.

use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::protocol::VoiceRequest;

// ---------------------------------------------------------------------------
// TtsClient
// ---------------------------------------------------------------------------

/// Low-level client for the managed speech-synthesis service.
pub struct TtsClient {
    http: reqwest::Client,
    endpoint: String,
    voice: String,
    tone: String,
    timeout: Duration,
}

impl TtsClient {
    pub fn new(endpoint: String, voice: String, tone: String, timeout: Duration) -> Self {
        TtsClient {
            http: reqwest::Client::new(),
            endpoint,
            voice,
            tone,
            timeout,
        }
    }

    /// Synthesize one line of text. Bounded by the configured timeout so a
    /// slow synthesis call cannot stall the voice queue indefinitely.
    pub async fn speak(&self, text: &str, language: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "text": text,
            "language": language,
            "voice": self.voice,
            "tone": self.tone,
        });
        let response = tokio::time::timeout(
            self.timeout,
            self.http.post(&self.endpoint).json(&body).send(),
        )
        .await
        .context("speech synthesis timed out")?
        .context("speech synthesis request failed")?;
        response
            .error_for_status()
            .context("speech synthesis request rejected")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// VoiceClient wrapper
// ---------------------------------------------------------------------------

/// High-level wrapper that can be either an active synthesis client or
/// disabled (no speech endpoint configured).
pub enum VoiceClient {
    Active(TtsClient),
    Disabled,
}

impl VoiceClient {
    /// Build a `VoiceClient` from the application config. Returns `Disabled`
    /// when no speech endpoint is configured.
    pub fn from_config(config: &Config) -> Self {
        if config.voice.speech_url.is_empty() {
            return VoiceClient::Disabled;
        }
        VoiceClient::Active(TtsClient::new(
            config.voice.speech_url.clone(),
            config.voice.voice.clone(),
            config.voice.tone.clone(),
            config.voice.timeout(),
        ))
    }

    /// Speak one line, delegating to the inner client or silently dropping
    /// the request when disabled.
    pub async fn speak(&self, text: &str, language: &str) -> anyhow::Result<()> {
        match self {
            VoiceClient::Active(client) => client.speak(text, language).await,
            VoiceClient::Disabled => {
                debug!("voice disabled, dropping speech request");
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Drain the voice queue one request at a time until all senders are
/// dropped. Failures are logged and swallowed.
pub async fn run_worker(client: VoiceClient, mut rx: mpsc::Receiver<VoiceRequest>) {
    while let Some(request) = rx.recv().await {
        if let Err(e) = client.speak(&request.text, &request.language).await {
            warn!("speech synthesis failed: {e:#}");
        }
    }
    info!("voice worker shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_client_swallows_requests() {
        let client = VoiceClient::Disabled;
        client.speak("FOUR!", "en").await.unwrap();
    }

    #[tokio::test]
    async fn worker_drains_queue_and_exits_on_close() {
        let (tx, rx) = mpsc::channel(8);
        let worker = tokio::spawn(run_worker(VoiceClient::Disabled, rx));

        for i in 0..3 {
            tx.send(VoiceRequest {
                text: format!("Ball {i}."),
                language: "en".into(),
            })
            .await
            .unwrap();
        }
        drop(tx);

        // Worker must terminate once the channel closes.
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("worker should exit")
            .unwrap();
    }
}
