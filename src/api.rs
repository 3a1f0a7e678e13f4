// REST client for the upstream cricket-data API: match list and commentary
// history pages.

use anyhow::Context;
use tracing::debug;

use crate::protocol::{MatchSummary, RawLine};

/// Thin JSON client over the cricket-data REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        ApiClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the list of candidate live matches.
    pub async fn fetch_matches(&self) -> anyhow::Result<Vec<MatchSummary>> {
        let url = format!("{}/matches/live", self.base_url);
        debug!(%url, "fetching match list");
        let matches = self
            .http
            .get(&url)
            .send()
            .await
            .context("match list request failed")?
            .error_for_status()
            .context("match list request rejected")?
            .json::<Vec<MatchSummary>>()
            .await
            .context("match list response was not valid JSON")?;
        Ok(matches)
    }

    /// Fetch commentary lines strictly older than `before_ts` for one
    /// innings of one match.
    pub async fn fetch_history(
        &self,
        match_id: &str,
        innings_id: &str,
        before_ts: i64,
        language: &str,
        page_size: usize,
    ) -> anyhow::Result<Vec<RawLine>> {
        let url = format!("{}/matches/{match_id}/commentary", self.base_url);
        debug!(%url, innings_id, before_ts, "fetching commentary history page");
        let lines = self
            .http
            .get(&url)
            .query(&[
                ("innings_id", innings_id),
                ("language", language),
                ("before", &before_ts.to_string()),
                ("limit", &page_size.to_string()),
            ])
            .send()
            .await
            .context("commentary history request failed")?
            .error_for_status()
            .context("commentary history request rejected")?
            .json::<Vec<RawLine>>()
            .await
            .context("commentary history response was not valid JSON")?;
        Ok(lines)
    }
}
