//! Review fetchers: one HTTP round trip per app id.
//!
//! The poller only sees the [`ReviewFetcher`] trait; the iTunes
//! implementation owns the wire format and the HTTP client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use common::review::Review;
use std::time::Duration;

use crate::feed::{self, RssFeed};

pub const ITUNES_BASE_URL: &str = "https://itunes.apple.com";
pub const USER_AGENT: &str = "AppReviewPoller/1.0";
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait ReviewFetcher: Send + Sync {
    /// Fetch the latest reviews for one app. Malformed entries are dropped;
    /// transport, status and document errors fail the whole fetch.
    async fn fetch_reviews(&self, app_id: &str) -> Result<Vec<Review>>;
}

pub struct ItunesFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl ItunesFetcher {
    pub fn new() -> Result<Self> {
        Self::with_base_url(ITUNES_BASE_URL)
    }

    /// Point the fetcher at another host serving the same feed layout.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn feed_url(&self, app_id: &str) -> String {
        format!(
            "{}/us/rss/customerreviews/id={}/sortBy=mostRecent/page=1/json",
            self.base_url, app_id
        )
    }
}

#[async_trait]
impl ReviewFetcher for ItunesFetcher {
    async fn fetch_reviews(&self, app_id: &str) -> Result<Vec<Review>> {
        let resp = self
            .client
            .get(self.feed_url(app_id))
            .send()
            .await
            .context("failed to fetch reviews")?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            anyhow::bail!("unexpected status code: {}", status.as_u16());
        }

        let feed: RssFeed = resp.json().await.context("failed to decode RSS feed")?;
        Ok(feed::into_reviews(&feed, app_id, Utc::now()))
    }
}
