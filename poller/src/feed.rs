//! iTunes customer-reviews RSS feed (JSON flavour) and entry validation.

use chrono::{DateTime, Utc};
use common::review::{Review, MAX_RATING, MIN_RATING};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RssFeed {
    #[serde(default)]
    pub feed: Feed,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Feed {
    #[serde(default)]
    pub entry: Vec<RssEntry>,
}

/// Every feed value is wrapped as `{"label": "..."}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub name: Label,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RssEntry {
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub content: Label,
    /// "1" to "5".
    #[serde(rename = "im:rating", default)]
    pub rating: Label,
    /// RFC 3339 submission time.
    #[serde(default)]
    pub updated: Label,
    #[serde(default)]
    pub id: Label,
}

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("missing entry id")]
    MissingId,

    #[error("invalid rating {0:?}")]
    InvalidRating(String),

    #[error("invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Convert one raw entry into a review.
pub fn parse_entry(
    entry: &RssEntry,
    app_id: &str,
    fetched_at: DateTime<Utc>,
) -> Result<Review, EntryError> {
    // The id is the store's dedup key.
    let id = entry.id.label.trim();
    if id.is_empty() {
        return Err(EntryError::MissingId);
    }

    let rating = entry
        .rating
        .label
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|r| (MIN_RATING..=MAX_RATING).contains(r))
        .ok_or_else(|| EntryError::InvalidRating(entry.rating.label.clone()))?;

    let submitted_at = DateTime::parse_from_rfc3339(&entry.updated.label)
        .map_err(|source| EntryError::InvalidTimestamp {
            value: entry.updated.label.clone(),
            source,
        })?
        .with_timezone(&Utc);

    Ok(Review {
        id: id.to_string(),
        app_id: app_id.to_string(),
        author: entry.author.name.label.clone(),
        content: entry.content.label.clone(),
        rating,
        submitted_at,
        fetched_at,
    })
}

/// Convert a whole feed, skipping entries that fail validation.
pub fn into_reviews(feed: &RssFeed, app_id: &str, fetched_at: DateTime<Utc>) -> Vec<Review> {
    feed.feed
        .entry
        .iter()
        .filter_map(|entry| match parse_entry(entry, app_id, fetched_at) {
            Ok(review) => Some(review),
            Err(e) => {
                warn!(app_id = %app_id, entry_id = %entry.id.label, "Skipping malformed review entry: {}", e);
                None
            }
        })
        .collect()
}
