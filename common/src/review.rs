use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ingested customer review, keyed by the feed's entry id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub app_id: String,
    pub author: String,
    pub content: String,
    /// Star rating, 1 to 5.
    pub rating: u8,
    pub submitted_at: DateTime<Utc>,
    /// When this poller fetched the review.
    pub fetched_at: DateTime<Utc>,
}

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
