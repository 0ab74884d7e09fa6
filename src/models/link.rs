use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A shortened URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortLink {
    /// Base-62 short code. Empty until the link has been stored.
    pub id: String,
    /// The full URL the short code redirects to.
    pub target: String,
    pub created_at: DateTime<Utc>,
    /// Clicks folded in by the last aggregation run.
    pub clicks: i64,
}

impl ShortLink {
    /// Create an unsaved link with no clicks, stamped with the current time.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            target: target.into(),
            created_at: Utc::now(),
            clicks: 0,
        }
    }
}
