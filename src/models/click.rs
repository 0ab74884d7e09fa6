use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single recorded redirect. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
    /// Short code of the link that was followed
    pub link_id: String,
    pub occurred_at: DateTime<Utc>,
    /// Remote address as seen by the server, optionally with a `:port` suffix
    pub remote_addr: String,
    pub referrer: String,
    pub user_agent: String,
}

impl ClickEvent {
    /// Record a click happening now.
    pub fn new(
        link_id: impl Into<String>,
        remote_addr: impl Into<String>,
        referrer: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            link_id: link_id.into(),
            occurred_at: Utc::now(),
            remote_addr: remote_addr.into(),
            referrer: referrer.into(),
            user_agent: user_agent.into(),
        }
    }
}
