use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cumulative click statistics for one link.
///
/// `last_updated` is the aggregation watermark: every click event with
/// `occurred_at <= last_updated` has already been counted exactly once.
/// Breakdown maps use `"Unknown"` as an ordinary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub link_id: String,
    pub clicks: i64,
    pub last_updated: DateTime<Utc>,
    pub referrers: BTreeMap<String, i64>,
    pub browsers: BTreeMap<String, i64>,
    pub countries: BTreeMap<String, i64>,
    pub platforms: BTreeMap<String, i64>,
    /// Keyed by UTC hour formatted `YYYYMMDDHH`
    pub hours: BTreeMap<String, i64>,
}

impl Statistics {
    /// Empty statistics with the watermark at the Unix epoch.
    pub fn new(link_id: impl Into<String>) -> Self {
        Self {
            link_id: link_id.into(),
            clicks: 0,
            last_updated: DateTime::<Utc>::UNIX_EPOCH,
            referrers: BTreeMap::new(),
            browsers: BTreeMap::new(),
            countries: BTreeMap::new(),
            platforms: BTreeMap::new(),
            hours: BTreeMap::new(),
        }
    }
}
