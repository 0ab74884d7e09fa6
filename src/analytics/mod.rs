//! Click analytics
//!
//! Classification of individual click events (browser, platform, country,
//! hour) and the batch aggregator that folds click logs into per-link
//! statistics.

pub mod aggregator;
pub mod classifier;
pub mod geoip;
pub mod user_agent;

pub use aggregator::{AggregationSummary, StatisticsAggregator};
pub use classifier::{Classification, Classifier};
pub use geoip::{classify_country, CountryTable, IpRange};
pub use user_agent::classify_user_agent;
