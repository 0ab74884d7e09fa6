//! Turns a click event into the breakdown keys it is counted under.

use crate::analytics::geoip::CountryTable;
use crate::analytics::user_agent::{classify_user_agent, UNKNOWN};
use crate::models::ClickEvent;

/// Format of the hour bucket key, e.g. `2013080114`.
pub const HOUR_FORMAT: &str = "%Y%m%d%H";

/// Breakdown keys for a single click event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub referrer: String,
    pub browser: String,
    pub country: String,
    pub platform: String,
    pub hour: String,
}

/// Classifies click events by referrer, browser, country, platform and hour.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    countries: CountryTable,
}

impl Classifier {
    pub fn new(countries: CountryTable) -> Self {
        Self { countries }
    }

    pub fn classify(&self, event: &ClickEvent) -> Classification {
        let (browser, platform) = classify_user_agent(&event.user_agent);

        let referrer = if event.referrer.is_empty() {
            UNKNOWN.to_string()
        } else {
            event.referrer.clone()
        };

        Classification {
            referrer,
            browser: browser.to_string(),
            country: self.countries.lookup(&event.remote_addr).to_string(),
            platform: platform.to_string(),
            hour: event.occurred_at.format(HOUR_FORMAT).to_string(),
        }
    }
}
