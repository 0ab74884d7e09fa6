use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::analytics::aggregator::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub aggregation: AggregationConfig,
    pub geoip: GeoIpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Links fetched per page during a run
    pub link_page_size: i64,
    /// Click events fetched per page during a run
    pub event_page_size: i64,
    /// Delay between runs in watch mode
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    /// Optional `start,end,country` file replacing the built-in table
    pub ranges_path: Option<String>,
}

impl AggregationConfig {
    const fn default_interval_secs() -> u64 {
        300
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_str = var("DATABASE_BACKEND").unwrap_or_else(|| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "sqlite" => DatabaseBackend::Sqlite,
            "memory" => DatabaseBackend::Memory,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, memory"
                );
                DatabaseBackend::Sqlite
            }
        };

        let url = var("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./linkstat.db?mode=rwc".to_string());

        let max_connections = var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "5".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let link_page_size = var("AGGREGATION_LINK_PAGE_SIZE")
            .map(|v| v.parse::<i64>())
            .transpose()
            .context("AGGREGATION_LINK_PAGE_SIZE must be an integer")?
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let event_page_size = var("AGGREGATION_EVENT_PAGE_SIZE")
            .map(|v| v.parse::<i64>())
            .transpose()
            .context("AGGREGATION_EVENT_PAGE_SIZE must be an integer")?
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let interval_secs = var("AGGREGATION_INTERVAL_SECS")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("AGGREGATION_INTERVAL_SECS must be a non-negative integer")?
            .unwrap_or_else(AggregationConfig::default_interval_secs);

        let ranges_path = var("GEOIP_RANGES_PATH").filter(|p| !p.is_empty());

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url,
                max_connections,
            },
            aggregation: AggregationConfig {
                link_page_size,
                event_page_size,
                interval_secs,
            },
            geoip: GeoIpConfig { ranges_path },
        })
    }
}
