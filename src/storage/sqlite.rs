use crate::codec;
use crate::models::{ClickEvent, ShortLink, Statistics};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};
use std::collections::BTreeMap;
use std::sync::Arc;

/// SQLite-backed storage.
///
/// Links keep an integer `AUTOINCREMENT` key next to their short code; the
/// short code of a new link is the base-62 rendering of that key.
/// Timestamps are stored as Unix microseconds for both click events and
/// statistics watermarks, so comparisons after a round trip stay exact.
pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open SQLite database at {}", database_url))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Other(e.into())
}

fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(micros: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| StorageError::Other(anyhow!("timestamp {} out of range", micros)))
}

fn map_to_json(map: &BTreeMap<String, i64>) -> StorageResult<String> {
    serde_json::to_string(map).map_err(|e| StorageError::Other(e.into()))
}

fn map_from_json(column: &str, raw: &str) -> StorageResult<BTreeMap<String, i64>> {
    serde_json::from_str(raw)
        .with_context(|| format!("Malformed {} column", column))
        .map_err(StorageError::Other)
}

#[derive(FromRow)]
struct LinkRow {
    id: String,
    target: String,
    created_at: i64,
    clicks: i64,
}

impl LinkRow {
    fn into_link(self) -> StorageResult<ShortLink> {
        Ok(ShortLink {
            id: self.id,
            target: self.target,
            created_at: from_micros(self.created_at)?,
            clicks: self.clicks,
        })
    }
}

#[derive(FromRow)]
struct EventRow {
    link_id: String,
    occurred_at: i64,
    remote_addr: String,
    referrer: String,
    user_agent: String,
}

impl EventRow {
    fn into_event(self) -> StorageResult<ClickEvent> {
        Ok(ClickEvent {
            link_id: self.link_id,
            occurred_at: from_micros(self.occurred_at)?,
            remote_addr: self.remote_addr,
            referrer: self.referrer,
            user_agent: self.user_agent,
        })
    }
}

#[derive(FromRow)]
struct StatisticsRow {
    link_id: String,
    clicks: i64,
    last_updated: i64,
    referrers: String,
    browsers: String,
    countries: String,
    platforms: String,
    hours: String,
}

impl StatisticsRow {
    fn into_statistics(self) -> StorageResult<Statistics> {
        Ok(Statistics {
            link_id: self.link_id,
            clicks: self.clicks,
            last_updated: from_micros(self.last_updated)?,
            referrers: map_from_json("referrers", &self.referrers)?,
            browsers: map_from_json("browsers", &self.browsers)?,
            countries: map_from_json("countries", &self.countries)?,
            platforms: map_from_json("platforms", &self.platforms)?,
            hours: map_from_json("hours", &self.hours)?,
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        // `id` is NULL only while a freshly inserted row waits for its code.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                key INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE,
                target TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                clicks INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_created_at ON links(created_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS click_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                link_id TEXT NOT NULL,
                occurred_at INTEGER NOT NULL,
                remote_addr TEXT NOT NULL,
                referrer TEXT NOT NULL,
                user_agent TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_click_events_link ON click_events(link_id, occurred_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS statistics (
                link_id TEXT PRIMARY KEY,
                clicks INTEGER NOT NULL,
                last_updated INTEGER NOT NULL,
                referrers TEXT NOT NULL,
                browsers TEXT NOT NULL,
                countries TEXT NOT NULL,
                platforms TEXT NOT NULL,
                hours TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn count_links(&self) -> StorageResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM links WHERE id IS NOT NULL")
            .fetch_one(self.pool.as_ref())
            .await
            .map_err(db_err)
    }

    async fn list_links(&self, limit: i64, offset: i64) -> StorageResult<Vec<ShortLink>> {
        sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT id, target, created_at, clicks
            FROM links
            WHERE id IS NOT NULL
            ORDER BY created_at DESC, key DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(db_err)?
        .into_iter()
        .map(LinkRow::into_link)
        .collect()
    }

    async fn get_link(&self, id: &str) -> StorageResult<ShortLink> {
        sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT id, target, created_at, clicks
            FROM links
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(db_err)?
        .ok_or(StorageError::NotFound)?
        .into_link()
    }

    async fn put_link(&self, link: &mut ShortLink) -> StorageResult<String> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if link.id.is_empty() {
            // AUTOINCREMENT never reuses a key, so a code already taken by an
            // explicitly named link is skipped on the next attempt.
            loop {
                let key = sqlx::query(
                    "INSERT INTO links (id, target, created_at, clicks) VALUES (NULL, ?, ?, ?)",
                )
                .bind(&link.target)
                .bind(to_micros(link.created_at))
                .bind(link.clicks)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?
                .last_insert_rowid();

                let id = codec::encode(key);
                let taken =
                    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM links WHERE id = ?")
                        .bind(&id)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(db_err)?;

                if taken == 0 {
                    sqlx::query("UPDATE links SET id = ? WHERE key = ?")
                        .bind(&id)
                        .bind(key)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;
                    link.id = id;
                    break;
                }

                sqlx::query("DELETE FROM links WHERE key = ?")
                    .bind(key)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
        } else {
            sqlx::query(
                r#"
                INSERT INTO links (id, target, created_at, clicks)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    target = excluded.target,
                    created_at = excluded.created_at,
                    clicks = excluded.clicks
                "#,
            )
            .bind(&link.id)
            .bind(&link.target)
            .bind(to_micros(link.created_at))
            .bind(link.clicks)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(link.id.clone())
    }

    async fn delete_link(&self, id: &str) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for query in [
            "DELETE FROM click_events WHERE link_id = ?",
            "DELETE FROM statistics WHERE link_id = ?",
            "DELETE FROM links WHERE id = ?",
        ] {
            sqlx::query(query)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }

    async fn get_statistics(&self, id: &str) -> StorageResult<Statistics> {
        sqlx::query_as::<_, StatisticsRow>(
            r#"
            SELECT link_id, clicks, last_updated, referrers, browsers, countries, platforms, hours
            FROM statistics
            WHERE link_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(db_err)?
        .ok_or(StorageError::NotFound)?
        .into_statistics()
    }

    async fn put_statistics(&self, stats: &Statistics) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO statistics
                (link_id, clicks, last_updated, referrers, browsers, countries, platforms, hours)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(link_id) DO UPDATE SET
                clicks = excluded.clicks,
                last_updated = excluded.last_updated,
                referrers = excluded.referrers,
                browsers = excluded.browsers,
                countries = excluded.countries,
                platforms = excluded.platforms,
                hours = excluded.hours
            "#,
        )
        .bind(&stats.link_id)
        .bind(stats.clicks)
        .bind(to_micros(stats.last_updated))
        .bind(map_to_json(&stats.referrers)?)
        .bind(map_to_json(&stats.browsers)?)
        .bind(map_to_json(&stats.countries)?)
        .bind(map_to_json(&stats.platforms)?)
        .bind(map_to_json(&stats.hours)?)
        .execute(self.pool.as_ref())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn append_click_event(&self, event: &ClickEvent) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO click_events (link_id, occurred_at, remote_addr, referrer, user_agent)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.link_id)
        .bind(to_micros(event.occurred_at))
        .bind(&event.remote_addr)
        .bind(&event.referrer)
        .bind(&event.user_agent)
        .execute(self.pool.as_ref())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn count_click_events(&self, id: &str) -> StorageResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM click_events WHERE link_id = ?")
            .bind(id)
            .fetch_one(self.pool.as_ref())
            .await
            .map_err(db_err)
    }

    async fn list_click_events(
        &self,
        id: &str,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<ClickEvent>> {
        sqlx::query_as::<_, EventRow>(
            r#"
            SELECT link_id, occurred_at, remote_addr, referrer, user_agent
            FROM click_events
            WHERE link_id = ?
            ORDER BY occurred_at ASC, seq ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(db_err)?
        .into_iter()
        .map(EventRow::into_event)
        .collect()
    }
}
