//! Integration tests for the storage contract
//!
//! Every test runs against both the in-memory store and SQLite so the two
//! backends stay interchangeable for the aggregator.
//!
//! Tests can be filtered by backend using the DATABASE_BACKEND environment variable:
//! - `DATABASE_BACKEND=sqlite cargo test` - Run only SQLite tests
//! - `DATABASE_BACKEND=memory cargo test` - Run only in-memory tests
//! - By default, both backends are tested

use chrono::{DateTime, Duration, TimeZone, Utc};
use linkstat::codec;
use linkstat::models::{ClickEvent, ShortLink, Statistics};
use linkstat::storage::{MemoryStorage, SqliteStorage, Storage};
use std::sync::Arc;

/// Get the database backend to test from environment variable
fn should_test_backend(backend: &str) -> bool {
    match std::env::var("DATABASE_BACKEND") {
        Ok(val) => val.to_lowercase() == backend.to_lowercase(),
        Err(_) => true,
    }
}

/// One in-memory SQLite database per test; a single connection keeps
/// every query on the same database.
async fn create_sqlite_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

async fn backends() -> Vec<(&'static str, Arc<dyn Storage>)> {
    let mut backends: Vec<(&'static str, Arc<dyn Storage>)> = Vec::new();
    if should_test_backend("memory") {
        backends.push(("memory", Arc::new(MemoryStorage::new())));
    }
    if should_test_backend("sqlite") {
        backends.push(("sqlite", create_sqlite_storage().await));
    }
    backends
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2013, 8, day, hour, 0, 0).unwrap()
}

fn link_created_at(target: &str, created_at: DateTime<Utc>) -> ShortLink {
    ShortLink {
        id: String::new(),
        target: target.to_string(),
        created_at,
        clicks: 0,
    }
}

fn click(link_id: &str, occurred_at: DateTime<Utc>) -> ClickEvent {
    ClickEvent {
        link_id: link_id.to_string(),
        occurred_at,
        remote_addr: "1.0.0.23:5555".to_string(),
        referrer: "https://example.org/".to_string(),
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) Firefox/22.0".to_string(),
    }
}

#[tokio::test]
async fn test_put_link_allocates_codec_ids() {
    for (name, storage) in backends().await {
        let mut first = link_created_at("https://example.com/1", at(1, 0));
        let mut second = link_created_at("https://example.com/2", at(1, 1));

        let id1 = storage.put_link(&mut first).await.unwrap();
        let id2 = storage.put_link(&mut second).await.unwrap();

        assert_eq!(first.id, id1, "{name}");
        assert_eq!(second.id, id2, "{name}");
        assert_ne!(id1, id2, "{name}");
        assert!(codec::is_valid_id(&id1), "{name}");
        assert!(codec::decode(&id1) > 0, "{name}");
        assert_eq!(codec::encode(codec::decode(&id2)), id2, "{name}");

        let fetched = storage.get_link(&id1).await.unwrap();
        assert_eq!(fetched, first, "{name}");
        assert_eq!(storage.count_links().await.unwrap(), 2, "{name}");
    }
}

#[tokio::test]
async fn test_put_link_overwrites_existing() {
    for (name, storage) in backends().await {
        let mut link = link_created_at("https://example.com/a", at(2, 0));
        let id = storage.put_link(&mut link).await.unwrap();

        link.clicks = 42;
        link.target = "https://example.com/b".to_string();
        assert_eq!(storage.put_link(&mut link).await.unwrap(), id, "{name}");

        let fetched = storage.get_link(&id).await.unwrap();
        assert_eq!(fetched.clicks, 42, "{name}");
        assert_eq!(fetched.target, "https://example.com/b", "{name}");
        assert_eq!(storage.count_links().await.unwrap(), 1, "{name}");
    }
}

#[tokio::test]
async fn test_explicit_id_is_not_reallocated() {
    for (name, storage) in backends().await {
        let mut custom = link_created_at("https://example.com/custom", at(3, 0));
        custom.id = "1".to_string();
        storage.put_link(&mut custom).await.unwrap();

        let mut fresh = link_created_at("https://example.com/fresh", at(3, 1));
        let id = storage.put_link(&mut fresh).await.unwrap();

        assert_ne!(id, "1", "{name}");
        assert_eq!(
            storage.get_link("1").await.unwrap().target,
            "https://example.com/custom",
            "{name}"
        );
        assert_eq!(storage.count_links().await.unwrap(), 2, "{name}");
    }
}

#[tokio::test]
async fn test_list_links_newest_first_with_pagination() {
    for (name, storage) in backends().await {
        for day in 1..=5 {
            let mut link = link_created_at(&format!("https://example.com/{day}"), at(day, 0));
            storage.put_link(&mut link).await.unwrap();
        }

        let first_page = storage.list_links(2, 0).await.unwrap();
        let targets: Vec<&str> = first_page.iter().map(|l| l.target.as_str()).collect();
        assert_eq!(
            targets,
            vec!["https://example.com/5", "https://example.com/4"],
            "{name}"
        );

        let last_page = storage.list_links(2, 4).await.unwrap();
        assert_eq!(last_page.len(), 1, "{name}");
        assert_eq!(last_page[0].target, "https://example.com/1", "{name}");

        assert!(storage.list_links(2, 6).await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn test_missing_records_are_not_found() {
    for (name, storage) in backends().await {
        assert!(
            storage.get_link("nope").await.unwrap_err().is_not_found(),
            "{name}"
        );
        assert!(
            storage.get_statistics("nope").await.unwrap_err().is_not_found(),
            "{name}"
        );
        assert_eq!(storage.count_click_events("nope").await.unwrap(), 0, "{name}");
        assert!(
            storage.list_click_events("nope", 10, 0).await.unwrap().is_empty(),
            "{name}"
        );
    }
}

#[tokio::test]
async fn test_click_events_oldest_first() {
    for (name, storage) in backends().await {
        // Appended out of order on purpose.
        for hour in [5, 1, 3, 2, 4] {
            storage.append_click_event(&click("abc", at(10, hour))).await.unwrap();
        }
        storage.append_click_event(&click("other", at(10, 0))).await.unwrap();

        assert_eq!(storage.count_click_events("abc").await.unwrap(), 5, "{name}");

        let page = storage.list_click_events("abc", 3, 0).await.unwrap();
        let hours: Vec<DateTime<Utc>> = page.iter().map(|e| e.occurred_at).collect();
        assert_eq!(hours, vec![at(10, 1), at(10, 2), at(10, 3)], "{name}");

        let rest = storage.list_click_events("abc", 3, 3).await.unwrap();
        assert_eq!(rest.len(), 2, "{name}");
        assert_eq!(rest[1], click("abc", at(10, 5)), "{name}");
    }
}

#[tokio::test]
async fn test_statistics_upsert() {
    for (name, storage) in backends().await {
        let mut stats = Statistics::new("xyz");
        stats.clicks = 3;
        stats.last_updated = at(12, 9) + Duration::microseconds(123_456);
        stats.referrers.insert("Unknown".to_string(), 2);
        stats.referrers.insert("https://example.org/".to_string(), 1);
        stats.browsers.insert("Chrome".to_string(), 3);
        stats.countries.insert("AU".to_string(), 3);
        stats.platforms.insert("Linux".to_string(), 3);
        stats.hours.insert("2013081209".to_string(), 3);
        storage.put_statistics(&stats).await.unwrap();

        assert_eq!(storage.get_statistics("xyz").await.unwrap(), stats, "{name}");

        stats.clicks = 4;
        *stats.browsers.get_mut("Chrome").unwrap() += 1;
        storage.put_statistics(&stats).await.unwrap();

        assert_eq!(storage.get_statistics("xyz").await.unwrap(), stats, "{name}");
    }
}

#[tokio::test]
async fn test_delete_link_cascades() {
    for (name, storage) in backends().await {
        let mut doomed = link_created_at("https://example.com/doomed", at(4, 0));
        let mut kept = link_created_at("https://example.com/kept", at(4, 1));
        let doomed_id = storage.put_link(&mut doomed).await.unwrap();
        let kept_id = storage.put_link(&mut kept).await.unwrap();

        for id in [&doomed_id, &kept_id] {
            storage.append_click_event(&click(id, at(5, 0))).await.unwrap();
            storage.put_statistics(&Statistics::new(id.as_str())).await.unwrap();
        }

        storage.delete_link(&doomed_id).await.unwrap();

        assert!(storage.get_link(&doomed_id).await.unwrap_err().is_not_found(), "{name}");
        assert!(
            storage.get_statistics(&doomed_id).await.unwrap_err().is_not_found(),
            "{name}"
        );
        assert_eq!(storage.count_click_events(&doomed_id).await.unwrap(), 0, "{name}");

        assert!(storage.get_link(&kept_id).await.is_ok(), "{name}");
        assert!(storage.get_statistics(&kept_id).await.is_ok(), "{name}");
        assert_eq!(storage.count_click_events(&kept_id).await.unwrap(), 1, "{name}");
        assert_eq!(storage.count_links().await.unwrap(), 1, "{name}");
    }
}

#[tokio::test]
async fn test_sqlite_survives_reopen() {
    if !should_test_backend("sqlite") {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("links.db").display());

    let id = {
        let storage = SqliteStorage::new(&url, 2).await.unwrap();
        storage.init().await.unwrap();
        let mut link = link_created_at("https://example.com/persist", at(6, 0));
        storage.put_link(&mut link).await.unwrap()
    };

    let storage = SqliteStorage::new(&url, 2).await.unwrap();
    storage.init().await.unwrap();
    assert_eq!(
        storage.get_link(&id).await.unwrap().target,
        "https://example.com/persist"
    );
}
