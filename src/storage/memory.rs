use crate::codec;
use crate::models::{ClickEvent, ShortLink, Statistics};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};

/// Storage operations that can be made to fail in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListLinks,
    GetStatistics,
    PutLink,
    PutStatistics,
    ListClickEvents,
}

#[derive(Default)]
struct Inner {
    /// Short code -> (insertion sequence, link)
    links: HashMap<String, (u64, ShortLink)>,
    statistics: HashMap<String, Statistics>,
    events: HashMap<String, Vec<ClickEvent>>,
    next_key: i64,
    next_seq: u64,
}

#[derive(Default)]
struct FailurePlan {
    /// Operation -> (calls seen so far, failing call number)
    planned: HashMap<Operation, (usize, usize)>,
}

/// Process-local storage backed by hash maps.
///
/// Useful as an ephemeral backend and as the test double for everything
/// built on [`Storage`].
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
    failures: Mutex<FailurePlan>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `call`-th invocation (1-based) of `op` fail with a generic
    /// storage error. Other invocations are unaffected.
    pub async fn fail_on(&self, op: Operation, call: usize) {
        self.failures.lock().await.planned.insert(op, (0, call));
    }

    async fn check(&self, op: Operation) -> StorageResult<()> {
        let mut plan = self.failures.lock().await;
        if let Some((seen, fail_at)) = plan.planned.get_mut(&op) {
            *seen += 1;
            if *seen == *fail_at {
                return Err(anyhow!("injected failure in {:?}", op).into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn count_links(&self) -> StorageResult<i64> {
        Ok(self.inner.read().await.links.len() as i64)
    }

    async fn list_links(&self, limit: i64, offset: i64) -> StorageResult<Vec<ShortLink>> {
        self.check(Operation::ListLinks).await?;

        let inner = self.inner.read().await;
        let mut links: Vec<&(u64, ShortLink)> = inner.links.values().collect();
        links.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at).then(b.0.cmp(&a.0)));

        Ok(links
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|(_, link)| link.clone())
            .collect())
    }

    async fn get_link(&self, id: &str) -> StorageResult<ShortLink> {
        self.inner
            .read()
            .await
            .links
            .get(id)
            .map(|(_, link)| link.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn put_link(&self, link: &mut ShortLink) -> StorageResult<String> {
        self.check(Operation::PutLink).await?;

        let mut inner = self.inner.write().await;

        if link.id.is_empty() {
            // Skip keys whose code was already taken by an explicit id.
            loop {
                inner.next_key += 1;
                let id = codec::encode(inner.next_key);
                if !inner.links.contains_key(&id) {
                    link.id = id;
                    break;
                }
            }
        }

        let seq = match inner.links.get(&link.id) {
            Some((seq, _)) => *seq,
            None => {
                inner.next_seq += 1;
                inner.next_seq
            }
        };
        inner.links.insert(link.id.clone(), (seq, link.clone()));

        Ok(link.id.clone())
    }

    async fn delete_link(&self, id: &str) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.links.remove(id);
        inner.statistics.remove(id);
        inner.events.remove(id);
        Ok(())
    }

    async fn get_statistics(&self, id: &str) -> StorageResult<Statistics> {
        self.check(Operation::GetStatistics).await?;

        self.inner
            .read()
            .await
            .statistics
            .get(id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn put_statistics(&self, stats: &Statistics) -> StorageResult<()> {
        self.check(Operation::PutStatistics).await?;

        self.inner
            .write()
            .await
            .statistics
            .insert(stats.link_id.clone(), stats.clone());
        Ok(())
    }

    async fn append_click_event(&self, event: &ClickEvent) -> StorageResult<()> {
        self.inner
            .write()
            .await
            .events
            .entry(event.link_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn count_click_events(&self, id: &str) -> StorageResult<i64> {
        Ok(self
            .inner
            .read()
            .await
            .events
            .get(id)
            .map_or(0, |events| events.len() as i64))
    }

    async fn list_click_events(
        &self,
        id: &str,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<ClickEvent>> {
        self.check(Operation::ListClickEvents).await?;

        let inner = self.inner.read().await;
        let Some(events) = inner.events.get(id) else {
            return Ok(Vec::new());
        };

        // Stable sort keeps append order for identical timestamps.
        let mut sorted: Vec<&ClickEvent> = events.iter().collect();
        sorted.sort_by_key(|event| event.occurred_at);

        Ok(sorted
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
