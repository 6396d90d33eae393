//! Read-through cache of remote lists and items.
//!
//! Entries are only ever filled from fetch results and dropped wholesale
//! after a successful mutation. Concurrent misses on the same key both fetch.
//! A fetch that was started before an invalidation is returned to its caller
//! but never stored.
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::debug;

use crate::model::{Campaign, ListQuery, OutreachItem};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Outreach(ListQuery),
    Pending(Option<u32>),
    Item(i64),
    Campaigns,
}

impl CacheKey {
    pub fn is_outreach(&self) -> bool {
        !matches!(self, CacheKey::Campaigns)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    Items(Vec<OutreachItem>),
    Item(OutreachItem),
    Campaigns(Vec<Campaign>),
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Bumped by every outreach invalidation.
    generation: u64,
}

#[derive(Debug, Default)]
pub struct ListCache {
    inner: Mutex<Inner>,
}

impl ListCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.lock().await.entries.get(key).cloned()
    }

    pub async fn generation(&self) -> u64 {
        self.inner.lock().await.generation
    }

    /// Cached value for `key`, or the result of `fetch` stored under it.
    /// Errors pass through and are not cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: CacheKey, fetch: F) -> Result<CacheEntry, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheEntry, E>>,
    {
        let started = {
            let inner = self.inner.lock().await;
            if let Some(hit) = inner.entries.get(&key) {
                debug!(?key, "cache hit");
                return Ok(hit.clone());
            }
            inner.generation
        };
        debug!(?key, "cache miss");
        let entry = fetch().await?;
        let mut inner = self.inner.lock().await;
        if key.is_outreach() && inner.generation != started {
            debug!(?key, "invalidated while fetching; not stored");
        } else {
            inner.entries.insert(key, entry.clone());
        }
        Ok(entry)
    }

    /// Drop every outreach list and item entry.
    pub async fn invalidate_outreach(&self) {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !key.is_outreach());
        debug!(
            dropped = before - inner.entries.len(),
            generation = inner.generation,
            "outreach cache invalidated"
        );
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
