//! Work Item Type Cache
//!
//! Read-mostly cache of work item types keyed by id. Types are append-only, so an
//! entry never goes stale by itself; creating a type still clears the cache so a
//! freshly created subtype's base is re-read from the store.
//!
//! # Concurrency
//!
//! Lookups share a `tokio::sync::RwLock`; populating a miss and [`invalidate`]
//! take it exclusively.
//!
//! [`invalidate`]: WorkItemTypeCache::invalidate

use crate::models::WorkItemType;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
pub struct WorkItemTypeCache {
    entries: RwLock<HashMap<Uuid, WorkItemType>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl WorkItemTypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: Uuid) -> Option<WorkItemType> {
        let found = self.entries.read().await.get(&id).cloned();
        match found {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Work item type cache hit: {}", id);
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        found
    }

    pub async fn put(&self, wit: WorkItemType) {
        self.entries.write().await.insert(wit.id, wit);
    }

    /// Drop every entry
    pub async fn invalidate(&self) {
        let mut entries = self.entries.write().await;
        if !entries.is_empty() {
            tracing::debug!("Invalidating {} cached work item types", entries.len());
        }
        entries.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().await.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
