// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sharded in-memory response cache with per-entry TTL.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tollgate_config::model::CacheConfig;
use tollgate_core::{
    AdapterType, CacheEntry, CacheStats, HealthStatus, OrganizationId, PluginAdapter,
    ResponseCache, TollgateError,
};
use tracing::debug;

struct StoredEntry {
    entry: CacheEntry,
    size: usize,
    inserted_at: Instant,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// [`ResponseCache`] over a [`DashMap`].
///
/// Readers never wait on writers to other shards. Expired entries are
/// dropped lazily on lookup and swept when the cache is full.
pub struct MemoryCache {
    entries: DashMap<String, StoredEntry>,
    max_entries: usize,
    max_value_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCache {
    pub fn new(max_entries: usize, max_value_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            max_value_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.max_value_bytes)
    }

    fn sweep_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, stored| stored.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|item| item.value().inserted_at)
            .map(|item| item.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            debug!(fingerprint = %key, "evicted oldest cache entry");
        }
    }
}

#[async_trait]
impl PluginAdapter for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Cache
    }

    async fn health_check(&self) -> Result<HealthStatus, TollgateError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TollgateError> {
        self.entries.clear();
        Ok(())
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        let found = self
            .entries
            .get(fingerprint)
            .map(|stored| stored.is_live(now).then(|| stored.entry.clone()));

        match found {
            Some(Some(entry)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            Some(None) => {
                self.entries
                    .remove_if(fingerprint, |_, stored| !stored.is_live(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn put(
        &self,
        fingerprint: &str,
        entry: CacheEntry,
        ttl: Duration,
    ) -> Result<(), TollgateError> {
        if self.max_entries == 0 {
            return Ok(());
        }

        let size = entry.approximate_size();
        if size > self.max_value_bytes {
            return Err(TollgateError::Cache(format!(
                "entry of {size} bytes exceeds the {} byte limit",
                self.max_value_bytes
            )));
        }

        let now = Instant::now();
        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            TollgateError::Cache(format!("ttl of {}s is out of range", ttl.as_secs()))
        })?;
        if !self.entries.contains_key(fingerprint) && self.entries.len() >= self.max_entries {
            let swept = self.sweep_expired(now);
            if swept > 0 {
                debug!(swept, "swept expired cache entries");
            }
            if self.entries.len() >= self.max_entries {
                self.evict_oldest();
            }
        }

        self.entries.insert(
            fingerprint.to_string(),
            StoredEntry {
                entry,
                size,
                inserted_at: now,
                expires_at,
            },
        );
        Ok(())
    }

    async fn purge(&self, organization_id: Option<&OrganizationId>) -> usize {
        match organization_id {
            None => {
                let count = self.entries.len();
                self.entries.clear();
                count
            }
            Some(org) => {
                let keys: Vec<String> = self
                    .entries
                    .iter()
                    .filter(|item| item.value().entry.organization_id == *org)
                    .map(|item| item.key().clone())
                    .collect();
                keys.iter()
                    .filter(|key| self.entries.remove(key.as_str()).is_some())
                    .count()
            }
        }
    }

    async fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let (entries, size_bytes) = self
            .entries
            .iter()
            .filter(|item| item.value().is_live(now))
            .fold((0, 0), |(count, bytes), item| {
                (count + 1, bytes + item.value().size)
            });
        CacheStats {
            entries,
            size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    async fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}
