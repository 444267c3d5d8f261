// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response cache trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TollgateError;
use crate::types::{CacheEntry, CacheStats, OrganizationId};

/// Fingerprint-keyed store of previously billed responses.
///
/// A cache is never the source of truth for billing. A miss is always safe
/// to treat as "compute it", and a failed `put` must not fail the request.
#[async_trait]
pub trait ResponseCache: Send + Sync + 'static {
    /// Looks up a live entry. Expired entries are reported as misses.
    async fn get(&self, fingerprint: &str) -> Option<CacheEntry>;

    /// Stores an entry for `ttl`.
    async fn put(
        &self,
        fingerprint: &str,
        entry: CacheEntry,
        ttl: Duration,
    ) -> Result<(), TollgateError>;

    /// Removes one organization's entries, or everything when `None`.
    /// Returns the number of entries removed.
    async fn purge(&self, organization_id: Option<&OrganizationId>) -> usize;

    /// Entry count, approximate size, and hit/miss counters.
    async fn stats(&self) -> CacheStats;

    /// Zeroes the hit/miss counters.
    async fn reset_stats(&self);
}
