// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response caching for the Tollgate broker.
//!
//! [`MemoryCache`] implements the core `ResponseCache` trait over a sharded
//! concurrent map. [`fingerprint`] derives the cache key for a request.

pub mod fingerprint;
pub mod memory;

pub use fingerprint::{fingerprint, normalize_prompt};
pub use memory::MemoryCache;
