// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request classification and provider selection for the Tollgate broker.
//!
//! Classifies each request into a usage type, resolves the provider and model
//! that should serve it, and enforces per-provider request rate limits.

pub mod classifier;
pub mod rate_limit;
pub mod router;

pub use classifier::{Classification, UsageClassifier, parse_usage_type};
pub use rate_limit::RateLimiter;
pub use router::{ProviderRouter, RouteTarget};
