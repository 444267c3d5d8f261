// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request orchestration for the Tollgate metered AI broker.
//!
//! The [`Broker`] is the single entry point for AI feature calls:
//! - Classifies the request and routes it to a provider and model
//! - Serves identical requests from the response cache without charging
//! - Rejects requests the wallet cannot cover before any provider call
//! - Retries transient provider failures with backoff
//! - Debits the exact cost once, after a successful response
//!
//! [`AdminService`] exposes wallet and cache maintenance to operators.

pub mod admin;
pub mod broker;
mod metrics;
pub mod providers;
pub mod retry;
pub mod types;

pub use admin::AdminService;
pub use broker::Broker;
pub use providers::ProviderRegistry;
pub use retry::Backoff;
pub use types::{Actor, AiRequest, BrokerError, BrokerErrorKind, BrokerResult, BrokerState};
