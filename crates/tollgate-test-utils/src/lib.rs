// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tollgate integration tests.
//!
//! Provides a mock provider and a test harness for fast, deterministic,
//! CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Provider adapter with scripted replies, latency, and call counting
//! - [`TestHarness`] - Full broker over a temp SQLite database

pub mod harness;
pub mod mock_provider;

pub use harness::{MOCK_LARGE_MODEL, MOCK_MODEL, MOCK_PROVIDER, TestHarness, TestHarnessBuilder};
pub use mock_provider::{DEFAULT_USAGE, MockProvider, MockReply};
