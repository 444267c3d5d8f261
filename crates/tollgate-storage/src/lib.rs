// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Tollgate broker.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`. The wallet ledger
//! issues its queries through [`Database::connection`].

pub mod database;
pub mod migrations;

pub use database::{Database, map_tr_err};
