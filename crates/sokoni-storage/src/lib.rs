// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Sokoni commerce engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and typed query
//! modules for sessions, orders, the catalog, and the customer directory.
//!
//! The two multi-row units with correctness stakes -- order creation and the
//! delivery-time stock deduction -- each run inside a single transaction on
//! the writer thread (see `queries::orders`).

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;
