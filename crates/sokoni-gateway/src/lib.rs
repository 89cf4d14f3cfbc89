// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface of the Sokoni commerce engine.
//!
//! Exposes the transport webhook (verification handshake + inbound message
//! intake) and the administrative order API (listing, status updates,
//! cancellation, stats, deep links). The webhook path always acknowledges
//! with 200 and defers processing to detached tasks, so the transport
//! never retries because of downstream failures.

pub mod handlers;
pub mod server;

pub use server::{router, start_server, AppState, ServerConfig};
