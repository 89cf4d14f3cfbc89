// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-customer finite-state dialogue engine for the Sokoni commerce
//! engine.
//!
//! [`DialogueEngine`] interprets inbound chat messages against durable
//! per-phone session state: browsing, cart building, checkout, order
//! tracking, rating, and reorder, plus the `ORDER:<id>` deep-link shortcut.
//! Turns for one phone are serialized, state persists before anything is
//! sent, and every failure degrades into an apology plus a return to the
//! main menu.

pub mod engine;
pub mod render;

pub use engine::{DialogueEngine, ProductLink};
