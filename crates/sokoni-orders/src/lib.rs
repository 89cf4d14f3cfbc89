// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Order lifecycle management for the Sokoni commerce engine.
//!
//! [`OrderService`] owns creation, status transitions (including the
//! delivery-time stock deduction), cancellation, and ratings. [`Notifier`]
//! announces status changes to the customer, best-effort and deduplicated
//! per status.

pub mod lifecycle;
pub mod notify;

pub use lifecycle::OrderService;
pub use notify::Notifier;
