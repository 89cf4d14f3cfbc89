// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `sokoni-core::types` for use across
//! crate boundaries. This module re-exports them for convenience within the
//! storage crate.

pub use sokoni_core::types::{
    CartLine, Category, Customer, Flow, Item, ItemCondition, NewOrder, NewOrderLine, NewSale,
    Order, OrderLine, OrderStats, OrderStatus, SaleRecord, Session, SessionState, StockLevel,
    Warehouse,
};
