// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The order lifecycle manager.
//!
//! Creation reserves stock by validation only; the authoritative stock
//! deduction plus accounting-ledger writes happen exactly once, at the
//! `delivered` transition, inside one storage transaction. Status
//! notifications run after the status has committed and can never undo it.

use std::sync::Arc;

use sokoni_core::types::{NewOrder, Order, OrderStats, OrderStatus};
use sokoni_core::{OutboundGateway, SokoniError};
use sokoni_storage::queries::orders;
use sokoni_storage::Database;
use tracing::info;

use crate::notify::Notifier;

/// Validates, creates, and advances orders, notifying the customer on every
/// status change.
pub struct OrderService {
    db: Arc<Database>,
    notifier: Notifier,
    number_prefix: String,
}

impl OrderService {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<dyn OutboundGateway>,
        number_prefix: impl Into<String>,
    ) -> Self {
        let notifier = Notifier::new(Arc::clone(&db), gateway);
        Self {
            db,
            notifier,
            number_prefix: number_prefix.into(),
        }
    }

    /// Create a `pending` order from validated lines. Stock is checked but
    /// not decremented.
    pub async fn create_order(&self, req: NewOrder) -> Result<Order, SokoniError> {
        let order = orders::create(&self.db, req, &self.number_prefix).await?;
        info!(
            order = %order.order_number,
            phone = %order.customer_phone,
            total = order.total_amount,
            lines = order.lines.len(),
            "order created"
        );
        Ok(order)
    }

    /// Advance an order to `new_status`.
    ///
    /// Transitions out of a terminal status are refused. `delivered` runs
    /// the stock deduction + sale-ledger transaction and aborts wholesale on
    /// `InsufficientStock`, leaving the order in its prior status.
    /// `cancelled` routes through the cancel rules. The customer is notified
    /// after the write commits; notification failure is logged, not raised.
    pub async fn update_status(
        &self,
        id: i64,
        new_status: OrderStatus,
    ) -> Result<Order, SokoniError> {
        let order = match new_status {
            OrderStatus::Delivered => orders::deliver(&self.db, id).await?,
            OrderStatus::Cancelled => orders::cancel(&self.db, id).await?,
            other => orders::set_status(&self.db, id, other).await?,
        };

        info!(
            order = %order.order_number,
            status = %order.status,
            "order status updated"
        );

        self.notifier.notify(&order).await;
        Ok(order)
    }

    /// Cancel an order. Refused once delivered; no stock to restore because
    /// stock is only deducted at delivery.
    pub async fn cancel_order(&self, id: i64) -> Result<Order, SokoniError> {
        let order = orders::cancel(&self.db, id).await?;
        info!(order = %order.order_number, "order cancelled");
        self.notifier.notify(&order).await;
        Ok(order)
    }

    /// Attach a 1-5 rating and optional feedback to a delivered order.
    /// Each order can be rated once.
    pub async fn rate_order(
        &self,
        id: i64,
        rating: u8,
        feedback: Option<String>,
    ) -> Result<Order, SokoniError> {
        let order = orders::rate(&self.db, id, rating, feedback).await?;
        info!(order = %order.order_number, rating, "order rated");
        Ok(order)
    }

    /// Fetch one order or fail with `NotFound`.
    pub async fn find_one(&self, id: i64) -> Result<Order, SokoniError> {
        orders::get(&self.db, id)
            .await?
            .ok_or_else(|| SokoniError::not_found("order", id))
    }

    /// All orders, newest first.
    pub async fn find_all(&self) -> Result<Vec<Order>, SokoniError> {
        orders::list_all(&self.db).await
    }

    /// Orders placed from one phone number, newest first.
    pub async fn find_by_phone(&self, phone: &str) -> Result<Vec<Order>, SokoniError> {
        orders::find_by_phone(&self.db, phone).await
    }

    /// Delivered orders that have not been rated yet, for one phone.
    pub async fn delivered_unrated(&self, phone: &str) -> Result<Vec<Order>, SokoniError> {
        orders::delivered_unrated(&self.db, phone).await
    }

    /// The most recent orders for one phone, capped at `limit`.
    pub async fn history(&self, phone: &str, limit: u32) -> Result<Vec<Order>, SokoniError> {
        orders::history(&self.db, phone, limit).await
    }

    /// Aggregate counts per status and revenue excluding cancelled orders.
    pub async fn stats(&self) -> Result<OrderStats, SokoniError> {
        orders::stats(&self.db).await
    }
}
