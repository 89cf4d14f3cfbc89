// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Status-change notifications to the customer.
//!
//! Maps an order status to a message template and sends it through the
//! outbound gateway. Everything here is best-effort: failures are logged
//! and never surface to the lifecycle manager, so a notification can never
//! roll back or block a status change that already committed.
//!
//! The duplicate-send guard (`notified_status`) lives next to the send so
//! every caller gets it: a redundant write of the same status never
//! re-notifies the customer.

use std::sync::Arc;

use sokoni_core::types::{Order, OrderStatus};
use sokoni_core::OutboundGateway;
use sokoni_storage::queries::{customers, orders};
use sokoni_storage::Database;
use tracing::{debug, info, warn};

/// Sends order-status notifications, deduplicated per status.
pub struct Notifier {
    db: Arc<Database>,
    gateway: Arc<dyn OutboundGateway>,
}

impl Notifier {
    pub fn new(db: Arc<Database>, gateway: Arc<dyn OutboundGateway>) -> Self {
        Self { db, gateway }
    }

    /// Notify the customer about the order's current status.
    ///
    /// Skips silently when this status was already announced or has no
    /// template. Never returns an error.
    pub async fn notify(&self, order: &Order) {
        if order.notified_status == Some(order.status) {
            debug!(
                order = %order.order_number,
                status = %order.status,
                "status already notified, skipping"
            );
            return;
        }

        let customer_name = match customers::find_by_phone(&self.db, &order.customer_phone).await
        {
            Ok(Some(customer)) => customer.name,
            Ok(None) => order.customer_phone.clone(),
            Err(e) => {
                warn!(error = %e, "customer lookup failed, using phone as name");
                order.customer_phone.clone()
            }
        };

        let Some(message) = render_status_message(order, &customer_name) else {
            debug!(status = %order.status, "no notification template for status");
            return;
        };

        match self.gateway.send_text(&order.customer_phone, &message).await {
            Ok(_) => {
                info!(
                    order = %order.order_number,
                    status = %order.status,
                    phone = %order.customer_phone,
                    "status notification sent"
                );
                if let Err(e) =
                    orders::set_notified_status(&self.db, order.id, order.status).await
                {
                    warn!(error = %e, order = %order.order_number, "failed to record notified status");
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    order = %order.order_number,
                    status = %order.status,
                    "status notification failed"
                );
            }
        }
    }
}

/// Renders the message body for a status, or `None` when the status has no
/// customer-facing template (`pending`).
pub fn render_status_message(order: &Order, customer_name: &str) -> Option<String> {
    let items = items_list(order);
    let number = &order.order_number;
    let total = order.total_amount;

    let message = match order.status {
        OrderStatus::Pending => return None,
        OrderStatus::Confirmed => {
            let address = order
                .delivery_address
                .as_deref()
                .filter(|a| !a.is_empty())
                .unwrap_or("Not specified");
            format!(
                "✅ *Order Confirmed!*\n\n\
                 Hello {customer_name}, your order *#{number}* has been confirmed!\n\n\
                 *Items:*\n{items}\n\n\
                 *Total:* TZS {total:.2}\n\
                 *Delivery Address:* {address}\n\n\
                 We're preparing your order for delivery. You'll be notified when it's ready!"
            )
        }
        OrderStatus::Processing | OrderStatus::Ready => format!(
            "📦 *Order Ready!*\n\n\
             {customer_name}, your order *#{number}* is ready for delivery!\n\n\
             *Items:*\n{items}\n\n\
             *Total Amount:* TZS {total:.2}\n\
             *Payment:* Cash on Delivery\n\n\
             Our delivery team will contact you shortly!"
        ),
        OrderStatus::Delivered => format!(
            "✅ *Order Delivered!*\n\n\
             Your order *#{number}* has been delivered successfully!\n\n\
             *Items:*\n{items}\n\n\
             *Total Paid:* TZS {total:.2}\n\n\
             Thank you for shopping with us! 🎉\n\n\
             Type *menu* anytime to place a new order."
        ),
        OrderStatus::Cancelled => format!(
            "❌ *Order Cancelled*\n\n\
             Your order *#{number}* has been cancelled.\n\n\
             If you have any questions, please contact us.\n\n\
             Type *menu* to place a new order."
        ),
    };

    Some(message)
}

fn items_list(order: &Order) -> String {
    order
        .lines
        .iter()
        .map(|line| {
            format!(
                "• {} x{} - TZS {:.2}",
                line.item_name, line.quantity, line.total_price
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sokoni_core::types::OrderLine;

    fn order_with_status(status: OrderStatus) -> Order {
        Order {
            id: 1,
            order_number: "WA2608070001".into(),
            customer_phone: "255700000001".into(),
            customer_id: None,
            warehouse_id: 1,
            lines: vec![OrderLine {
                id: 1,
                item_id: 1,
                item_name: "LED Bulb 9W".into(),
                quantity: 3,
                unit_price: 1500.0,
                total_price: 4500.0,
            }],
            total_amount: 4500.0,
            status,
            delivery_address: Some("Kariakoo".into()),
            notes: None,
            notified_status: None,
            rating: None,
            feedback: None,
            rated_at: None,
            created_at: "2026-08-07T10:00:00+00:00".into(),
            confirmed_at: None,
            delivered_at: None,
        }
    }

    #[test]
    fn pending_has_no_template() {
        let order = order_with_status(OrderStatus::Pending);
        assert!(render_status_message(&order, "Asha").is_none());
    }

    #[test]
    fn confirmed_template_includes_items_total_and_address() {
        let order = order_with_status(OrderStatus::Confirmed);
        let msg = render_status_message(&order, "Asha").unwrap();
        assert!(msg.contains("WA2608070001"));
        assert!(msg.contains("LED Bulb 9W x3"));
        assert!(msg.contains("TZS 4500.00"));
        assert!(msg.contains("Kariakoo"));
        assert!(msg.contains("Asha"));
    }

    #[test]
    fn confirmed_without_address_says_not_specified() {
        let mut order = order_with_status(OrderStatus::Confirmed);
        order.delivery_address = Some(String::new());
        let msg = render_status_message(&order, "Asha").unwrap();
        assert!(msg.contains("Not specified"));
    }

    #[test]
    fn processing_and_ready_share_the_ready_template() {
        let processing = order_with_status(OrderStatus::Processing);
        let ready = order_with_status(OrderStatus::Ready);
        assert_eq!(
            render_status_message(&processing, "Asha"),
            render_status_message(&ready, "Asha")
        );
    }

    #[test]
    fn delivered_and_cancelled_have_distinct_templates() {
        let delivered = order_with_status(OrderStatus::Delivered);
        let cancelled = order_with_status(OrderStatus::Cancelled);
        assert!(render_status_message(&delivered, "Asha")
            .unwrap()
            .contains("delivered successfully"));
        assert!(render_status_message(&cancelled, "Asha")
            .unwrap()
            .contains("has been cancelled"));
    }
}
