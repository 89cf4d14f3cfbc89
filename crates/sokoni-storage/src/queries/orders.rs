// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Order persistence and the two transactional units of the order
//! lifecycle.
//!
//! [`create`] validates every line (item, active price, stock at the order's
//! warehouse), snapshots prices, allocates the daily order number, and
//! inserts the order plus its lines -- one transaction. Stock is NOT
//! decremented here; creation reserves by validation only.
//!
//! [`deliver`] is the authoritative deduction point: it re-checks stock for
//! every line, decrements, writes the accounting sale rows, and stamps the
//! delivery -- one transaction, so a failed line leaves nothing half done.
//!
//! Order numbers are `<prefix><yyMMdd><seq:04>`, the sequence being the
//! same-day order count plus one computed inside the insert transaction.
//! Together with the single writer thread and the UNIQUE constraint on
//! `order_number`, concurrent creations cannot collide.

use std::str::FromStr;

use chrono::{Days, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use sokoni_core::types::{NewOrder, Order, OrderLine, OrderStats, OrderStatus};
use sokoni_core::SokoniError;

use crate::database::{domain_err, map_tr_err, Database};

const ORDER_COLUMNS: &str = "id, order_number, customer_phone, customer_id, warehouse_id, \
     total_amount, status, delivery_address, notes, notified_status, rating, feedback, \
     rated_at, created_at, confirmed_at, delivered_at";

fn order_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Order> {
    let status: String = row.get(6)?;
    let status = OrderStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let notified: Option<String> = row.get(9)?;
    let notified_status = match notified {
        Some(s) => Some(OrderStatus::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(Order {
        id: row.get(0)?,
        order_number: row.get(1)?,
        customer_phone: row.get(2)?,
        customer_id: row.get(3)?,
        warehouse_id: row.get(4)?,
        lines: Vec::new(),
        total_amount: row.get(5)?,
        status,
        delivery_address: row.get(7)?,
        notes: row.get(8)?,
        notified_status,
        rating: row.get(10)?,
        feedback: row.get(11)?,
        rated_at: row.get(12)?,
        created_at: row.get(13)?,
        confirmed_at: row.get(14)?,
        delivered_at: row.get(15)?,
    })
}

fn load_lines(conn: &rusqlite::Connection, order_id: i64) -> rusqlite::Result<Vec<OrderLine>> {
    let mut stmt = conn.prepare(
        "SELECT id, item_id, item_name, quantity, unit_price, total_price
         FROM order_items WHERE order_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![order_id], |row| {
        Ok(OrderLine {
            id: row.get(0)?,
            item_id: row.get(1)?,
            item_name: row.get(2)?,
            quantity: row.get(3)?,
            unit_price: row.get(4)?,
            total_price: row.get(5)?,
        })
    })?;
    let mut lines = Vec::new();
    for row in rows {
        lines.push(row?);
    }
    Ok(lines)
}

fn load_order(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Order>> {
    let base = conn
        .query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
            params![id],
            order_from_row,
        )
        .optional()?;
    match base {
        Some(mut order) => {
            order.lines = load_lines(conn, order.id)?;
            Ok(Some(order))
        }
        None => Ok(None),
    }
}

fn load_orders_where(
    conn: &rusqlite::Connection,
    where_clause: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Order>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {ORDER_COLUMNS} FROM orders {where_clause}"))?;
    let rows = stmt.query_map(params, order_from_row)?;
    let mut orders = Vec::new();
    for row in rows {
        orders.push(row?);
    }
    for order in &mut orders {
        order.lines = load_lines(conn, order.id)?;
    }
    Ok(orders)
}

/// Allocates the next order number for today. Must run inside the same
/// transaction as the order insert.
fn next_order_number(tx: &Transaction<'_>, prefix: &str) -> rusqlite::Result<String> {
    let now = Utc::now();
    let today = now.date_naive();
    let tomorrow = today + Days::new(1);
    let day_start = format!("{today}T00:00:00");
    let day_end = format!("{tomorrow}T00:00:00");

    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM orders WHERE created_at >= ?1 AND created_at < ?2",
        params![day_start, day_end],
        |row| row.get(0),
    )?;

    Ok(format!(
        "{prefix}{}{:04}",
        now.format("%y%m%d"),
        count + 1
    ))
}

/// Create an order from validated cart lines. One transaction.
///
/// Validates warehouse, item existence, active price, and stock at the
/// order's warehouse; snapshots unit prices and item names into the lines;
/// sums the total; allocates the order number. Stock quantities are not
/// touched -- the decrement happens at delivery.
pub async fn create(db: &Database, req: NewOrder, prefix: &str) -> Result<Order, SokoniError> {
    let prefix = prefix.to_string();
    let now = Utc::now().to_rfc3339();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            if req.lines.is_empty() {
                return Err(domain_err(SokoniError::InvalidState(
                    "order has no line items".into(),
                )));
            }

            let warehouse_exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM warehouses WHERE id = ?1",
                    params![req.warehouse_id],
                    |row| row.get(0),
                )
                .optional()?;
            if warehouse_exists.is_none() {
                return Err(domain_err(SokoniError::not_found(
                    "warehouse",
                    req.warehouse_id,
                )));
            }

            // An order may exist for a phone with no directory record yet.
            let customer_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM customers WHERE phone = ?1",
                    params![req.customer_phone],
                    |row| row.get(0),
                )
                .optional()?;

            let mut total_amount = 0.0;
            let mut snapshots = Vec::with_capacity(req.lines.len());
            for line in &req.lines {
                if line.quantity <= 0 {
                    return Err(domain_err(SokoniError::InvalidState(format!(
                        "quantity must be positive, got {}",
                        line.quantity
                    ))));
                }

                let name: Option<String> = tx
                    .query_row(
                        "SELECT name FROM items WHERE id = ?1",
                        params![line.item_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(name) = name else {
                    return Err(domain_err(SokoniError::not_found("item", line.item_id)));
                };

                let unit_price: Option<f64> = tx
                    .query_row(
                        "SELECT selling_price FROM item_prices
                         WHERE item_id = ?1 AND is_active = 1
                         ORDER BY id DESC LIMIT 1",
                        params![line.item_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(unit_price) = unit_price else {
                    return Err(domain_err(SokoniError::InvalidState(format!(
                        "item {name} has no active price"
                    ))));
                };

                let available: i64 = tx
                    .query_row(
                        "SELECT quantity FROM item_stock
                         WHERE item_id = ?1 AND warehouse_id = ?2",
                        params![line.item_id, req.warehouse_id],
                        |row| row.get(0),
                    )
                    .optional()?
                    .unwrap_or(0);
                if available < line.quantity {
                    return Err(domain_err(SokoniError::InsufficientStock {
                        item: name,
                        available,
                        requested: line.quantity,
                    }));
                }

                let total_price = unit_price * line.quantity as f64;
                total_amount += total_price;
                snapshots.push((line.item_id, name, line.quantity, unit_price, total_price));
            }

            let order_number = next_order_number(&tx, &prefix)?;

            tx.execute(
                "INSERT INTO orders (order_number, customer_phone, customer_id, warehouse_id,
                                     total_amount, status, delivery_address, notes,
                                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8, ?8)",
                params![
                    order_number,
                    req.customer_phone,
                    customer_id,
                    req.warehouse_id,
                    total_amount,
                    req.delivery_address,
                    req.notes,
                    now,
                ],
            )?;
            let order_id = tx.last_insert_rowid();

            for (item_id, name, quantity, unit_price, total_price) in &snapshots {
                tx.execute(
                    "INSERT INTO order_items (order_id, item_id, item_name, quantity,
                                              unit_price, total_price)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![order_id, item_id, name, quantity, unit_price, total_price],
                )?;
            }

            tx.commit()?;

            let order = load_order(conn, order_id)?
                .ok_or_else(|| domain_err(SokoniError::not_found("order", order_id)))?;
            Ok(order)
        })
        .await
        .map_err(map_tr_err)
}

/// The delivery transition: re-check stock, decrement, write sale rows,
/// stamp `delivered_at`. One transaction.
///
/// Fails with `InvalidState` when the order is already terminal (so a repeat
/// call can never deduct twice) and with `InsufficientStock` when the window
/// between reservation and delivery was exhausted by other orders -- in
/// which case the order keeps its prior status for manual reconciliation.
///
/// Sale rows are only written when the phone has a directory record; a
/// missing customer skips the ledger rather than failing the delivery.
pub async fn deliver(db: &Database, id: i64) -> Result<Order, SokoniError> {
    let now = Utc::now().to_rfc3339();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let order = load_order(&tx, id)?
                .ok_or_else(|| domain_err(SokoniError::not_found("order", id)))?;
            if order.status.is_terminal() {
                return Err(domain_err(SokoniError::InvalidState(format!(
                    "order {} is already {}",
                    order.order_number, order.status
                ))));
            }

            let customer_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM customers WHERE phone = ?1",
                    params![order.customer_phone],
                    |row| row.get(0),
                )
                .optional()?;

            for line in &order.lines {
                let stock: Option<(i64, i64)> = tx
                    .query_row(
                        "SELECT id, quantity FROM item_stock
                         WHERE item_id = ?1 AND warehouse_id = ?2",
                        params![line.item_id, order.warehouse_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                let Some((stock_id, available)) = stock else {
                    return Err(domain_err(SokoniError::not_found(
                        "stock record",
                        format!("item {} at warehouse {}", line.item_id, order.warehouse_id),
                    )));
                };

                if available < line.quantity {
                    return Err(domain_err(SokoniError::InsufficientStock {
                        item: line.item_name.clone(),
                        available,
                        requested: line.quantity,
                    }));
                }

                tx.execute(
                    "UPDATE item_stock SET quantity = quantity - ?1 WHERE id = ?2",
                    params![line.quantity, stock_id],
                )?;

                if let Some(customer_id) = customer_id {
                    tx.execute(
                        "INSERT INTO sales (customer_id, item_id, warehouse_id, quantity,
                                            amount_paid, remarks, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            customer_id,
                            line.item_id,
                            order.warehouse_id,
                            line.quantity,
                            line.total_price,
                            format!("WhatsApp Order #{}", order.order_number),
                            now,
                        ],
                    )?;
                }
            }

            tx.execute(
                "UPDATE orders
                 SET status = 'delivered',
                     delivered_at = COALESCE(delivered_at, ?1),
                     updated_at = ?1
                 WHERE id = ?2",
                params![now, id],
            )?;

            tx.commit()?;

            let order = load_order(conn, id)?
                .ok_or_else(|| domain_err(SokoniError::not_found("order", id)))?;
            Ok(order)
        })
        .await
        .map_err(map_tr_err)
}

/// Write a non-terminal status (`pending`, `confirmed`, `processing`,
/// `ready`). `confirmed` stamps `confirmed_at` on first transition.
///
/// Terminal targets have their own entry points: [`deliver`] and [`cancel`].
pub async fn set_status(
    db: &Database,
    id: i64,
    new_status: OrderStatus,
) -> Result<Order, SokoniError> {
    if new_status.is_terminal() {
        return Err(SokoniError::Internal(format!(
            "set_status cannot write terminal status {new_status}"
        )));
    }
    let now = Utc::now().to_rfc3339();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let order = load_order(&tx, id)?
                .ok_or_else(|| domain_err(SokoniError::not_found("order", id)))?;
            if order.status.is_terminal() {
                return Err(domain_err(SokoniError::InvalidState(format!(
                    "order {} is already {}",
                    order.order_number, order.status
                ))));
            }

            let stamp_confirmed =
                new_status == OrderStatus::Confirmed && order.confirmed_at.is_none();
            tx.execute(
                "UPDATE orders
                 SET status = ?1,
                     confirmed_at = CASE WHEN ?2 THEN ?3 ELSE confirmed_at END,
                     updated_at = ?3
                 WHERE id = ?4",
                params![new_status.to_string(), stamp_confirmed, now, id],
            )?;

            tx.commit()?;

            let order = load_order(conn, id)?
                .ok_or_else(|| domain_err(SokoniError::not_found("order", id)))?;
            Ok(order)
        })
        .await
        .map_err(map_tr_err)
}

/// Cancel an order. Refused once delivered; stock needs no restoration
/// because it is only deducted at delivery.
pub async fn cancel(db: &Database, id: i64) -> Result<Order, SokoniError> {
    let now = Utc::now().to_rfc3339();
    db.connection()
        .call(move |conn| {
            let order = load_order(conn, id)?
                .ok_or_else(|| domain_err(SokoniError::not_found("order", id)))?;
            if order.status == OrderStatus::Delivered {
                return Err(domain_err(SokoniError::InvalidState(format!(
                    "cannot cancel delivered order {}",
                    order.order_number
                ))));
            }

            conn.execute(
                "UPDATE orders SET status = 'cancelled', updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )?;

            let order = load_order(conn, id)?
                .ok_or_else(|| domain_err(SokoniError::not_found("order", id)))?;
            Ok(order)
        })
        .await
        .map_err(map_tr_err)
}

/// Record which status the customer was last notified about.
pub async fn set_notified_status(
    db: &Database,
    id: i64,
    status: OrderStatus,
) -> Result<(), SokoniError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE orders SET notified_status = ?1 WHERE id = ?2",
                params![status.to_string(), id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Attach a rating (1-5) and optional feedback to a delivered, not yet
/// rated order.
pub async fn rate(
    db: &Database,
    id: i64,
    rating: u8,
    feedback: Option<String>,
) -> Result<Order, SokoniError> {
    if !(1..=5).contains(&rating) {
        return Err(SokoniError::InvalidState(format!(
            "rating must be between 1 and 5, got {rating}"
        )));
    }
    let now = Utc::now().to_rfc3339();
    db.connection()
        .call(move |conn| {
            let order = load_order(conn, id)?
                .ok_or_else(|| domain_err(SokoniError::not_found("order", id)))?;
            if order.status != OrderStatus::Delivered {
                return Err(domain_err(SokoniError::InvalidState(format!(
                    "order {} is not delivered",
                    order.order_number
                ))));
            }
            if order.rating.is_some() {
                return Err(domain_err(SokoniError::InvalidState(format!(
                    "order {} is already rated",
                    order.order_number
                ))));
            }

            conn.execute(
                "UPDATE orders SET rating = ?1, feedback = ?2, rated_at = ?3, updated_at = ?3
                 WHERE id = ?4",
                params![rating, feedback, now, id],
            )?;

            let order = load_order(conn, id)?
                .ok_or_else(|| domain_err(SokoniError::not_found("order", id)))?;
            Ok(order)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch an order (with lines) by id.
pub async fn get(db: &Database, id: i64) -> Result<Option<Order>, SokoniError> {
    db.connection()
        .call(move |conn| Ok(load_order(conn, id)?))
        .await
        .map_err(map_tr_err)
}

/// All orders, newest first.
pub async fn list_all(db: &Database) -> Result<Vec<Order>, SokoniError> {
    db.connection()
        .call(|conn| Ok(load_orders_where(conn, "ORDER BY created_at DESC, id DESC", [])?))
        .await
        .map_err(map_tr_err)
}

/// Orders for one phone number, newest first.
pub async fn find_by_phone(db: &Database, phone: &str) -> Result<Vec<Order>, SokoniError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            Ok(load_orders_where(
                conn,
                "WHERE customer_phone = ?1 ORDER BY created_at DESC, id DESC",
                params![phone],
            )?)
        })
        .await
        .map_err(map_tr_err)
}

/// Delivered-but-unrated orders for one phone, most recently delivered first.
pub async fn delivered_unrated(db: &Database, phone: &str) -> Result<Vec<Order>, SokoniError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            Ok(load_orders_where(
                conn,
                "WHERE customer_phone = ?1 AND status = 'delivered' AND rating IS NULL
                 ORDER BY delivered_at DESC, id DESC",
                params![phone],
            )?)
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent orders for one phone, capped at `limit`.
pub async fn history(db: &Database, phone: &str, limit: u32) -> Result<Vec<Order>, SokoniError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            Ok(load_orders_where(
                conn,
                "WHERE customer_phone = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
                params![phone, limit],
            )?)
        })
        .await
        .map_err(map_tr_err)
}

/// Aggregate counts per status and total revenue excluding cancelled orders.
pub async fn stats(db: &Database) -> Result<OrderStats, SokoniError> {
    db.connection()
        .call(|conn| {
            let mut stats = OrderStats::default();
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*), SUM(total_amount) FROM orders GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                let status: String = row.get(0)?;
                let count: u64 = row.get(1)?;
                let amount: f64 = row.get::<_, Option<f64>>(2)?.unwrap_or(0.0);
                Ok((status, count, amount))
            })?;
            for row in rows {
                let (status, count, amount) = row?;
                stats.total += count;
                match status.as_str() {
                    "pending" => stats.pending = count,
                    "confirmed" => stats.confirmed = count,
                    "processing" => stats.processing = count,
                    "ready" => stats.ready = count,
                    "delivered" => stats.delivered = count,
                    "cancelled" => stats.cancelled = count,
                    _ => {}
                }
                if status != "cancelled" {
                    stats.total_revenue += amount;
                }
            }
            Ok(stats)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemCondition, NewOrderLine};
    use crate::queries::{catalog, customers};

    struct Fixture {
        db: Database,
        warehouse_id: i64,
        panel_id: i64,
        bulb_id: i64,
    }

    async fn setup() -> Fixture {
        let db = Database::open_in_memory().await.unwrap();
        let warehouse_id = customers::insert_warehouse(&db, "Main").await.unwrap();

        let panel_id = catalog::insert_item(
            &db, "Solar Panel 150W", Some("SP-150"), ItemCondition::New, None, None,
        )
        .await
        .unwrap();
        catalog::insert_price(&db, panel_id, 185000.0, true).await.unwrap();
        catalog::insert_stock(&db, panel_id, warehouse_id, 10).await.unwrap();

        let bulb_id =
            catalog::insert_item(&db, "LED Bulb 9W", None, ItemCondition::New, None, None)
                .await
                .unwrap();
        catalog::insert_price(&db, bulb_id, 1500.0, true).await.unwrap();
        catalog::insert_stock(&db, bulb_id, warehouse_id, 100).await.unwrap();

        Fixture {
            db,
            warehouse_id,
            panel_id,
            bulb_id,
        }
    }

    fn request(f: &Fixture, lines: Vec<NewOrderLine>) -> NewOrder {
        NewOrder {
            customer_phone: "255700000001".into(),
            warehouse_id: f.warehouse_id,
            lines,
            delivery_address: Some("Kariakoo, Dar".into()),
            notes: None,
        }
    }

    async fn stock_qty(f: &Fixture, item_id: i64) -> i64 {
        catalog::get_stock(&f.db, item_id, f.warehouse_id)
            .await
            .unwrap()
            .unwrap()
            .quantity
    }

    #[tokio::test]
    async fn create_snapshots_prices_and_sums_total() {
        let f = setup().await;
        let order = create(
            &f.db,
            request(
                &f,
                vec![
                    NewOrderLine { item_id: f.panel_id, quantity: 2 },
                    NewOrderLine { item_id: f.bulb_id, quantity: 4 },
                ],
            ),
            "WA",
        )
        .await
        .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.total_amount, 2.0 * 185000.0 + 4.0 * 1500.0);
        let line_sum: f64 = order.lines.iter().map(|l| l.total_price).sum();
        assert_eq!(line_sum, order.total_amount);
        assert_eq!(order.lines[0].item_name, "Solar Panel 150W");

        // Reservation is by validation only -- stock untouched.
        assert_eq!(stock_qty(&f, f.panel_id).await, 10);
        assert_eq!(stock_qty(&f, f.bulb_id).await, 100);
    }

    #[tokio::test]
    async fn order_numbers_use_daily_sequence() {
        let f = setup().await;
        let first = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 1 }]),
            "WA",
        )
        .await
        .unwrap();
        let second = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 1 }]),
            "WA",
        )
        .await
        .unwrap();

        let date = Utc::now().format("%y%m%d").to_string();
        assert_eq!(first.order_number, format!("WA{date}0001"));
        assert_eq!(second.order_number, format!("WA{date}0002"));
    }

    #[tokio::test]
    async fn create_rejects_insufficient_stock() {
        let f = setup().await;
        let err = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.panel_id, quantity: 11 }]),
            "WA",
        )
        .await
        .unwrap_err();

        match err {
            SokoniError::InsufficientStock { item, available, requested } => {
                assert_eq!(item, "Solar Panel 150W");
                assert_eq!(available, 10);
                assert_eq!(requested, 11);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert!(list_all(&f.db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_missing_warehouse_and_item() {
        let f = setup().await;

        let mut req = request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 1 }]);
        req.warehouse_id = 999;
        assert!(matches!(
            create(&f.db, req, "WA").await.unwrap_err(),
            SokoniError::NotFound { entity: "warehouse", .. }
        ));

        let req = request(&f, vec![NewOrderLine { item_id: 999, quantity: 1 }]);
        assert!(matches!(
            create(&f.db, req, "WA").await.unwrap_err(),
            SokoniError::NotFound { entity: "item", .. }
        ));
    }

    #[tokio::test]
    async fn create_rejects_item_without_active_price() {
        let f = setup().await;
        let orphan =
            catalog::insert_item(&f.db, "No Price", None, ItemCondition::New, None, None)
                .await
                .unwrap();
        catalog::insert_stock(&f.db, orphan, f.warehouse_id, 5).await.unwrap();

        let err = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: orphan, quantity: 1 }]),
            "WA",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SokoniError::InvalidState(msg) if msg.contains("active price")));
    }

    #[tokio::test]
    async fn create_rejects_non_positive_quantity() {
        let f = setup().await;
        let err = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 0 }]),
            "WA",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SokoniError::InvalidState(_)));
    }

    #[tokio::test]
    async fn confirmed_stamps_confirmed_at_once() {
        let f = setup().await;
        let order = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 1 }]),
            "WA",
        )
        .await
        .unwrap();

        let confirmed = set_status(&f.db, order.id, OrderStatus::Confirmed).await.unwrap();
        let stamp = confirmed.confirmed_at.clone().unwrap();

        let again = set_status(&f.db, order.id, OrderStatus::Confirmed).await.unwrap();
        assert_eq!(again.confirmed_at.as_deref(), Some(stamp.as_str()));
    }

    #[tokio::test]
    async fn deliver_decrements_stock_and_writes_sales() {
        let f = setup().await;
        customers::ensure(&f.db, "255700000001", "Asha").await.unwrap();
        let order = create(
            &f.db,
            request(
                &f,
                vec![
                    NewOrderLine { item_id: f.panel_id, quantity: 2 },
                    NewOrderLine { item_id: f.bulb_id, quantity: 3 },
                ],
            ),
            "WA",
        )
        .await
        .unwrap();

        let delivered = deliver(&f.db, order.id).await.unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert!(delivered.delivered_at.is_some());

        assert_eq!(stock_qty(&f, f.panel_id).await, 8);
        assert_eq!(stock_qty(&f, f.bulb_id).await, 97);

        let sales = customers::list_sales(&f.db).await.unwrap();
        assert_eq!(sales.len(), 2);
        assert!(sales[0]
            .remarks
            .as_deref()
            .unwrap()
            .contains(&order.order_number));
    }

    #[tokio::test]
    async fn deliver_without_customer_skips_ledger() {
        let f = setup().await;
        let order = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 1 }]),
            "WA",
        )
        .await
        .unwrap();

        deliver(&f.db, order.id).await.unwrap();
        assert!(customers::list_sales(&f.db).await.unwrap().is_empty());
        assert_eq!(stock_qty(&f, f.bulb_id).await, 99);
    }

    #[tokio::test]
    async fn deliver_rejects_when_stock_was_exhausted() {
        let f = setup().await;
        customers::ensure(&f.db, "255700000001", "Asha").await.unwrap();
        let order = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.panel_id, quantity: 5 }]),
            "WA",
        )
        .await
        .unwrap();

        // Another order drained the shelf between reservation and delivery.
        let stock = catalog::get_stock(&f.db, f.panel_id, f.warehouse_id)
            .await
            .unwrap()
            .unwrap();
        catalog::adjust_stock(&f.db, stock.id, 0).await.unwrap();

        let err = deliver(&f.db, order.id).await.unwrap_err();
        assert!(matches!(err, SokoniError::InsufficientStock { available: 0, .. }));

        // Nothing half-applied: status untouched, no sales, stock untouched.
        let order = get(&f.db, order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.delivered_at.is_none());
        assert!(customers::list_sales(&f.db).await.unwrap().is_empty());
        assert_eq!(stock_qty(&f, f.panel_id).await, 0);
    }

    #[tokio::test]
    async fn repeated_delivery_deducts_stock_at_most_once() {
        let f = setup().await;
        let order = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 10 }]),
            "WA",
        )
        .await
        .unwrap();

        deliver(&f.db, order.id).await.unwrap();
        let err = deliver(&f.db, order.id).await.unwrap_err();
        assert!(matches!(err, SokoniError::InvalidState(_)));

        assert_eq!(stock_qty(&f, f.bulb_id).await, 90);
    }

    #[tokio::test]
    async fn cancel_delivered_always_fails_without_mutation() {
        let f = setup().await;
        let order = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 2 }]),
            "WA",
        )
        .await
        .unwrap();
        deliver(&f.db, order.id).await.unwrap();

        let err = cancel(&f.db, order.id).await.unwrap_err();
        assert!(matches!(err, SokoniError::InvalidState(_)));

        let order = get(&f.db, order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(stock_qty(&f, f.bulb_id).await, 98);
    }

    #[tokio::test]
    async fn cancel_pending_order_touches_no_stock() {
        let f = setup().await;
        let order = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.panel_id, quantity: 3 }]),
            "WA",
        )
        .await
        .unwrap();

        let cancelled = cancel(&f.db, order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(stock_qty(&f, f.panel_id).await, 10);
    }

    #[tokio::test]
    async fn cancelled_orders_refuse_further_status_writes() {
        let f = setup().await;
        let order = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 1 }]),
            "WA",
        )
        .await
        .unwrap();
        cancel(&f.db, order.id).await.unwrap();

        let err = set_status(&f.db, order.id, OrderStatus::Processing).await.unwrap_err();
        assert!(matches!(err, SokoniError::InvalidState(_)));
    }

    #[tokio::test]
    async fn total_amount_never_changes_after_creation() {
        let f = setup().await;
        let order = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.panel_id, quantity: 2 }]),
            "WA",
        )
        .await
        .unwrap();
        let original = order.total_amount;

        // A price change after creation must not touch the snapshot.
        catalog::insert_price(&f.db, f.panel_id, 200000.0, true).await.unwrap();

        set_status(&f.db, order.id, OrderStatus::Confirmed).await.unwrap();
        set_status(&f.db, order.id, OrderStatus::Ready).await.unwrap();
        let delivered = deliver(&f.db, order.id).await.unwrap();

        assert_eq!(delivered.total_amount, original);
        let line_sum: f64 = delivered.lines.iter().map(|l| l.total_price).sum();
        assert_eq!(line_sum, original);
    }

    #[tokio::test]
    async fn rating_is_delivered_only_and_write_once() {
        let f = setup().await;
        let order = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 1 }]),
            "WA",
        )
        .await
        .unwrap();

        assert!(matches!(
            rate(&f.db, order.id, 5, None).await.unwrap_err(),
            SokoniError::InvalidState(_)
        ));

        deliver(&f.db, order.id).await.unwrap();
        assert!(matches!(
            rate(&f.db, order.id, 9, None).await.unwrap_err(),
            SokoniError::InvalidState(_)
        ));

        let rated = rate(&f.db, order.id, 4, Some("asante".into())).await.unwrap();
        assert_eq!(rated.rating, Some(4));
        assert_eq!(rated.feedback.as_deref(), Some("asante"));
        assert!(rated.rated_at.is_some());

        assert!(matches!(
            rate(&f.db, order.id, 5, None).await.unwrap_err(),
            SokoniError::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn delivered_unrated_scopes_to_phone_and_rating() {
        let f = setup().await;
        let mine = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 1 }]),
            "WA",
        )
        .await
        .unwrap();
        deliver(&f.db, mine.id).await.unwrap();

        let mut other_req = request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 1 }]);
        other_req.customer_phone = "255799999999".into();
        let other = create(&f.db, other_req, "WA").await.unwrap();
        deliver(&f.db, other.id).await.unwrap();

        let unrated = delivered_unrated(&f.db, "255700000001").await.unwrap();
        assert_eq!(unrated.len(), 1);
        assert_eq!(unrated[0].id, mine.id);

        rate(&f.db, mine.id, 5, None).await.unwrap();
        assert!(delivered_unrated(&f.db, "255700000001").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_counts_and_revenue_exclude_cancelled() {
        let f = setup().await;
        let a = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 2 }]),
            "WA",
        )
        .await
        .unwrap();
        let b = create(
            &f.db,
            request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 4 }]),
            "WA",
        )
        .await
        .unwrap();
        deliver(&f.db, a.id).await.unwrap();
        cancel(&f.db, b.id).await.unwrap();

        let stats = stats(&f.db).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.total_revenue, 3000.0);
    }

    #[tokio::test]
    async fn history_limits_and_orders_newest_first() {
        let f = setup().await;
        for _ in 0..3 {
            create(
                &f.db,
                request(&f, vec![NewOrderLine { item_id: f.bulb_id, quantity: 1 }]),
                "WA",
            )
            .await
            .unwrap();
        }

        let recent = history(&f.db, "255700000001", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].id > recent[1].id);
    }
}
