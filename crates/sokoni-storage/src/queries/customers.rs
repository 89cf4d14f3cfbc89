// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Customer directory, warehouse directory, and the accounting sale ledger.

use rusqlite::{params, OptionalExtension};
use sokoni_core::types::{Customer, NewSale, SaleRecord, Warehouse};
use sokoni_core::SokoniError;

use crate::database::{map_tr_err, Database};

/// Look up a customer by phone number.
pub async fn find_by_phone(db: &Database, phone: &str) -> Result<Option<Customer>, SokoniError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn
                .query_row(
                    "SELECT id, name, phone FROM customers WHERE phone = ?1",
                    params![phone],
                    |row| {
                        Ok(Customer {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            phone: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(result)
        })
        .await
        .map_err(map_tr_err)
}

/// Look up a customer by phone, creating the record if absent.
///
/// The name is only used on first creation; an existing record keeps its name.
pub async fn ensure(db: &Database, phone: &str, name: &str) -> Result<Customer, SokoniError> {
    let phone = phone.to_string();
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO customers (name, phone) VALUES (?1, ?2)",
                params![name, phone],
            )?;
            let customer = conn.query_row(
                "SELECT id, name, phone FROM customers WHERE phone = ?1",
                params![phone],
                |row| {
                    Ok(Customer {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                    })
                },
            )?;
            Ok(customer)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a warehouse by id.
pub async fn get_warehouse(db: &Database, id: i64) -> Result<Option<Warehouse>, SokoniError> {
    db.connection()
        .call(move |conn| {
            let result = conn
                .query_row(
                    "SELECT id, name FROM warehouses WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(Warehouse {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(result)
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a warehouse, returning its id.
pub async fn insert_warehouse(db: &Database, name: &str) -> Result<i64, SokoniError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("INSERT INTO warehouses (name) VALUES (?1)", params![name])?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Record one sale-ledger row.
///
/// The delivery transition writes its sale rows inside the delivery
/// transaction (`queries::orders::deliver`); this standalone insert serves
/// other callers of the ledger.
pub async fn record_sale(db: &Database, sale: NewSale) -> Result<i64, SokoniError> {
    let now = chrono::Utc::now().to_rfc3339();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sales (customer_id, item_id, warehouse_id, quantity, amount_paid, remarks, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    sale.customer_id,
                    sale.item_id,
                    sale.warehouse_id,
                    sale.quantity,
                    sale.amount_paid,
                    sale.remarks,
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// All sale-ledger rows, oldest first.
pub async fn list_sales(db: &Database) -> Result<Vec<SaleRecord>, SokoniError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, customer_id, item_id, warehouse_id, quantity, amount_paid, remarks, created_at
                 FROM sales ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(SaleRecord {
                    id: row.get(0)?,
                    customer_id: row.get(1)?,
                    item_id: row.get(2)?,
                    warehouse_id: row.get(3)?,
                    quantity: row.get(4)?,
                    amount_paid: row.get(5)?,
                    remarks: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?;
            let mut sales = Vec::new();
            for row in rows {
                sales.push(row?);
            }
            Ok(sales)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_creates_then_reuses() {
        let db = Database::open_in_memory().await.unwrap();

        let first = ensure(&db, "255700000001", "Asha").await.unwrap();
        let second = ensure(&db, "255700000001", "Somebody Else").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Asha");
    }

    #[tokio::test]
    async fn find_by_phone_misses_cleanly() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(find_by_phone(&db, "255799999999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn warehouse_round_trip() {
        let db = Database::open_in_memory().await.unwrap();
        let id = insert_warehouse(&db, "Dar Depot").await.unwrap();
        let wh = get_warehouse(&db, id).await.unwrap().unwrap();
        assert_eq!(wh.name, "Dar Depot");
        assert!(get_warehouse(&db, id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_sale_appends_ledger_row() {
        let db = Database::open_in_memory().await.unwrap();
        let wh = insert_warehouse(&db, "Main").await.unwrap();
        let customer = ensure(&db, "255700000001", "Asha").await.unwrap();
        let item = crate::queries::catalog::insert_item(
            &db,
            "Bulb",
            None,
            crate::models::ItemCondition::New,
            None,
            None,
        )
        .await
        .unwrap();

        record_sale(
            &db,
            NewSale {
                customer_id: customer.id,
                item_id: item,
                warehouse_id: wh,
                quantity: 2,
                amount_paid: 3000.0,
                remarks: Some("walk-in".into()),
            },
        )
        .await
        .unwrap();

        let sales = list_sales(&db).await.unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].quantity, 2);
        assert_eq!(sales[0].remarks.as_deref(), Some("walk-in"));
    }
}
