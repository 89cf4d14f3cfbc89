// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog and inventory queries: items, active prices, per-warehouse stock,
//! and categories.
//!
//! Items are loaded with their active price and stock levels attached, the
//! shape the dialogue engine renders from. The one inventory mutation
//! exposed here is [`adjust_stock`]; the delivery-time decrement lives in
//! `queries::orders` because it must share the delivery transaction.

use std::str::FromStr;

use rusqlite::{params, OptionalExtension};
use sokoni_core::types::{Category, Item, ItemCondition, StockLevel};
use sokoni_core::SokoniError;

use crate::database::{domain_err, map_tr_err, Database};

/// Loads one item with active price and stock rows attached.
fn load_item(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Item>> {
    let base = conn
        .query_row(
            "SELECT id, name, code, condition, description, image_url, category_id
             FROM items WHERE id = ?1",
            params![id],
            |row| {
                let condition: String = row.get(3)?;
                Ok(Item {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    code: row.get(2)?,
                    condition: ItemCondition::from_str(&condition).unwrap_or(ItemCondition::New),
                    description: row.get(4)?,
                    image_url: row.get(5)?,
                    category_id: row.get(6)?,
                    active_price: None,
                    stock: Vec::new(),
                })
            },
        )
        .optional()?;

    let Some(mut item) = base else {
        return Ok(None);
    };

    item.active_price = conn
        .query_row(
            "SELECT selling_price FROM item_prices
             WHERE item_id = ?1 AND is_active = 1
             ORDER BY id DESC LIMIT 1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    let mut stmt = conn.prepare(
        "SELECT id, item_id, warehouse_id, quantity FROM item_stock
         WHERE item_id = ?1 ORDER BY warehouse_id",
    )?;
    let rows = stmt.query_map(params![id], |row| {
        Ok(StockLevel {
            id: row.get(0)?,
            item_id: row.get(1)?,
            warehouse_id: row.get(2)?,
            quantity: row.get(3)?,
        })
    })?;
    for row in rows {
        item.stock.push(row?);
    }

    Ok(Some(item))
}

fn load_items(conn: &rusqlite::Connection, ids: Vec<i64>) -> rusqlite::Result<Vec<Item>> {
    let mut items = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(item) = load_item(conn, id)? {
            items.push(item);
        }
    }
    Ok(items)
}

/// Fetch an item by id with price and stock attached.
pub async fn get_item(db: &Database, id: i64) -> Result<Option<Item>, SokoniError> {
    db.connection()
        .call(move |conn| Ok(load_item(conn, id)?))
        .await
        .map_err(map_tr_err)
}

/// Exact, case-insensitive lookup by product code.
pub async fn find_by_code(db: &Database, code: &str) -> Result<Option<Item>, SokoniError> {
    let code = code.to_string();
    db.connection()
        .call(move |conn| {
            let id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM items WHERE code IS NOT NULL AND lower(code) = lower(?1)",
                    params![code],
                    |row| row.get(0),
                )
                .optional()?;
            match id {
                Some(id) => Ok(load_item(conn, id)?),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Case-insensitive substring search on item name.
pub async fn search_by_name(db: &Database, query: &str) -> Result<Vec<Item>, SokoniError> {
    let query = query.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM items
                 WHERE lower(name) LIKE '%' || lower(?1) || '%'
                 ORDER BY name",
            )?;
            let ids = stmt
                .query_map(params![query], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            Ok(load_items(conn, ids)?)
        })
        .await
        .map_err(map_tr_err)
}

/// Items belonging to one category.
pub async fn items_in_category(
    db: &Database,
    category_id: i64,
) -> Result<Vec<Item>, SokoniError> {
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM items WHERE category_id = ?1 ORDER BY name")?;
            let ids = stmt
                .query_map(params![category_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            Ok(load_items(conn, ids)?)
        })
        .await
        .map_err(map_tr_err)
}

/// All item categories.
pub async fn list_categories(db: &Database) -> Result<Vec<Category>, SokoniError> {
    db.connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, code, description FROM categories ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    code: row.get(1)?,
                    description: row.get(2)?,
                })
            })?;
            let mut categories = Vec::new();
            for row in rows {
                categories.push(row?);
            }
            Ok(categories)
        })
        .await
        .map_err(map_tr_err)
}

/// Stock record for one item at one warehouse.
pub async fn get_stock(
    db: &Database,
    item_id: i64,
    warehouse_id: i64,
) -> Result<Option<StockLevel>, SokoniError> {
    db.connection()
        .call(move |conn| {
            let result = conn
                .query_row(
                    "SELECT id, item_id, warehouse_id, quantity FROM item_stock
                     WHERE item_id = ?1 AND warehouse_id = ?2",
                    params![item_id, warehouse_id],
                    |row| {
                        Ok(StockLevel {
                            id: row.get(0)?,
                            item_id: row.get(1)?,
                            warehouse_id: row.get(2)?,
                            quantity: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(result)
        })
        .await
        .map_err(map_tr_err)
}

/// Set the absolute quantity of a stock record.
pub async fn adjust_stock(
    db: &Database,
    stock_id: i64,
    new_quantity: i64,
) -> Result<(), SokoniError> {
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE item_stock SET quantity = ?1 WHERE id = ?2",
                params![new_quantity, stock_id],
            )?;
            if changed == 0 {
                return Err(domain_err(SokoniError::not_found("stock record", stock_id)));
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

// --- Inserts (seeding and tests) ---

/// Insert a category, returning its id.
pub async fn insert_category(
    db: &Database,
    code: &str,
    description: &str,
) -> Result<i64, SokoniError> {
    let code = code.to_string();
    let description = description.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO categories (code, description) VALUES (?1, ?2)",
                params![code, description],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Insert an item, returning its id.
pub async fn insert_item(
    db: &Database,
    name: &str,
    code: Option<&str>,
    condition: ItemCondition,
    category_id: Option<i64>,
    image_url: Option<&str>,
) -> Result<i64, SokoniError> {
    let name = name.to_string();
    let code = code.map(str::to_string);
    let condition = condition.to_string();
    let image_url = image_url.map(str::to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO items (name, code, condition, category_id, image_url)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![name, code, condition, category_id, image_url],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a price row for an item.
pub async fn insert_price(
    db: &Database,
    item_id: i64,
    selling_price: f64,
    is_active: bool,
) -> Result<i64, SokoniError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO item_prices (item_id, selling_price, is_active)
                 VALUES (?1, ?2, ?3)",
                params![item_id, selling_price, is_active as i64],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a stock record for an item at a warehouse.
pub async fn insert_stock(
    db: &Database,
    item_id: i64,
    warehouse_id: i64,
    quantity: i64,
) -> Result<i64, SokoniError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO item_stock (item_id, warehouse_id, quantity)
                 VALUES (?1, ?2, ?3)",
                params![item_id, warehouse_id, quantity],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::customers;

    async fn seed_one(db: &Database) -> (i64, i64) {
        let wh = customers::insert_warehouse(db, "Main").await.unwrap();
        let cat = insert_category(db, "SOLAR", "Solar equipment").await.unwrap();
        let item = insert_item(db, "Solar Panel 150W", Some("SP-150"), ItemCondition::New, Some(cat), None)
            .await
            .unwrap();
        insert_price(db, item, 185000.0, true).await.unwrap();
        insert_stock(db, item, wh, 10).await.unwrap();
        (item, wh)
    }

    #[tokio::test]
    async fn get_item_attaches_price_and_stock() {
        let db = Database::open_in_memory().await.unwrap();
        let (item_id, wh) = seed_one(&db).await;

        let item = get_item(&db, item_id).await.unwrap().unwrap();
        assert_eq!(item.name, "Solar Panel 150W");
        assert_eq!(item.active_price, Some(185000.0));
        assert_eq!(item.stock_at(wh).map(|s| s.quantity), Some(10));
    }

    #[tokio::test]
    async fn inactive_price_is_not_active_price() {
        let db = Database::open_in_memory().await.unwrap();
        let item = insert_item(&db, "Old Lamp", None, ItemCondition::Used, None, None)
            .await
            .unwrap();
        insert_price(&db, item, 900.0, false).await.unwrap();

        let item = get_item(&db, item).await.unwrap().unwrap();
        assert_eq!(item.active_price, None);
    }

    #[tokio::test]
    async fn find_by_code_ignores_case() {
        let db = Database::open_in_memory().await.unwrap();
        let (item_id, _) = seed_one(&db).await;

        let found = find_by_code(&db, "sp-150").await.unwrap().unwrap();
        assert_eq!(found.id, item_id);
        assert!(find_by_code(&db, "NOPE-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_by_name_is_substring_case_insensitive() {
        let db = Database::open_in_memory().await.unwrap();
        seed_one(&db).await;
        insert_item(&db, "LED Bulb 9W", None, ItemCondition::New, None, None)
            .await
            .unwrap();

        let hits = search_by_name(&db, "panel").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Solar Panel 150W");

        assert!(search_by_name(&db, "toaster").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn items_in_category_filters() {
        let db = Database::open_in_memory().await.unwrap();
        let (_, _) = seed_one(&db).await;
        let other_cat = insert_category(&db, "AUDIO", "Audio gear").await.unwrap();
        insert_item(&db, "Speaker", None, ItemCondition::New, Some(other_cat), None)
            .await
            .unwrap();

        let audio = items_in_category(&db, other_cat).await.unwrap();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].name, "Speaker");
    }

    #[tokio::test]
    async fn adjust_stock_sets_quantity() {
        let db = Database::open_in_memory().await.unwrap();
        let (item_id, wh) = seed_one(&db).await;
        let stock = get_stock(&db, item_id, wh).await.unwrap().unwrap();

        adjust_stock(&db, stock.id, 3).await.unwrap();
        let stock = get_stock(&db, item_id, wh).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 3);
    }

    #[tokio::test]
    async fn adjust_stock_missing_record_is_not_found() {
        let db = Database::open_in_memory().await.unwrap();
        let err = adjust_stock(&db, 999, 3).await.unwrap_err();
        assert!(matches!(err, SokoniError::NotFound { .. }));
    }
}
