// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog fixtures shared by integration tests across the workspace.

use sokoni_core::types::ItemCondition;
use sokoni_storage::queries::{catalog, customers};
use sokoni_storage::Database;

/// Ids of the seeded catalog, returned by [`seed_catalog`].
#[derive(Debug, Clone)]
pub struct CatalogFixture {
    pub warehouse_id: i64,
    pub solar_category_id: i64,
    pub lighting_category_id: i64,
    /// "Solar Panel 150W", code SP-150, price 185000, stock 10, has an image.
    pub panel_id: i64,
    /// "LED Bulb 9W", code LB-9, price 1500, stock 100, no image.
    pub bulb_id: i64,
}

/// Seeds one warehouse, two categories, and two sellable items.
pub async fn seed_catalog(db: &Database) -> CatalogFixture {
    let warehouse_id = customers::insert_warehouse(db, "Main Warehouse")
        .await
        .expect("seed warehouse");

    let solar_category_id = catalog::insert_category(db, "SOLAR", "Solar equipment")
        .await
        .expect("seed category");
    let lighting_category_id = catalog::insert_category(db, "LIGHT", "Lighting")
        .await
        .expect("seed category");

    let panel_id = catalog::insert_item(
        db,
        "Solar Panel 150W",
        Some("SP-150"),
        ItemCondition::New,
        Some(solar_category_id),
        Some("https://cdn.example.com/items/sp-150.jpg"),
    )
    .await
    .expect("seed item");
    catalog::insert_price(db, panel_id, 185000.0, true)
        .await
        .expect("seed price");
    catalog::insert_stock(db, panel_id, warehouse_id, 10)
        .await
        .expect("seed stock");

    let bulb_id = catalog::insert_item(
        db,
        "LED Bulb 9W",
        Some("LB-9"),
        ItemCondition::New,
        Some(lighting_category_id),
        None,
    )
    .await
    .expect("seed item");
    catalog::insert_price(db, bulb_id, 1500.0, true)
        .await
        .expect("seed price");
    catalog::insert_stock(db, bulb_id, warehouse_id, 100)
        .await
        .expect("seed stock");

    CatalogFixture {
        warehouse_id,
        solar_category_id,
        lighting_category_id,
        panel_id,
        bulb_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seed_catalog_produces_sellable_items() {
        let db = Database::open_in_memory().await.unwrap();
        let fixture = seed_catalog(&db).await;

        let panel = catalog::get_item(&db, fixture.panel_id).await.unwrap().unwrap();
        assert_eq!(panel.active_price, Some(185000.0));
        assert_eq!(
            panel.stock_at(fixture.warehouse_id).map(|s| s.quantity),
            Some(10)
        );
        assert!(panel.image_url.is_some());

        let bulb = catalog::get_item(&db, fixture.bulb_id).await.unwrap().unwrap();
        assert!(bulb.image_url.is_none());
    }
}
