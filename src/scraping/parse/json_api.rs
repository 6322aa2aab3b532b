//! Typed JSON path: API bodies carrying top-level `products` or `items`
//! arrays of well-formed product objects.

use serde_json::Value;

use super::{format_price_minor, value_to_display, value_to_f64, value_to_i64, RecordContext};
use crate::core::types::{record_timestamp, Availability, ProductRecord};

const PRODUCT_ARRAY_KEYS: &[&str] = &["products", "items"];

pub fn parse(value: &Value, ctx: &RecordContext) -> Vec<ProductRecord> {
    let mut out = Vec::new();
    for key in PRODUCT_ARRAY_KEYS {
        if let Some(items) = value.get(key).and_then(|v| v.as_array()) {
            for item in items {
                if let Some(record) = record_from_object(item, ctx) {
                    out.push(record);
                }
            }
        }
    }
    out
}

fn record_from_object(item: &Value, ctx: &RecordContext) -> Option<ProductRecord> {
    let id = item.get("id").and_then(|v| v.as_str()).filter(|s| !s.is_empty())?;
    let name = item
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())?;

    let mrp = value_to_f64(item.get("mrp"))
        .map(format_price_minor)
        .unwrap_or_else(|| "N/A".to_string());
    // A selling price of zero is a feed artifact, not a free product.
    let price = match value_to_f64(item.get("sellingPrice")) {
        Some(p) if p != 0.0 => format_price_minor(p),
        _ => mrp.clone(),
    };

    let inventory = value_to_i64(item.get("availableQuantity"));
    let pack_size = value_to_display(item.get("packsize"))
        .or_else(|| value_to_display(item.get("weightInGms")).map(|g| format!("{} g", g)))
        .unwrap_or_else(|| "N/A".to_string());
    let brand = item
        .get("brand")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Unknown")
        .to_string();
    let shelf_life = value_to_display(item.get("shelfLifeInHours"))
        .unwrap_or_else(|| "N/A".to_string());

    let base_product_id = match item.get("slug").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) {
        Some(slug) => format!("/pn/{}/pvid/{}", slug, id),
        None => format!("/pvid/{}", id),
    };

    Some(ProductRecord {
        category: ctx.category.clone(),
        subcategory: ctx.subcategory.clone(),
        item_name: name.to_string(),
        brand,
        mrp,
        price,
        pack_size,
        delivery_eta: ctx.session.delivery_eta.clone(),
        availability: Availability::from_inventory(inventory),
        inventory: inventory.unwrap_or(0).to_string(),
        store_id: ctx.session.store_id.clone(),
        base_product_id,
        shelf_life_in_hours: shelf_life,
        timestamp: record_timestamp(),
        pincode_input: ctx.pincode.clone(),
        clicked_label: ctx.session.clicked_location_label.clone(),
    })
}
