//! Streamed-component ("flight") path. Category pages stream their state as
//! newline-delimited chunks, each `<id>:<json>`; product cards sit at
//! arbitrary depth under `cardData` keys. The same card id can stream several
//! times as the page hydrates — the last occurrence is authoritative, while
//! first-appearance order is kept for output stability.

use std::collections::HashMap;

use serde_json::Value;

use super::{format_price_minor, value_to_display, value_to_f64, value_to_i64, RecordContext};
use crate::core::types::{record_timestamp, Availability, ProductRecord};

pub fn parse(text: &str, ctx: &RecordContext) -> Vec<ProductRecord> {
    collect_cards(text)
        .into_iter()
        .filter_map(|(id, card)| record_from_card(&id, &card, ctx))
        .collect()
}

/// Decode every chunk line and gather `cardData` payloads, keyed by card id.
fn collect_cards(text: &str) -> Vec<(String, Value)> {
    let mut order: Vec<String> = Vec::new();
    let mut cards: HashMap<String, Value> = HashMap::new();

    for line in text.lines() {
        if !line.contains("cardData") {
            continue;
        }
        // Chunks are usually `1a:{...}`; bare JSON lines appear in buffered
        // captures, so try the whole line first.
        let decoded: Option<Value> = serde_json::from_str(line).ok().or_else(|| {
            line.split_once(':')
                .and_then(|(_, rest)| serde_json::from_str(rest).ok())
        });
        let Some(value) = decoded else { continue };

        let mut found = Vec::new();
        find_cards(&value, &mut found);
        for card in found {
            let Some(id) = card.get("id").and_then(|v| v.as_str()).filter(|s| !s.is_empty())
            else {
                continue;
            };
            if !cards.contains_key(id) {
                order.push(id.to_string());
            }
            cards.insert(id.to_string(), card);
        }
    }

    order
        .into_iter()
        .filter_map(|id| cards.remove(&id).map(|card| (id, card)))
        .collect()
}

/// Recursive descent: collect the value of every `cardData` key. The payload
/// is usually an object but occasionally a JSON-encoded string.
fn find_cards(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Object(map) => {
            if let Some(card) = map.get("cardData") {
                match card {
                    Value::Object(_) => out.push(card.clone()),
                    Value::String(s) => {
                        if let Ok(inner) = serde_json::from_str::<Value>(s) {
                            if inner.is_object() {
                                out.push(inner);
                            }
                        }
                    }
                    _ => {}
                }
            }
            for v in map.values() {
                find_cards(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                find_cards(v, out);
            }
        }
        _ => {}
    }
}

fn record_from_card(id: &str, card: &Value, ctx: &RecordContext) -> Option<ProductRecord> {
    let empty = Value::Object(Default::default());
    let product = card.get("product").unwrap_or(&empty);
    let variant = card.get("productVariant").unwrap_or(&empty);

    let name = product
        .get("name")
        .or_else(|| card.get("name"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())?;

    let mrp_minor = value_to_f64(variant.get("mrp")).or_else(|| value_to_f64(card.get("mrp")));
    let price_minor = value_to_f64(card.get("discountedSellingPrice"))
        .or_else(|| value_to_f64(card.get("sellingPrice")))
        .or_else(|| value_to_f64(variant.get("discountedSellingPrice")))
        .or_else(|| value_to_f64(variant.get("sellingPrice")));

    let mrp = mrp_minor
        .map(format_price_minor)
        .unwrap_or_else(|| "N/A".to_string());
    let price = match price_minor {
        Some(p) if p != 0.0 => format_price_minor(p),
        _ => mrp.clone(),
    };

    let inventory =
        value_to_i64(card.get("availableQuantity")).or_else(|| value_to_i64(variant.get("availableQuantity")));
    let pack_size = value_to_display(variant.get("formattedPacksize"))
        .or_else(|| value_to_display(variant.get("packsize")))
        .unwrap_or_else(|| "N/A".to_string());
    let shelf_life = value_to_display(variant.get("shelfLifeInHours"))
        .unwrap_or_else(|| "N/A".to_string());
    let brand = product
        .get("brand")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Unknown")
        .to_string();
    let store_id = card
        .get("storeId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| ctx.session.store_id.clone());

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
        store_id,
        base_product_id: id.to_string(),
        shelf_life_in_hours: shelf_life,
        timestamp: record_timestamp(),
        pincode_input: ctx.pincode.clone(),
        clicked_label: ctx.session.clicked_location_label.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SessionContext;

    fn ctx() -> RecordContext {
        RecordContext::from_category_url(
            "https://example.com/cn/dairy-bread-eggs/milk/cid/xyz",
            "560001",
            &SessionContext::default(),
        )
    }

    fn card_chunk(id: &str, name: &str, price: i64, qty: i64) -> String {
        format!(
            r#"2f:{{"widgets":[{{"cardData":{{"id":"{id}","sellingPrice":{price},"availableQuantity":{qty},"product":{{"name":"{name}","brand":"Amul"}},"productVariant":{{"mrp":6500,"formattedPacksize":"500 ml","shelfLifeInHours":"48"}}}}}}]}}"#
        )
    }

    #[test]
    fn parses_prefixed_chunks() {
        let text = format!(
            "0:[]\n{}\n{}\n",
            card_chunk("c1", "Toned Milk", 5400, 12),
            card_chunk("c2", "Full Cream Milk", 6500, 0),
        );
        let records = parse(&text, &ctx());
        assert_eq!(records.len(), 2);

        let r = &records[0];
        assert_eq!(r.item_name, "Toned Milk");
        assert_eq!(r.brand, "Amul");
        assert_eq!(r.price, "54.0");
        assert_eq!(r.mrp, "65.0");
        assert_eq!(r.pack_size, "500 ml");
        assert_eq!(r.shelf_life_in_hours, "48");
        assert_eq!(r.availability, Availability::InStock);
        assert_eq!(r.base_product_id, "c1");
        assert_eq!(r.category, "Dairy Bread Eggs");

        assert_eq!(records[1].availability, Availability::OutOfStock);
    }

    #[test]
    fn last_chunk_per_card_wins_order_preserved() {
        let text = format!(
            "{}\n{}\n{}\n",
            card_chunk("c1", "Stale Name", 5400, 12),
            card_chunk("c2", "Other", 1000, 1),
            card_chunk("c1", "Fresh Name", 5600, 3),
        );
        let records = parse(&text, &ctx());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].base_product_id, "c1");
        assert_eq!(records[0].item_name, "Fresh Name");
        assert_eq!(records[0].price, "56.0");
        assert_eq!(records[1].base_product_id, "c2");
    }

    #[test]
    fn card_data_encoded_as_string_is_decoded() {
        let inner = r#"{\"id\":\"s1\",\"sellingPrice\":900,\"availableQuantity\":2,\"product\":{\"name\":\"Butter\"}}"#;
        let text = format!(r#"3a:{{"cardData":"{inner}"}}"#);
        let records = parse(&text, &ctx());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].item_name, "Butter");
        assert_eq!(records[0].brand, "Unknown");
    }

    #[test]
    fn undecodable_lines_are_skipped() {
        let text = "1a:{broken json cardData\nnot even close\n";
        assert!(parse(text, &ctx()).is_empty());
    }

    #[test]
    fn zero_price_falls_back_to_mrp() {
        let text = card_chunk("c9", "Curd", 0, 4);
        let records = parse(&text, &ctx());
        assert_eq!(records[0].price, "65.0");
    }
}
