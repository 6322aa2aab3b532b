use chrono::Local;
use serde::{Deserialize, Serialize};

/// Timestamp format used across all emitted records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time rendered in the record timestamp format.
pub fn record_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Stock state derived from the captured inventory counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    #[serde(rename = "In Stock")]
    InStock,
    #[serde(rename = "Out of Stock")]
    OutOfStock,
}

impl Availability {
    /// Inventory above zero means in stock; zero, negative or absent means out.
    pub fn from_inventory(inventory: Option<i64>) -> Self {
        match inventory {
            Some(n) if n > 0 => Availability::InStock,
            _ => Availability::OutOfStock,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::InStock => "In Stock",
            Availability::OutOfStock => "Out of Stock",
        }
    }
}

/// One normalized catalog row, independent of which payload encoding it came
/// from. Serde names match the CSV header set consumed downstream; decimal
/// fields stay `String` because the feeds mix numbers with `"N/A"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Subcategory")]
    pub subcategory: String,
    #[serde(rename = "Item Name")]
    pub item_name: String,
    #[serde(rename = "Brand")]
    pub brand: String,
    #[serde(rename = "Mrp")]
    pub mrp: String,
    #[serde(rename = "Price")]
    pub price: String,
    #[serde(rename = "Weight/pack_size")]
    pub pack_size: String,
    #[serde(rename = "Delivery ETA")]
    pub delivery_eta: String,
    pub availability: Availability,
    pub inventory: String,
    pub store_id: String,
    pub base_product_id: String,
    pub shelf_life_in_hours: String,
    pub timestamp: String,
    pub pincode_input: String,
    pub clicked_label: String,
}

/// What the location step actually achieved for one postal code. Threaded
/// explicitly into every scrape call so records carry the session they were
/// captured under.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub delivery_eta: String,
    pub store_id: String,
    pub clicked_location_label: String,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            delivery_eta: "N/A".to_string(),
            store_id: "N/A".to_string(),
            clicked_location_label: "N/A".to_string(),
        }
    }
}

/// A unit of work pulled competitively by pipeline workers.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItem {
    /// Full catalog sweep for one postal code.
    Assortment { pincode: String },
    /// Single product-page availability check under one postal code.
    Availability { url: String, pincode: String },
}

impl WorkItem {
    pub fn pincode(&self) -> &str {
        match self {
            WorkItem::Assortment { pincode } => pincode,
            WorkItem::Availability { pincode, .. } => pincode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Failed,
}

/// One row of the per-work-item metrics feed. Exactly one is emitted per item,
/// whether the item succeeded or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    #[serde(rename = "Pincode")]
    pub pincode: String,
    #[serde(rename = "Status")]
    pub status: RunStatus,
    #[serde(rename = "Categories_Scraped")]
    pub categories_scraped: usize,
    #[serde(rename = "Products_Found")]
    pub products_found: usize,
    #[serde(rename = "Start_Time")]
    pub start_time: String,
    #[serde(rename = "End_Time")]
    pub end_time: String,
    #[serde(rename = "Duration_Seconds")]
    pub duration_seconds: f64,
    #[serde(rename = "Error_Message")]
    pub error_message: String,
}

/// Tagged sink-queue message. `EndOfStream` is the shutdown sentinel — sent
/// exactly once per channel, after all producers have been joined.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkMessage<T> {
    Data(T),
    EndOfStream,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_derives_from_inventory() {
        assert_eq!(Availability::from_inventory(Some(3)), Availability::InStock);
        assert_eq!(Availability::from_inventory(Some(1)), Availability::InStock);
        assert_eq!(
            Availability::from_inventory(Some(0)),
            Availability::OutOfStock
        );
        assert_eq!(
            Availability::from_inventory(Some(-2)),
            Availability::OutOfStock
        );
        assert_eq!(Availability::from_inventory(None), Availability::OutOfStock);
    }

    #[test]
    fn availability_serializes_to_display_strings() {
        assert_eq!(
            serde_json::to_string(&Availability::InStock).unwrap(),
            "\"In Stock\""
        );
        assert_eq!(
            serde_json::to_string(&Availability::OutOfStock).unwrap(),
            "\"Out of Stock\""
        );
    }

    #[test]
    fn session_context_defaults_to_na() {
        let ctx = SessionContext::default();
        assert_eq!(ctx.delivery_eta, "N/A");
        assert_eq!(ctx.store_id, "N/A");
        assert_eq!(ctx.clicked_location_label, "N/A");
    }

    #[test]
    fn product_record_uses_csv_header_names() {
        let record = ProductRecord {
            category: "Fruits & Vegetables".into(),
            subcategory: "Fresh Fruits".into(),
            item_name: "Banana".into(),
            brand: "Unknown".into(),
            mrp: "60.0".into(),
            price: "45.0".into(),
            pack_size: "6 pcs".into(),
            delivery_eta: "8 mins".into(),
            availability: Availability::InStock,
            inventory: "10".into(),
            store_id: "abc-123".into(),
            base_product_id: "/pn/banana/pvid/uuid-1".into(),
            shelf_life_in_hours: "72".into(),
            timestamp: "2025-01-01 00:00:00".into(),
            pincode_input: "560001".into(),
            clicked_label: "Bengaluru 560001".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["Item Name"], "Banana");
        assert_eq!(json["Weight/pack_size"], "6 pcs");
        assert_eq!(json["Delivery ETA"], "8 mins");
        assert_eq!(json["availability"], "In Stock");
    }
}
