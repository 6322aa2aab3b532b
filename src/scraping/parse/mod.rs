//! Payload normalization. Three parse paths feed one record schema:
//!
//! * `json_api` — well-typed JSON bodies with `products`/`items` arrays.
//! * `flight` — newline-delimited streamed-component chunks (`cardData` trees).
//! * `recover` — escaped-JSON/HTML fragments, regex proximity joins.
//!
//! All paths are pure functions over captured bodies so they are testable
//! without a browser. Per-item failures skip the item; entry points always
//! return a `Vec`.

pub mod flight;
pub mod json_api;
pub mod recover;

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::core::types::{ProductRecord, SessionContext};
use crate::scraping::capture::{CapturedResponse, Payload};

/// Everything record construction needs besides the payload itself.
#[derive(Debug, Clone)]
pub struct RecordContext {
    pub category: String,
    pub subcategory: String,
    pub pincode: String,
    pub session: SessionContext,
}

impl RecordContext {
    /// Derive category/subcategory from a `/cn/<category>/<subcategory>/cid/…`
    /// URL. Hyphens become spaces, words are title-cased; a missing
    /// subcategory segment reads as "All".
    pub fn from_category_url(url: &str, pincode: &str, session: &SessionContext) -> Self {
        let (category, subcategory) = split_category_path(url);
        Self {
            category,
            subcategory,
            pincode: pincode.to_string(),
            session: session.clone(),
        }
    }

    /// Context for a direct product-page availability check.
    pub fn availability_check(pincode: &str, session: &SessionContext) -> Self {
        Self {
            category: "Availability Check".to_string(),
            subcategory: "Direct Link".to_string(),
            pincode: pincode.to_string(),
            session: session.clone(),
        }
    }
}

fn split_category_path(url: &str) -> (String, String) {
    let Some(rest) = url.split("/cn/").nth(1) else {
        return ("Unknown".to_string(), "All".to_string());
    };
    let mut parts = rest.split('/');
    let category = parts
        .next()
        .filter(|s| !s.is_empty())
        .map(title_case_segment)
        .unwrap_or_else(|| "Unknown".to_string());
    let subcategory = match parts.next() {
        Some(seg) if !seg.is_empty() && seg != "cid" => title_case_segment(seg),
        _ => "All".to_string(),
    };
    (category, subcategory)
}

fn title_case_segment(segment: &str) -> String {
    segment
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convert a minor-unit amount (paise) to a display rupee string.
/// Whole amounts keep one decimal place so `6000` reads `"60.0"`.
pub(crate) fn format_price_minor(minor: f64) -> String {
    let rupees = minor / 100.0;
    if rupees.fract() == 0.0 {
        format!("{:.1}", rupees)
    } else {
        rupees.to_string()
    }
}

/// Numbers sometimes arrive as JSON strings; accept both.
pub(crate) fn value_to_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn value_to_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Stringify a scalar field (`"72"` and `72` both mean 72 hours).
pub(crate) fn value_to_display(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn push_deduped(out: &mut Vec<ProductRecord>, seen: &mut HashSet<String>, records: Vec<ProductRecord>) {
    for record in records {
        // First occurrence of a product id wins within one scrape call.
        if seen.insert(record.base_product_id.clone()) {
            out.push(record);
        }
    }
}

/// Full parse set: typed JSON bodies plus regex recovery over text bodies.
pub fn parse_captures(captures: &[CapturedResponse], ctx: &RecordContext) -> Vec<ProductRecord> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for capture in captures {
        match &capture.payload {
            Payload::Json(value) => {
                push_deduped(&mut out, &mut seen, json_api::parse(value, ctx));
            }
            Payload::Text(text) => {
                push_deduped(&mut out, &mut seen, recover::parse(text, ctx));
            }
        }
    }
    debug!(
        category = %ctx.category,
        records = out.len(),
        "full parse complete"
    );
    out
}

/// Fast parse set: typed JSON bodies plus streamed-component chunks. Skips
/// the regex recovery pass.
pub fn parse_captures_fast(
    captures: &[CapturedResponse],
    ctx: &RecordContext,
) -> Vec<ProductRecord> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for capture in captures {
        match &capture.payload {
            Payload::Json(value) => {
                push_deduped(&mut out, &mut seen, json_api::parse(value, ctx));
            }
            Payload::Text(text) => {
                push_deduped(&mut out, &mut seen, flight::parse(text, ctx));
            }
        }
    }
    debug!(
        category = %ctx.category,
        records = out.len(),
        "fast parse complete"
    );
    out
}
