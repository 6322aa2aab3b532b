//! Regex recovery path. Some category payloads arrive as server-rendered
//! markup whose product data is double-encoded: JSON attributes appear as
//! escaped `\"key\":value` pairs while names, pack sizes and prices sit in
//! nearby HTML. Nothing ties an attribute block to its anchor structurally,
//! so the join is positional: attributes found within `PROXIMITY_WINDOW`
//! bytes of a product id are credited to that id.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use super::{title_case_segment, RecordContext};
use crate::core::types::{record_timestamp, Availability, ProductRecord};

/// Join radius around an escaped product id, in bytes. Wide enough to span
/// one card's attribute block; on unusually dense listings two adjacent cards
/// can fall inside one window and misjoin, which is accepted — the first
/// match per attribute wins.
pub(crate) const PROXIMITY_WINDOW: usize = 1000;

/// How far past an anchor to look for its link text and price cell.
const ANCHOR_LOOKAHEAD: usize = 800;

/// Name prefixes up to this length before `" - "` are treated as a brand.
const BRAND_PREFIX_MAX: usize = 25;

fn id_attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\\"id\\":\\"([a-f0-9\-]+)\\""#).unwrap())
}

fn quantity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\\"availableQuantity\\":(\d+)"#).unwrap())
}

fn shelf_life_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\\"shelfLifeInHours\\":\\"([^"\\]+)\\""#).unwrap())
}

fn packsize_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\\"packsize\\":(\d+)"#).unwrap())
}

fn product_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href="(/pn/[^"]+)""#).unwrap())
}

fn link_text_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r">([^<]+)</a>").unwrap())
}

fn ordinal_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\s*").unwrap())
}

fn pack_unit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(\d+(?:\.\d+)?\s*(?:kg|g|gm|gms|ml|l|ltr|litre|litres|pc|pcs|piece|pieces|unit|units|pack|packs|bunch|bunches)\b)",
        )
        .unwrap()
    })
}

fn price_cell_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<td>₹(\d+)</td>").unwrap())
}

#[derive(Debug, Default, Clone)]
struct RecoveredAttrs {
    inventory: Option<String>,
    shelf_life: Option<String>,
    pack_count: Option<String>,
}

fn clamp_start(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn clamp_end(text: &str, mut i: usize) -> usize {
    if i >= text.len() {
        return text.len();
    }
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Pass 1: collect escaped attributes near each escaped product id.
fn attr_map(text: &str) -> HashMap<String, RecoveredAttrs> {
    let mut map: HashMap<String, RecoveredAttrs> = HashMap::new();
    for caps in id_attr_regex().captures_iter(text) {
        let id = caps[1].to_string();
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        let start = clamp_start(text, whole.0.saturating_sub(PROXIMITY_WINDOW));
        let end = clamp_end(text, whole.1 + PROXIMITY_WINDOW);
        let window = &text[start..end];

        let entry = map.entry(id).or_default();
        if entry.inventory.is_none() {
            entry.inventory = quantity_regex().captures(window).map(|c| c[1].to_string());
        }
        if entry.shelf_life.is_none() {
            entry.shelf_life = shelf_life_regex().captures(window).map(|c| c[1].to_string());
        }
        if entry.pack_count.is_none() {
            entry.pack_count = packsize_regex().captures(window).map(|c| c[1].to_string());
        }
    }
    map
}

/// Pass 2: walk product anchors, pulling name, brand, pack size and price
/// from surrounding markup and joining pass-1 attributes by product id.
pub fn parse(text: &str, ctx: &RecordContext) -> Vec<ProductRecord> {
    let attrs = attr_map(text);
    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for caps in product_link_regex().captures_iter(text) {
        let url_part = caps[1].to_string();
        if !seen.insert(url_part.clone()) {
            continue;
        }
        let anchor_end = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let snippet_end = clamp_end(text, anchor_end + ANCHOR_LOOKAHEAD);
        let snippet = &text[anchor_end..snippet_end];

        let slug = url_part
            .strip_prefix("/pn/")
            .and_then(|rest| rest.split('/').next())
            .unwrap_or("");
        let pvid = url_part
            .split("pvid/")
            .nth(1)
            .map(|s| s.trim_end_matches('/').to_string());

        let name = link_text_regex()
            .captures(snippet)
            .map(|c| clean_link_text(&c[1]))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| title_case_segment(slug));
        if name.is_empty() {
            continue;
        }

        let recovered = pvid.as_deref().and_then(|id| attrs.get(id));
        let brand = brand_for(slug, &name);
        // Unit suffix in the display name beats the escaped pack counter.
        let pack_size = pack_unit_regex()
            .captures(&name)
            .map(|c| c[1].to_string())
            .or_else(|| recovered.and_then(|a| a.pack_count.clone()))
            .unwrap_or_else(|| "N/A".to_string());
        let price = price_cell_regex()
            .captures(snippet)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "N/A".to_string());

        let inventory = recovered
            .and_then(|a| a.inventory.clone())
            .unwrap_or_else(|| "N/A".to_string());
        let shelf_life = recovered
            .and_then(|a| a.shelf_life.clone())
            .unwrap_or_else(|| "N/A".to_string());

        out.push(ProductRecord {
            category: ctx.category.clone(),
            subcategory: ctx.subcategory.clone(),
            item_name: name,
            brand,
            mrp: price.clone(),
            price,
            pack_size,
            delivery_eta: ctx.session.delivery_eta.clone(),
            availability: Availability::from_inventory(inventory.parse::<i64>().ok()),
            inventory,
            store_id: ctx.session.store_id.clone(),
            base_product_id: url_part,
            shelf_life_in_hours: shelf_life,
            timestamp: record_timestamp(),
            pincode_input: ctx.pincode.clone(),
            clicked_label: ctx.session.clicked_location_label.clone(),
        });
    }
    out
}

fn clean_link_text(raw: &str) -> String {
    let cleaned = raw.replace("<!-- -->", " ");
    let trimmed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    ordinal_prefix_regex().replace(&trimmed, "").to_string()
}

/// Slug's first segment names the brand most of the time; a short `" - "`
/// prefix in the display name is more precise when present.
fn brand_for(slug: &str, name: &str) -> String {
    if let Some(prefix) = name.split(" - ").next() {
        if prefix != name && !prefix.is_empty() && prefix.len() < BRAND_PREFIX_MAX {
            return prefix.to_string();
        }
    }
    let first = slug.split('-').next().unwrap_or("");
    if first.is_empty() {
        "Unknown".to_string()
    } else {
        title_case_segment(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SessionContext;

    fn ctx() -> RecordContext {
        RecordContext::from_category_url(
            "https://example.com/cn/fruits-vegetables/fresh-fruits/cid/abc",
            "560001",
            &SessionContext::default(),
        )
    }

    const PVID: &str = "11111111-2222-3333-4444-555555555555";

    fn sample_text() -> String {
        format!(
            concat!(
                r#"prelude \"id\":\"{id}\",\"availableQuantity\":7,"#,
                r#"\"packsize\":6,\"shelfLifeInHours\":\"72\" filler "#,
                r#"<a href="/pn/fresh-banana/pvid/{id}">2. Fresh - Banana 6 pcs</a>"#,
                r#"<tr><td>₹45</td></tr>"#,
            ),
            id = PVID
        )
    }

    #[test]
    fn joins_attributes_by_proximity() {
        let records = parse(&sample_text(), &ctx());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.item_name, "Fresh - Banana 6 pcs");
        assert_eq!(r.brand, "Fresh");
        assert_eq!(r.pack_size, "6 pcs");
        assert_eq!(r.price, "45");
        assert_eq!(r.mrp, "45");
        assert_eq!(r.inventory, "7");
        assert_eq!(r.shelf_life_in_hours, "72");
        assert_eq!(r.availability, Availability::InStock);
        assert_eq!(r.base_product_id, format!("/pn/fresh-banana/pvid/{}", PVID));
    }

    #[test]
    fn anchor_without_attributes_is_out_of_stock() {
        let text = r#"<a href="/pn/amul-butter/pvid/99999999-aaaa-bbbb-cccc-dddddddddddd">Amul Butter 100 g</a>"#;
        let records = parse(text, &ctx());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.inventory, "N/A");
        assert_eq!(r.availability, Availability::OutOfStock);
        assert_eq!(r.shelf_life_in_hours, "N/A");
        assert_eq!(r.price, "N/A");
        assert_eq!(r.pack_size, "100 g");
        // No " - " prefix, so the slug supplies the brand.
        assert_eq!(r.brand, "Amul");
    }

    #[test]
    fn duplicate_anchors_collapse() {
        let text = format!("{}{}", sample_text(), sample_text());
        let records = parse(&text, &ctx());
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_link_text_derives_name_from_slug() {
        let text = r#"<a href="/pn/organic-tomato/pvid/12345678-1111-2222-3333-444444444444"><img src="x"/></a>"#;
        let records = parse(text, &ctx());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].item_name, "Organic Tomato");
    }

    #[test]
    fn attributes_outside_window_do_not_join() {
        let far = "x".repeat(PROXIMITY_WINDOW + 100);
        let text = format!(
            r#"\"id\":\"{id}\",\"availableQuantity\":9{far}<a href="/pn/far-item/pvid/{id}">Far Item</a>"#,
            id = "aaaaaaaa-1111-2222-3333-bbbbbbbbbbbb",
            far = far
        );
        // Pass 1 still keyed the attributes by id, so the join works even when
        // the anchor is far away; proximity only constrains id-to-attribute.
        let records = parse(&text, &ctx());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].inventory, "9");
    }

    #[test]
    fn ordinal_and_comment_noise_is_stripped() {
        assert_eq!(clean_link_text("3. Milk<!-- --> 500 ml"), "Milk 500 ml");
        assert_eq!(clean_link_text("Plain Name"), "Plain Name");
    }
}
