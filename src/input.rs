//! Work-list loading. Input CSVs come from hand-maintained sheets, so cells
//! are treated as dirty by default: comma-packed values, float-formatted
//! postal codes (`560001.0`) and stray text all appear in the wild.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::core::types::WorkItem;

/// Split one spreadsheet cell into clean 6-digit postal codes.
///
/// A cell may hold several codes separated by commas; numeric cells exported
/// through a spreadsheet often carry a trailing `.0`. Anything that does not
/// end up as exactly six ASCII digits is dropped.
pub fn normalize_pincode_cell(cell: &str) -> Vec<String> {
    cell.split(',')
        .filter_map(|token| {
            let token = token.trim();
            let token = token.strip_suffix(".0").unwrap_or(token);
            let token = token.split('.').next().unwrap_or(token).trim();
            if token.len() == 6 && token.chars().all(|c| c.is_ascii_digit()) {
                Some(token.to_string())
            } else {
                None
            }
        })
        .collect()
}

fn find_column(headers: &csv::StringRecord, matcher: impl Fn(&str) -> bool) -> Option<usize> {
    headers
        .iter()
        .position(|h| matcher(&h.trim().to_ascii_lowercase()))
}

/// Load the deduplicated, sorted postal-code work list for an assortment run.
///
/// The pincode column is matched by name case-insensitively. Rows with no
/// valid code are skipped with a warning rather than failing the run.
pub fn load_pincodes(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open work list {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let col = find_column(&headers, |h| h == "pincode")
        .or_else(|| find_column(&headers, |h| h.contains("pincode")))
        .ok_or_else(|| anyhow!("no pincode column in {}", path.display()))?;

    let mut seen = BTreeSet::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("bad CSV row {} in {}", idx + 2, path.display()))?;
        let cell = row.get(col).unwrap_or("");
        let codes = normalize_pincode_cell(cell);
        if codes.is_empty() && !cell.trim().is_empty() {
            warn!("row {}: no valid pincode in cell {:?}", idx + 2, cell);
        }
        seen.extend(codes);
    }

    let pincodes: Vec<String> = seen.into_iter().collect();
    info!("loaded {} unique pincodes from {}", pincodes.len(), path.display());
    Ok(pincodes)
}

/// Load `(product url, pincode)` pairs for an availability run.
///
/// Column matching is looser here: any header containing `url`/`link` and any
/// containing `pin` qualify, since these sheets come from several sources.
pub fn load_availability_items(path: &Path) -> Result<Vec<WorkItem>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open work list {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let url_col = find_column(&headers, |h| h.contains("url") || h.contains("link"))
        .ok_or_else(|| anyhow!("no url column in {}", path.display()))?;
    let pin_col = find_column(&headers, |h| h.contains("pin"))
        .ok_or_else(|| anyhow!("no pincode column in {}", path.display()))?;

    let mut items = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("bad CSV row {} in {}", idx + 2, path.display()))?;
        let url = row.get(url_col).unwrap_or("").trim().to_string();
        let pins = normalize_pincode_cell(row.get(pin_col).unwrap_or(""));
        if url.is_empty() || pins.is_empty() {
            warn!("row {}: skipped (url or pincode missing)", idx + 2);
            continue;
        }
        for pincode in pins {
            items.push(WorkItem::Availability {
                url: url.clone(),
                pincode,
            });
        }
    }

    info!("loaded {} availability checks from {}", items.len(), path.display());
    Ok(items)
}
