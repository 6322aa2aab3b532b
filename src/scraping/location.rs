//! Location-setter state machine.
//!
//! Drives the storefront's delivery-location modal: open it, type a postal
//! code, pick the first suggestion, then pull delivery ETA and store id out of
//! the reloaded page. Every step degrades instead of failing — a scrape with
//! location context missing is still worth running, so this function never
//! returns an error. Progress is traced per phase for post-mortems.

use std::sync::OnceLock;
use std::time::Duration;

use chromiumoxide::Page;
use regex::Regex;
use tracing::{info, warn};

use crate::core::types::SessionContext;
use crate::scraping::{browser, humanize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    ModalOpening,
    InputFound,
    SuggestionsLoading,
    Selected,
    SelectionFailed,
    ContextExtracted,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::ModalOpening => "modal_opening",
            Phase::InputFound => "input_found",
            Phase::SuggestionsLoading => "suggestions_loading",
            Phase::Selected => "selected",
            Phase::SelectionFailed => "selection_failed",
            Phase::ContextExtracted => "context_extracted",
        }
    }
}

const LOCATION_TRIGGER_SELECTOR: &str = "button[aria-label='Select Location']";

/// DOM-level click fallback for when an overlay intercepts the native click.
const TRIGGER_JS_CLICK: &str = r#"
(() => {
    const el = document.querySelector("button[aria-label='Select Location']");
    if (el) { el.click(); return true; }
    return false;
})()
"#;

/// Probe for the address search input, most specific placeholder first.
/// Focuses and clears the first visible hit.
const FOCUS_INPUT_JS: &str = r#"
(() => {
    const visible = el => !!(el && el.offsetParent !== null);
    const probes = [
        () => [...document.querySelectorAll('input')]
                .find(i => (i.placeholder || '').includes('Search a new address')),
        () => [...document.querySelectorAll('input')]
                .find(i => (i.placeholder || '').includes('Search')),
        () => document.querySelector("input[type='text']"),
    ];
    for (const probe of probes) {
        const el = probe();
        if (visible(el)) {
            el.focus();
            el.value = '';
            el.dispatchEvent(new Event('input', { bubbles: true }));
            return true;
        }
    }
    return false;
})()
"#;

/// Click the first visible suggestion; returns its first text line, or null.
/// Test-id selectors first, class-substring heuristics as fallback.
const CLICK_SUGGESTION_JS: &str = r#"
(() => {
    const selectors = [
        "[data-testid='address-search-item']",
        "[data-testid='location-search-item']",
        "[data-testid='prediction-item']",
        "div[class*='suggestion']",
        "div[class*='address-item']",
    ];
    for (const sel of selectors) {
        const el = document.querySelector(sel);
        if (el && el.offsetParent !== null) {
            const label = (el.innerText || '').split('\n')[0].trim();
            el.click();
            return label || null;
        }
    }
    return null;
})()
"#;

const ETA_PROBE_JS: &str = r#"
(() => {
    const selectors = ["[data-testid='eta-container']", "p[class*='eta']", "span[class*='eta']"];
    for (const sel of selectors) {
        const el = document.querySelector(sel);
        if (el && el.innerText && el.innerText.trim()) return el.innerText.trim();
    }
    return null;
})()
"#;

fn eta_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+\s*mins?)").unwrap())
}

fn store_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""storeId":"([^"]+)""#).unwrap())
}

fn store_id_loose_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)store_?id\W+([a-zA-Z0-9\-]+)").unwrap())
}

fn trace_phase(pincode: &str, phase: Phase) {
    info!(pincode, phase = phase.as_str(), "location setter");
}

async fn eval_bool(page: &Page, js: &str) -> bool {
    page.evaluate(js)
        .await
        .ok()
        .and_then(|v| v.into_value::<serde_json::Value>().ok())
        .and_then(|j| j.as_bool())
        .unwrap_or(false)
}

async fn eval_string(page: &Page, js: &str) -> Option<String> {
    page.evaluate(js)
        .await
        .ok()
        .and_then(|v| v.into_value::<serde_json::Value>().ok())
        .and_then(|j| j.as_str().map(|s| s.to_string()))
        .filter(|s| !s.is_empty())
}

/// Set the delivery location for `pincode`, starting from the storefront root.
///
/// Always returns a `SessionContext`; fields that could not be established
/// stay `"N/A"`.
pub async fn set_location(page: &Page, base_url: &str, pincode: &str) -> SessionContext {
    let mut ctx = SessionContext::default();
    trace_phase(pincode, Phase::Idle);

    let nav = tokio::time::timeout(Duration::from_secs(60), page.goto(base_url)).await;
    match nav {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            warn!(pincode, "storefront navigation failed: {}", e);
            return ctx;
        }
        Err(_) => {
            warn!(pincode, "storefront navigation timed out");
            return ctx;
        }
    }
    browser::wait_until_stable(page, 1500, 10_000).await;
    humanize::pause(1000, 3000).await;

    // Picker failures are non-fatal: a session may already carry a location
    // (missing trigger, pre-filled address), in which case the extraction
    // below still finds ETA and store id on the page.
    if let Some(label) = drive_picker(page, pincode).await {
        ctx.clicked_location_label = label;
    }

    // Selection reloads the page with location-scoped content.
    humanize::pause(2000, 4000).await;
    browser::wait_until_stable(page, 1500, 10_000).await;

    if let Some(eta) = eval_string(page, ETA_PROBE_JS).await {
        ctx.delivery_eta = eta;
    }
    let markup = page.content().await.unwrap_or_default();
    apply_markup_context(&mut ctx, &markup);

    trace_phase(pincode, Phase::ContextExtracted);
    info!(
        pincode,
        eta = %ctx.delivery_eta,
        store_id = %ctx.store_id,
        label = %ctx.clicked_location_label,
        "location set"
    );
    ctx
}

/// Walk the picker flow: open the modal, focus the address input, type the
/// pincode, click the first suggestion. Returns the clicked suggestion's
/// label; `None` when any step did not complete.
async fn drive_picker(page: &Page, pincode: &str) -> Option<String> {
    // Open the location modal. Overlays routinely intercept the native click,
    // so fall back to a DOM-level click.
    trace_phase(pincode, Phase::ModalOpening);
    let mut modal_opened = false;
    match page.find_element(LOCATION_TRIGGER_SELECTOR).await {
        Ok(el) => match el.click().await {
            Ok(_) => modal_opened = true,
            Err(e) => {
                warn!(pincode, "native trigger click failed: {}", e);
            }
        },
        Err(e) => {
            warn!(pincode, "location trigger not found: {}", e);
        }
    }
    if !modal_opened {
        modal_opened = eval_bool(page, TRIGGER_JS_CLICK).await;
    }
    if !modal_opened {
        warn!(pincode, "could not open location modal, keeping current location");
        return None;
    }
    humanize::pause(800, 1600).await;

    // Focus and clear the address input.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut input_focused = false;
    while std::time::Instant::now() < deadline {
        if eval_bool(page, FOCUS_INPUT_JS).await {
            input_focused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;
    }
    if !input_focused {
        warn!(pincode, "address input never appeared");
        return None;
    }
    trace_phase(pincode, Phase::InputFound);

    if let Err(e) = humanize::type_text(page, pincode).await {
        warn!(pincode, "typing failed: {}", e);
        return None;
    }

    // Suggestions load asynchronously; poll for the first visible one.
    trace_phase(pincode, Phase::SuggestionsLoading);
    let deadline = std::time::Instant::now() + Duration::from_secs(8);
    while std::time::Instant::now() < deadline {
        if let Some(label) = eval_string(page, CLICK_SUGGESTION_JS).await {
            trace_phase(pincode, Phase::Selected);
            return Some(label);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    // No suggestion panel; Enter sometimes commits the raw pincode.
    trace_phase(pincode, Phase::SelectionFailed);
    if let Err(e) = humanize::press_enter(page).await {
        warn!(pincode, "enter fallback failed: {}", e);
    }
    None
}

/// Regex fallbacks over the page markup for fields the DOM probes missed.
fn apply_markup_context(ctx: &mut SessionContext, markup: &str) {
    if ctx.delivery_eta == "N/A" {
        if let Some(m) = eta_regex().captures(markup) {
            ctx.delivery_eta = m[1].trim().to_string();
        }
    }
    if let Some(m) = store_id_regex().captures(markup) {
        ctx.store_id = m[1].to_string();
    } else if let Some(m) = store_id_loose_regex().captures(markup) {
        ctx.store_id = m[1].to_string();
    }
}
