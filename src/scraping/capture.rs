//! Transient network-response capture.
//!
//! One category-page navigation produces dozens of backend responses; the
//! catalog data rides in a handful of JSON and streamed-component bodies.
//! This module subscribes to `Network.responseReceived` for the duration of a
//! single navigation, lets the page settle under humanized scrolling, then
//! pulls qualifying bodies with `Network.getResponseBody`. The observer task
//! is aborted on every exit path so listeners never leak across navigations.

use std::sync::Arc;
use std::time::Duration;

use aho_corasick::AhoCorasick;
use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::OnceLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::scraping::{browser, humanize};

/// Minimum length for a non-JSON body to be worth regex recovery. Short HTML
/// fragments never contain product tables.
const TEXT_PAYLOAD_MIN: usize = 10_000;

/// How long to wait for one `getResponseBody` call before giving up on that
/// response (bodies get evicted from the renderer cache).
const BODY_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapturedResponse {
    pub url: String,
    pub payload: Payload,
}

const SKIP_MIME_PATTERNS: &[&str] = &[
    "image/",
    "font",
    "text/css",
    "javascript",
    "video/",
    "audio/",
    "octet-stream",
    "svg",
];

const SKIP_URL_PATTERNS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".webp", ".gif", ".ico", ".svg", ".woff", ".woff2", ".ttf", ".css",
    ".js?", ".mp4",
];

fn skip_matcher() -> &'static (AhoCorasick, AhoCorasick) {
    static MATCHERS: OnceLock<(AhoCorasick, AhoCorasick)> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        (
            AhoCorasick::new(SKIP_MIME_PATTERNS).expect("valid mime patterns"),
            AhoCorasick::new(SKIP_URL_PATTERNS).expect("valid url patterns"),
        )
    })
}

/// Static assets and styling/script payloads carry no catalog data.
fn should_skip(url: &str, mime: &str) -> bool {
    let (mime_matcher, url_matcher) = skip_matcher();
    mime_matcher.is_match(&mime.to_ascii_lowercase()) || url_matcher.is_match(&url.to_ascii_lowercase())
}

/// Decide whether a fetched body is worth handing to the parse engine.
fn qualify(raw: String, mime: &str) -> Option<Payload> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
        return Some(Payload::Json(value));
    }
    if mime.contains("x-component") || raw.len() >= TEXT_PAYLOAD_MIN {
        return Some(Payload::Text(raw));
    }
    None
}

/// Navigate to `url` while observing network responses, then fetch and
/// qualify the interesting bodies.
///
/// Navigation timeouts are recoverable: whatever arrived before the deadline
/// is still harvested. Only subscription failures (dead page) error out.
pub async fn capture_during_navigation(
    page: &Page,
    url: &str,
    nav_timeout: Duration,
) -> Result<Vec<CapturedResponse>> {
    page.execute(EnableParams::default())
        .await
        .map_err(|e| anyhow!("Network.enable failed: {}", e))?;

    let mut events = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| anyhow!("response listener failed: {}", e))?;

    let collected: Arc<Mutex<Vec<(RequestId, String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = collected.clone();
    let collector = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let response = &event.response;
            if response.status != 200 || should_skip(&response.url, &response.mime_type) {
                continue;
            }
            sink.lock().await.push((
                event.request_id.clone(),
                response.url.clone(),
                response.mime_type.clone(),
            ));
        }
    });

    // No early return below this point until the collector is aborted.
    match tokio::time::timeout(nav_timeout, page.goto(url)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(url, "navigation error, harvesting partial capture: {}", e),
        Err(_) => warn!(url, "navigation timed out, harvesting partial capture"),
    }

    // Lazy-loaded sections fire their fetches on scroll.
    humanize::reading_scroll(page).await;
    browser::wait_until_stable(page, 1500, 8_000).await;

    collector.abort();

    let metas = {
        let mut guard = collected.lock().await;
        std::mem::take(&mut *guard)
    };
    debug!(url, candidates = metas.len(), "fetching response bodies");

    let mut captures = Vec::new();
    for (request_id, response_url, mime) in metas {
        let fetched = tokio::time::timeout(
            BODY_FETCH_TIMEOUT,
            page.execute(GetResponseBodyParams::new(request_id)),
        )
        .await;
        let body = match fetched {
            Ok(Ok(resp)) => {
                if resp.result.base64_encoded {
                    match BASE64
                        .decode(resp.result.body.as_bytes())
                        .ok()
                        .and_then(|bytes| String::from_utf8(bytes).ok())
                    {
                        Some(text) => text,
                        None => continue, // binary leftover
                    }
                } else {
                    resp.result.body.clone()
                }
            }
            Ok(Err(e)) => {
                debug!(url = %response_url, "body unavailable: {}", e);
                continue;
            }
            Err(_) => {
                debug!(url = %response_url, "body fetch timed out");
                continue;
            }
        };

        if let Some(payload) = qualify(body, &mime) {
            captures.push(CapturedResponse {
                url: response_url,
                payload,
            });
        }
    }

    info!(url, captures = captures.len(), "capture complete");
    Ok(captures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_static_assets_by_mime_and_url() {
        assert!(should_skip("https://cdn.example.com/a", "image/webp"));
        assert!(should_skip("https://cdn.example.com/a", "text/css"));
        assert!(should_skip("https://cdn.example.com/app.woff2", "text/plain"));
        assert!(!should_skip(
            "https://api.example.com/v1/products",
            "application/json"
        ));
        assert!(!should_skip(
            "https://example.com/cn/fruits/cid/1",
            "text/x-component"
        ));
    }

    #[test]
    fn qualify_prefers_json() {
        match qualify(r#"{"products":[]}"#.to_string(), "text/plain") {
            Some(Payload::Json(v)) => assert!(v.get("products").is_some()),
            other => panic!("expected json payload, got {:?}", other),
        }
    }

    #[test]
    fn qualify_keeps_component_streams_and_large_text() {
        assert!(matches!(
            qualify("1a:notjson".to_string(), "text/x-component"),
            Some(Payload::Text(_))
        ));
        let large = "x".repeat(TEXT_PAYLOAD_MIN);
        assert!(matches!(qualify(large, "text/html"), Some(Payload::Text(_))));
    }

    #[test]
    fn qualify_drops_short_non_json() {
        assert_eq!(qualify("<div>hi</div>".to_string(), "text/html"), None);
    }
}
