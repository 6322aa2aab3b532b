//! Category-link discovery on the located storefront home page.

use std::time::Duration;

use chromiumoxide::Page;
use tracing::{info, warn};

/// How long to wait for the category grid to render before giving up.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(15);

const COLLECT_CATEGORY_LINKS_JS: &str = r#"
(() => {
    const urls = new Set();
    for (const a of document.querySelectorAll('a[href]')) {
        const href = a.href;
        if (href && href.includes('/cn/') && href.includes('/cid/')) {
            urls.add(href);
        }
    }
    return [...urls];
})()
"#;

async fn collect_links(page: &Page) -> Vec<String> {
    page.evaluate(COLLECT_CATEGORY_LINKS_JS)
        .await
        .ok()
        .and_then(|v| v.into_value::<Vec<String>>().ok())
        .unwrap_or_default()
}

/// Collect every unique category URL visible on the current page.
///
/// The grid renders client-side after location selection, so poll until links
/// appear or the deadline passes. An empty result is a recoverable condition
/// (wrong pincode, region with no coverage) and is only warned about.
pub async fn discover(page: &Page) -> Vec<String> {
    let deadline = std::time::Instant::now() + DISCOVERY_TIMEOUT;
    loop {
        let links = collect_links(page).await;
        if !links.is_empty() {
            info!(count = links.len(), "category links discovered");
            return links;
        }
        if std::time::Instant::now() >= deadline {
            warn!("no category links found before deadline");
            return Vec::new();
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}
