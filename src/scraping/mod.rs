//! Browser-backed extraction engine.

pub mod browser;
pub mod capture;
pub mod categories;
pub mod humanize;
pub mod location;
pub mod parse;

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{info, warn};
use url::Url;

use crate::core::config;
use crate::core::types::{record_timestamp, Availability, ProductRecord, SessionContext};
use browser::BrowserSession;
use parse::RecordContext;

/// The scrape seam the pipeline drives. Workers are generic over this so the
/// orchestration layer is testable without a browser.
#[async_trait]
pub trait CatalogScraper: Send {
    async fn start(&mut self) -> Result<()>;
    async fn stop(&mut self);
    /// Set the delivery location. Degrades internally; errors only when the
    /// session itself is unusable.
    async fn set_location(&mut self, pincode: &str) -> Result<SessionContext>;
    async fn discover_categories(&mut self) -> Result<Vec<String>>;
    /// Streamed-component parse set; the default for assortment sweeps.
    async fn scrape_category_fast(
        &mut self,
        url: &str,
        pincode: &str,
        session: &SessionContext,
    ) -> Result<Vec<ProductRecord>>;
    /// Full parse set including regex recovery.
    async fn scrape_category(
        &mut self,
        url: &str,
        pincode: &str,
        session: &SessionContext,
    ) -> Result<Vec<ProductRecord>>;
    /// Single product-page stock check.
    async fn scrape_availability(
        &mut self,
        url: &str,
        pincode: &str,
        session: &SessionContext,
    ) -> Result<Vec<ProductRecord>>;
}

/// Production scraper: one exclusive browser session against the storefront.
pub struct StoreScraper {
    base_url: String,
    headless: bool,
    nav_timeout: Duration,
    session: Option<BrowserSession>,
}

impl StoreScraper {
    pub fn new() -> Self {
        Self {
            base_url: config::base_url(),
            headless: config::headless(),
            nav_timeout: config::nav_timeout(),
            session: None,
        }
    }

    fn page(&self) -> Result<&chromiumoxide::Page> {
        self.session
            .as_ref()
            .map(|s| s.page())
            .ok_or_else(|| anyhow!("browser session not started"))
    }
}

impl Default for StoreScraper {
    fn default() -> Self {
        Self::new()
    }
}

const PRODUCT_PAGE_PROBE_JS: &str = r#"
(() => {
    const q = s => document.querySelector(s);
    const txt = el => (el && el.innerText) ? el.innerText.trim() : null;
    return JSON.stringify({
        name: txt(q('h1')),
        price: txt(q("[data-testid='product-price']")),
        mrp: txt(q("[data-testid='product-mrp']")),
        pack: txt(q("[data-testid='product-quantity']")),
        oos: (document.body.innerText || '').includes('Out of Stock'),
    });
})()
"#;

/// `"₹123.45"` → `"123.45"`; anything non-numeric → `"N/A"`.
fn clean_money(raw: Option<&str>) -> String {
    let digits: String = raw
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.is_empty() {
        "N/A".to_string()
    } else {
        digits
    }
}

#[async_trait]
impl CatalogScraper for StoreScraper {
    async fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let session = BrowserSession::launch(self.headless).await?;
        self.session = Some(session);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    async fn set_location(&mut self, pincode: &str) -> Result<SessionContext> {
        let base_url = self.base_url.clone();
        let page = self.page()?;
        Ok(location::set_location(page, &base_url, pincode).await)
    }

    async fn discover_categories(&mut self) -> Result<Vec<String>> {
        let page = self.page()?;
        Ok(categories::discover(page).await)
    }

    async fn scrape_category_fast(
        &mut self,
        url: &str,
        pincode: &str,
        session: &SessionContext,
    ) -> Result<Vec<ProductRecord>> {
        let nav_timeout = self.nav_timeout;
        let page = self.page()?;
        let ctx = RecordContext::from_category_url(url, pincode, session);
        let captures = capture::capture_during_navigation(page, url, nav_timeout).await?;
        let records = parse::parse_captures_fast(&captures, &ctx);
        info!(
            category = %ctx.category,
            captures = captures.len(),
            records = records.len(),
            "category scraped (fast)"
        );
        Ok(records)
    }

    async fn scrape_category(
        &mut self,
        url: &str,
        pincode: &str,
        session: &SessionContext,
    ) -> Result<Vec<ProductRecord>> {
        let nav_timeout = self.nav_timeout;
        let page = self.page()?;
        let ctx = RecordContext::from_category_url(url, pincode, session);
        let captures = capture::capture_during_navigation(page, url, nav_timeout).await?;
        let records = parse::parse_captures(&captures, &ctx);
        info!(
            category = %ctx.category,
            captures = captures.len(),
            records = records.len(),
            "category scraped (full)"
        );
        Ok(records)
    }

    async fn scrape_availability(
        &mut self,
        url: &str,
        pincode: &str,
        session: &SessionContext,
    ) -> Result<Vec<ProductRecord>> {
        let nav_timeout = self.nav_timeout;
        let page = self.page()?;

        match tokio::time::timeout(nav_timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(anyhow!("product page navigation failed: {}", e)),
            Err(_) => return Err(anyhow!("product page navigation timed out")),
        }
        browser::wait_until_stable(page, 1500, 10_000).await;
        humanize::pause(500, 1500).await;

        let probed = page
            .evaluate(PRODUCT_PAGE_PROBE_JS)
            .await
            .ok()
            .and_then(|v| v.into_value::<String>().ok())
            .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
            .unwrap_or_default();

        let Some(name) = probed.get("name").and_then(|v| v.as_str()).filter(|s| !s.is_empty())
        else {
            warn!(url, "product page has no readable name");
            return Ok(Vec::new());
        };
        let out_of_stock = probed.get("oos").and_then(|v| v.as_bool()).unwrap_or(false);

        let ctx = RecordContext::availability_check(pincode, session);
        let base_product_id = Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| url.to_string());

        Ok(vec![ProductRecord {
            category: ctx.category.clone(),
            subcategory: ctx.subcategory.clone(),
            item_name: name.to_string(),
            brand: "Unknown".to_string(),
            mrp: clean_money(probed.get("mrp").and_then(|v| v.as_str())),
            price: clean_money(probed.get("price").and_then(|v| v.as_str())),
            pack_size: probed
                .get("pack")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .unwrap_or("N/A")
                .to_string(),
            delivery_eta: session.delivery_eta.clone(),
            availability: if out_of_stock {
                Availability::OutOfStock
            } else {
                Availability::InStock
            },
            // Listing pages cap visible stock; "10+" mirrors what a shopper sees.
            inventory: if out_of_stock { "0".into() } else { "10+".into() },
            store_id: session.store_id.clone(),
            base_product_id,
            shelf_life_in_hours: "N/A".to_string(),
            timestamp: record_timestamp(),
            pincode_input: pincode.to_string(),
            clicked_label: session.clicked_location_label.clone(),
        }])
    }
}
