use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_BASE_URL: &str = "AISLE_SCOUT_BASE_URL";
pub const ENV_MAX_WORKERS: &str = "AISLE_SCOUT_MAX_WORKERS";
pub const ENV_HEADLESS: &str = "AISLE_SCOUT_HEADLESS";
pub const ENV_NAV_TIMEOUT_SECS: &str = "AISLE_SCOUT_NAV_TIMEOUT_SECS";
pub const ENV_OUTPUT_DIR: &str = "AISLE_SCOUT_OUTPUT_DIR";

/// Optional override for the Chromium-family browser executable.
///
/// Default behavior is auto-discovery (see `scraping::browser::find_browser_channels()`).
/// This function only returns a value when `CHROME_EXECUTABLE` is set to an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

/// Storefront root the scraper drives. Overridable for staging mirrors.
pub fn base_url() -> String {
    std::env::var(ENV_BASE_URL)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "https://www.zeptonow.com".to_string())
}

/// Upper bound on concurrent browser-backed workers. Default: 4.
pub fn max_workers() -> usize {
    std::env::var(ENV_MAX_WORKERS)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(4)
}

/// Headless by default; set `AISLE_SCOUT_HEADLESS=0` to watch the browser.
pub fn headless() -> bool {
    let Ok(v) = std::env::var(ENV_HEADLESS) else {
        return true;
    };
    let v = v.trim().to_ascii_lowercase();
    if v.is_empty() {
        return true;
    }
    !matches!(v.as_str(), "0" | "false" | "no" | "off")
}

/// Hard cap on a single page navigation. Default: 30 s.
pub fn nav_timeout() -> Duration {
    let secs = std::env::var(ENV_NAV_TIMEOUT_SECS)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(30);
    Duration::from_secs(secs)
}

/// Directory for CSV outputs. Created on demand by the sinks. Default: `output/`.
pub fn output_dir() -> PathBuf {
    std::env::var(ENV_OUTPUT_DIR)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("output"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        // Env-free process defaults (tests run without these vars set).
        if std::env::var(ENV_MAX_WORKERS).is_err() {
            assert_eq!(max_workers(), 4);
        }
        if std::env::var(ENV_NAV_TIMEOUT_SECS).is_err() {
            assert_eq!(nav_timeout(), Duration::from_secs(30));
        }
        if std::env::var(ENV_BASE_URL).is_err() {
            assert!(base_url().starts_with("https://"));
        }
    }
}
