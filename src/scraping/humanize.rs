//! Randomized pacing primitives. Every interaction with the storefront goes
//! through these so timing never looks machine-regular.
//!
//! `ThreadRng` is not `Send`, so all sampling happens in a block before the
//! first `.await` of each function.

use std::time::Duration;

use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams, DispatchMouseEventType,
    MouseButton,
};
use chromiumoxide::Page;
use rand::distr::{Distribution, Uniform};
use tracing::warn;

/// Sleep for a uniformly random duration in `[min_ms, max_ms)`.
pub async fn pause(min_ms: u64, max_ms: u64) {
    tokio::time::sleep(jitter_ms(min_ms, max_ms)).await;
}

/// Random duration in `[min_ms, max_ms)` without sleeping, for callers that
/// need the value itself (staggered startup, cooldowns). A degenerate range
/// (`min >= max`, e.g. `(0, 0)` to disable jitter) yields `min` exactly.
pub fn jitter_ms(min_ms: u64, max_ms: u64) -> Duration {
    if min_ms >= max_ms {
        return Duration::from_millis(min_ms);
    }
    let ms = {
        let mut rng = rand::rng();
        Uniform::new(min_ms, max_ms).unwrap().sample(&mut rng)
    };
    Duration::from_millis(ms)
}

/// Type into the focused element via raw CDP key events with per-keystroke
/// jitter (50–150 ms).
pub async fn type_text(page: &Page, text: &str) -> Result<()> {
    for c in text.chars() {
        let key_down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .text(c.to_string())
            .build()
            .map_err(|e| anyhow!("key event build failed: {}", e))?;
        page.execute(key_down)
            .await
            .map_err(|e| anyhow!("CDP keyDown failed: {}", e))?;

        let key_up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .build()
            .map_err(|e| anyhow!("key event build failed: {}", e))?;
        page.execute(key_up)
            .await
            .map_err(|e| anyhow!("CDP keyUp failed: {}", e))?;

        pause(50, 150).await;
    }
    Ok(())
}

/// Press Enter in the focused element. The `Char` event with `\r` is what
/// actually triggers form submission in Chromium.
pub async fn press_enter(page: &Page) -> Result<()> {
    pause(100, 300).await;

    let key_down = DispatchKeyEventParams::builder()
        .r#type(DispatchKeyEventType::RawKeyDown)
        .key("Enter")
        .code("Enter")
        .windows_virtual_key_code(13)
        .native_virtual_key_code(13)
        .build()
        .map_err(|e| anyhow!("key event build failed: {}", e))?;
    page.execute(key_down)
        .await
        .map_err(|e| anyhow!("CDP Enter keyDown failed: {}", e))?;

    let char_event = DispatchKeyEventParams::builder()
        .r#type(DispatchKeyEventType::Char)
        .text("\r")
        .build()
        .map_err(|e| anyhow!("key event build failed: {}", e))?;
    page.execute(char_event)
        .await
        .map_err(|e| anyhow!("CDP Enter char failed: {}", e))?;

    let key_up = DispatchKeyEventParams::builder()
        .r#type(DispatchKeyEventType::KeyUp)
        .key("Enter")
        .code("Enter")
        .windows_virtual_key_code(13)
        .native_virtual_key_code(13)
        .build()
        .map_err(|e| anyhow!("key event build failed: {}", e))?;
    page.execute(key_up)
        .await
        .map_err(|e| anyhow!("CDP Enter keyUp failed: {}", e))?;

    Ok(())
}

/// Scroll like a reader: several wheel passes down with read pauses, and an
/// occasional short correction back up. Errors are logged, never propagated —
/// a failed scroll must not kill a capture.
pub async fn reading_scroll(page: &Page) {
    let passes: Vec<(f64, u64, Option<f64>)> = {
        let mut rng = rand::rng();
        let pass_dist = Uniform::new(2usize, 5).unwrap();
        let down_dist = Uniform::new(300.0f64, 700.0).unwrap();
        let pause_dist = Uniform::new(300u64, 1200).unwrap();
        let up_dist = Uniform::new(50.0f64, 200.0).unwrap();
        let chance_dist = Uniform::new(0u8, 4).unwrap();

        (0..pass_dist.sample(&mut rng))
            .map(|_| {
                let down = down_dist.sample(&mut rng);
                let read_pause = pause_dist.sample(&mut rng);
                let up = (chance_dist.sample(&mut rng) == 0).then(|| up_dist.sample(&mut rng));
                (down, read_pause, up)
            })
            .collect()
    };

    for (down, read_pause, up) in passes {
        if let Err(e) = wheel(page, down).await {
            warn!("scroll simulation error: {}", e);
        }
        tokio::time::sleep(Duration::from_millis(read_pause)).await;
        if let Some(up) = up {
            if let Err(e) = wheel(page, -up).await {
                warn!("scroll-up simulation error: {}", e);
            }
        }
    }
}

async fn wheel(page: &Page, delta_y: f64) -> Result<()> {
    let scroll = DispatchMouseEventParams::builder()
        .r#type(DispatchMouseEventType::MouseWheel)
        .x(400.0)
        .y(300.0)
        .button(MouseButton::None)
        .delta_x(0.0)
        .delta_y(delta_y)
        .build()
        .map_err(|e| anyhow!("mouse event build failed: {}", e))?;
    page.execute(scroll)
        .await
        .map_err(|e| anyhow!("CDP wheel failed: {}", e))?;
    Ok(())
}
