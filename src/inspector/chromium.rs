//! Chromium-based inspector using chromiumoxide.

use super::{EvalError, Inspector, InspectorPage, ScriptEvent};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::debugger::{
    DisableParams as DebuggerDisableParams, EnableParams as DebuggerEnableParams,
    EventScriptParsed,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. MAPSCOUT_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("MAPSCOUT_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.mapscout/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".mapscout/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".mapscout/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".mapscout/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".mapscout/chromium/chrome-linux64/chrome"),
                home.join(".mapscout/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    if let Ok(path) = which::which("google-chrome") {
        return Some(path);
    }
    if let Ok(path) = which::which("chromium") {
        return Some(path);
    }
    if let Ok(path) = which::which("chromium-browser") {
        return Some(path);
    }

    // 4. Common macOS locations
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based inspector.
pub struct ChromiumInspector {
    browser: Browser,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumInspector {
    /// Create a new ChromiumInspector, launching a headless Chromium instance.
    pub async fn new() -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Set MAPSCOUT_CHROMIUM_PATH or install Chrome.")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Inspector for ChromiumInspector {
    async fn new_page(&self, url: &str) -> Result<Box<dyn InspectorPage>> {
        let page = self
            .browser
            .new_page(url)
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumPage {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        // Browser is dropped when ChromiumInspector is dropped
        Ok(())
    }

    fn active_pages(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page session.
pub struct ChromiumPage {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl InspectorPage for ChromiumPage {
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<()> {
        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        match result {
            Ok(Ok(_page)) => {
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn set_script_instrumentation(&self, enabled: bool) -> Result<()> {
        if enabled {
            self.page
                .execute(DebuggerEnableParams::default())
                .await
                .context("failed to enable script instrumentation")?;
        } else {
            self.page
                .execute(DebuggerDisableParams::default())
                .await
                .context("failed to disable script instrumentation")?;
        }
        debug!(enabled, "script instrumentation toggled");
        Ok(())
    }

    async fn script_events(&self) -> Result<BoxStream<'static, ScriptEvent>> {
        let stream = self
            .page
            .event_listener::<EventScriptParsed>()
            .await
            .map_err(|e| anyhow::anyhow!("failed to subscribe to script events: {e}"))?;

        Ok(stream
            .map(|event| ScriptEvent::new(event.url.clone(), event.source_map_url.clone()))
            .boxed())
    }

    async fn evaluate(&self, expression: &str, timeout_ms: u64) -> Result<Value, EvalError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(EvalError::Session)?;

        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.evaluate(params),
        )
        .await;

        match result {
            Ok(Ok(evaluation)) => evaluation
                .value()
                .cloned()
                .ok_or_else(|| EvalError::Page("evaluation produced no value".to_string())),
            Ok(Err(e)) => Err(EvalError::Page(format!("{e}"))),
            Err(_) => Err(EvalError::Timeout { ms: timeout_ms }),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::capture::CaptureWindow;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_capture_and_evaluate() {
        let inspector = ChromiumInspector::new()
            .await
            .expect("failed to create inspector");
        let page = inspector
            .new_page("about:blank")
            .await
            .expect("failed to create page");

        let window = CaptureWindow::open(page.as_ref())
            .await
            .expect("failed to open capture window");

        // A script with an inline source map reference
        let html = "data:text/html,<script>//%23 sourceMappingURL=data:application/json;base64,eyJ2ZXJzaW9uIjozfQ==%0Avar x=1;</script>";
        page.navigate(html, 10_000).await.expect("navigation failed");
        tokio::time::sleep(Duration::from_millis(500)).await;

        let scripts = window
            .close(page.as_ref())
            .await
            .expect("failed to close capture window");
        assert!(!scripts.is_empty());

        let value = page
            .evaluate("(async () => ({answer: 6 * 7}))()", 5_000)
            .await
            .expect("evaluation failed");
        assert_eq!(value["answer"], 42);

        page.close().await.expect("close failed");
        assert_eq!(inspector.active_pages(), 0);

        inspector.shutdown().await.expect("shutdown failed");
    }
}
