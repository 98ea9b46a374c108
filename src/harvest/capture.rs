//! The capture window: buffers script-parse notifications that declare a
//! source map.
//!
//! Capture is purely recording. A single spawned task owns the buffer and is
//! its only writer; nothing reads the buffer until the window closes, so no
//! locking is involved. Resolution work happens later, in
//! [`super::aggregate`].

use super::TaggedScript;
use crate::inspector::{InspectorPage, ScriptEvent};
use anyhow::{Context, Result};
use futures::{FutureExt, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::trace;

/// An open capture window over one page session.
pub struct CaptureWindow {
    stop: oneshot::Sender<()>,
    collector: JoinHandle<Vec<TaggedScript>>,
}

impl CaptureWindow {
    /// Subscribe to the page's script events, then enable instrumentation.
    /// Subscription happens first so a notification emitted immediately after
    /// enablement cannot be lost.
    pub async fn open(page: &dyn InspectorPage) -> Result<Self> {
        let mut events = page.script_events().await?;
        page.set_script_instrumentation(true)
            .await
            .context("failed to open capture window")?;

        let (stop, mut stop_rx) = oneshot::channel();
        let collector = tokio::spawn(async move {
            let mut buffer: Vec<TaggedScript> = Vec::new();
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        // Drain notifications already delivered before the
                        // window closed.
                        while let Some(Some(event)) = events.next().now_or_never() {
                            record(&mut buffer, event);
                        }
                        break;
                    }
                    event = events.next() => match event {
                        Some(event) => record(&mut buffer, event),
                        None => break,
                    },
                }
            }
            buffer
        });

        Ok(Self { stop, collector })
    }

    /// Disable instrumentation, stop the collector task, and return the
    /// buffer in arrival order. The collector is always joined, even when
    /// disabling fails; the disable error is then surfaced to the caller
    /// since it means the capture window itself was unreliable.
    pub async fn close(self, page: &dyn InspectorPage) -> Result<Vec<TaggedScript>> {
        let disabled = page.set_script_instrumentation(false).await;
        let _ = self.stop.send(());
        let buffer = self
            .collector
            .await
            .context("capture task panicked")?;
        disabled.context("failed to close capture window")?;
        Ok(buffer)
    }
}

fn record(buffer: &mut Vec<TaggedScript>, event: ScriptEvent) {
    match event.source_map_url {
        Some(reference) if !reference.is_empty() => {
            trace!(script_url = %event.url, "buffered script with source map reference");
            buffer.push(TaggedScript {
                script_url: event.url,
                map_reference: reference,
            });
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::stub::StubPage;

    #[tokio::test]
    async fn test_only_scripts_with_references_are_buffered() {
        let page = StubPage::new();
        page.push_script("https://x/a.js", Some("a.map"));
        page.push_script("https://x/b.js", None);
        page.push_script("https://x/c.js", Some(""));
        page.push_script("https://x/d.js", Some("d.map"));

        let window = CaptureWindow::open(&page).await.unwrap();
        let scripts = window.close(&page).await.unwrap();

        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0].script_url, "https://x/a.js");
        assert_eq!(scripts[0].map_reference, "a.map");
        assert_eq!(scripts[1].script_url, "https://x/d.js");
    }

    #[tokio::test]
    async fn test_buffer_preserves_arrival_order() {
        let page = StubPage::new();
        for i in 0..20 {
            page.push_script(&format!("https://x/{i}.js"), Some(&format!("{i}.map")));
        }

        let window = CaptureWindow::open(&page).await.unwrap();
        let scripts = window.close(&page).await.unwrap();

        assert_eq!(scripts.len(), 20);
        for (i, script) in scripts.iter().enumerate() {
            assert_eq!(script.map_reference, format!("{i}.map"));
        }
    }

    #[tokio::test]
    async fn test_window_toggles_instrumentation() {
        let page = StubPage::new();
        let window = CaptureWindow::open(&page).await.unwrap();
        window.close(&page).await.unwrap();
        assert_eq!(page.instrumentation_log(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_open_propagates_instrumentation_failure() {
        let page = StubPage::new();
        page.fail_next_instrumentation_toggle();
        assert!(CaptureWindow::open(&page).await.is_err());
    }

    #[tokio::test]
    async fn test_close_propagates_instrumentation_failure() {
        let page = StubPage::new();
        let window = CaptureWindow::open(&page).await.unwrap();
        page.fail_next_instrumentation_toggle();
        assert!(window.close(&page).await.is_err());
    }

    #[tokio::test]
    async fn test_events_pushed_mid_window_are_captured() {
        let page = StubPage::new();
        let window = CaptureWindow::open(&page).await.unwrap();

        page.push_script("https://x/late.js", Some("late.map"));
        tokio::task::yield_now().await;

        let scripts = window.close(&page).await.unwrap();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].map_reference, "late.map");
    }
}
