//! Scripted in-memory inspector used by tests and offline development.
//!
//! `StubPage` replays queued script events through the capture stream and
//! answers in-page evaluations from a table of canned fetch behaviors keyed
//! by URL substring. Timeouts are enforced exactly like the Chromium
//! implementation, so timeout paths are exercisable without a browser.

use super::{EvalError, Inspector, InspectorPage, ScriptEvent};
use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Canned behavior for one fetched URL.
#[derive(Debug, Clone)]
pub enum FetchBehavior {
    /// Respond with this status and body text.
    Body { status: u16, body: String },
    /// Fail the way an in-page `fetch` rejects (DNS failure, CORS, offline).
    TransportError(String),
    /// Never respond, forcing the caller's timeout to fire.
    Hang,
}

/// A scripted page session.
pub struct StubPage {
    events_tx: mpsc::UnboundedSender<ScriptEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ScriptEvent>>>,
    fetches: Mutex<HashMap<String, FetchBehavior>>,
    instrumentation_log: Mutex<Vec<bool>>,
    fail_next_toggle: AtomicBool,
    evaluated: Mutex<Vec<String>>,
    navigations: Mutex<Vec<String>>,
}

impl StubPage {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded();
        Self {
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            fetches: Mutex::new(HashMap::new()),
            instrumentation_log: Mutex::new(Vec::new()),
            fail_next_toggle: AtomicBool::new(false),
            evaluated: Mutex::new(Vec::new()),
            navigations: Mutex::new(Vec::new()),
        }
    }

    /// Queue a script-parse event for delivery to the capture stream.
    pub fn push_script(&self, url: &str, map_reference: Option<&str>) {
        let event = ScriptEvent::new(url, map_reference.map(str::to_string));
        let _ = self.events_tx.unbounded_send(event);
    }

    /// Register the behavior for any evaluation whose expression mentions `url`.
    pub fn on_fetch(&self, url: &str, behavior: FetchBehavior) {
        self.fetches
            .lock()
            .expect("lock poisoned")
            .insert(url.to_string(), behavior);
    }

    /// Make the next instrumentation toggle fail, simulating a dead session.
    pub fn fail_next_instrumentation_toggle(&self) {
        self.fail_next_toggle.store(true, Ordering::SeqCst);
    }

    /// History of `set_script_instrumentation` calls.
    pub fn instrumentation_log(&self) -> Vec<bool> {
        self.instrumentation_log
            .lock()
            .expect("lock poisoned")
            .clone()
    }

    /// Expressions evaluated so far.
    pub fn evaluated(&self) -> Vec<String> {
        self.evaluated.lock().expect("lock poisoned").clone()
    }

    /// URLs navigated to so far.
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().expect("lock poisoned").clone()
    }
}

impl Default for StubPage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InspectorPage for StubPage {
    async fn navigate(&self, url: &str, _timeout_ms: u64) -> Result<()> {
        self.navigations
            .lock()
            .expect("lock poisoned")
            .push(url.to_string());
        Ok(())
    }

    async fn set_script_instrumentation(&self, enabled: bool) -> Result<()> {
        if self.fail_next_toggle.swap(false, Ordering::SeqCst) {
            bail!("scripted instrumentation failure");
        }
        self.instrumentation_log
            .lock()
            .expect("lock poisoned")
            .push(enabled);
        Ok(())
    }

    async fn script_events(&self) -> Result<BoxStream<'static, ScriptEvent>> {
        let receiver = self
            .events_rx
            .lock()
            .expect("lock poisoned")
            .take();
        match receiver {
            // The page keeps its sender alive, so the stream stays pending
            // after the queued events instead of ending.
            Some(rx) => Ok(rx.boxed()),
            None => bail!("script events already subscribed"),
        }
    }

    async fn evaluate(&self, expression: &str, timeout_ms: u64) -> Result<Value, EvalError> {
        self.evaluated
            .lock()
            .expect("lock poisoned")
            .push(expression.to_string());

        let behavior = {
            let fetches = self.fetches.lock().expect("lock poisoned");
            fetches
                .iter()
                .find(|(url, _)| expression.contains(url.as_str()))
                .map(|(_, behavior)| behavior.clone())
        };

        let Some(behavior) = behavior else {
            return Err(EvalError::Page(format!(
                "no scripted fetch matches expression: {expression}"
            )));
        };

        let respond = async move {
            match behavior {
                FetchBehavior::Body { status, body } => Ok(json!({
                    "ok": (200..300).contains(&status),
                    "status": status,
                    "body": body,
                })),
                FetchBehavior::TransportError(reason) => Ok(json!({
                    "transportError": format!("TypeError: Failed to fetch ({reason})"),
                })),
                FetchBehavior::Hang => {
                    futures::future::pending::<()>().await;
                    unreachable!()
                }
            }
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), respond).await {
            Ok(result) => result,
            Err(_) => Err(EvalError::Timeout { ms: timeout_ms }),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// An inspector handing out pre-built stub pages.
pub struct StubInspector {
    pages: Mutex<Vec<Arc<StubPage>>>,
    handed_out: Mutex<usize>,
}

impl StubInspector {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(Vec::new()),
            handed_out: Mutex::new(0),
        }
    }

    /// Queue a page to be returned by the next `new_page` call.
    pub fn with_page(self, page: Arc<StubPage>) -> Self {
        self.pages.lock().expect("lock poisoned").push(page);
        self
    }
}

impl Default for StubInspector {
    fn default() -> Self {
        Self::new()
    }
}

/// Forwarding wrapper so a shared `Arc<StubPage>` can be handed out as a
/// boxed trait object while the test keeps its own handle for scripting.
struct SharedPage(Arc<StubPage>);

#[async_trait]
impl InspectorPage for SharedPage {
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<()> {
        self.0.navigate(url, timeout_ms).await
    }
    async fn set_script_instrumentation(&self, enabled: bool) -> Result<()> {
        self.0.set_script_instrumentation(enabled).await
    }
    async fn script_events(&self) -> Result<BoxStream<'static, ScriptEvent>> {
        self.0.script_events().await
    }
    async fn evaluate(&self, expression: &str, timeout_ms: u64) -> Result<Value, EvalError> {
        self.0.evaluate(expression, timeout_ms).await
    }
    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Inspector for StubInspector {
    async fn new_page(&self, _url: &str) -> Result<Box<dyn InspectorPage>> {
        let page = self.pages.lock().expect("lock poisoned").pop();
        match page {
            Some(page) => {
                *self.handed_out.lock().expect("lock poisoned") += 1;
                Ok(Box::new(SharedPage(page)))
            }
            None => bail!("no scripted pages remaining"),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_pages(&self) -> usize {
        *self.handed_out.lock().expect("lock poisoned")
    }
}
