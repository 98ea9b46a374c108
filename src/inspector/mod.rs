//! Inspector abstraction for driving an instrumented browser page.
//!
//! Defines the `Inspector` and `InspectorPage` traits that abstract over
//! the DevTools-protocol driver (currently Chromium via chromiumoxide).

pub mod chromium;
pub mod stub;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A script-parse notification from the page, one per parsed script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEvent {
    /// URL the script was loaded from.
    pub url: String,
    /// Declared source map reference, if any. An empty `sourceMapURL` from
    /// the wire is normalized to `None`.
    pub source_map_url: Option<String>,
}

impl ScriptEvent {
    pub fn new(url: impl Into<String>, source_map_url: Option<String>) -> Self {
        Self {
            url: url.into(),
            source_map_url: source_map_url.filter(|reference| !reference.is_empty()),
        }
    }
}

/// Failure modes of an in-page evaluation. Timeouts are distinguishable from
/// every other failure class so callers can report them precisely.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("evaluation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("evaluation failed in page: {0}")]
    Page(String),

    #[error("browser session error: {0}")]
    Session(String),
}

/// A browser engine that can create instrumented page sessions.
#[async_trait]
pub trait Inspector: Send + Sync {
    /// Create a new page session, initially at `url`.
    async fn new_page(&self, url: &str) -> Result<Box<dyn InspectorPage>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active page sessions.
    fn active_pages(&self) -> usize;
}

/// A single instrumented page session.
#[async_trait]
pub trait InspectorPage: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<()>;

    /// Enable or disable script-parse instrumentation. The protocol commands
    /// behind this are idempotent; a failure here means the session itself is
    /// unreliable and is propagated to the caller.
    async fn set_script_instrumentation(&self, enabled: bool) -> Result<()>;

    /// Subscribe to the stream of script-parse notifications. Dropping the
    /// returned stream unsubscribes.
    async fn script_events(&self) -> Result<BoxStream<'static, ScriptEvent>>;

    /// Evaluate a value-returning expression in the page, awaiting promises,
    /// bounded by `timeout_ms`.
    async fn evaluate(&self, expression: &str, timeout_ms: u64) -> Result<Value, EvalError>;

    /// Close this page session.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A no-op inspector used when Chromium is unavailable.
///
/// Every `new_page` call returns an error; tooling that only works with
/// previously collected output still functions.
pub struct NoopInspector;

#[async_trait]
impl Inspector for NoopInspector {
    async fn new_page(&self, _url: &str) -> Result<Box<dyn InspectorPage>> {
        Err(anyhow::anyhow!("browser not available, collection disabled"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_pages(&self) -> usize {
        0
    }
}
