//! Concurrent resolution of a capture buffer.

use super::fetch;
use super::{MapOutcome, TaggedScript};
use crate::inspector::InspectorPage;
use futures::future;

/// Resolve every buffered script concurrently, returning one outcome per
/// entry in the buffer's original order.
///
/// Output slot `i` always corresponds to input slot `i`, independent of
/// completion order. A failing task never cancels its siblings; since
/// [`fetch::fetch_map`] converts every failure into a `Failed` value, the
/// join itself cannot fail and the output length always equals the input
/// length.
///
/// Each remote fetch is individually bounded by `fetch_timeout_ms`. There is
/// no overall batch deadline; callers that need one can wrap this future in
/// `tokio::time::timeout`.
pub async fn resolve_all(
    page: &dyn InspectorPage,
    scripts: Vec<TaggedScript>,
    fetch_timeout_ms: u64,
) -> Vec<MapOutcome> {
    if scripts.is_empty() {
        return Vec::new();
    }

    let tasks = scripts
        .into_iter()
        .map(|script| fetch::fetch_map(page, script, fetch_timeout_ms));
    future::join_all(tasks).await
}
