//! Source map retrieval: inline payload decoding and in-page fetching.
//!
//! Every failure class (malformed payload, transport fault, non-success
//! status, timeout, invalid JSON) terminates in a [`MapOutcome::Failed`]
//! value. Nothing escapes this boundary as an error or panic, which keeps
//! the aggregator's join semantics trivial.

use super::resolve;
use super::{MapOutcome, TaggedScript};
use crate::inspector::{EvalError, InspectorPage};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;
use tracing::debug;

/// References with this scheme embed the map directly in the reference
/// string.
const INLINE_SCHEME: &str = "data:";

/// Resolve one buffered script into an outcome.
///
/// Inline `data:` references are decoded locally, with no timeout: the
/// decode is CPU-bound and never blocks on the network. Remote references
/// are resolved against the script URL and fetched inside the page session,
/// bounded by `timeout_ms`.
pub async fn fetch_map(
    page: &dyn InspectorPage,
    script: TaggedScript,
    timeout_ms: u64,
) -> MapOutcome {
    let TaggedScript {
        script_url,
        map_reference,
    } = script;

    if map_reference.starts_with(INLINE_SCHEME) {
        decode_inline(script_url, &map_reference)
    } else {
        let resolved = resolve::resolve_against(&map_reference, &script_url);
        fetch_remote(page, script_url, resolved, timeout_ms).await
    }
}

fn failed(script_url: String, source_map_url: Option<String>, error: String) -> MapOutcome {
    MapOutcome::Failed {
        script_url,
        source_map_url,
        error,
    }
}

/// Decode a `data:...;base64,<payload>` reference. `source_map_url` stays
/// absent on every path here: nothing external was fetched.
fn decode_inline(script_url: String, reference: &str) -> MapOutcome {
    let Some((_, payload)) = reference.split_once(',') else {
        return failed(
            script_url,
            None,
            "inline source map has no payload separator".to_string(),
        );
    };

    let bytes = match BASE64.decode(payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            return failed(
                script_url,
                None,
                format!("invalid base64 in inline source map: {e}"),
            )
        }
    };

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            return failed(
                script_url,
                None,
                format!("inline source map is not valid UTF-8: {e}"),
            )
        }
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(map) => MapOutcome::Resolved {
            script_url,
            source_map_url: None,
            map,
        },
        Err(e) => failed(
            script_url,
            None,
            format!("invalid JSON in inline source map: {e}"),
        ),
    }
}

/// Fetch a remote map from inside the page session so the request carries
/// the page's cookies and origin. The injected expression catches its own
/// failures and reports them through the envelope, so no exception crosses
/// the evaluation boundary. The body crosses the protocol as raw text and
/// is parsed exactly once, here.
async fn fetch_remote(
    page: &dyn InspectorPage,
    script_url: String,
    resolved: String,
    timeout_ms: u64,
) -> MapOutcome {
    debug!(url = %resolved, "fetching source map");
    let expression = fetch_expression(&resolved);

    let envelope = match page.evaluate(&expression, timeout_ms).await {
        Ok(envelope) => envelope,
        Err(EvalError::Timeout { ms }) => {
            return failed(
                script_url,
                Some(resolved),
                format!("timed out after {ms}ms fetching source map"),
            )
        }
        Err(e) => {
            return failed(
                script_url,
                Some(resolved),
                format!("source map fetch failed: {e}"),
            )
        }
    };

    if let Some(reason) = envelope.get("transportError").and_then(Value::as_str) {
        return failed(
            script_url,
            Some(resolved),
            format!("source map fetch failed: {reason}"),
        );
    }

    let status = envelope.get("status").and_then(Value::as_u64).unwrap_or(0);
    let ok = envelope.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if !ok {
        return failed(
            script_url,
            Some(resolved),
            format!("source map fetch returned status {status}"),
        );
    }

    let body = envelope.get("body").and_then(Value::as_str).unwrap_or("");
    match serde_json::from_str::<Value>(body) {
        Ok(map) => MapOutcome::Resolved {
            script_url,
            source_map_url: Some(resolved),
            map,
        },
        // The fetch itself succeeded; keep the resolved URL on the failure.
        Err(e) => failed(
            script_url,
            Some(resolved),
            format!("source map is not valid JSON: {e}"),
        ),
    }
}

/// Build the in-page fetch expression for one URL. The URL is embedded as a
/// JSON string literal, which is also a valid JavaScript string literal.
fn fetch_expression(url: &str) -> String {
    let literal = Value::String(url.to_string());
    format!(
        "(async () => {{\
           try {{\
             const resp = await fetch({literal}, {{credentials: 'include'}});\
             const body = await resp.text();\
             return {{ok: resp.ok, status: resp.status, body}};\
           }} catch (err) {{\
             return {{transportError: String(err)}};\
           }}\
         }})()"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::stub::{FetchBehavior, StubPage};
    use assert_json_diff::assert_json_eq;

    fn tagged(script_url: &str, map_reference: &str) -> TaggedScript {
        TaggedScript {
            script_url: script_url.to_string(),
            map_reference: map_reference.to_string(),
        }
    }

    #[tokio::test]
    async fn test_inline_base64_payload_resolves() {
        let page = StubPage::new();
        // {"version":3}
        let script = tagged(
            "https://x/a.js",
            "data:application/json;base64,eyJ2ZXJzaW9uIjozfQ==",
        );

        let outcome = fetch_map(&page, script, 1_500).await;
        match outcome {
            MapOutcome::Resolved {
                source_map_url,
                map,
                ..
            } => {
                assert_eq!(source_map_url, None);
                assert_json_eq!(map, serde_json::json!({"version": 3}));
            }
            other => panic!("expected Resolved, got {other:?}"),
        }
        // Nothing was evaluated in the page for an inline payload
        assert!(page.evaluated().is_empty());
    }

    #[tokio::test]
    async fn test_inline_without_separator_fails() {
        let page = StubPage::new();
        let outcome = fetch_map(&page, tagged("https://x/a.js", "data:application/json"), 1_500)
            .await;
        match outcome {
            MapOutcome::Failed {
                source_map_url,
                error,
                ..
            } => {
                assert_eq!(source_map_url, None);
                assert!(error.contains("payload separator"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_inline_bad_base64_fails() {
        let page = StubPage::new();
        let outcome = fetch_map(
            &page,
            tagged("https://x/a.js", "data:application/json;base64,@@@"),
            1_500,
        )
        .await;
        match outcome {
            MapOutcome::Failed { error, .. } => assert!(error.contains("base64")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_inline_bad_json_fails() {
        let page = StubPage::new();
        // base64 of "not json"
        let outcome = fetch_map(
            &page,
            tagged("https://x/a.js", "data:application/json;base64,bm90IGpzb24="),
            1_500,
        )
        .await;
        match outcome {
            MapOutcome::Failed {
                source_map_url,
                error,
                ..
            } => {
                assert_eq!(source_map_url, None);
                assert!(error.contains("JSON"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remote_fetch_resolves_relative_reference() {
        let page = StubPage::new();
        page.on_fetch(
            "https://x/y/a.map",
            FetchBehavior::Body {
                status: 200,
                body: r#"{"version":3,"sources":["a.ts"]}"#.to_string(),
            },
        );

        let outcome = fetch_map(&page, tagged("https://x/y/b.js", "a.map"), 1_500).await;
        match outcome {
            MapOutcome::Resolved {
                script_url,
                source_map_url,
                map,
            } => {
                assert_eq!(script_url, "https://x/y/b.js");
                assert_eq!(source_map_url.as_deref(), Some("https://x/y/a.map"));
                assert_eq!(map["sources"][0], "a.ts");
            }
            other => panic!("expected Resolved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remote_non_success_status_mentions_status() {
        let page = StubPage::new();
        page.on_fetch(
            "https://x/missing.map",
            FetchBehavior::Body {
                status: 404,
                body: "Not Found".to_string(),
            },
        );

        let outcome =
            fetch_map(&page, tagged("https://x/b.js", "missing.map"), 1_500).await;
        match outcome {
            MapOutcome::Failed {
                source_map_url,
                error,
                ..
            } => {
                assert_eq!(source_map_url.as_deref(), Some("https://x/missing.map"));
                assert!(error.contains("404"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remote_transport_error_fails() {
        let page = StubPage::new();
        page.on_fetch(
            "https://offline.example/a.map",
            FetchBehavior::TransportError("connection refused".to_string()),
        );

        let outcome = fetch_map(
            &page,
            tagged("https://offline.example/b.js", "a.map"),
            1_500,
        )
        .await;
        match outcome {
            MapOutcome::Failed { error, .. } => {
                assert!(error.contains("Failed to fetch"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_timeout_fails_with_resolved_url() {
        let page = StubPage::new();
        page.on_fetch("https://slow.example/a.map", FetchBehavior::Hang);

        let outcome =
            fetch_map(&page, tagged("https://slow.example/b.js", "a.map"), 1_500).await;
        match outcome {
            MapOutcome::Failed {
                source_map_url,
                error,
                ..
            } => {
                assert_eq!(source_map_url.as_deref(), Some("https://slow.example/a.map"));
                assert!(error.contains("1500ms"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remote_invalid_json_keeps_resolved_url() {
        let page = StubPage::new();
        page.on_fetch(
            "https://x/a.map",
            FetchBehavior::Body {
                status: 200,
                body: "<html>error page</html>".to_string(),
            },
        );

        let outcome = fetch_map(&page, tagged("https://x/b.js", "a.map"), 1_500).await;
        match outcome {
            MapOutcome::Failed {
                source_map_url,
                error,
                ..
            } => {
                assert_eq!(source_map_url.as_deref(), Some("https://x/a.map"));
                assert!(error.contains("JSON"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_fetch_expression_embeds_url_as_literal() {
        let expr = fetch_expression("https://x/a\"b.map");
        assert!(expr.contains(r#"fetch("https://x/a\"b.map""#));
        assert!(expr.contains("transportError"));
    }
}
