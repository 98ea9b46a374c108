//! Source map URL resolution.

use url::Url;

/// Resolve a possibly-relative map reference against the script's own URL.
///
/// When either side fails to parse, the raw reference is returned unchanged;
/// callers must not treat the fallback as fatal, since downstream retrieval
/// will fail naturally on an unusable reference (or succeed, if the
/// reference was already absolute).
pub fn resolve_against(reference: &str, base: &str) -> String {
    match Url::parse(base).and_then(|base| base.join(reference)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => reference.to_string(),
    }
}
