//! Path dispatch
//!
//! The first path segment names the provider; everything after it is the
//! upstream-relative path.

/// Split an inbound path into `(provider_name, upstream_path)`.
///
/// The upstream path always starts with `/`; a bare `/name` maps to `/`.
/// Returns `None` when there is no non-empty first segment to dispatch on.
pub fn split_provider_path(path: &str) -> Option<(&str, String)> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.split_once('/') {
        Some(("", _)) => None,
        Some((name, rest)) => Some((name, format!("/{rest}"))),
        None => Some((trimmed, "/".to_string())),
    }
}
