//! Path helpers shared by the route tree and the router.

use regex::Regex;

use crate::error::PatternError;

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Joins path fragments with single slashes. The result starts with a slash
/// only if the first fragment did.
///
/// ```
/// assert_eq!(keiro::join(&["/", "a/", "/b"]), "/a/b");
/// assert_eq!(keiro::join(&["a", "b"]), "a/b");
/// assert_eq!(keiro::join(&["/", ""]), "/");
/// ```
pub fn join(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .map(|part| part.trim_matches('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    match parts.first() {
        Some(first) if first.starts_with('/') => format!("/{joined}"),
        _ => joined,
    }
}

/// Matcher accepting a path and every one of its structural ancestors.
///
/// Compiled from a route's full path, it answers whether invalidating some
/// concrete path should clear that route's caches: `/users/:id/posts` accepts
/// `/users/5/posts`, `/users/5`, `/users` and `/`, but not `/users/5/likes`.
#[derive(Debug, Clone)]
pub struct InvalidatePattern(Regex);

impl InvalidatePattern {
    pub fn test(&self, path: &str) -> bool {
        self.0.is_match(path)
    }
}

/// Builds the [`InvalidatePattern`] of `path`. Every trailing segment is
/// optional; parameter and catch-all segments match any value.
pub fn compile_invalidate_pattern(path: &str) -> Result<InvalidatePattern, PatternError> {
    let pattern = segments(path)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .fold(String::new(), |pattern, part| {
            let part = if part.starts_with(':') {
                "[^/]+".to_string()
            } else if part.starts_with('*') {
                ".*".to_string()
            } else {
                regex::escape(part)
            };
            format!("(?:/{part}{pattern})?")
        });

    Regex::new(&format!("^{pattern}/?$"))
        .map(InvalidatePattern)
        .map_err(|e| PatternError::Regex(path.into(), e.to_string()))
}

/// Computes the part of the tree left behind when navigating from
/// `previous` to `next`.
///
/// Walks the previous path segment by segment, keeping segments while both
/// paths agree plus the first one that differs. Returns `None` when nothing
/// was left: the paths are equal, or `previous` is a prefix of `next`.
///
/// ```
/// use keiro::exited_path;
///
/// assert_eq!(exited_path("/app/settings/profile", "/app/home").as_deref(), Some("/app/settings"));
/// assert_eq!(exited_path("/a/b", "/a").as_deref(), Some("/a/b"));
/// assert_eq!(exited_path("/a", "/a/b"), None);
/// ```
pub fn exited_path(previous: &str, next: &str) -> Option<String> {
    let previous: Vec<&str> = segments(previous).collect();
    let next: Vec<&str> = segments(next).collect();

    for (i, part) in previous.iter().enumerate() {
        if next.get(i) != Some(part) {
            return Some(format!("/{}", previous[..=i].join("/")));
        }
    }

    None
}
