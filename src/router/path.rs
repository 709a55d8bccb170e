//! Path and pattern helpers shared by the routing tree and route groups.
//!
//! Patterns and request paths are split the same way: on `/`, with empty
//! segments dropped and everything after the first `*` segment ignored.

/// Parameter key bound by a bare `*` wildcard.
pub const DEFAULT_WILDCARD_KEY: &str = "path";

// Classification of a single pattern segment by its leading character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Literal(&'a str),
    Named(&'a str),
    Wildcard(&'a str),
}

impl<'a> Segment<'a> {
    pub(crate) fn parse(raw: &'a str) -> Self {
        if let Some(name) = raw.strip_prefix(':') {
            Segment::Named(name)
        } else if let Some(name) = raw.strip_prefix('*') {
            if name.is_empty() {
                Segment::Wildcard(DEFAULT_WILDCARD_KEY)
            } else {
                Segment::Wildcard(name)
            }
        } else {
            Segment::Literal(raw)
        }
    }
}

pub(crate) fn is_named(segment: &str) -> bool {
    segment.starts_with(':')
}

pub(crate) fn is_wildcard(segment: &str) -> bool {
    segment.starts_with('*')
}

/// Split a path or pattern into its non-empty segments.
///
/// Splitting stops after the first segment starting with `*`; that segment
/// absorbs the rest of the path.
///
/// ```
/// use ruta::router::split_segments;
///
/// assert_eq!(split_segments("/users//42/"), vec!["users", "42"]);
/// assert_eq!(split_segments("/files/*path/ignored"), vec!["files", "*path"]);
/// assert!(split_segments("/").is_empty());
/// ```
pub fn split_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        segments.push(segment);
        if is_wildcard(segment) {
            break;
        }
    }
    segments
}

/// Lexically clean a slash-separated path.
///
/// Repeated slashes collapse, `.` segments are dropped and `..` removes the
/// preceding segment (never climbing above the root). The result never has a
/// trailing slash, except for the root itself. An empty input cleans to `/`.
///
/// ```
/// use ruta::router::clean_path;
///
/// assert_eq!(clean_path("/a//b/./c/.."), "/a/b");
/// assert_eq!(clean_path("/../x"), "/x");
/// assert_eq!(clean_path(""), "/");
/// ```
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/') || path.is_empty();
    let mut stack: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.last().is_some_and(|last| *last != "..") {
                    stack.pop();
                } else if !rooted {
                    stack.push("..");
                }
            }
            other => stack.push(other),
        }
    }

    let joined = stack.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_owned(),
        (false, false) => joined,
    }
}

/// Join a group prefix and a relative pattern into one cleaned pattern.
pub(crate) fn join_paths(prefix: &str, path: &str) -> String {
    clean_path(&format!("{prefix}/{path}"))
}
