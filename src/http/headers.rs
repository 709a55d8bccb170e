//! Order-preserving header list with case-insensitive lookup.

use std::fmt;

/// A case-insensitive, multi-value HTTP header list.
///
/// Entries keep their insertion order, which is also the order they are
/// serialized in.
///
/// # Examples
///
/// ```
/// use ruta::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Set-Cookie", "a=1");
/// headers.insert("Set-Cookie", "b=2");
/// assert_eq!(headers.get_all("set-cookie").count(), 2);
///
/// headers.set("set-cookie", "c=3");
/// assert_eq!(headers.get("SET-COOKIE"), Some("c=3"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Append an entry, keeping earlier values of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replace all values of `name` with a single `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.inner.push((name, value.into()));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Remove every entry named `name`; `true` if any existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of entries, counting repeated names separately.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_borrows_from_headers_not_from_name() {
        let mut headers = Headers::new();
        headers.insert("Host", "example.com");
        let host = {
            let name = String::from("host");
            headers.get(&name)
        };
        assert_eq!(host, Some("example.com"));
    }

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.insert("Content-Type", "application/json");
        assert_eq!(h.get("CONTENT-type"), Some("application/json"));
        assert!(h.contains("content-type"));
        assert!(!h.contains("x-missing"));
    }

    #[test]
    fn set_replaces_every_value() {
        let mut h = Headers::new();
        h.insert("Vary", "Origin");
        h.insert("vary", "Accept");
        h.insert("X-Other", "1");
        h.set("VARY", "Cookie");
        assert_eq!(h.get_all("vary").collect::<Vec<_>>(), vec!["Cookie"]);
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn display_writes_wire_lines() {
        let mut h = Headers::new();
        h.insert("A", "1");
        h.insert("B", "2");
        assert_eq!(h.to_string(), "A: 1\r\nB: 2\r\n");
    }
}
