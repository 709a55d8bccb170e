//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Why a buffer could not be turned into a [`Request`].
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request head is incomplete")]
    Incomplete,

    #[error("malformed request: {0}")]
    Parse(#[from] httparse::Error),

    #[error("request line has no {field}")]
    MissingField { field: &'static str },
}

/// A parsed HTTP/1.1 request.
///
/// The path is kept exactly as sent (minus the query string); cleaning and
/// segment splitting happen in the router.
///
/// # Examples
///
/// ```
/// use ruta::Request;
///
/// let raw = b"GET /users/42?fields=name HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/users/42");
/// assert_eq!(request.query_param("fields"), Some("name"));
/// ```
#[derive(Debug, Default)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    query_params: HashMap<String, String>,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Build a request without going through the wire format.
    ///
    /// `target` may carry a query string.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        let query_params = query.as_deref().map(parse_query_string).unwrap_or_default();
        Self {
            method,
            path,
            version: 1,
            query,
            query_params,
            ..Self::default()
        }
    }

    /// Parse the request at the front of `buf`.
    ///
    /// On success returns the request and the length of its head (request
    /// line plus headers). The body is whatever follows the head, capped at
    /// `Content-Length` (zero without one), so bytes belonging to a
    /// pipelined follow-up request are left alone.
    ///
    /// # Errors
    ///
    /// [`RequestError::Incomplete`] while the head is still arriving,
    /// [`RequestError::Parse`] for malformed input.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut slots = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut head = httparse::Request::new(&mut slots);
        let head_len = match head.parse(buf)? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = head
            .method
            .map(Method::from)
            .ok_or(RequestError::MissingField { field: "method" })?;
        let (path, query) = head
            .path
            .map(split_target)
            .ok_or(RequestError::MissingField { field: "path" })?;
        let version = head
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut headers = Headers::with_capacity(head.headers.len());
        for field in head.headers.iter() {
            // Non-UTF-8 header values are dropped.
            if let Ok(value) = std::str::from_utf8(field.value) {
                headers.insert(field.name, value);
            }
        }

        let mut request = Self {
            method,
            path,
            version,
            headers,
            query_params: query.as_deref().map(parse_query_string).unwrap_or_default(),
            query,
            ..Self::default()
        };
        let rest = &buf[head_len..];
        let body_len = request.content_length().unwrap_or(0).min(rest.len());
        request.body = Bytes::copy_from_slice(&rest[..body_len]);

        Ok((request, head_len))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Raw query string without the leading `?`.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(String::as_str)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Peer address of the connection, when the transport knows it.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn set_remote_addr(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }
}

fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
        None => (target.to_owned(), None),
    }
}

/// Parses a URL query string (`key=value&key2=value2`) into a `HashMap`.
///
/// Keys and values have `+` decoded as a space; percent-decoding is left to
/// the handler.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key.replace('+', " "), value.replace('+', " "))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/");
        assert_eq!(req.version(), 1);
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(offset, raw.len());
        assert!(req.remote_addr().is_none());
    }

    #[test]
    fn parse_keeps_raw_path_and_query() {
        let raw = b"GET /a/../b//c?q=rust+lang&flag HTTP/1.1\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/a/../b//c");
        assert_eq!(req.query_string(), Some("q=rust+lang&flag"));
        assert_eq!(req.query_param("q"), Some("rust lang"));
        assert_eq!(req.query_param("flag"), Some(""));
    }

    #[test]
    fn custom_method_is_preserved() {
        let raw = b"PURGE /cache HTTP/1.1\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Custom("PURGE".to_owned()));
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn keep_alive_rules() {
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(req.is_keep_alive());
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());
        let (req, _) = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn content_length_and_body_offset() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&raw[body_offset..], b"hello");
    }

    #[test]
    fn body_stops_at_content_length() {
        let raw = b"POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\nokGET /b HTTP/1.1\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(&req.body()[..], b"ok");

        let raw = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
        let (req, head_len) = Request::parse(raw).unwrap();
        assert!(req.body().is_empty());
        assert!(raw[head_len..].starts_with(b"GET /b"));
    }

    #[test]
    fn programmatic_request() {
        let req = Request::new(Method::Delete, "/users/1?soft=true");
        assert_eq!(req.path(), "/users/1");
        assert_eq!(req.query_param("soft"), Some("true"));
        assert!(req.is_keep_alive());
    }
}
