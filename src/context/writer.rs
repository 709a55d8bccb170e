//! Buffered response writer handed to handlers through the [`Context`].
//!
//! Nothing reaches the socket until the whole pipeline has finished, so the
//! writer can report the status it captured to middleware running after the
//! handler (see [`crate::middleware::Logger`]).
//!
//! [`Context`]: super::Context

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::http::{Headers, Response, StatusCode};

/// Accumulates status, headers and body for one response.
///
/// The status is captured the first time it is set, either explicitly through
/// [`write_header`](Self::write_header) or implicitly as `200 OK` by the first
/// body write. Later status changes are ignored.
///
/// # Examples
///
/// ```
/// use ruta::context::ResponseWriter;
/// use ruta::StatusCode;
///
/// let mut writer = ResponseWriter::new();
/// writer.write_header(StatusCode::CREATED);
/// writer.write_header(StatusCode::BAD_REQUEST); // ignored
/// writer.write_str("done");
///
/// assert_eq!(writer.status(), StatusCode::CREATED);
/// assert_eq!(writer.body(), b"done");
/// ```
#[derive(Debug, Default)]
pub struct ResponseWriter {
    status: Option<StatusCode>,
    headers: Headers,
    body: BytesMut,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the response status if none has been captured yet.
    pub fn write_header(&mut self, status: StatusCode) {
        match self.status {
            Some(current) if current != status => {
                debug!(
                    current = current.as_u16(),
                    ignored = status.as_u16(),
                    "superfluous status write"
                );
            }
            Some(_) => {}
            None => self.status = Some(status),
        }
    }

    /// Append raw bytes to the body, capturing `200 OK` if no status was set.
    pub fn write(&mut self, data: &[u8]) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.put_slice(data);
    }

    pub fn write_str(&mut self, data: &str) {
        self.write(data.as_bytes());
    }

    /// Replace every value of `name` with `value`.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Add a value for `name`, keeping existing ones.
    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The captured status, or `200 OK` when nothing has been written yet.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// `true` once a status has been captured.
    pub fn is_written(&self) -> bool {
        self.status.is_some()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Discard everything written so far.
    pub fn clear(&mut self) {
        self.status = None;
        self.headers.clear();
        self.body.clear();
    }

    /// Move the buffered state into a transport [`Response`], leaving the
    /// writer empty.
    pub fn take_response(&mut self, keep_alive: bool) -> Response {
        let status = self.status();
        let headers = std::mem::take(&mut self.headers);
        let body = self.body.split().freeze();
        self.status = None;

        Response::new(status)
            .headers(headers)
            .body_bytes(body)
            .keep_alive(keep_alive)
    }
}
