//! Tokio transport adapter: accepts TCP connections, parses HTTP/1.1 requests
//! and hands each one to [`Router::handle`].
//!
//! Routing and handler execution are synchronous and run on the connection's
//! task. Persistent connections (keep-alive) are supported.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::router::Router;

/// Failures of the listening socket. Per-connection I/O errors are logged
/// and only end that connection.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("listener I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Requests whose head and body exceed this many buffered bytes get a `413`.
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// A listening socket that feeds a [`Router`].
///
/// # Examples
///
/// ```rust,no_run
/// use ruta::{Context, Router, Routes, Server, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::with_defaults();
///     router.get("/", |ctx: &mut Context| ctx.string(StatusCode::OK, "Hello!"))?;
///
///     let server = Server::bind("0.0.0.0:3000").await?;
///     println!("serving on {}", server.local_addr());
///     server.serve(router).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Open a TCP listener on `addr`. Port `0` picks a free port; read it
    /// back with [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the socket cannot be opened.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                return Err(ServerError::Bind {
                    addr: addr.to_owned(),
                    source,
                });
            }
        };
        Ok(Self {
            local_addr: listener.local_addr()?,
            listener,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the process exits, spawning one task per
    /// connection. Every task shares the same frozen router.
    ///
    /// # Errors
    ///
    /// Does not return under normal operation; failed accepts are logged and
    /// skipped.
    pub async fn serve(self, router: impl Into<Arc<Router>>) -> Result<(), ServerError> {
        let router: Arc<Router> = router.into();
        info!(addr = %self.local_addr, patterns = router.patterns().len(), "listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };
            debug!(%peer, "accepted");

            let router = Arc::clone(&router);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, router).await {
                    warn!(%peer, error = %e, "connection dropped");
                }
            });
        }
    }
}

impl Router {
    /// Shorthand for [`Server::bind`] followed by [`Server::serve`].
    ///
    /// # Errors
    ///
    /// See [`Server::bind`].
    pub async fn run(self, addr: impl AsRef<str>) -> Result<(), ServerError> {
        Server::bind(addr).await?.serve(self).await
    }
}

/// What the read side of a connection produced.
enum Frame {
    /// A complete request and the number of buffered bytes it occupies.
    Request(Request, usize),
    /// The peer sent something we refuse to route; reply and hang up.
    Reject(Response),
    /// More bytes are needed.
    Partial,
}

/// Try to cut one request out of the front of `buf`.
fn frame(buf: &[u8]) -> Frame {
    if buf.len() > MAX_REQUEST_SIZE {
        return too_large();
    }

    match Request::parse(buf) {
        Ok((request, head_len)) => {
            let declared = request.content_length().unwrap_or(0);
            let consumed = match head_len.checked_add(declared) {
                Some(total) if total <= MAX_REQUEST_SIZE => total,
                _ => return too_large(),
            };
            if buf.len() < consumed {
                Frame::Partial
            } else {
                Frame::Request(request, consumed)
            }
        }
        Err(RequestError::Incomplete) => Frame::Partial,
        Err(e) => Frame::Reject(
            Response::new(StatusCode::BAD_REQUEST).body_bytes(format!("Bad Request: {e}")),
        ),
    }
}

fn too_large() -> Frame {
    Frame::Reject(
        Response::new(StatusCode::PAYLOAD_TOO_LARGE).body_bytes("Request entity too large"),
    )
}

/// Serve requests from one connection until the peer closes it or asks for
/// `Connection: close`.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    router: Arc<Router>,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        if stream.read_buf(&mut buf).await? == 0 {
            debug!(%peer, "peer closed the connection");
            return Ok(());
        }

        // A single read may carry several pipelined requests.
        loop {
            let (mut request, consumed) = match frame(&buf) {
                Frame::Partial => break,
                Frame::Reject(response) => {
                    warn!(%peer, status = response.status().as_u16(), "rejecting request");
                    stream
                        .write_all(&response.keep_alive(false).into_bytes())
                        .await?;
                    return Ok(());
                }
                Frame::Request(request, consumed) => (request, consumed),
            };
            // The request owns a copy of its body.
            buf.advance(consumed);

            request.set_remote_addr(peer);
            let keep_alive = request.is_keep_alive();
            debug!(%peer, method = %request.method(), path = %request.path(), "routing");

            let response = router.handle(request);
            stream.write_all(&response.into_bytes()).await?;
            stream.flush().await?;

            if !keep_alive {
                debug!(%peer, "closing after Connection: close");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;
    use crate::context::Context;
    use crate::router::Routes;

    async fn spawn(router: Router) -> SocketAddr {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.serve(router));
        addr
    }

    async fn exchange(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn serves_routed_requests_with_peer_address() {
        let mut router = Router::new();
        router
            .get("/whoami/:name", |ctx: &mut Context| {
                let loopback = ctx
                    .request()
                    .remote_addr()
                    .is_some_and(|addr| addr.ip().is_loopback());
                let name = ctx.param("name").unwrap_or_default().to_owned();
                ctx.string(StatusCode::OK, format!("{name} {loopback}"));
            })
            .unwrap();
        let addr = spawn(router).await;

        let response = exchange(
            addr,
            "GET /whoami/ada HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Connection: close\r\n"));
        assert!(response.ends_with("\r\n\r\nada true"));
    }

    #[tokio::test]
    async fn unmatched_request_gets_404() {
        let addr = spawn(Router::new()).await;
        let response = exchange(addr, "GET /nope HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(response.ends_with("404 page not found"));
    }

    #[tokio::test]
    async fn waits_for_full_body() {
        let mut router = Router::new();
        router
            .post("/echo", |ctx: &mut Context| {
                let body = String::from_utf8_lossy(ctx.request().body()).into_owned();
                ctx.string(StatusCode::OK, body);
            })
            .unwrap();
        let addr = spawn(router).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello")
            .await
            .unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stream.write_all(b" world").await.unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with("hello world"));
    }

    #[tokio::test]
    async fn pipelined_requests_are_answered_in_order() {
        let mut router = Router::new();
        router
            .get("/n/:n", |ctx: &mut Context| {
                let n = ctx.param("n").unwrap_or_default().to_owned();
                ctx.string(StatusCode::OK, n);
            })
            .unwrap();
        let addr = spawn(router).await;

        let response = exchange(
            addr,
            "GET /n/first HTTP/1.1\r\n\r\nGET /n/second HTTP/1.1\r\nConnection: close\r\n\r\n",
        )
        .await;
        let first = response.find("first").unwrap();
        let second = response.find("second").unwrap();
        assert!(first < second);
        assert_eq!(response.matches("HTTP/1.1 200 OK").count(), 2);
    }

    #[test]
    fn oversized_content_length_is_rejected_before_the_body() {
        for raw in [
            &b"POST / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n"[..],
            &b"POST / HTTP/1.1\r\nContent-Length: 8388609\r\n\r\n"[..],
        ] {
            match frame(raw) {
                Frame::Reject(response) => {
                    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE)
                }
                _ => panic!("expected a 413 reject"),
            }
        }
    }

    #[tokio::test]
    async fn oversized_content_length_gets_413() {
        let addr = spawn(Router::new()).await;
        let response = exchange(
            addr,
            "POST / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let addr = spawn(Router::new()).await;
        let response = exchange(addr, "NOT A REQUEST\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }
}
