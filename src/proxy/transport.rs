//! Load-balanced upstream transport.
//!
//! # Responsibilities
//! - Dial upstream addresses with a connect timeout
//! - Wrap `https` connections in TLS, bounded by the handshake timeout
//! - Pick one balancer address per request and bound the wait for headers
//!   once the request has been handed to the connection
//!
//! # Design Decisions
//! - The connector never resolves names: the transport rewrites the request
//!   authority to `ip:port` first, so hyper pools connections per address
//! - `Host` carries the configured upstream authority, and TLS uses it for SNI

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::uri::{Authority, Scheme};
use axum::http::{header, HeaderValue, Request, Response, Uri};
use hyper::body::{Body as HttpBody, Frame, Incoming, SizeHint};
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::crypto::aws_lc_rs;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tower::Service;

use crate::load_balancer::RoundRobinBalancer;
use crate::proxy::{ForwardError, TransportError};
use crate::routing::UpstreamTimeouts;

#[derive(Clone)]
struct TlsSettings {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

/// Connector handed to hyper's pooled client.
#[derive(Clone)]
pub struct UpstreamConnector {
    dial_timeout: Duration,
    tls_handshake_timeout: Duration,
    tls: Option<TlsSettings>,
}

impl UpstreamConnector {
    /// Plain TCP connector.
    pub fn http(dial_timeout: Duration) -> Self {
        Self {
            dial_timeout,
            tls_handshake_timeout: Duration::ZERO,
            tls: None,
        }
    }

    /// TLS connector verifying against the Mozilla root set, with SNI set
    /// to `server_name`.
    pub fn https(
        dial_timeout: Duration,
        tls_handshake_timeout: Duration,
        server_name: &str,
    ) -> Result<Self, TransportError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TransportError::InvalidServerName(server_name.to_string()))?;

        Ok(Self {
            dial_timeout,
            tls_handshake_timeout,
            tls: Some(TlsSettings {
                connector: TlsConnector::from(Arc::new(config)),
                server_name,
            }),
        })
    }

    async fn connect(self, uri: Uri) -> Result<UpstreamIo, TransportError> {
        let host = uri.host().unwrap_or_default();
        let ip: IpAddr = host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .map_err(|_| TransportError::UnresolvedTarget(host.to_string()))?;
        let port = uri.port_u16().unwrap_or(if self.tls.is_some() { 443 } else { 80 });
        let addr = SocketAddr::new(ip, port);

        let stream = timeout(self.dial_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::DialTimeout { addr })?
            .map_err(|source| TransportError::Connect { addr, source })?;
        let _ = stream.set_nodelay(true);

        let Some(tls) = self.tls else {
            return Ok(UpstreamIo::Plain(TokioIo::new(stream)));
        };

        let stream = timeout(
            self.tls_handshake_timeout,
            tls.connector.connect(tls.server_name, stream),
        )
        .await
        .map_err(|_| TransportError::TlsHandshakeTimeout { addr })?
        .map_err(|source| TransportError::Tls { addr, source })?;

        Ok(UpstreamIo::Tls(Box::new(TokioIo::new(stream))))
    }
}

impl Service<Uri> for UpstreamConnector {
    type Response = UpstreamIo;
    type Error = TransportError;
    type Future = Pin<Box<dyn Future<Output = Result<UpstreamIo, TransportError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        Box::pin(self.clone().connect(uri))
    }
}

/// An established upstream connection.
pub enum UpstreamIo {
    Plain(TokioIo<TcpStream>),
    Tls(Box<TokioIo<TlsStream<TcpStream>>>),
}

impl Connection for UpstreamIo {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

impl Read for UpstreamIo {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamIo::Plain(io) => Pin::new(io).poll_read(cx, buf),
            UpstreamIo::Tls(io) => Pin::new(io.as_mut()).poll_read(cx, buf),
        }
    }
}

impl Write for UpstreamIo {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            UpstreamIo::Plain(io) => Pin::new(io).poll_write(cx, buf),
            UpstreamIo::Tls(io) => Pin::new(io.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamIo::Plain(io) => Pin::new(io).poll_flush(cx),
            UpstreamIo::Tls(io) => Pin::new(io.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamIo::Plain(io) => Pin::new(io).poll_shutdown(cx),
            UpstreamIo::Tls(io) => Pin::new(io.as_mut()).poll_shutdown(cx),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            UpstreamIo::Plain(io) => io.is_write_vectored(),
            UpstreamIo::Tls(io) => io.is_write_vectored(),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            UpstreamIo::Plain(io) => Pin::new(io).poll_write_vectored(cx, bufs),
            UpstreamIo::Tls(io) => Pin::new(io.as_mut()).poll_write_vectored(cx, bufs),
        }
    }
}

/// Pooled HTTP/1.1 client whose requests are spread over the balancer's
/// addresses.
pub struct UpstreamTransport {
    client: Client<UpstreamConnector, Body>,
    balancer: Arc<RoundRobinBalancer>,
    response_header_timeout: Duration,
}

impl UpstreamTransport {
    pub fn new(connector: UpstreamConnector, balancer: Arc<RoundRobinBalancer>, timeouts: &UpstreamTimeouts) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .build(connector);

        Self {
            client,
            balancer,
            response_header_timeout: timeouts.response_header,
        }
    }

    /// Send `request` to the next upstream address and wait for the
    /// response headers.
    ///
    /// Dialing and TLS are bounded by the connector. The response-header
    /// timeout starts once the request body has been fully handed over.
    pub async fn round_trip(&self, request: Request<Body>) -> Result<Response<Incoming>, ForwardError> {
        let address = self.balancer.next_address()?;
        let request = pin_to_address(request, address)?;

        let sent = Arc::new(Notify::new());
        let request = request.map(|body| {
            Body::new(SentSignal {
                inner: body,
                sent: Arc::clone(&sent),
            })
        });

        let response = self.client.request(request);
        tokio::pin!(response);

        let result = tokio::select! {
            result = &mut response => result,
            _ = sent.notified() => timeout(self.response_header_timeout, &mut response)
                .await
                .map_err(|_| ForwardError::ResponseHeaderTimeout)?,
        };

        match result {
            Err(e) if e.is_connect() => Err(ForwardError::Connect(e)),
            Err(e) => Err(ForwardError::Upstream(e)),
            Ok(response) => Ok(response),
        }
    }
}

/// Request body that reports when the connection has taken all of it.
struct SentSignal {
    inner: Body,
    sent: Arc<Notify>,
}

impl HttpBody for SentSignal {
    type Data = axum::body::Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if matches!(polled, Poll::Ready(None)) || this.inner.is_end_stream() {
            this.sent.notify_one();
        }
        polled
    }

    // hyper asks this when writing the request head; an empty body is
    // never polled.
    fn is_end_stream(&self) -> bool {
        let end = self.inner.is_end_stream();
        if end {
            self.sent.notify_one();
        }
        end
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Point `request` at `address`, keeping the original authority in `Host`.
fn pin_to_address(request: Request<Body>, address: IpAddr) -> Result<Request<Body>, ForwardError> {
    let (mut parts, body) = request.into_parts();
    let mut uri = parts.uri.into_parts();

    let default_port = if uri.scheme.as_ref() == Some(&Scheme::HTTPS) { 443 } else { 80 };
    let port = uri
        .authority
        .as_ref()
        .and_then(Authority::port_u16)
        .unwrap_or(default_port);

    if let Some(authority) = uri.authority.take() {
        let host = HeaderValue::from_str(authority.as_str()).map_err(axum::http::Error::from)?;
        parts.headers.insert(header::HOST, host);
    }

    let pinned = SocketAddr::new(address, port).to_string();
    uri.authority = Some(Authority::try_from(pinned.as_str()).map_err(axum::http::Error::from)?);
    parts.uri = Uri::from_parts(uri).map_err(axum::http::Error::from)?;

    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn pins_authority_and_sets_host() {
        let pinned = pin_to_address(
            request("http://distributor:9009/api/v1/push?a=1"),
            "10.0.0.7".parse().unwrap(),
        )
        .unwrap();

        assert_eq!(pinned.uri().to_string(), "http://10.0.0.7:9009/api/v1/push?a=1");
        assert_eq!(pinned.headers()[header::HOST], "distributor:9009");
    }

    #[test]
    fn default_port_follows_scheme() {
        let http = pin_to_address(request("http://frontend/x"), "10.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(http.uri().authority().unwrap().as_str(), "10.0.0.1:80");

        let https = pin_to_address(request("https://frontend/x"), "10.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(https.uri().authority().unwrap().as_str(), "10.0.0.1:443");
        assert_eq!(https.headers()[header::HOST], "frontend");
    }

    #[test]
    fn ipv6_addresses_are_bracketed() {
        let pinned = pin_to_address(request("http://ruler:8080/"), "::1".parse().unwrap()).unwrap();
        assert_eq!(pinned.uri().authority().unwrap().as_str(), "[::1]:8080");
    }

    #[tokio::test]
    async fn connector_rejects_hostnames() {
        let mut connector = UpstreamConnector::http(Duration::from_secs(1));
        let result = connector.call(Uri::from_static("http://distributor:9009/")).await;
        assert!(matches!(result, Err(TransportError::UnresolvedTarget(_))));
    }

    #[tokio::test]
    async fn connector_dials_ip_targets() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut connector = UpstreamConnector::http(Duration::from_secs(1));
        let uri: Uri = format!("http://{}/", addr).parse().unwrap();
        let io = connector.call(uri).await.unwrap();
        assert!(matches!(io, UpstreamIo::Plain(_)));
    }

    async fn loopback_transport(response_header: Duration) -> UpstreamTransport {
        let balancer = RoundRobinBalancer::new("127.0.0.1", Arc::new(crate::load_balancer::SystemResolver))
            .await
            .unwrap();
        let timeouts = UpstreamTimeouts {
            client: Duration::from_secs(10),
            dial: Duration::from_secs(1),
            tls_handshake: Duration::from_secs(1),
            response_header,
            dns_refresh: Duration::from_secs(60),
        };
        UpstreamTransport::new(
            UpstreamConnector::http(Duration::from_secs(1)),
            Arc::new(balancer),
            &timeouts,
        )
    }

    async fn spawn_backend(app: axum::Router) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        port
    }

    #[tokio::test]
    async fn slow_upload_does_not_consume_header_timeout() {
        let port = spawn_backend(
            axum::Router::new().fallback(|body: axum::body::Bytes| async move { format!("{} bytes", body.len()) }),
        )
        .await;
        let transport = loopback_transport(Duration::from_millis(300)).await;

        let chunks = futures_util::stream::iter(0..4).then(|_| async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok::<_, io::Error>(axum::body::Bytes::from_static(b"abcd"))
        });
        let request = Request::builder()
            .method("POST")
            .uri(format!("http://backend:{}/api/v1/push", port))
            .body(Body::from_stream(chunks))
            .unwrap();

        let response = transport.round_trip(request).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn slow_headers_time_out() {
        let port = spawn_backend(axum::Router::new().fallback(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            "late"
        }))
        .await;
        let transport = loopback_transport(Duration::from_millis(200)).await;

        let started = tokio::time::Instant::now();
        let result = transport
            .round_trip(request(&format!("http://backend:{}/api/v1/query", port)))
            .await;
        assert!(matches!(result, Err(ForwardError::ResponseHeaderTimeout)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn https_connector_builds_with_hostname() {
        let connector = UpstreamConnector::https(Duration::from_secs(1), Duration::from_secs(1), "alertmanager.example");
        assert!(connector.is_ok());
    }
}
