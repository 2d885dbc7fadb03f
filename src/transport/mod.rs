//! Portal transports.
//!
//! The state machine is transport-agnostic: it pulls at most one HTTP
//! exchange and services at most one DNS query per `poll()`, through the
//! [`Transport`] trait. [`StdTransport`] is the production implementation
//! (std sockets + tiny_http) and works on both the host and ESP-IDF.

pub mod dns;
pub mod http;

use std::fmt;
use std::io;
use std::net::Ipv4Addr;

use log::warn;

pub use dns::CaptiveDns;
pub use http::HttpPortal;

/// HTTP method of a portal request. Anything unusual is folded into
/// `Other`; the portal treats it like a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

/// One inbound HTTP exchange, decoded by the transport.
///
/// `params` carries query-string and form-body pairs, percent-decoded, in
/// arrival order. `host` is the Host header with any `:port` suffix
/// stripped, so the captive-portal check sees what the client typed.
#[derive(Debug, Clone)]
pub struct PortalRequest {
    pub method: Method,
    pub path: String,
    pub host: Option<String>,
    pub params: Vec<(String, String)>,
}

impl PortalRequest {
    /// First value of a named query/form parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether a parameter was present at all (possibly empty).
    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|(key, _)| key == name)
    }
}

/// Response handed back to the transport for the in-flight exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    /// `Location` header for redirects.
    pub location: Option<String>,
    /// Close the connection after sending. Required on empty-body redirects,
    /// where there is no content-length framing to rely on.
    pub close_connection: bool,
}

impl PortalResponse {
    /// 200 HTML page.
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.into(),
            location: None,
            close_connection: false,
        }
    }

    /// Plain-text response with an explicit status.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
            location: None,
            close_connection: false,
        }
    }

    /// 200 JSON response.
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: body.into(),
            location: None,
            close_connection: false,
        }
    }

    /// 302 redirect with an empty body and an explicit connection close.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: 302,
            content_type: "text/plain; charset=utf-8",
            body: String::new(),
            location: Some(location.into()),
            close_connection: true,
        }
    }
}

/// Transport failures. None of these stop the portal: the poll loop logs
/// them and goes on.
#[derive(Debug)]
pub enum TransportError {
    /// Could not bind a listening socket.
    Bind { port: u16, source: io::Error },
    /// Receiving or decoding an inbound exchange failed.
    Recv(io::Error),
    /// Writing a response failed (client usually went away).
    Send(io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind { port, source } => write!(f, "failed to bind port {port}: {source}"),
            Self::Recv(e) => write!(f, "failed to receive request: {e}"),
            Self::Send(e) => write!(f, "failed to send response: {e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. } => Some(source),
            Self::Recv(e) | Self::Send(e) => Some(e),
        }
    }
}

/// Request/response plumbing the portal runs on.
///
/// Contract: at most one exchange is in flight; every `Some` returned by
/// `next_request` is answered with exactly one `send_response` before the
/// next call. `open`/`close` bracket one portal session and are idempotent.
pub trait Transport {
    /// Bring the servers up, answering for `device_ip`.
    fn open(&mut self, device_ip: Ipv4Addr) -> Result<(), TransportError>;

    /// Tear the servers down. Idempotent.
    fn close(&mut self);

    /// Answer at most one pending DNS query with the fixed portal address.
    /// Returns whether a query was serviced.
    fn serve_dns(&mut self) -> Result<bool, TransportError>;

    /// Pull at most one pending HTTP exchange. Never blocks.
    fn next_request(&mut self) -> Result<Option<PortalRequest>, TransportError>;

    /// Answer the exchange returned by the last `next_request`.
    fn send_response(&mut self, response: PortalResponse) -> Result<(), TransportError>;
}

/// Production transport: wildcard DNS responder + tiny_http server.
pub struct StdTransport {
    dns: CaptiveDns,
    http: HttpPortal,
}

impl StdTransport {
    /// Standard ports (HTTP 80, DNS 53), what the portal uses on-device.
    pub fn new() -> Self {
        Self::with_ports(80, 53)
    }

    /// Custom ports, for hosts where 80/53 need privileges.
    pub fn with_ports(http_port: u16, dns_port: u16) -> Self {
        Self {
            dns: CaptiveDns::new(dns_port),
            http: HttpPortal::new(http_port),
        }
    }

    /// Bound HTTP address while open (tests bind port 0).
    pub fn http_addr(&self) -> Option<std::net::SocketAddr> {
        self.http.local_addr()
    }

    /// Bound DNS address while open.
    pub fn dns_addr(&self) -> Option<std::net::SocketAddr> {
        self.dns.local_addr()
    }
}

impl Default for StdTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for StdTransport {
    fn open(&mut self, device_ip: Ipv4Addr) -> Result<(), TransportError> {
        // The portal is useless without HTTP, so that error propagates.
        // Without DNS only the captive redirect suffers; keep going.
        if let Err(e) = self.dns.open(device_ip) {
            warn!("captive DNS unavailable, portal reachable by address only: {e}");
        }
        self.http.open()
    }

    fn close(&mut self) {
        self.dns.close();
        self.http.close();
    }

    fn serve_dns(&mut self) -> Result<bool, TransportError> {
        self.dns.serve_one()
    }

    fn next_request(&mut self) -> Result<Option<PortalRequest>, TransportError> {
        self.http.next_request()
    }

    fn send_response(&mut self, response: PortalResponse) -> Result<(), TransportError> {
        self.http.send_response(response)
    }
}
