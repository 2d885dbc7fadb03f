//! HTTP side of the portal transport.
//!
//! Backed by `tiny_http`, which works on both the host and ESP32 (via
//! std::net). The server accepts connections on its own internal thread;
//! `next_request` only pulls already-parsed exchanges off its queue, so the
//! portal poll loop never blocks here.

use std::io::{self, Read};
use std::net::SocketAddr;

use log::{debug, info, warn};
use tiny_http::{Header, Request, Response, Server};

use super::{Method, PortalRequest, PortalResponse, TransportError};

/// Cap on form bodies. Credential forms are a few hundred bytes at most.
const MAX_FORM_BYTES: u64 = 8 * 1024;

/// Non-blocking request/response adapter over one `tiny_http::Server`.
///
/// At most one exchange is held open at a time; [`HttpPortal::send_response`]
/// answers it. An exchange still pending when the next one is pulled gets
/// dropped, which makes tiny_http fail it out instead of wedging the queue.
pub struct HttpPortal {
    port: u16,
    server: Option<Server>,
    in_flight: Option<Request>,
}

impl HttpPortal {
    /// Create the adapter for the given port (80 on-device, 0 in tests).
    /// Nothing listens until [`HttpPortal::open`].
    pub fn new(port: u16) -> Self {
        Self {
            port,
            server: None,
            in_flight: None,
        }
    }

    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] when the port cannot be bound.
    pub fn open(&mut self) -> Result<(), TransportError> {
        let server = Server::http(("0.0.0.0", self.port)).map_err(|e| TransportError::Bind {
            port: self.port,
            source: io::Error::new(io::ErrorKind::AddrInUse, format!("{}", e)),
        })?;
        match server.server_addr().to_ip() {
            Some(addr) => info!("portal HTTP listening on http://{addr}/"),
            None => info!("portal HTTP listening on port {}", self.port),
        }
        self.server = Some(server);
        Ok(())
    }

    /// Drop the listener and any unanswered exchange. Idempotent.
    pub fn close(&mut self) {
        self.in_flight = None;
        if self.server.take().is_some() {
            debug!("portal HTTP server closed");
        }
    }

    /// Address the listener is bound to while open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().and_then(|s| s.server_addr().to_ip())
    }

    /// Pull at most one pending exchange, decoded into a [`PortalRequest`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Recv`] when the listener itself fails.
    pub fn next_request(&mut self) -> Result<Option<PortalRequest>, TransportError> {
        let Some(server) = self.server.as_ref() else {
            return Ok(None);
        };
        if self.in_flight.take().is_some() {
            warn!("dropping unanswered portal exchange");
        }

        let mut request = match server.try_recv().map_err(TransportError::Recv)? {
            Some(request) => request,
            None => return Ok(None),
        };
        let decoded = decode_request(&mut request);
        debug!(
            "<- {:?} {} ({} params)",
            decoded.method,
            decoded.path,
            decoded.params.len()
        );
        self.in_flight = Some(request);
        Ok(Some(decoded))
    }

    /// Answer the exchange pulled by the last [`HttpPortal::next_request`].
    ///
    /// tiny_http frames every body with an explicit Content-Length, so even
    /// the empty-body redirect is unambiguous to connectivity probes; the
    /// `close_connection` hint needs no extra handling here.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] when the write fails, usually
    /// because the client already went away.
    pub fn send_response(&mut self, response: PortalResponse) -> Result<(), TransportError> {
        let Some(request) = self.in_flight.take() else {
            warn!("response with no exchange in flight, dropped");
            return Ok(());
        };

        let status = response.status;
        let body_len = response.body.len();
        let mut reply = Response::from_data(response.body.into_bytes()).with_status_code(status);
        if let Some(header) = header("Content-Type", response.content_type) {
            reply = reply.with_header(header);
        }
        // Probe verdicts must not be cached or phones keep showing a stale
        // sign-in page after provisioning.
        if let Some(header) = header("Cache-Control", "no-store, no-cache") {
            reply = reply.with_header(header);
        }
        if let Some(location) = response.location.as_deref() {
            if let Some(header) = header("Location", location) {
                reply = reply.with_header(header);
            }
        }

        debug!("-> {status} ({body_len} bytes)");
        request.respond(reply).map_err(TransportError::Send)
    }
}

fn header(name: &str, value: &str) -> Option<Header> {
    let header = Header::from_bytes(name.as_bytes(), value.as_bytes()).ok();
    if header.is_none() {
        warn!("skipping malformed header {name}: {value}");
    }
    header
}

/// Decode method, path, Host and all query/form parameters.
fn decode_request(request: &mut Request) -> PortalRequest {
    let method = match request.method() {
        tiny_http::Method::Get => Method::Get,
        tiny_http::Method::Post => Method::Post,
        _ => Method::Other,
    };

    let url = request.url().to_string();
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path.to_string(), query),
        None => (url.clone(), ""),
    };
    let mut params = parse_form(query);

    let host = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Host"))
        .map(|h| strip_host_port(h.value.as_str()).to_string());

    if method == Method::Post && is_form_post(request) {
        let mut body = Vec::new();
        let mut reader = request.as_reader().take(MAX_FORM_BYTES);
        match reader.read_to_end(&mut body) {
            Ok(_) => params.extend(parse_form(&String::from_utf8_lossy(&body))),
            Err(e) => warn!("form body not readable: {e}"),
        }
    }

    PortalRequest {
        method,
        path,
        host,
        params,
    }
}

fn is_form_post(request: &Request) -> bool {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .is_some_and(|h| {
            h.value
                .as_str()
                .starts_with("application/x-www-form-urlencoded")
        })
}

/// Split `a=1&b=2` into decoded pairs. Pairs without `=` become empty values.
fn parse_form(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (percent_decode(name), percent_decode(value)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

/// Form-urlencoded decoding: `+` is a space, `%XX` is a byte. Malformed
/// escapes pass through literally.
fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'+' => out.push(b' '),
            b'%' if idx + 2 < bytes.len() => {
                if let (Some(hi), Some(lo)) = (hex_value(bytes[idx + 1]), hex_value(bytes[idx + 2]))
                {
                    out.push(hi << 4 | lo);
                    idx += 3;
                    continue;
                }
                out.push(b'%');
            }
            other => out.push(other),
        }
        idx += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|v| v as u8)
}

/// Drop a `:port` suffix so the captive check sees the name the client used.
/// Bare IPv6 literals keep their colons; they are never the portal address.
fn strip_host_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port))
            if !name.is_empty() && !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            name
        }
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Decoding Tests ====================

    #[test]
    fn test_percent_decode_form_encoding() {
        assert_eq!(percent_decode("caf%C3%A9+wifi"), "café wifi");
        assert_eq!(percent_decode("a%26b%3Dc"), "a&b=c");
        assert_eq!(percent_decode("plain"), "plain");
    }

    #[test]
    fn test_percent_decode_malformed_escapes_pass_through() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("50%2"), "50%2");
        assert_eq!(percent_decode("%zz"), "%zz");
    }

    #[test]
    fn test_parse_form_pairs() {
        let params = parse_form("s=my+ssid&p=p%40ss&flag");
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], ("s".to_string(), "my ssid".to_string()));
        assert_eq!(params[1], ("p".to_string(), "p@ss".to_string()));
        assert_eq!(params[2], ("flag".to_string(), String::new()));
        assert!(parse_form("").is_empty());
    }

    // ==================== Host Header Tests ====================

    #[test]
    fn test_strip_host_port() {
        assert_eq!(strip_host_port("192.168.4.1:8080"), "192.168.4.1");
        assert_eq!(strip_host_port("captive.apple.com:80"), "captive.apple.com");
        assert_eq!(strip_host_port("192.168.4.1"), "192.168.4.1");
        assert_eq!(strip_host_port("::1"), "::1");
        assert_eq!(strip_host_port(":80"), ":80");
    }

    // ==================== Lifecycle Tests ====================

    #[test]
    fn test_next_request_without_listener_is_a_noop() {
        let mut http = HttpPortal::new(0);
        assert!(http.next_request().unwrap().is_none());
        assert!(http.local_addr().is_none());
        http.close();
    }

    #[test]
    fn test_response_without_exchange_is_dropped() {
        let mut http = HttpPortal::new(0);
        http.send_response(PortalResponse::html("<p>late</p>"))
            .unwrap();
    }
}
