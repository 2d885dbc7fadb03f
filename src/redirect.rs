//! Captive-portal detection and redirect.
//!
//! Operating systems probe well-known hostnames after association; answering
//! those probes with a redirect to the portal address is what pops the
//! "sign in to network" sheet. Requests addressed to the device's own IP
//! pass through untouched.

use std::net::Ipv4Addr;

use crate::transport::PortalResponse;

/// Character-class test for a dotted-decimal IPv4 host.
///
/// Not a parser: any string of digits and dots passes, including the
/// empty string (a missing Host header is treated as addressed-by-IP).
/// No resolution, no range checks.
pub fn is_ip_literal(host: &str) -> bool {
    host.bytes().all(|b| b == b'.' || b.is_ascii_digit())
}

/// Decide whether a request should be captured.
///
/// `false` when the feature is disabled; otherwise any symbolic hostname is
/// redirected while IP-literal hosts reach the requested page directly.
/// `host` must already have its `:port` suffix stripped (the transport's
/// job).
pub fn should_redirect(host: &str, captive_portal_enabled: bool) -> bool {
    captive_portal_enabled && !is_ip_literal(host)
}

/// Build the capture response: 302 to the device address, empty body.
///
/// The empty body means there is no content-length framing to end the
/// exchange, so the response demands an explicit connection close.
pub fn redirect_response(device_ip: Ipv4Addr) -> PortalResponse {
    PortalResponse::redirect(format!("http://{device_ip}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Host Classification Tests ====================

    #[test]
    fn test_ip_literal_hosts() {
        assert!(is_ip_literal("192.168.4.1"));
        assert!(is_ip_literal("10.0.0.254"));
        // Character-class check only, not a parse.
        assert!(is_ip_literal("999.999"));
        // Missing Host header arrives as an empty string.
        assert!(is_ip_literal(""));
    }

    #[test]
    fn test_symbolic_hosts() {
        assert!(!is_ip_literal("connectivitycheck.gstatic.com"));
        assert!(!is_ip_literal("captive.apple.com"));
        assert!(!is_ip_literal("x"));
        assert!(!is_ip_literal("192.168.4.1:80"));
    }

    // ==================== Redirect Decision Tests ====================

    #[test]
    fn test_device_address_passes_through() {
        assert!(!should_redirect("192.168.4.1", true));
    }

    #[test]
    fn test_probe_hostname_is_captured() {
        assert!(should_redirect("anything.example", true));
    }

    #[test]
    fn test_disabled_never_redirects() {
        assert!(!should_redirect("x", false));
    }

    // ==================== Response Shape Tests ====================

    #[test]
    fn test_redirect_response_contract() {
        let response = redirect_response(Ipv4Addr::new(192, 168, 4, 1));
        assert_eq!(response.status, 302);
        assert_eq!(response.location.as_deref(), Some("http://192.168.4.1"));
        assert!(response.body.is_empty());
        assert!(response.close_connection);
    }
}
