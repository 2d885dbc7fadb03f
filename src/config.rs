//! Portal configuration and credential types.
//!
//! Everything here is plain data consumed read-only by the state machine at
//! `start()`. One `PortalConfig` describes one portal session; credentials
//! captured from the form are zeroed on drop.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Minimum WPA2 passphrase length accepted for the rendezvous AP.
pub const MIN_AP_PASSWORD_LEN: usize = 8;

/// Maximum WPA2 passphrase length accepted for the rendezvous AP.
pub const MAX_AP_PASSWORD_LEN: usize = 63;

/// AP name used when neither `start()` nor the config supplies one.
pub const DEFAULT_AP_SSID: &str = "wifi-portal";

/// Network credentials captured from the portal form.
///
/// Ephemeral: owned by the pending submission and the active join attempt,
/// zeroed as soon as they are dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    /// Target network SSID.
    pub ssid: String,
    /// Passphrase; empty for open networks.
    pub passphrase: String,
}

impl Credentials {
    /// Create credentials for a join attempt.
    pub fn new(ssid: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            passphrase: passphrase.into(),
        }
    }

    /// True when no passphrase was supplied (open network join).
    pub fn is_open(&self) -> bool {
        self.passphrase.is_empty()
    }
}

impl fmt::Debug for Credentials {
    // Never log the passphrase.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Static IPv4 override applied to either the station or the AP interface.
///
/// Station and AP overrides are independent instances; they are consumed at
/// connect/AP-start time and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticNetworkConfig {
    /// Interface address.
    pub ip: Ipv4Addr,
    /// Gateway address.
    pub gateway: Ipv4Addr,
    /// Subnet mask.
    pub subnet: Ipv4Addr,
}

impl StaticNetworkConfig {
    /// Create a static network override.
    pub const fn new(ip: Ipv4Addr, gateway: Ipv4Addr, subnet: Ipv4Addr) -> Self {
        Self { ip, gateway, subnet }
    }
}

/// Configuration for one portal session.
///
/// Built by the caller, validated once, then read-only for the lifetime of
/// the session. Durations of `None` disable the corresponding timeout.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Default AP name; `start()` arguments take precedence when non-empty.
    pub ap_ssid: String,
    /// Default AP passphrase; empty = open AP.
    pub ap_passphrase: String,
    /// How long the portal may stay up without activity; `None` = forever.
    pub portal_timeout: Option<Duration>,
    /// Bound on a single join attempt; `None` delegates to the radio's own
    /// unbounded wait.
    pub connect_timeout: Option<Duration>,
    /// Minimum quality percentage for a scanned network to be listed;
    /// -1 disables filtering.
    pub min_quality: i8,
    /// Collapse duplicate SSIDs in scan results, keeping the strongest.
    pub dedupe_scans: bool,
    /// Redirect unknown hosts to the portal address (captive-portal probes).
    pub captive_portal: bool,
    /// Make `auto_connect` drive the portal to resolution itself instead of
    /// returning after bring-up.
    pub blocking: bool,
    /// Hold the portal open while at least one client is associated to the AP.
    pub client_activity_grace: bool,
    /// Extend the portal window whenever a portal page is served.
    pub web_activity_grace: bool,
    /// Tear down after the first failed join attempt instead of re-entering
    /// the portal.
    pub stop_after_attempt: bool,
    /// Try the radio's push-button (WPS-style) handshake once when a join
    /// without a passphrase fails.
    pub push_button_fallback: bool,
    /// Always render the static-IP form fields, even without an override set.
    pub show_static_fields: bool,
    /// Extra markup injected into the `<head>` of every portal page.
    pub custom_head: String,
    /// Static override for the station interface.
    pub sta_static: Option<StaticNetworkConfig>,
    /// Static override for the AP interface.
    pub ap_static: Option<StaticNetworkConfig>,
    /// Re-enable persistent radio credentials at teardown.
    pub restore_persistent: bool,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            ap_ssid: String::new(),
            ap_passphrase: String::new(),
            portal_timeout: None,
            connect_timeout: None,
            min_quality: -1,
            dedupe_scans: true,
            captive_portal: true,
            blocking: true,
            client_activity_grace: false,
            web_activity_grace: true,
            stop_after_attempt: false,
            push_button_fallback: false,
            show_static_fields: false,
            custom_head: String::new(),
            sta_static: None,
            ap_static: None,
            restore_persistent: true,
        }
    }
}

impl PortalConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a field is out of range. An out-of-range AP
    /// passphrase is reported here too, but `start()` degrades to an open AP
    /// in that case instead of refusing to run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-1..=100).contains(&self.min_quality) {
            return Err(ConfigError::InvalidConfig(
                "min_quality must be in -1..=100",
            ));
        }
        validate_ap_password(&self.ap_passphrase)?;
        Ok(())
    }
}

/// Check an AP passphrase: empty (open AP) or 8..=63 bytes.
///
/// # Errors
///
/// Returns [`ConfigError::ApPasswordRejected`] when the length is invalid.
pub fn validate_ap_password(password: &str) -> Result<(), ConfigError> {
    let len = password.len();
    if len == 0 || (MIN_AP_PASSWORD_LEN..=MAX_AP_PASSWORD_LEN).contains(&len) {
        Ok(())
    } else {
        Err(ConfigError::ApPasswordRejected { len })
    }
}

/// Configuration errors.
///
/// All of these are recoverable: the portal reports them and keeps running
/// in a degraded mode rather than aborting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// AP passphrase outside the 8..=63 byte WPA2 range; the AP comes up
    /// open instead.
    ApPasswordRejected {
        /// Rejected passphrase length in bytes.
        len: usize,
    },
    /// Custom parameter id contained a non-alphanumeric character.
    InvalidParameterId {
        /// The offending id.
        id: String,
    },
    /// A config field was out of range.
    InvalidConfig(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApPasswordRejected { len } => write!(
                f,
                "AP passphrase must be empty or {MIN_AP_PASSWORD_LEN}..={MAX_AP_PASSWORD_LEN} bytes, got {len}"
            ),
            Self::InvalidParameterId { id } => {
                write!(f, "parameter id {id:?} is not alphanumeric")
            }
            Self::InvalidConfig(reason) => write!(f, "invalid portal config: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}
