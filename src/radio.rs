//! Radio abstraction.
//!
//! The provisioning core never talks to wireless hardware directly; it
//! drives this trait. The `esp32` feature provides an ESP-IDF
//! implementation, the host demo and the tests provide simulated ones.
//! Association, credential persistence and scanning all happen behind the
//! trait; the core only sequences them.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::config::StaticNetworkConfig;

/// Operating mode of the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    /// Radio powered down or unconfigured.
    Off,
    /// Client of an existing network.
    Station,
    /// Running its own network.
    AccessPoint,
    /// Station and access point at the same time.
    Both,
}

impl fmt::Display for RadioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Off => "off",
            Self::Station => "station",
            Self::AccessPoint => "access-point",
            Self::Both => "station+ap",
        };
        f.write_str(label)
    }
}

/// Station link status as reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Nothing in progress.
    Idle,
    /// The configured network was not found.
    NoTarget,
    /// A scan finished.
    ScanDone,
    /// Associated and addressable.
    Joined,
    /// The join attempt was rejected (bad credentials, AP refused).
    JoinFailed,
    /// A previously established link dropped.
    Lost,
    /// Not associated.
    Disconnected,
}

impl LinkStatus {
    /// True for states that end a join attempt's wait loop.
    ///
    /// `NoTarget` is not terminal: radios commonly report it transiently
    /// while still scanning for the target network.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Joined | Self::JoinFailed)
    }

    /// Short human-readable label, used on the info/status pages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::NoTarget => "no target",
            Self::ScanDone => "scan done",
            Self::Joined => "joined",
            Self::JoinFailed => "join failed",
            Self::Lost => "link lost",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Authentication scheme of a scanned network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Unknown,
}

impl AuthKind {
    /// True when joining needs a passphrase (renders a lock marker).
    pub fn is_secured(self) -> bool {
        !matches!(self, Self::Open)
    }

    /// Label used on the network list and info pages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Wep => "WEP",
            Self::WpaPsk => "WPA-PSK",
            Self::Wpa2Psk => "WPA2-PSK",
            Self::WpaWpa2Psk => "WPA/WPA2-PSK",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One network seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Advertised network name; may be empty for hidden networks.
    pub ssid: String,
    /// Received signal strength in dBm (typically -100..=-30).
    pub rssi_dbm: i16,
    /// Authentication scheme.
    pub auth: AuthKind,
    /// BSSID of the transmitter.
    pub bssid: [u8; 6],
}

/// Wireless hardware capability consumed by the provisioning core.
///
/// Join operations are issue-and-poll: `join`/`join_stored` start an
/// association and return immediately, progress is observed through
/// `status()`. Implementations log their own hardware errors; the core
/// treats anything that is not `Joined` within its deadline as a failed
/// attempt.
pub trait Radio {
    /// Current operating mode.
    fn mode(&self) -> RadioMode;

    /// Switch operating mode. Best-effort: errors are the implementation's
    /// to log, the core re-reads `mode()` where it matters.
    fn set_mode(&mut self, mode: RadioMode);

    /// Current station link status.
    fn status(&self) -> LinkStatus;

    /// Start a join with explicit credentials.
    fn join(&mut self, ssid: &str, passphrase: &str);

    /// Start a join using credentials persisted in the radio.
    fn join_stored(&mut self);

    /// True when the radio has persisted credentials to rejoin with.
    fn has_stored_credentials(&self) -> bool;

    /// SSID of the persisted credentials, if any. Used to prefill the form.
    fn stored_ssid(&self) -> Option<String>;

    /// Drop the current association, if any.
    fn disconnect(&mut self);

    /// Scan for nearby networks. Blocking, bounded by the radio itself.
    fn scan(&mut self) -> Vec<ScanResult>;

    /// Bring up the rendezvous AP. `passphrase` of `None` means an open AP.
    ///
    /// The returned flag is best-effort: some radios report failure while
    /// the AP is in fact up, so callers log it but do not bail on `false`.
    fn soft_ap(
        &mut self,
        ssid: &str,
        passphrase: Option<&str>,
        network: Option<&StaticNetworkConfig>,
    ) -> bool;

    /// Take the rendezvous AP down.
    fn stop_soft_ap(&mut self) -> bool;

    /// Address of the AP interface while the AP is up.
    fn ap_address(&self) -> Ipv4Addr;

    /// Number of clients currently associated to the AP.
    fn ap_client_count(&self) -> usize;

    /// Address of the station interface once joined.
    fn station_address(&self) -> Option<Ipv4Addr>;

    /// Apply a static IPv4 override to the station interface; effective for
    /// joins issued afterwards.
    fn set_station_network(&mut self, network: &StaticNetworkConfig);

    /// Control whether join credentials are persisted to non-volatile
    /// storage. The core opens a window around fresh joins so unrelated
    /// operations never overwrite saved credentials.
    fn set_persistent_credentials(&mut self, persistent: bool);

    /// Erase persisted credentials. Returns whether the erase succeeded.
    fn erase_stored_credentials(&mut self) -> bool;

    /// Block until the current join attempt reaches a terminal status.
    ///
    /// Used only when no connect timeout is configured. The default polls
    /// at a fixed interval; implementations with a native blocking wait may
    /// override it.
    fn wait_for_join_unbounded(&mut self) -> LinkStatus {
        loop {
            let status = self.status();
            if status.is_terminal() {
                return status;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    /// Kick off an in-band push-button (WPS-style) handshake, if the radio
    /// supports one. Default: unsupported, no-op.
    fn start_push_button_join(&mut self) {}
}
