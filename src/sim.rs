//! Simulated radio and scripted transport for host development and tests.
//!
//! No wireless hardware on a dev machine, so the host demo and the test
//! suite drive the portal against these stand-ins. [`SimRadio`] join
//! behavior mimics WPA2 basics: empty passphrases (open networks) and
//! passphrases of at least 8 bytes associate after a configurable number of
//! status polls, anything shorter is rejected. [`ScriptedTransport`] feeds
//! the portal canned requests instead of listening on sockets. Everything
//! the core does to either is recorded for assertions.

use std::cell::Cell;
use std::collections::VecDeque;
use std::net::Ipv4Addr;

use log::debug;

use crate::config::{Credentials, StaticNetworkConfig};
use crate::radio::{AuthKind, LinkStatus, Radio, RadioMode, ScanResult};
use crate::transport::{Method, PortalRequest, PortalResponse, Transport, TransportError};

/// Default number of non-terminal status polls before a join resolves.
const DEFAULT_JOIN_LATENCY: u32 = 2;

/// In-memory [`Radio`] implementation.
pub struct SimRadio {
    mode: RadioMode,
    link: Cell<LinkStatus>,
    join_target: Cell<LinkStatus>,
    join_countdown: Cell<u32>,
    join_latency: u32,
    push_button_succeeds: bool,
    fail_next_join: bool,
    stored: Option<Credentials>,
    persistent: bool,
    ap: Option<String>,
    ap_address: Ipv4Addr,
    ap_clients: usize,
    scan_results: Vec<ScanResult>,
    station_network: Option<StaticNetworkConfig>,

    // Interaction record, public for assertions.
    pub joins: Vec<(String, String)>,
    pub persistent_log: Vec<bool>,
    pub disconnects: usize,
    pub push_button_requests: usize,
    pub soft_ap_passphrases: Vec<Option<String>>,
}

impl SimRadio {
    pub fn new() -> Self {
        Self {
            mode: RadioMode::Off,
            link: Cell::new(LinkStatus::Disconnected),
            join_target: Cell::new(LinkStatus::Disconnected),
            join_countdown: Cell::new(0),
            join_latency: DEFAULT_JOIN_LATENCY,
            push_button_succeeds: false,
            fail_next_join: false,
            stored: None,
            persistent: false,
            ap: None,
            ap_address: Ipv4Addr::new(192, 168, 4, 1),
            ap_clients: 0,
            scan_results: Vec::new(),
            station_network: None,
            joins: Vec::new(),
            persistent_log: Vec::new(),
            disconnects: 0,
            push_button_requests: 0,
            soft_ap_passphrases: Vec::new(),
        }
    }

    /// Preload networks returned by `scan()`.
    pub fn with_scan_results(mut self, results: Vec<ScanResult>) -> Self {
        self.scan_results = results;
        self
    }

    /// Preload persisted credentials, as if a previous run had joined.
    pub fn with_stored(mut self, ssid: &str, passphrase: &str) -> Self {
        self.stored = Some(Credentials::new(ssid, passphrase));
        self
    }

    /// Number of non-terminal status polls before a join resolves.
    pub fn set_join_latency(&mut self, polls: u32) {
        self.join_latency = polls;
    }

    /// Make the push-button handshake associate successfully.
    pub fn set_push_button_succeeds(&mut self, succeeds: bool) {
        self.push_button_succeeds = succeeds;
    }

    /// Force the next join to be rejected regardless of the passphrase,
    /// e.g. an access point that refuses open association.
    pub fn fail_next_join(&mut self) {
        self.fail_next_join = true;
    }

    /// Simulate clients associating to the rendezvous AP.
    pub fn set_ap_clients(&mut self, clients: usize) {
        self.ap_clients = clients;
    }

    /// SSID of the currently running AP, if any.
    pub fn ap_ssid(&self) -> Option<&str> {
        self.ap.as_deref()
    }

    /// Station static override recorded from the core, if any.
    pub fn station_network(&self) -> Option<&StaticNetworkConfig> {
        self.station_network.as_ref()
    }

    fn begin_join(&mut self, target: LinkStatus) {
        self.join_target.set(target);
        self.join_countdown.set(self.join_latency);
        self.link.set(LinkStatus::Disconnected);
    }

    fn join_outcome_for(passphrase: &str) -> LinkStatus {
        if passphrase.is_empty() || passphrase.len() >= 8 {
            LinkStatus::Joined
        } else {
            LinkStatus::JoinFailed
        }
    }
}

impl Default for SimRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl Radio for SimRadio {
    fn mode(&self) -> RadioMode {
        self.mode
    }

    fn set_mode(&mut self, mode: RadioMode) {
        debug!("sim radio: mode {} -> {}", self.mode, mode);
        self.mode = mode;
        if !matches!(mode, RadioMode::AccessPoint | RadioMode::Both) {
            self.ap = None;
        }
    }

    fn status(&self) -> LinkStatus {
        let remaining = self.join_countdown.get();
        if remaining > 0 {
            self.join_countdown.set(remaining - 1);
            return LinkStatus::Disconnected;
        }
        self.link.set(self.join_target.get());
        self.link.get()
    }

    fn join(&mut self, ssid: &str, passphrase: &str) {
        debug!("sim radio: join '{ssid}'");
        self.joins.push((ssid.to_string(), passphrase.to_string()));
        if self.persistent {
            self.stored = Some(Credentials::new(ssid, passphrase));
        }
        let target = if std::mem::take(&mut self.fail_next_join) {
            LinkStatus::JoinFailed
        } else {
            Self::join_outcome_for(passphrase)
        };
        self.begin_join(target);
    }

    fn join_stored(&mut self) {
        match &self.stored {
            Some(creds) => {
                debug!("sim radio: rejoin stored '{}'", creds.ssid);
                let target = Self::join_outcome_for(&creds.passphrase);
                self.joins
                    .push((creds.ssid.clone(), creds.passphrase.clone()));
                self.begin_join(target);
            }
            None => self.begin_join(LinkStatus::JoinFailed),
        }
    }

    fn has_stored_credentials(&self) -> bool {
        self.stored.is_some()
    }

    fn stored_ssid(&self) -> Option<String> {
        self.stored.as_ref().map(|c| c.ssid.clone())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.join_countdown.set(0);
        self.join_target.set(LinkStatus::Disconnected);
        self.link.set(LinkStatus::Disconnected);
    }

    fn scan(&mut self) -> Vec<ScanResult> {
        self.scan_results.clone()
    }

    fn soft_ap(
        &mut self,
        ssid: &str,
        passphrase: Option<&str>,
        network: Option<&StaticNetworkConfig>,
    ) -> bool {
        debug!("sim radio: soft AP '{ssid}' up");
        self.ap = Some(ssid.to_string());
        self.soft_ap_passphrases
            .push(passphrase.map(str::to_string));
        if let Some(net) = network {
            self.ap_address = net.ip;
        }
        true
    }

    fn stop_soft_ap(&mut self) -> bool {
        debug!("sim radio: soft AP down");
        self.ap = None;
        self.ap_clients = 0;
        true
    }

    fn ap_address(&self) -> Ipv4Addr {
        self.ap_address
    }

    fn ap_client_count(&self) -> usize {
        self.ap_clients
    }

    fn station_address(&self) -> Option<Ipv4Addr> {
        matches!(self.link.get(), LinkStatus::Joined).then(|| Ipv4Addr::new(10, 0, 0, 17))
    }

    fn set_station_network(&mut self, network: &StaticNetworkConfig) {
        self.station_network = Some(*network);
    }

    fn set_persistent_credentials(&mut self, persistent: bool) {
        self.persistent = persistent;
        self.persistent_log.push(persistent);
    }

    fn erase_stored_credentials(&mut self) -> bool {
        self.stored = None;
        true
    }

    fn start_push_button_join(&mut self) {
        self.push_button_requests += 1;
        if self.push_button_succeeds {
            self.begin_join(LinkStatus::Joined);
        } else {
            self.begin_join(LinkStatus::JoinFailed);
        }
    }
}

/// Hooks whose sleeps return immediately, so bounded waits resolve in
/// simulated time instead of wall-clock time.
#[derive(Debug, Default)]
pub struct InstantHooks;

impl crate::hooks::PortalHooks for InstantHooks {
    fn sleep(&mut self, _duration: std::time::Duration) {}
}

/// In-memory [`Transport`]: tests queue requests, the portal's responses
/// and DNS service counts land in public fields.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    queue: VecDeque<PortalRequest>,
    dns_backlog: usize,
    open: bool,

    /// Make the next `open` fail, as if the ports were taken.
    pub fail_open: bool,

    // Interaction record, public for assertions.
    pub opened_at: Option<Ipv4Addr>,
    pub open_count: usize,
    pub close_count: usize,
    pub dns_serviced: usize,
    pub responses: Vec<PortalResponse>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request for a later `next_request`.
    pub fn push_request(&mut self, request: PortalRequest) {
        self.queue.push_back(request);
    }

    /// Pretend `count` DNS queries are waiting.
    pub fn push_dns_queries(&mut self, count: usize) {
        self.dns_backlog += count;
    }

    /// Body of the most recent response.
    pub fn last_body(&self) -> Option<&str> {
        self.responses.last().map(|r| r.body.as_str())
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self, device_ip: Ipv4Addr) -> Result<(), TransportError> {
        if self.fail_open {
            return Err(TransportError::Bind {
                port: 80,
                source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "scripted"),
            });
        }
        self.open = true;
        self.opened_at = Some(device_ip);
        self.open_count += 1;
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.close_count += 1;
        }
    }

    fn serve_dns(&mut self) -> Result<bool, TransportError> {
        if self.dns_backlog == 0 {
            return Ok(false);
        }
        self.dns_backlog -= 1;
        self.dns_serviced += 1;
        Ok(true)
    }

    fn next_request(&mut self) -> Result<Option<PortalRequest>, TransportError> {
        Ok(self.queue.pop_front())
    }

    fn send_response(&mut self, response: PortalResponse) -> Result<(), TransportError> {
        self.responses.push(response);
        Ok(())
    }
}

/// Shorthand for building a [`PortalRequest`] in tests.
pub fn portal_request(
    method: Method,
    path: &str,
    host: Option<&str>,
    params: &[(&str, &str)],
) -> PortalRequest {
    PortalRequest {
        method,
        path: path.to_string(),
        host: host.map(str::to_string),
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

/// A plausible scan list for demos and tests.
pub fn demo_scan() -> Vec<ScanResult> {
    vec![
        ScanResult {
            ssid: "home".into(),
            rssi_dbm: -52,
            auth: AuthKind::Wpa2Psk,
            bssid: [0x3c, 0x7c, 0x3f, 0x00, 0x00, 0x01],
        },
        ScanResult {
            ssid: "home".into(),
            rssi_dbm: -78,
            auth: AuthKind::Wpa2Psk,
            bssid: [0x3c, 0x7c, 0x3f, 0x00, 0x00, 0x02],
        },
        ScanResult {
            ssid: "cafe-guest".into(),
            rssi_dbm: -67,
            auth: AuthKind::Open,
            bssid: [0x18, 0xe8, 0x29, 0x00, 0x00, 0x03],
        },
        ScanResult {
            ssid: "printer-direct".into(),
            rssi_dbm: -91,
            auth: AuthKind::WpaWpa2Psk,
            bssid: [0x18, 0xe8, 0x29, 0x00, 0x00, 0x04],
        },
    ]
}
