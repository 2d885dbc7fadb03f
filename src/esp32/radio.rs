//! [`Radio`] backed by the ESP-IDF WiFi driver.
//!
//! Errors from the driver are logged here and absorbed; the provisioning
//! core observes outcomes only through `status()` and the accessor methods,
//! which is all the portal needs to route on.

use std::net::Ipv4Addr;

use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::ipv4;
use esp_idf_svc::netif::{EspNetif, NetifConfiguration};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};
use esp_idf_sys::{esp, EspError};
use log::{debug, info, warn};

use crate::config::StaticNetworkConfig;
use crate::radio::{AuthKind, LinkStatus, Radio, RadioMode, ScanResult};

/// ESP32 WiFi radio.
///
/// Joins are issued through the driver and polled via `status()`; the
/// driver reports a failed join as a plain disconnect, so the attempt
/// deadline in the core is what decides failure on this hardware.
pub struct EspRadio<'d> {
    wifi: EspWifi<'d>,
}

impl<'d> EspRadio<'d> {
    /// Wrap the modem peripheral.
    ///
    /// Pass the NVS partition so the driver can persist credentials; the
    /// core controls when persistence is actually enabled through
    /// [`Radio::set_persistent_credentials`].
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop, nvs)?;
        Ok(Self { wifi })
    }

    /// Direct access to the wrapped driver for concerns the portal does not
    /// cover (power save, country code).
    pub fn driver_mut(&mut self) -> &mut EspWifi<'d> {
        &mut self.wifi
    }

    fn configuration(&self) -> Configuration {
        match self.wifi.get_configuration() {
            Ok(config) => config,
            Err(e) => {
                debug!("configuration read failed: {e}");
                Configuration::None
            }
        }
    }

    fn apply(&mut self, config: &Configuration) {
        if let Err(e) = self.wifi.set_configuration(config) {
            warn!("configuration rejected by the driver: {e}");
        }
        if !matches!(config, Configuration::None) {
            if let Err(e) = self.wifi.start() {
                warn!("driver start failed: {e}");
            }
        }
    }

    /// True when the current configuration carries an AP part.
    fn ap_part_active(&self) -> bool {
        matches!(
            self.configuration(),
            Configuration::AccessPoint(_) | Configuration::Mixed(..)
        )
    }
}

/// Split any configuration into its station and AP halves, defaulting the
/// missing one, so mode changes can preserve whichever half survives.
fn split_configuration(config: Configuration) -> (ClientConfiguration, AccessPointConfiguration) {
    match config {
        Configuration::None => (ClientConfiguration::default(), AccessPointConfiguration::default()),
        Configuration::Client(client) => (client, AccessPointConfiguration::default()),
        Configuration::AccessPoint(ap) => (ClientConfiguration::default(), ap),
        Configuration::Mixed(client, ap) => (client, ap),
    }
}

fn auth_kind(method: Option<AuthMethod>) -> AuthKind {
    match method {
        None | Some(AuthMethod::None) => AuthKind::Open,
        Some(AuthMethod::WEP) => AuthKind::Wep,
        Some(AuthMethod::WPA) => AuthKind::WpaPsk,
        Some(AuthMethod::WPA2Personal) => AuthKind::Wpa2Psk,
        Some(AuthMethod::WPAWPA2Personal) => AuthKind::WpaWpa2Psk,
        Some(_) => AuthKind::Unknown,
    }
}

fn prefix_len(subnet: Ipv4Addr) -> u8 {
    u32::from(subnet).count_ones() as u8
}

impl Radio for EspRadio<'_> {
    fn mode(&self) -> RadioMode {
        match self.configuration() {
            Configuration::None => RadioMode::Off,
            Configuration::Client(_) => RadioMode::Station,
            Configuration::AccessPoint(_) => RadioMode::AccessPoint,
            Configuration::Mixed(..) => RadioMode::Both,
        }
    }

    fn set_mode(&mut self, mode: RadioMode) {
        debug!("radio mode -> {mode}");
        let (client, ap) = split_configuration(self.configuration());
        let next = match mode {
            RadioMode::Off => Configuration::None,
            RadioMode::Station => Configuration::Client(client),
            RadioMode::AccessPoint => Configuration::AccessPoint(ap),
            RadioMode::Both => Configuration::Mixed(client, ap),
        };
        self.apply(&next);
        if matches!(mode, RadioMode::Off) {
            if let Err(e) = self.wifi.stop() {
                warn!("driver stop failed: {e}");
            }
        }
    }

    fn status(&self) -> LinkStatus {
        // The driver folds rejected joins into "not connected"; the core's
        // attempt deadline turns a stuck disconnect into a failure.
        match self.wifi.is_connected() {
            Ok(true) => LinkStatus::Joined,
            Ok(false) => LinkStatus::Disconnected,
            Err(e) => {
                debug!("link status unavailable: {e}");
                LinkStatus::Disconnected
            }
        }
    }

    fn join(&mut self, ssid: &str, passphrase: &str) {
        let Ok(ssid_buf) = ssid.try_into() else {
            warn!("SSID does not fit the driver limit, join not issued");
            return;
        };
        let Ok(password) = passphrase.try_into() else {
            warn!("passphrase does not fit the driver limit, join not issued");
            return;
        };
        let client = ClientConfiguration {
            ssid: ssid_buf,
            password,
            auth_method: if passphrase.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..ClientConfiguration::default()
        };
        let (_, ap) = split_configuration(self.configuration());
        let next = if self.ap_part_active() {
            Configuration::Mixed(client, ap)
        } else {
            Configuration::Client(client)
        };
        self.apply(&next);
        info!("joining '{ssid}'");
        if let Err(e) = self.wifi.connect() {
            warn!("join not issued: {e}");
        }
    }

    fn join_stored(&mut self) {
        // With storage on flash the driver restores the last client
        // configuration at start; connecting without touching the
        // configuration reuses it.
        info!(
            "joining stored network '{}'",
            self.stored_ssid().unwrap_or_default()
        );
        if let Err(e) = self.wifi.connect() {
            warn!("stored join not issued: {e}");
        }
    }

    fn has_stored_credentials(&self) -> bool {
        self.stored_ssid().is_some()
    }

    fn stored_ssid(&self) -> Option<String> {
        match self.configuration() {
            Configuration::Client(client) | Configuration::Mixed(client, _)
                if !client.ssid.is_empty() =>
            {
                Some(client.ssid.as_str().to_string())
            }
            _ => None,
        }
    }

    fn disconnect(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            debug!("disconnect reported: {e}");
        }
    }

    fn scan(&mut self) -> Vec<ScanResult> {
        match self.wifi.scan() {
            Ok(points) => points
                .into_iter()
                .map(|point| ScanResult {
                    ssid: point.ssid.as_str().to_string(),
                    rssi_dbm: i16::from(point.signal_strength),
                    auth: auth_kind(point.auth_method),
                    bssid: point.bssid,
                })
                .collect(),
            Err(e) => {
                warn!("scan failed: {e}");
                Vec::new()
            }
        }
    }

    fn soft_ap(
        &mut self,
        ssid: &str,
        passphrase: Option<&str>,
        network: Option<&StaticNetworkConfig>,
    ) -> bool {
        let Ok(ssid_buf) = ssid.try_into() else {
            warn!("AP SSID does not fit the driver limit");
            return false;
        };
        let mut ap = AccessPointConfiguration {
            ssid: ssid_buf,
            auth_method: AuthMethod::None,
            ..AccessPointConfiguration::default()
        };
        if let Some(pass) = passphrase {
            match pass.try_into() {
                Ok(password) => {
                    ap.password = password;
                    ap.auth_method = AuthMethod::WPA2Personal;
                }
                Err(_) => warn!("AP passphrase does not fit the driver limit, starting open"),
            }
        }

        if let Some(net) = network {
            let netif_config = NetifConfiguration {
                ip_configuration: Some(ipv4::Configuration::Router(ipv4::RouterConfiguration {
                    subnet: ipv4::Subnet {
                        gateway: net.ip,
                        mask: ipv4::Mask(prefix_len(net.subnet)),
                    },
                    dhcp_enabled: true,
                    dns: Some(net.ip),
                    secondary_dns: None,
                })),
                ..NetifConfiguration::wifi_default_router()
            };
            let swapped = EspNetif::new_with_conf(&netif_config)
                .and_then(|netif| self.wifi.swap_netif_ap(netif));
            if let Err(e) = swapped {
                warn!("AP addressing override not applied: {e}");
            }
        }

        let (client, _) = split_configuration(self.configuration());
        let next = match self.configuration() {
            Configuration::Client(_) | Configuration::Mixed(..) => Configuration::Mixed(client, ap),
            _ => Configuration::AccessPoint(ap),
        };
        match self.wifi.set_configuration(&next).and_then(|()| self.wifi.start()) {
            Ok(()) => true,
            Err(e) => {
                warn!("AP start reported: {e}");
                false
            }
        }
    }

    fn stop_soft_ap(&mut self) -> bool {
        let next = match self.configuration() {
            Configuration::Mixed(client, _) => Configuration::Client(client),
            Configuration::AccessPoint(_) => Configuration::None,
            unchanged => unchanged,
        };
        match self.wifi.set_configuration(&next) {
            Ok(()) => true,
            Err(e) => {
                warn!("AP stop reported: {e}");
                false
            }
        }
    }

    fn ap_address(&self) -> Ipv4Addr {
        match self.wifi.ap_netif().get_ip_info() {
            Ok(info) => info.ip,
            Err(e) => {
                debug!("AP address unavailable: {e}");
                Ipv4Addr::UNSPECIFIED
            }
        }
    }

    fn ap_client_count(&self) -> usize {
        let mut stations = esp_idf_sys::wifi_sta_list_t::default();
        match esp!(unsafe { esp_idf_sys::esp_wifi_ap_get_sta_list(&mut stations) }) {
            Ok(()) => stations.num as usize,
            Err(e) => {
                debug!("station list unavailable: {e}");
                0
            }
        }
    }

    fn station_address(&self) -> Option<Ipv4Addr> {
        if !matches!(self.wifi.is_connected(), Ok(true)) {
            return None;
        }
        match self.wifi.sta_netif().get_ip_info() {
            Ok(info) if !info.ip.is_unspecified() => Some(info.ip),
            _ => None,
        }
    }

    fn set_station_network(&mut self, network: &StaticNetworkConfig) {
        let netif_config = NetifConfiguration {
            ip_configuration: Some(ipv4::Configuration::Client(
                ipv4::ClientConfiguration::Fixed(ipv4::ClientSettings {
                    ip: network.ip,
                    subnet: ipv4::Subnet {
                        gateway: network.gateway,
                        mask: ipv4::Mask(prefix_len(network.subnet)),
                    },
                    dns: None,
                    secondary_dns: None,
                }),
            )),
            ..NetifConfiguration::wifi_default_client()
        };
        let swapped = EspNetif::new_with_conf(&netif_config)
            .and_then(|netif| self.wifi.swap_netif_sta(netif));
        match swapped {
            Ok(_) => info!("station addressing fixed at {}", network.ip),
            Err(e) => warn!("static station addressing not applied: {e}"),
        }
    }

    fn set_persistent_credentials(&mut self, persistent: bool) {
        let storage = if persistent {
            esp_idf_sys::wifi_storage_t_WIFI_STORAGE_FLASH
        } else {
            esp_idf_sys::wifi_storage_t_WIFI_STORAGE_RAM
        };
        if let Err(e) = esp!(unsafe { esp_idf_sys::esp_wifi_set_storage(storage) }) {
            warn!("credential storage switch failed: {e}");
        }
    }

    fn erase_stored_credentials(&mut self) -> bool {
        match esp!(unsafe { esp_idf_sys::esp_wifi_restore() }) {
            Ok(()) => true,
            Err(e) => {
                warn!("credential erase failed: {e}");
                false
            }
        }
    }

    fn start_push_button_join(&mut self) {
        let mut config = esp_idf_sys::esp_wps_config_t::default();
        config.wps_type = esp_idf_sys::wps_type_WPS_TYPE_PBC;
        let started = esp!(unsafe { esp_idf_sys::esp_wifi_wps_enable(&config) })
            .and_then(|()| esp!(unsafe { esp_idf_sys::esp_wifi_wps_start(0) }));
        match started {
            Ok(()) => info!("push-button handshake started"),
            Err(e) => warn!("push-button handshake not started: {e}"),
        }
    }
}
