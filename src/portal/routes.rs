//! The portal's route table and handlers.
//!
//! Fixed routes, resolved by exact path match:
//!
//! | path        | page                                        |
//! |-------------|---------------------------------------------|
//! | `/`         | menu (captive-check applies)                |
//! | `/wifi`     | credential form with a fresh scan           |
//! | `/0wifi`    | credential form without scanning            |
//! | `/wifisave` | accept a submission, show the saved page    |
//! | `/i`        | device info                                 |
//! | `/status`   | link state as JSON                          |
//! | `/r`        | request a device restart, abort the session |
//! | `/erase`    | erase stored credentials                    |
//! | `/exit`     | close the portal, abort the session         |
//!
//! Anything else is a 404 (captive-check applies, so portal-detection
//! probes against random paths still get the redirect). Every handler runs
//! synchronously inside `poll()` and counts as activity for the
//! web-activity grace window, except the captive redirect itself: probe
//! chatter must not hold the portal open.

use std::net::Ipv4Addr;
use std::time::Instant;

use log::{debug, error, info, warn};

use crate::config::StaticNetworkConfig;
use crate::hooks::PortalHooks;
use crate::radio::{LinkStatus, Radio};
use crate::redirect::{redirect_response, should_redirect};
use crate::session::{PortalRole, PortalSession};
use crate::signal::{rank_networks, rssi_to_quality};
use crate::transport::{PortalRequest, PortalResponse, Transport};

use super::{pages, WifiProvisioner};

impl<R: Radio, T: Transport, H: PortalHooks> WifiProvisioner<R, T, H> {
    pub(crate) fn dispatch(&mut self, request: &PortalRequest) -> PortalResponse {
        debug!("portal request: {:?} {}", request.method, request.path);
        match request.path.as_str() {
            "/" => self.handle_root(request),
            "/wifi" => self.handle_wifi_form(true),
            "/0wifi" => self.handle_wifi_form(false),
            "/wifisave" => self.handle_save(request),
            "/i" => self.handle_info(),
            "/status" => self.handle_status(),
            "/r" => self.handle_reset(),
            "/erase" => self.handle_erase(),
            "/exit" => self.handle_exit(),
            _ => self.handle_not_found(request),
        }
    }

    /// Redirect symbolic hosts to the portal address so OS captive-portal
    /// probes land on the menu. `None` means the request names this device
    /// and the route should render normally.
    fn captive_redirect(&self, request: &PortalRequest) -> Option<PortalResponse> {
        let host = request.host.as_deref().unwrap_or("");
        if should_redirect(host, self.config.captive_portal) {
            info!("captive redirect for host '{host}'");
            return Some(redirect_response(self.device_ip));
        }
        None
    }

    fn render(&self, body: &str) -> PortalResponse {
        PortalResponse::html(pages::page(
            &self.page_title(),
            &self.config.custom_head,
            body,
        ))
    }

    /// AP name while the rendezvous AP runs, the device address for a
    /// web-only portal.
    fn page_title(&self) -> String {
        match self.session.as_ref().map(PortalSession::role) {
            Some(PortalRole::StationOnly) => self.device_ip.to_string(),
            _ => self.ap_ssid.clone(),
        }
    }

    fn handle_root(&mut self, request: &PortalRequest) -> PortalResponse {
        if let Some(redirect) = self.captive_redirect(request) {
            return redirect;
        }
        self.touch_activity();
        self.render(pages::menu())
    }

    fn handle_wifi_form(&mut self, scan: bool) -> PortalResponse {
        self.touch_activity();
        let mut body = String::new();

        if scan {
            let networks = self.radio.scan();
            let ranked = rank_networks(&networks, self.config.min_quality, self.config.dedupe_scans);
            debug!("scan: {} found, {} listed", networks.len(), ranked.len());
            if ranked.is_empty() {
                body.push_str(pages::no_networks());
            } else {
                for index in ranked {
                    let network = &networks[index];
                    body.push_str(&pages::network_item(
                        &network.ssid,
                        rssi_to_quality(network.rssi_dbm),
                        network.auth.is_secured(),
                    ));
                }
                body.push_str("<br/>");
            }
        }

        let prefill = self.radio.stored_ssid().unwrap_or_default();
        body.push_str(&pages::form_open(&prefill));

        if self.config.show_static_fields || self.config.sta_static.is_some() {
            let (ip, gateway, subnet) = match &self.config.sta_static {
                Some(net) => (
                    net.ip.to_string(),
                    net.gateway.to_string(),
                    net.subnet.to_string(),
                ),
                None => (String::new(), String::new(), String::new()),
            };
            body.push_str(&pages::static_field("ip", "Static IP", &ip));
            body.push_str(&pages::static_field("gw", "Static Gateway", &gateway));
            body.push_str(&pages::static_field("sn", "Subnet", &subnet));
            body.push_str("<br/>");
        }

        for param in self.params.iter() {
            body.push_str(&pages::param_field(param));
        }

        body.push_str(pages::form_close());
        body.push_str(pages::scan_link());
        self.render(&body)
    }

    /// `/wifisave` queues the submission; the join runs on the next poll so
    /// this response reaches the client over the still-stable AP link first.
    fn handle_save(&mut self, request: &PortalRequest) -> PortalResponse {
        self.touch_activity();
        let ssid = request.param("s").unwrap_or("");
        let passphrase = request.param("p").unwrap_or("");
        let sta_static = self.static_override(request);
        if ssid.is_empty() {
            info!("form submitted without an SSID, will retry the stored network");
        }
        self.submit_credentials(ssid, passphrase, sta_static, &request.params);
        self.render(pages::saved_body())
    }

    /// Static station settings for this submission: form fields override the
    /// configured base per-field; without a base, all three are required.
    fn static_override(&self, request: &PortalRequest) -> Option<StaticNetworkConfig> {
        let ip = parse_addr_field(request, "ip");
        let gateway = parse_addr_field(request, "gw");
        let subnet = parse_addr_field(request, "sn");

        match &self.config.sta_static {
            Some(base) => Some(StaticNetworkConfig {
                ip: ip.unwrap_or(base.ip),
                gateway: gateway.unwrap_or(base.gateway),
                subnet: subnet.unwrap_or(base.subnet),
            }),
            None => match (ip, gateway, subnet) {
                (Some(ip), Some(gateway), Some(subnet)) => {
                    Some(StaticNetworkConfig::new(ip, gateway, subnet))
                }
                (None, None, None) => None,
                _ => {
                    warn!("partial static settings ignored, ip/gw/sn must all be given");
                    None
                }
            },
        }
    }

    fn handle_info(&mut self) -> PortalResponse {
        self.touch_activity();
        let mut body = String::from("<dl>");
        body.push_str(&pages::info_entry("Link", self.radio.status().label()));
        body.push_str(&pages::info_entry(
            "Radio mode",
            &self.radio.mode().to_string(),
        ));
        let stored = self.radio.stored_ssid();
        body.push_str(&pages::info_entry(
            "Stored network",
            stored.as_deref().unwrap_or("(none)"),
        ));
        let station = self.radio.station_address().map(|a| a.to_string());
        body.push_str(&pages::info_entry(
            "Station address",
            station.as_deref().unwrap_or("(none)"),
        ));
        if self.session.as_ref().map(PortalSession::role) == Some(PortalRole::ApAndWebPortal) {
            body.push_str(&pages::info_entry("AP name", &self.ap_ssid));
            body.push_str(&pages::info_entry(
                "AP address",
                &self.device_ip.to_string(),
            ));
            body.push_str(&pages::info_entry(
                "AP clients",
                &self.radio.ap_client_count().to_string(),
            ));
        }
        if let Some(session) = self.session.as_ref() {
            let uptime = session.uptime(Instant::now());
            body.push_str(&pages::info_entry(
                "Portal uptime",
                &format!("{}s", uptime.as_secs()),
            ));
        }
        body.push_str("</dl>");
        body.push_str(pages::erase_button());
        body.push_str(pages::back_link());
        self.render(&body)
    }

    fn handle_status(&mut self) -> PortalResponse {
        self.touch_activity();
        let status = self.radio.status();
        let stored = self.radio.stored_ssid();
        let sta_ip = self.radio.station_address().map(|a| a.to_string());
        let uptime_secs = self
            .session
            .as_ref()
            .map_or(0, |s| s.uptime(Instant::now()).as_secs());
        let body = format!(
            r#"{{"link":{},"connected":{},"stored_ssid":{},"sta_ip":{},"ap_ssid":{},"portal_ip":{},"ap_clients":{},"uptime_secs":{}}}"#,
            json_string(status.label()),
            status == LinkStatus::Joined,
            json_opt(stored.as_deref()),
            json_opt(sta_ip.as_deref()),
            json_opt((!self.ap_ssid.is_empty()).then_some(self.ap_ssid.as_str())),
            json_string(&self.device_ip.to_string()),
            self.radio.ap_client_count(),
            uptime_secs,
        );
        PortalResponse::json(body)
    }

    fn handle_reset(&mut self) -> PortalResponse {
        self.touch_activity();
        info!("device restart requested from the portal");
        self.hooks.restart_requested();
        if let Some(session) = self.session.as_mut() {
            session.request_abort();
        }
        self.render(pages::reset_body())
    }

    fn handle_erase(&mut self) -> PortalResponse {
        self.touch_activity();
        let erased = self.radio.erase_stored_credentials();
        if erased {
            info!("stored credentials erased");
        } else {
            error!("stored credential erase failed");
        }
        let mut body = pages::erase_body(erased).to_string();
        body.push_str(pages::back_link());
        self.render(&body)
    }

    fn handle_exit(&mut self) -> PortalResponse {
        self.touch_activity();
        info!("portal close requested from the exit page");
        if let Some(session) = self.session.as_mut() {
            session.request_abort();
        }
        self.render(pages::exit_body())
    }

    fn handle_not_found(&mut self, request: &PortalRequest) -> PortalResponse {
        if let Some(redirect) = self.captive_redirect(request) {
            return redirect;
        }
        self.touch_activity();
        let mut message = format!(
            "Not found\n\nURI: {}\nMethod: {:?}\nArguments: {}\n",
            request.path,
            request.method,
            request.params.len(),
        );
        for (name, value) in &request.params {
            message.push_str(&format!(" {name}: {value}\n"));
        }
        PortalResponse::text(404, message)
    }
}

fn parse_addr_field(request: &PortalRequest, name: &str) -> Option<Ipv4Addr> {
    let raw = request.param(name)?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(addr) => Some(addr),
        Err(_) => {
            warn!("unparsable {name} field '{raw}' ignored");
            None
        }
    }
}

fn json_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn json_opt(value: Option<&str>) -> String {
    value.map_or_else(|| "null".to_string(), json_string)
}
