//! Host demo of the provisioning portal.
//!
//! Runs the portal against the simulated radio so the pages, the captive
//! DNS answers and the submit-and-join flow can be exercised from a browser
//! on a dev machine.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin host-portal
//! # then browse http://127.0.0.1:8080/
//! ```
//!
//! Browse by IP: a symbolic host (like `localhost`) trips the captive
//! redirect, exactly as a phone's connectivity probe would. Any passphrase
//! of at least 8 characters "joins" the simulated radio; shorter ones fail
//! and re-enter the portal, same as a wrong passphrase on hardware.

use std::time::Duration;

use log::{info, warn};
use wifi_provisioner::sim::{demo_scan, SimRadio};
use wifi_provisioner::{
    CustomParameter, PortalConfig, Radio, SessionOutcome, StdTransport, WifiProvisioner,
};

const HTTP_PORT: u16 = 8080;
const DNS_PORT: u16 = 5353;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== Provisioning portal (host demo) starting ===");

    let radio = SimRadio::new().with_scan_results(demo_scan());
    let transport = StdTransport::with_ports(HTTP_PORT, DNS_PORT);
    let config = PortalConfig {
        portal_timeout: Some(Duration::from_secs(300)),
        connect_timeout: Some(Duration::from_secs(10)),
        ..PortalConfig::default()
    };

    let mut portal = WifiProvisioner::new(radio, transport, config);
    portal.add_parameter(
        CustomParameter::new("mqtt", "MQTT broker", "mqtt.local", 64)
            .expect("static parameter id"),
    );

    info!("pages at http://127.0.0.1:{HTTP_PORT}/, captive DNS on udp/{DNS_PORT}");

    match portal.auto_connect("demo-portal", "") {
        SessionOutcome::Connected => {
            info!(
                "provisioned: joined '{}'",
                portal.radio().stored_ssid().unwrap_or_default()
            );
            if let Some(value) = portal.parameter_value("mqtt") {
                info!("mqtt broker parameter: '{value}'");
            }
        }
        outcome => warn!("portal ended without a connection: {outcome}"),
    }
}
