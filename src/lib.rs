//! Captive-portal WiFi provisioning for headless devices.
//!
//! A device that ships without credentials brings up a rendezvous access
//! point, answers every DNS query with its own address and serves a small
//! set of configuration pages. The user joins the AP, lands on the portal,
//! picks a network and submits a passphrase; the device tries the join and
//! tears the portal down once it holds.
//!
//! The core is a cooperative state machine: one [`WifiProvisioner::poll`]
//! call services at most one DNS query and one HTTP exchange, so it can run
//! inside an existing firmware main loop without tasks or locks. Hardware
//! sits behind the [`radio::Radio`] trait (the `esp32` feature provides an
//! ESP-IDF implementation); sockets sit behind [`transport::Transport`], so
//! everything above the drivers is testable on the host.

pub mod config;
pub mod connect;
#[cfg(feature = "esp32")]
pub mod esp32;
pub mod hooks;
pub mod params;
pub mod portal;
pub mod radio;
pub mod redirect;
pub mod session;
pub mod signal;
pub mod sim;
pub mod timeout;
pub mod transport;

// Re-export commonly used items
pub use config::{ConfigError, Credentials, PortalConfig, StaticNetworkConfig};
pub use connect::{AttemptOutcome, ConnectionAttempt};
pub use hooks::{DefaultHooks, PortalHooks};
pub use params::{CustomParameter, LabelPlacement};
pub use portal::{PollResult, PortalState, Started, WifiProvisioner};
pub use radio::{AuthKind, LinkStatus, Radio, RadioMode, ScanResult};
pub use session::{PortalRole, SessionOutcome};
pub use transport::{StdTransport, Transport};

#[cfg(feature = "esp32")]
pub use esp32::EspRadio;
