//! Caller hooks into the portal lifecycle.
//!
//! One injected strategy object carries every caller-supplied behavior:
//! lifecycle notifications, a cooperative yield point, and the
//! sleep primitive used by every bounded wait. All methods default to
//! no-ops (sleep defaults to `thread::sleep`), so `DefaultHooks` is enough
//! for ordinary hosts; schedulers with watchdogs override `on_idle`, tests
//! override `sleep` to run waits instantly.

use std::net::Ipv4Addr;
use std::time::Duration;

/// Injected portal callbacks and timing primitives.
pub trait PortalHooks {
    /// The rendezvous AP is up and the portal is about to serve. Fired once
    /// per session, before the first `poll()`.
    fn ap_started(&mut self, ssid: &str, address: Ipv4Addr) {
        let _ = (ssid, address);
    }

    /// Credentials were submitted and are being committed; fired before
    /// teardown so the caller can persist custom parameter values.
    fn credentials_saved(&mut self) {}

    /// The reset page was requested. The portal aborts its session but never
    /// restarts the device itself; that decision belongs here.
    fn restart_requested(&mut self) {}

    /// Cooperative yield point, invoked at sub-interval granularity inside
    /// every wait loop and once per blocking-loop iteration. Feed watchdogs
    /// here.
    fn on_idle(&mut self) {}

    /// Bounded sleep used by settle delays and status polling.
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Hooks that do nothing beyond really sleeping.
#[derive(Debug, Default)]
pub struct DefaultHooks;

impl PortalHooks for DefaultHooks {}
