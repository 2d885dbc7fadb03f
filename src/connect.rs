//! A single bounded join attempt.
//!
//! The orchestrator hands this module a radio in station(+AP) mode and one
//! set of credentials (or none, to rejoin the stored network); it issues
//! the join and waits it out. No retries happen here; re-entering the
//! portal after a failure is the orchestrator's decision.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::{Credentials, PortalConfig, StaticNetworkConfig};
use crate::hooks::PortalHooks;
use crate::radio::{LinkStatus, Radio};

/// Interval between link-status polls during a bounded wait.
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of one join attempt. Never a fault: every variant is a normal
/// outcome the orchestrator routes on.
#[must_use = "the attempt outcome decides whether the portal re-enters"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Station associated and is addressable.
    Connected,
    /// Nothing to join with: no credentials given and none stored.
    NoCredentials,
    /// The radio reported a terminal failure.
    Failed,
    /// No terminal status within the configured bound.
    TimedOut,
}

impl AttemptOutcome {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Policy for one join attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionAttempt {
    /// Bound on the wait; `None` delegates to the radio's unbounded wait.
    pub connect_timeout: Option<Duration>,
    /// Try the push-button handshake once if a passphrase-less join fails.
    pub push_button_fallback: bool,
}

impl ConnectionAttempt {
    pub fn new(connect_timeout: Option<Duration>, push_button_fallback: bool) -> Self {
        Self {
            connect_timeout,
            push_button_fallback,
        }
    }

    pub fn from_config(config: &PortalConfig) -> Self {
        Self::new(config.connect_timeout, config.push_button_fallback)
    }

    /// Run the attempt.
    ///
    /// With `credentials`, issues a fresh join; the radio's persistent
    /// storage is enabled only around that join, so nothing else can
    /// overwrite saved credentials. Without credentials, rejoins the stored
    /// network when `stored_fallback` allows and one exists, otherwise
    /// returns [`AttemptOutcome::NoCredentials`] without waiting.
    pub fn run<R, H>(
        &self,
        radio: &mut R,
        hooks: &mut H,
        credentials: Option<&Credentials>,
        sta_static: Option<&StaticNetworkConfig>,
        stored_fallback: bool,
    ) -> AttemptOutcome
    where
        R: Radio + ?Sized,
        H: PortalHooks + ?Sized,
    {
        if let Some(network) = sta_static {
            radio.set_station_network(network);
        }

        let passphrase_supplied = match credentials {
            Some(creds) => {
                info!("connecting to '{}'", creds.ssid);
                radio.disconnect();
                radio.set_persistent_credentials(true);
                radio.join(&creds.ssid, &creds.passphrase);
                radio.set_persistent_credentials(false);
                !creds.passphrase.is_empty()
            }
            None if stored_fallback && radio.has_stored_credentials() => {
                info!(
                    "connecting to stored network '{}'",
                    radio.stored_ssid().unwrap_or_default()
                );
                radio.join_stored();
                false
            }
            None => {
                debug!("no credentials supplied and none stored");
                return AttemptOutcome::NoCredentials;
            }
        };

        let mut status = self.wait(radio, hooks);

        if status != LinkStatus::Joined && self.push_button_fallback && !passphrase_supplied {
            info!("join without passphrase failed, trying push-button handshake");
            radio.start_push_button_join();
            status = self.wait(radio, hooks);
        }

        match status {
            LinkStatus::Joined => {
                info!(
                    "connected, station address {}",
                    radio
                        .station_address()
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".into())
                );
                AttemptOutcome::Connected
            }
            LinkStatus::JoinFailed => {
                warn!("join attempt failed");
                AttemptOutcome::Failed
            }
            other => {
                warn!("join attempt timed out (last status: {other})");
                AttemptOutcome::TimedOut
            }
        }
    }

    /// Wait for a terminal status, polling every [`STATUS_POLL_INTERVAL`]
    /// with a yield per slice. Returns the last observed status when the
    /// bound elapses first.
    fn wait<R, H>(&self, radio: &mut R, hooks: &mut H) -> LinkStatus
    where
        R: Radio + ?Sized,
        H: PortalHooks + ?Sized,
    {
        let Some(timeout) = self.connect_timeout else {
            return radio.wait_for_join_unbounded();
        };

        let deadline = Instant::now() + timeout;
        loop {
            let status = radio.status();
            if status.is_terminal() {
                return status;
            }
            if Instant::now() >= deadline {
                return status;
            }
            hooks.sleep(STATUS_POLL_INTERVAL);
            hooks.on_idle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{InstantHooks, SimRadio};
    use std::net::Ipv4Addr;

    const TIMEOUT: Option<Duration> = Some(Duration::from_secs(10));

    fn creds(ssid: &str, passphrase: &str) -> Credentials {
        Credentials::new(ssid, passphrase)
    }

    // ==================== Credential Source Tests ====================

    #[test]
    fn test_no_credentials_fails_fast() {
        let mut radio = SimRadio::new();
        let attempt = ConnectionAttempt::new(TIMEOUT, false);
        let outcome = attempt.run(&mut radio, &mut InstantHooks, None, None, true);
        assert_eq!(outcome, AttemptOutcome::NoCredentials);
        assert!(radio.joins.is_empty());
    }

    #[test]
    fn test_stored_fallback_can_be_disallowed() {
        let mut radio = SimRadio::new().with_stored("home", "secret123");
        let attempt = ConnectionAttempt::new(TIMEOUT, false);
        let outcome = attempt.run(&mut radio, &mut InstantHooks, None, None, false);
        assert_eq!(outcome, AttemptOutcome::NoCredentials);
        assert!(radio.joins.is_empty());
    }

    #[test]
    fn test_stored_rejoin_connects() {
        let mut radio = SimRadio::new().with_stored("home", "secret123");
        let attempt = ConnectionAttempt::new(TIMEOUT, false);
        let outcome = attempt.run(&mut radio, &mut InstantHooks, None, None, true);
        assert_eq!(outcome, AttemptOutcome::Connected);
    }

    // ==================== Fresh Join Tests ====================

    #[test]
    fn test_fresh_join_persists_only_during_the_call() {
        let mut radio = SimRadio::new();
        let attempt = ConnectionAttempt::new(TIMEOUT, false);
        let outcome = attempt.run(
            &mut radio,
            &mut InstantHooks,
            Some(&creds("home", "secret123")),
            None,
            true,
        );
        assert_eq!(outcome, AttemptOutcome::Connected);
        assert_eq!(radio.joins, vec![("home".into(), "secret123".into())]);
        assert_eq!(radio.persistent_log, vec![true, false]);
        assert_eq!(radio.disconnects, 1);
        assert_eq!(radio.stored_ssid().as_deref(), Some("home"));
    }

    #[test]
    fn test_static_config_applied_before_join() {
        let mut radio = SimRadio::new();
        let network = StaticNetworkConfig::new(
            Ipv4Addr::new(10, 0, 0, 9),
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(255, 255, 255, 0),
        );
        let attempt = ConnectionAttempt::new(TIMEOUT, false);
        let _ = attempt.run(
            &mut radio,
            &mut InstantHooks,
            Some(&creds("home", "secret123")),
            Some(&network),
            true,
        );
        assert_eq!(radio.station_network(), Some(&network));
    }

    #[test]
    fn test_rejected_join_reports_failed() {
        let mut radio = SimRadio::new();
        radio.set_join_latency(0);
        let attempt = ConnectionAttempt::new(TIMEOUT, false);
        let outcome = attempt.run(
            &mut radio,
            &mut InstantHooks,
            Some(&creds("home", "nope")),
            None,
            true,
        );
        assert_eq!(outcome, AttemptOutcome::Failed);
    }

    // ==================== Wait Policy Tests ====================

    #[test]
    fn test_bounded_wait_times_out() {
        let mut radio = SimRadio::new();
        radio.set_join_latency(u32::MAX);
        let attempt = ConnectionAttempt::new(Some(Duration::from_millis(10)), false);
        let outcome = attempt.run(
            &mut radio,
            &mut InstantHooks,
            Some(&creds("home", "secret123")),
            None,
            true,
        );
        assert_eq!(outcome, AttemptOutcome::TimedOut);
    }

    #[test]
    fn test_unbounded_wait_delegates_to_radio() {
        let mut radio = SimRadio::new();
        radio.set_join_latency(1);
        let attempt = ConnectionAttempt::new(None, false);
        let outcome = attempt.run(
            &mut radio,
            &mut InstantHooks,
            Some(&creds("home", "secret123")),
            None,
            true,
        );
        assert_eq!(outcome, AttemptOutcome::Connected);
    }

    // ==================== Push-Button Tests ====================

    #[test]
    fn test_push_button_tried_once_without_passphrase() {
        let mut radio = SimRadio::new();
        radio.set_join_latency(0);
        radio.fail_next_join();
        radio.set_push_button_succeeds(true);
        let attempt = ConnectionAttempt::new(TIMEOUT, true);
        let outcome = attempt.run(
            &mut radio,
            &mut InstantHooks,
            Some(&creds("cafe-guest", "")),
            None,
            true,
        );
        assert_eq!(outcome, AttemptOutcome::Connected);
        assert_eq!(radio.push_button_requests, 1);
    }

    #[test]
    fn test_push_button_skipped_with_passphrase() {
        let mut radio = SimRadio::new();
        radio.set_join_latency(0);
        radio.fail_next_join();
        let attempt = ConnectionAttempt::new(TIMEOUT, true);
        let outcome = attempt.run(
            &mut radio,
            &mut InstantHooks,
            Some(&creds("home", "secret123")),
            None,
            true,
        );
        assert_eq!(outcome, AttemptOutcome::Failed);
        assert_eq!(radio.push_button_requests, 0);
    }

    #[test]
    fn test_push_button_disabled_by_config() {
        let mut radio = SimRadio::new();
        radio.set_join_latency(0);
        radio.fail_next_join();
        radio.set_push_button_succeeds(true);
        let attempt = ConnectionAttempt::new(TIMEOUT, false);
        let outcome = attempt.run(
            &mut radio,
            &mut InstantHooks,
            Some(&creds("cafe-guest", "")),
            None,
            true,
        );
        assert_eq!(outcome, AttemptOutcome::Failed);
        assert_eq!(radio.push_button_requests, 0);
    }
}
