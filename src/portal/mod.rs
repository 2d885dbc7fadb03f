//! The provisioning portal state machine.
//!
//! [`WifiProvisioner`] owns a [`Radio`], a [`Transport`] and the caller's
//! [`PortalHooks`], and drives the whole flow: rendezvous AP up, captive
//! DNS + portal pages served, credentials captured, join attempted, AP torn
//! down. Everything runs in the caller's context; one [`WifiProvisioner::poll`]
//! services at most one DNS query and one HTTP exchange, then returns. No
//! locks, no background tasks.
//!
//! Two ways to drive it:
//! - cooperative: call [`WifiProvisioner::poll`] from the main loop until it
//!   stops returning [`PollResult::Pending`];
//! - blocking: [`WifiProvisioner::run_blocking_until_resolved`] (or
//!   [`WifiProvisioner::auto_connect`] with `blocking` set) loops internally
//!   and applies the portal timeout policy.

mod pages;
mod routes;

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::{
    validate_ap_password, ConfigError, Credentials, PortalConfig, StaticNetworkConfig,
    DEFAULT_AP_SSID,
};
use crate::connect::ConnectionAttempt;
use crate::hooks::{DefaultHooks, PortalHooks};
use crate::params::{CustomParameter, ParameterRegistry};
use crate::radio::{LinkStatus, Radio, RadioMode};
use crate::session::{PendingSubmission, PortalRole, PortalSession, SessionOutcome};
use crate::timeout::TimeoutPolicy;
use crate::transport::Transport;

/// Pause after AP bring-up before reading the interface address. Some
/// radios report 0.0.0.0 for a moment after `soft_ap` returns.
const AP_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Pause between accepting a submission and churning radio modes, so the
/// saved-page response reaches the client before its AP link gets shaky.
const ATTEMPT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Slice for settle sleeps; `on_idle` runs between slices.
const SETTLE_SLICE: Duration = Duration::from_millis(50);

/// Pacing of the blocking resolution loop.
const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Where the state machine currently is. Linear except for the
/// `Connecting -> PortalActive` edge taken when an attempt fails and the
/// portal re-enters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalState {
    /// Constructed, nothing started.
    Idle,
    /// Radio mode switched, AP coming up.
    ApStarting,
    /// Serving DNS and portal pages.
    PortalActive,
    /// Join attempt in progress; the portal pauses.
    Connecting,
    /// Join verified.
    Connected,
    /// Session over, AP and servers down.
    TornDown,
}

/// What one `poll()` resolved to.
#[must_use = "a terminal poll result means the portal is gone"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// Portal still running; keep polling.
    Pending,
    /// Provisioning succeeded and the portal tore itself down.
    Connected,
    /// The session ended without a connection (failed, aborted).
    Failed,
}

/// Successful portal bring-up: what to print on the device's display so the
/// user knows where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    /// Name of the rendezvous AP (or of the joined network for a web-only
    /// portal).
    pub ssid: String,
    /// Address serving the portal pages.
    pub address: Ipv4Addr,
}

/// Captive-portal WiFi provisioner.
///
/// Generic over the radio, the transport and the hooks so the same state
/// machine runs against ESP-IDF, the host simulator and scripted tests.
pub struct WifiProvisioner<R, T, H = DefaultHooks> {
    config: PortalConfig,
    radio: R,
    transport: T,
    hooks: H,
    params: ParameterRegistry,
    session: Option<PortalSession>,
    state: PortalState,
    last_outcome: SessionOutcome,
    /// Radio mode to restore at teardown when the session did not connect.
    prior_mode: Option<RadioMode>,
    /// Name of the running rendezvous AP, for the pages.
    ap_ssid: String,
    /// Address the portal answers on while serving.
    device_ip: Ipv4Addr,
    /// Whether this session saw a credential submission; gates the
    /// `credentials_saved` hook at teardown.
    submission_seen: bool,
}

impl<R: Radio, T: Transport> WifiProvisioner<R, T> {
    /// Create a provisioner with [`DefaultHooks`].
    pub fn new(radio: R, transport: T, config: PortalConfig) -> Self {
        Self::with_hooks(radio, transport, DefaultHooks, config)
    }
}

impl<R: Radio, T: Transport, H: PortalHooks> WifiProvisioner<R, T, H> {
    /// Create a provisioner with caller-supplied hooks.
    ///
    /// The config is validated up front; problems are logged rather than
    /// refused, because every config error has a defined degraded behavior.
    pub fn with_hooks(radio: R, transport: T, hooks: H, config: PortalConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("portal config problem, continuing degraded: {e}");
        }
        Self {
            config,
            radio,
            transport,
            hooks,
            params: ParameterRegistry::new(),
            session: None,
            state: PortalState::Idle,
            last_outcome: SessionOutcome::Pending,
            prior_mode: None,
            ap_ssid: String::new(),
            device_ip: Ipv4Addr::UNSPECIFIED,
            submission_seen: false,
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn state(&self) -> PortalState {
        self.state
    }

    /// Outcome of the current session, or of the last one after teardown.
    pub fn outcome(&self) -> SessionOutcome {
        self.session
            .as_ref()
            .map_or(self.last_outcome, PortalSession::outcome)
    }

    /// True between a successful `start()` and teardown.
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&PortalSession> {
        self.session.as_ref()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Direct radio access, for callers that manage the radio outside the
    /// portal lifecycle. Avoid while a session is active.
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Direct transport access (tests inject traffic through this).
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Register a custom form field. Registration order is render order.
    pub fn add_parameter(&mut self, param: CustomParameter) {
        self.params.add(param);
    }

    pub fn parameters(&self) -> &ParameterRegistry {
        &self.params
    }

    /// Value of a custom field after the form was submitted.
    pub fn parameter_value(&self, id: &str) -> Option<&str> {
        self.params.value(id)
    }

    /// Erase credentials persisted in the radio. Returns whether the erase
    /// succeeded.
    pub fn erase_stored_credentials(&mut self) -> bool {
        self.radio.erase_stored_credentials()
    }

    /// Try the stored credentials first and only open the portal when they
    /// do not produce a connection.
    ///
    /// Returns [`SessionOutcome::Connected`] without ever starting the
    /// portal when the stored join works. Otherwise the portal starts with
    /// the given AP parameters; with `blocking` configured this drives it
    /// to resolution, otherwise it returns [`SessionOutcome::Pending`] and
    /// the caller polls.
    pub fn auto_connect(&mut self, ap_ssid: &str, ap_passphrase: &str) -> SessionOutcome {
        self.radio.set_mode(RadioMode::Station);
        if self.radio.status() == LinkStatus::Joined {
            info!("already connected, portal not needed");
            self.last_outcome = SessionOutcome::Connected;
            self.state = PortalState::Connected;
            return SessionOutcome::Connected;
        }

        let attempt = ConnectionAttempt::from_config(&self.config);
        let outcome = attempt.run(
            &mut self.radio,
            &mut self.hooks,
            None,
            self.config.sta_static.as_ref(),
            true,
        );
        if outcome.is_connected() {
            self.last_outcome = SessionOutcome::Connected;
            self.state = PortalState::Connected;
            return SessionOutcome::Connected;
        }

        info!("stored credentials did not produce a connection, opening the portal");
        if let Err(e) = self.start(ap_ssid, ap_passphrase) {
            warn!("portal started degraded: {e}");
        }
        if self.config.blocking {
            self.run_blocking_until_resolved()
        } else {
            SessionOutcome::Pending
        }
    }

    /// Bring up the rendezvous AP and the portal servers.
    ///
    /// Non-empty arguments override the configured defaults. On success the
    /// caller polls; with default config, [`WifiProvisioner::auto_connect`]
    /// is usually the better entry point.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ApPasswordRejected`] when the AP passphrase is outside
    /// the WPA2 range. The portal still comes up, with an open AP, so a bad
    /// passphrase can never brick provisioning; the error tells the caller
    /// the AP is unprotected. [`ConfigError::InvalidConfig`] when a session
    /// is already active (nothing is touched in that case).
    pub fn start(&mut self, ap_ssid: &str, ap_passphrase: &str) -> Result<Started, ConfigError> {
        if self.session.is_some() {
            return Err(ConfigError::InvalidConfig(
                "a portal session is already active",
            ));
        }

        self.state = PortalState::ApStarting;
        debug!("state -> ap starting");

        let ssid = self.effective_ap_ssid(ap_ssid);
        let requested = if ap_passphrase.is_empty() {
            self.config.ap_passphrase.clone()
        } else {
            ap_passphrase.to_string()
        };
        let password_error = validate_ap_password(&requested).err();
        let passphrase = match &password_error {
            None if !requested.is_empty() => Some(requested),
            _ => None,
        };
        if password_error.is_some() {
            warn!("AP passphrase rejected, starting the rendezvous AP open");
        }

        self.prior_mode = Some(self.radio.mode());
        // Credentials persist only inside an attempt's explicit window;
        // nothing the portal does in between may overwrite them.
        self.radio.set_persistent_credentials(false);

        // A half-associated station keeps some radios from answering on the
        // AP interface. Keep the station only when it is actually joined.
        if self.radio.status() == LinkStatus::Joined {
            self.radio.set_mode(RadioMode::Both);
        } else {
            self.radio.disconnect();
            self.radio.set_mode(RadioMode::AccessPoint);
        }

        if !self
            .radio
            .soft_ap(&ssid, passphrase.as_deref(), self.config.ap_static.as_ref())
        {
            // The flag is best-effort; radios report failure with the AP up.
            warn!("radio reported AP start failure, continuing");
        }
        self.settle(AP_SETTLE_DELAY);
        self.device_ip = self.radio.ap_address();
        self.ap_ssid = ssid.clone();

        let role = if self.open_transport() {
            PortalRole::ApAndWebPortal
        } else {
            PortalRole::ApActive
        };

        self.session = Some(PortalSession::new(role, Instant::now()));
        self.submission_seen = false;
        self.last_outcome = SessionOutcome::Pending;
        self.state = PortalState::PortalActive;
        debug!("state -> portal active");
        self.hooks.ap_started(&ssid, self.device_ip);
        match role {
            PortalRole::ApActive => info!("rendezvous AP '{ssid}' up, portal pages unavailable"),
            _ => info!("portal '{ssid}' serving at http://{}/", self.device_ip),
        }

        match password_error {
            Some(error) => Err(error),
            None => Ok(Started {
                ssid,
                address: self.device_ip,
            }),
        }
    }

    /// Serve the portal pages over an existing station connection, no AP.
    ///
    /// Same routes, same polling; useful for reconfiguring an already
    /// provisioned device from inside its network.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidConfig`] when a session is already active or
    /// the station has no address to serve on.
    pub fn start_web_portal(&mut self) -> Result<Started, ConfigError> {
        if self.session.is_some() {
            return Err(ConfigError::InvalidConfig(
                "a portal session is already active",
            ));
        }
        let Some(address) = self.radio.station_address() else {
            return Err(ConfigError::InvalidConfig(
                "web portal needs a joined station interface",
            ));
        };

        self.prior_mode = None;
        self.device_ip = address;
        self.ap_ssid = self.radio.stored_ssid().unwrap_or_default();
        // Unlike the AP flow there is no degraded mode here: without its
        // servers a station-side portal serves nothing at all.
        if !self.open_transport() {
            return Err(ConfigError::InvalidConfig(
                "web portal transport failed to open",
            ));
        }

        self.session = Some(PortalSession::new(PortalRole::StationOnly, Instant::now()));
        self.submission_seen = false;
        self.last_outcome = SessionOutcome::Pending;
        self.state = PortalState::PortalActive;
        debug!("state -> portal active (web only)");
        info!("web portal serving at http://{address}/");

        Ok(Started {
            ssid: self.ap_ssid.clone(),
            address,
        })
    }

    /// Run one cooperative slice: at most one DNS query, at most one HTTP
    /// exchange, then any submission-triggered join attempt.
    ///
    /// Terminal results mean the session tore itself down (servers closed,
    /// AP stopped); distinguish failure modes through
    /// [`WifiProvisioner::outcome`].
    pub fn poll(&mut self) -> PollResult {
        let Some(session) = self.session.as_ref() else {
            debug!("poll without an active session");
            return PollResult::Pending;
        };

        // Set by the exit/reset pages during the previous cycle; acting on
        // it one cycle later lets their responses go out first.
        if session.abort_requested() {
            info!("portal session aborted");
            self.finish(SessionOutcome::Aborted);
            return PollResult::Failed;
        }

        self.service_transport();

        if self
            .session
            .as_ref()
            .is_some_and(PortalSession::has_pending)
        {
            return self.run_pending_attempt();
        }

        PollResult::Pending
    }

    /// Drive the portal to resolution, applying the portal window timeout.
    ///
    /// The classic blocking flow: the caller gives up its loop and gets a
    /// terminal outcome back.
    pub fn run_blocking_until_resolved(&mut self) -> SessionOutcome {
        let policy = TimeoutPolicy::from_config(&self.config);
        loop {
            let clients = self.radio.ap_client_count();
            let Some(session) = self.session.as_mut() else {
                return self.last_outcome;
            };
            if policy.has_timed_out(session, Instant::now(), clients) {
                warn!("portal window elapsed without provisioning");
                self.finish(SessionOutcome::TimedOut);
                return SessionOutcome::TimedOut;
            }

            match self.poll() {
                PollResult::Pending => {}
                PollResult::Connected => return SessionOutcome::Connected,
                PollResult::Failed => return self.last_outcome,
            }

            self.hooks.on_idle();
            self.hooks.sleep(BLOCKING_POLL_INTERVAL);
        }
    }

    /// Queue credentials as if the form had been submitted.
    ///
    /// The next `poll()` runs the join attempt. `values` are absorbed into
    /// matching custom parameters first. Returns whether the submission was
    /// accepted (a terminal or missing session rejects it).
    pub fn submit_credentials(
        &mut self,
        ssid: &str,
        passphrase: &str,
        sta_static: Option<StaticNetworkConfig>,
        values: &[(String, String)],
    ) -> bool {
        let updated = self.params.absorb(values);
        if updated > 0 {
            debug!("absorbed {updated} custom parameter value(s)");
        }

        let Some(session) = self.session.as_mut() else {
            warn!("credentials submitted without an active session");
            return false;
        };
        let accepted = session.submit(PendingSubmission {
            credentials: Credentials::new(ssid, passphrase),
            sta_static,
        });
        if accepted {
            self.submission_seen = true;
            info!("credentials for '{ssid}' queued for the next poll");
        } else {
            warn!("submission ignored, session already {}", session.outcome());
        }
        accepted
    }

    /// Tear the portal down: final transport drain, servers closed, AP
    /// stopped, radio mode restored. A session that ended connected keeps
    /// station mode instead of the prior mode, so the fresh join survives
    /// teardown. Idempotent. A session still pending is recorded as
    /// aborted.
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if !session.is_terminal() {
            session.finish(SessionOutcome::Aborted);
        }
        info!("portal stopping: {}", session.outcome());

        if self.submission_seen {
            self.hooks.credentials_saved();
        }

        // One last drain so the page that triggered the stop gets out.
        self.service_transport();
        self.transport.close();

        if session.role() != PortalRole::StationOnly {
            if !self.radio.stop_soft_ap() {
                warn!("radio reported AP stop failure");
            }
            let restored = if session.outcome() == SessionOutcome::Connected {
                // Keep the fresh join; only drop the AP role.
                RadioMode::Station
            } else {
                self.prior_mode.take().unwrap_or(RadioMode::Station)
            };
            self.prior_mode = None;
            self.radio.set_mode(restored);
        }

        if self.config.restore_persistent {
            self.radio.set_persistent_credentials(true);
        }

        self.last_outcome = session.outcome();
        self.state = if session.outcome() == SessionOutcome::Connected {
            PortalState::Connected
        } else {
            PortalState::TornDown
        };
        debug!("state -> {:?}", self.state);
    }

    /// Service at most one DNS query and one HTTP exchange. Transport
    /// errors are logged and skipped; the portal outlives flaky clients.
    fn service_transport(&mut self) {
        if let Err(e) = self.transport.serve_dns() {
            warn!("dns service error: {e}");
        }

        match self.transport.next_request() {
            Ok(Some(request)) => {
                let response = self.dispatch(&request);
                if let Err(e) = self.transport.send_response(response) {
                    warn!("response not delivered: {e}");
                }
            }
            Ok(None) => {}
            Err(e) => warn!("http service error: {e}"),
        }
    }

    /// Run the queued join attempt and route its outcome.
    fn run_pending_attempt(&mut self) -> PollResult {
        self.state = PortalState::Connecting;
        debug!("state -> connecting");
        self.settle(ATTEMPT_SETTLE_DELAY);

        let Some(pending) = self.session.as_mut().and_then(|s| s.take_pending()) else {
            self.state = PortalState::PortalActive;
            return PollResult::Pending;
        };

        // The station joins next to the running AP; the AP drops only after
        // the attempt is verified.
        self.radio.set_mode(RadioMode::Both);

        // An empty submitted SSID means "retry the stored network".
        let credentials = (!pending.credentials.ssid.is_empty()).then_some(&pending.credentials);
        let sta_static = pending
            .sta_static
            .as_ref()
            .or(self.config.sta_static.as_ref());
        let attempt = ConnectionAttempt::from_config(&self.config);
        let outcome = attempt.run(&mut self.radio, &mut self.hooks, credentials, sta_static, true);

        if outcome.is_connected() {
            info!("provisioning complete");
            self.finish(SessionOutcome::Connected);
            return PollResult::Connected;
        }

        if self.config.stop_after_attempt {
            warn!("join attempt did not connect ({outcome:?}), stopping");
            self.finish(SessionOutcome::Failed);
            return PollResult::Failed;
        }

        warn!("join attempt did not connect ({outcome:?}), portal re-entered");
        self.radio.disconnect();
        self.radio.set_mode(RadioMode::AccessPoint);
        self.state = PortalState::PortalActive;
        debug!("state -> portal active");
        PollResult::Pending
    }

    fn finish(&mut self, outcome: SessionOutcome) {
        if let Some(session) = self.session.as_mut() {
            session.finish(outcome);
        }
        self.stop();
    }

    /// Open the portal servers. Returns whether they are serving; a failed
    /// open is logged, not fatal, because the AP alone still marks the
    /// device as reachable and recoverable.
    fn open_transport(&mut self) -> bool {
        match self.transport.open(self.device_ip) {
            Ok(()) => true,
            Err(e) => {
                error!("portal transport failed to open: {e}");
                false
            }
        }
    }

    fn effective_ap_ssid(&self, requested: &str) -> String {
        if !requested.is_empty() {
            requested.to_string()
        } else if !self.config.ap_ssid.is_empty() {
            self.config.ap_ssid.clone()
        } else {
            DEFAULT_AP_SSID.to_string()
        }
    }

    /// Sleep in short slices with a yield between each, so cooperative
    /// schedulers and watchdogs stay fed during settle delays.
    fn settle(&mut self, total: Duration) {
        let mut remaining = total;
        while !remaining.is_zero() {
            let slice = remaining.min(SETTLE_SLICE);
            self.hooks.sleep(slice);
            self.hooks.on_idle();
            remaining -= slice;
        }
    }

    /// Record page activity for the web-activity grace window.
    fn touch_activity(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.touch(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{portal_request, ScriptedTransport, SimRadio};
    use crate::transport::Method;

    /// Hooks that never really sleep and record every lifecycle callback.
    #[derive(Default)]
    struct RecordingHooks {
        ap_started: Vec<(String, Ipv4Addr)>,
        saved: usize,
        restarts: usize,
    }

    impl PortalHooks for RecordingHooks {
        fn ap_started(&mut self, ssid: &str, address: Ipv4Addr) {
            self.ap_started.push((ssid.to_string(), address));
        }

        fn credentials_saved(&mut self) {
            self.saved += 1;
        }

        fn restart_requested(&mut self) {
            self.restarts += 1;
        }

        fn sleep(&mut self, _duration: Duration) {}
    }

    fn test_config() -> PortalConfig {
        PortalConfig {
            connect_timeout: Some(Duration::from_secs(5)),
            ..PortalConfig::default()
        }
    }

    fn provisioner(
        radio: SimRadio,
        config: PortalConfig,
    ) -> WifiProvisioner<SimRadio, ScriptedTransport, RecordingHooks> {
        WifiProvisioner::with_hooks(
            radio,
            ScriptedTransport::new(),
            RecordingHooks::default(),
            config,
        )
    }

    // ==================== Happy Path Tests ====================

    #[test]
    fn test_full_provisioning_flow() {
        let mut portal = provisioner(SimRadio::new(), test_config());

        let started = portal.start("unit-portal", "").unwrap();
        assert_eq!(started.ssid, "unit-portal");
        assert_eq!(started.address, Ipv4Addr::new(192, 168, 4, 1));
        assert_eq!(portal.state(), PortalState::PortalActive);
        assert_eq!(portal.radio().ap_ssid(), Some("unit-portal"));
        assert_eq!(
            portal.hooks().ap_started,
            vec![("unit-portal".to_string(), Ipv4Addr::new(192, 168, 4, 1))]
        );

        assert_eq!(portal.poll(), PollResult::Pending);

        assert!(portal.submit_credentials("home", "secret123", None, &[]));
        assert_eq!(portal.poll(), PollResult::Connected);

        assert_eq!(portal.outcome(), SessionOutcome::Connected);
        assert_eq!(portal.state(), PortalState::Connected);
        assert!(!portal.is_active());
        // AP gone, fresh join kept, credentials persisted by the attempt.
        assert_eq!(portal.radio().ap_ssid(), None);
        assert_eq!(portal.radio().mode(), RadioMode::Station);
        assert_eq!(portal.radio().stored_ssid().as_deref(), Some("home"));
        // Persistence windows: portal start, around the join, teardown restore.
        assert_eq!(portal.radio().persistent_log, vec![false, true, false, true]);
        assert_eq!(portal.hooks().saved, 1);
        assert_eq!(portal.transport().close_count, 1);
    }

    #[test]
    fn test_failed_attempt_reenters_portal() {
        let mut radio = SimRadio::new();
        radio.set_join_latency(0);
        let mut portal = provisioner(radio, test_config());
        portal.start("unit-portal", "").unwrap();

        assert!(portal.submit_credentials("home", "nope", None, &[]));
        assert_eq!(portal.poll(), PollResult::Pending);

        // Session survives, AP is back without the station role.
        assert!(portal.is_active());
        assert_eq!(portal.outcome(), SessionOutcome::Pending);
        assert_eq!(portal.state(), PortalState::PortalActive);
        assert_eq!(portal.radio().mode(), RadioMode::AccessPoint);

        // A corrected submission still works.
        assert!(portal.submit_credentials("home", "secret123", None, &[]));
        assert_eq!(portal.poll(), PollResult::Connected);
    }

    #[test]
    fn test_stop_after_attempt_tears_down_on_failure() {
        let mut radio = SimRadio::new();
        radio.set_join_latency(0);
        let config = PortalConfig {
            stop_after_attempt: true,
            ..test_config()
        };
        let mut portal = provisioner(radio, config);
        portal.start("unit-portal", "").unwrap();

        assert!(portal.submit_credentials("home", "nope", None, &[]));
        assert_eq!(portal.poll(), PollResult::Failed);
        assert_eq!(portal.outcome(), SessionOutcome::Failed);
        assert!(!portal.is_active());
        assert_eq!(portal.radio().ap_ssid(), None);
    }

    // ==================== AP Password Tests ====================

    #[test]
    fn test_invalid_ap_password_starts_open_and_reports() {
        let mut portal = provisioner(SimRadio::new(), test_config());

        let result = portal.start("unit-portal", "short");
        assert_eq!(result, Err(ConfigError::ApPasswordRejected { len: 5 }));

        // The portal is running regardless, with an open AP.
        assert_eq!(portal.state(), PortalState::PortalActive);
        assert!(portal.is_active());
        assert_eq!(portal.radio().ap_ssid(), Some("unit-portal"));
        assert_eq!(portal.radio().soft_ap_passphrases, vec![None]);
        portal.stop();
    }

    #[test]
    fn test_valid_ap_password_is_used() {
        let mut portal = provisioner(SimRadio::new(), test_config());
        portal.start("unit-portal", "hunter2hunter2").unwrap();
        assert_eq!(
            portal.radio().soft_ap_passphrases,
            vec![Some("hunter2hunter2".to_string())]
        );
        portal.stop();
    }

    #[test]
    fn test_start_twice_is_refused() {
        let mut portal = provisioner(SimRadio::new(), test_config());
        portal.start("unit-portal", "").unwrap();
        assert!(matches!(
            portal.start("again", ""),
            Err(ConfigError::InvalidConfig(_))
        ));
        // The running session was not disturbed.
        assert_eq!(portal.radio().ap_ssid(), Some("unit-portal"));
        portal.stop();
    }

    // ==================== Abort Tests ====================

    #[test]
    fn test_exit_page_aborts_on_the_next_poll() {
        let mut portal = provisioner(SimRadio::new(), test_config());
        portal.start("unit-portal", "").unwrap();

        portal.transport_mut().push_request(portal_request(
            Method::Get,
            "/exit",
            Some("192.168.4.1"),
            &[],
        ));

        // The cycle that serves the exit page still reports pending.
        assert_eq!(portal.poll(), PollResult::Pending);
        assert_eq!(portal.transport().responses.len(), 1);

        // The next cycle acts on the abort.
        assert_eq!(portal.poll(), PollResult::Failed);
        assert_eq!(portal.outcome(), SessionOutcome::Aborted);
        assert!(!portal.is_active());
    }

    #[test]
    fn test_stop_mid_session_records_aborted() {
        let mut portal = provisioner(SimRadio::new(), test_config());
        portal.start("unit-portal", "").unwrap();
        portal.stop();
        assert_eq!(portal.outcome(), SessionOutcome::Aborted);
        // Idempotent.
        portal.stop();
        assert_eq!(portal.transport().close_count, 1);
    }

    #[test]
    fn test_stop_restores_prior_mode_unless_connected() {
        // Aborted session: the mode from before start() comes back.
        let mut portal = provisioner(SimRadio::new(), test_config());
        assert_eq!(portal.radio().mode(), RadioMode::Off);
        portal.start("unit-portal", "").unwrap();
        portal.stop();
        assert_eq!(portal.radio().mode(), RadioMode::Off);

        // Connected session: station mode is kept so the join survives.
        let mut portal = provisioner(SimRadio::new(), test_config());
        portal.start("unit-portal", "").unwrap();
        assert!(portal.submit_credentials("home", "secret123", None, &[]));
        assert_eq!(portal.poll(), PollResult::Connected);
        assert_eq!(portal.radio().mode(), RadioMode::Station);
    }

    // ==================== Bounded Work Tests ====================

    #[test]
    fn test_poll_services_at_most_one_of_each() {
        let mut portal = provisioner(SimRadio::new(), test_config());
        portal.start("unit-portal", "").unwrap();

        let transport = portal.transport_mut();
        transport.push_dns_queries(2);
        transport.push_request(portal_request(Method::Get, "/", Some("192.168.4.1"), &[]));
        transport.push_request(portal_request(Method::Get, "/i", Some("192.168.4.1"), &[]));

        assert_eq!(portal.poll(), PollResult::Pending);
        assert_eq!(portal.transport().dns_serviced, 1);
        assert_eq!(portal.transport().responses.len(), 1);

        assert_eq!(portal.poll(), PollResult::Pending);
        assert_eq!(portal.transport().dns_serviced, 2);
        assert_eq!(portal.transport().responses.len(), 2);
    }

    // ==================== Timeout Tests ====================

    #[test]
    fn test_blocking_loop_times_out() {
        let config = PortalConfig {
            portal_timeout: Some(Duration::from_millis(30)),
            ..test_config()
        };
        let mut portal = provisioner(SimRadio::new(), config);
        portal.start("unit-portal", "").unwrap();

        let outcome = portal.run_blocking_until_resolved();
        assert_eq!(outcome, SessionOutcome::TimedOut);
        assert_eq!(portal.outcome(), SessionOutcome::TimedOut);
        assert!(!portal.is_active());
        assert_eq!(portal.radio().ap_ssid(), None);
    }

    #[test]
    fn test_blocking_loop_resolves_submissions() {
        let mut portal = provisioner(SimRadio::new(), test_config());
        portal.start("unit-portal", "").unwrap();
        portal.transport_mut().push_request(portal_request(
            Method::Post,
            "/wifisave",
            Some("192.168.4.1"),
            &[("s", "home"), ("p", "secret123")],
        ));

        let outcome = portal.run_blocking_until_resolved();
        assert_eq!(outcome, SessionOutcome::Connected);
        assert_eq!(portal.radio().stored_ssid().as_deref(), Some("home"));
    }

    // ==================== Submission Guard Tests ====================

    #[test]
    fn test_submit_without_session_is_rejected() {
        let mut portal = provisioner(SimRadio::new(), test_config());
        assert!(!portal.submit_credentials("home", "secret123", None, &[]));
        assert_eq!(portal.poll(), PollResult::Pending);
        assert!(portal.radio().joins.is_empty());
    }

    // ==================== Auto-Connect Tests ====================

    #[test]
    fn test_auto_connect_with_stored_credentials_skips_portal() {
        let mut radio = SimRadio::new().with_stored("home", "secret123");
        radio.set_join_latency(0);
        let mut portal = provisioner(radio, test_config());

        assert_eq!(portal.auto_connect("unit-portal", ""), SessionOutcome::Connected);
        assert_eq!(portal.outcome(), SessionOutcome::Connected);
        assert!(!portal.is_active());
        assert_eq!(portal.transport().open_count, 0);
        assert_eq!(portal.radio().ap_ssid(), None);
    }

    #[test]
    fn test_auto_connect_already_joined_reports_connected_state() {
        // A link brought up before auto_connect, as after a warm reboot.
        let mut radio = SimRadio::new().with_stored("home", "secret123");
        radio.set_join_latency(0);
        radio.join_stored();
        let _ = radio.status();

        let mut portal = provisioner(radio, test_config());
        assert_eq!(portal.auto_connect("unit-portal", ""), SessionOutcome::Connected);
        assert_eq!(portal.state(), PortalState::Connected);
        assert_eq!(portal.outcome(), SessionOutcome::Connected);
        // The setup join is the only one; no portal was opened.
        assert_eq!(portal.radio().joins.len(), 1);
        assert_eq!(portal.transport().open_count, 0);
    }

    #[test]
    fn test_auto_connect_without_stored_opens_portal_nonblocking() {
        let config = PortalConfig {
            blocking: false,
            ..test_config()
        };
        let mut portal = provisioner(SimRadio::new(), config);

        assert_eq!(portal.auto_connect("unit-portal", ""), SessionOutcome::Pending);
        assert!(portal.is_active());
        assert_eq!(portal.transport().open_count, 1);
        assert_eq!(portal.radio().ap_ssid(), Some("unit-portal"));
        portal.stop();
    }

    #[test]
    fn test_auto_connect_blocking_drives_to_timeout() {
        let config = PortalConfig {
            portal_timeout: Some(Duration::from_millis(30)),
            ..test_config()
        };
        let mut portal = provisioner(SimRadio::new(), config);
        assert_eq!(
            portal.auto_connect("unit-portal", ""),
            SessionOutcome::TimedOut
        );
        assert!(!portal.is_active());
    }

    // ==================== Web Portal Tests ====================

    #[test]
    fn test_web_portal_serves_on_station_address() {
        let mut radio = SimRadio::new().with_stored("home", "secret123");
        radio.set_join_latency(0);
        radio.join_stored();
        assert_eq!(radio.status(), LinkStatus::Joined);

        let mut portal = provisioner(radio, test_config());
        let started = portal.start_web_portal().unwrap();
        assert_eq!(started.address, Ipv4Addr::new(10, 0, 0, 17));
        assert_eq!(started.ssid, "home");
        assert_eq!(
            portal.session().map(PortalSession::role),
            Some(PortalRole::StationOnly)
        );
        assert_eq!(
            portal.transport().opened_at,
            Some(Ipv4Addr::new(10, 0, 0, 17))
        );

        portal.stop();
        // No AP was involved; the station link is untouched.
        assert_eq!(portal.radio().status(), LinkStatus::Joined);
        assert_eq!(portal.transport().close_count, 1);
    }

    #[test]
    fn test_web_portal_requires_station_address() {
        let mut portal = provisioner(SimRadio::new(), test_config());
        assert!(matches!(
            portal.start_web_portal(),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(!portal.is_active());
    }

    // ==================== Degraded Transport Tests ====================

    #[test]
    fn test_ap_survives_transport_open_failure() {
        let mut transport = ScriptedTransport::new();
        transport.fail_open = true;
        let mut portal =
            WifiProvisioner::with_hooks(SimRadio::new(), transport, RecordingHooks::default(), test_config());

        // The AP is still worth having; only the pages are gone.
        portal.start("unit-portal", "").unwrap();
        assert!(portal.is_active());
        assert_eq!(
            portal.session().map(PortalSession::role),
            Some(PortalRole::ApActive)
        );
        assert_eq!(portal.radio().ap_ssid(), Some("unit-portal"));
        assert_eq!(portal.poll(), PollResult::Pending);

        portal.stop();
        assert_eq!(portal.transport().close_count, 0);
    }

    #[test]
    fn test_web_portal_refuses_without_transport() {
        let mut radio = SimRadio::new().with_stored("home", "secret123");
        radio.set_join_latency(0);
        radio.join_stored();
        let _ = radio.status();

        let mut transport = ScriptedTransport::new();
        transport.fail_open = true;
        let mut portal =
            WifiProvisioner::with_hooks(radio, transport, RecordingHooks::default(), test_config());
        assert!(matches!(
            portal.start_web_portal(),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(!portal.is_active());
    }

    // ==================== Persistence Tests ====================

    #[test]
    fn test_restore_persistent_can_be_disabled() {
        let config = PortalConfig {
            restore_persistent: false,
            ..test_config()
        };
        let mut portal = provisioner(SimRadio::new(), config);
        portal.start("unit-portal", "").unwrap();
        assert!(portal.submit_credentials("home", "secret123", None, &[]));
        assert_eq!(portal.poll(), PollResult::Connected);
        // No trailing restore write.
        assert_eq!(portal.radio().persistent_log, vec![false, true, false]);
    }

    #[test]
    fn test_default_ap_ssid_fallbacks() {
        let mut portal = provisioner(SimRadio::new(), test_config());
        let started = portal.start("", "").unwrap();
        assert_eq!(started.ssid, DEFAULT_AP_SSID);
        portal.stop();

        let config = PortalConfig {
            ap_ssid: "from-config".into(),
            ..test_config()
        };
        let mut portal = provisioner(SimRadio::new(), config);
        let started = portal.start("", "").unwrap();
        assert_eq!(started.ssid, "from-config");
        portal.stop();
    }
}
