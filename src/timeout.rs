//! Portal window timeout with activity grace.
//!
//! The window must bound unattended exposure of the open rendezvous AP
//! without cutting off a user mid-configuration. Elapsed time therefore
//! only accrues while nobody is associated (when client grace is on), and
//! serving a portal page pushes the window forward (web grace).

use std::time::{Duration, Instant};

use log::debug;

use crate::config::PortalConfig;
use crate::session::PortalSession;

/// Decides when a portal session has run out of time.
///
/// Stateless itself; the sliding window lives in the session so that a
/// fresh policy value (or a re-read of the config) cannot reset it.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    timeout: Option<Duration>,
    client_activity_grace: bool,
    web_activity_grace: bool,
}

impl TimeoutPolicy {
    pub fn new(
        timeout: Option<Duration>,
        client_activity_grace: bool,
        web_activity_grace: bool,
    ) -> Self {
        Self {
            timeout,
            client_activity_grace,
            web_activity_grace,
        }
    }

    pub fn from_config(config: &PortalConfig) -> Self {
        Self::new(
            config.portal_timeout,
            config.client_activity_grace,
            config.web_activity_grace,
        )
    }

    /// Check the window against `now`.
    ///
    /// Guarded sessions (no timeout configured, or client grace with at
    /// least one associated peer) never time out, and each check slides the
    /// effective start to `now` so time only accrues from the moment the
    /// guard lapses. Web grace advances the effective start to the last
    /// page activity. Times out once the elapsed window reaches the
    /// configured duration.
    pub fn has_timed_out(
        &self,
        session: &mut PortalSession,
        now: Instant,
        ap_clients: usize,
    ) -> bool {
        let Some(timeout) = self.timeout else {
            session.slide_window_to(now);
            return false;
        };

        if self.client_activity_grace && ap_clients > 0 {
            session.slide_window_to(now);
            return false;
        }

        if self.web_activity_grace {
            if let Some(last) = session.last_activity_at() {
                if last > session.window_started_at() {
                    session.slide_window_to(last);
                }
            }
        }

        let elapsed = now.duration_since(session.window_started_at());
        if elapsed >= timeout {
            debug!("portal window elapsed after {elapsed:?}");
            true
        } else {
            false
        }
    }
}
