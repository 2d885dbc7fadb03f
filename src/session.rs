//! Portal session state.
//!
//! One `PortalSession` exists per portal run. All mutation happens inside
//! the state machine's `poll()` sequence (handlers run synchronously within
//! it), so the session needs no locking; every run-scoped flag lives here
//! and nowhere else.

use std::fmt;
use std::time::{Duration, Instant};

use crate::config::{Credentials, StaticNetworkConfig};

/// What the device is doing while the portal runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalRole {
    /// Portal pages served over an existing station connection; no AP.
    StationOnly,
    /// Rendezvous AP up, portal not (yet) serving.
    ApActive,
    /// Rendezvous AP up with the full captive portal.
    ApAndWebPortal,
}

impl PortalRole {
    pub fn label(self) -> &'static str {
        match self {
            Self::StationOnly => "web portal (station)",
            Self::ApActive => "access point",
            Self::ApAndWebPortal => "access point + portal",
        }
    }
}

impl fmt::Display for PortalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a session ended (or that it has not yet).
#[must_use = "the session outcome decides what the caller does next"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Still provisioning.
    Pending,
    /// Station joined the target network.
    Connected,
    /// A join attempt failed and the portal was configured to stop.
    Failed,
    /// The portal window elapsed.
    TimedOut,
    /// Exit/reset was requested from the portal.
    Aborted,
}

impl SessionOutcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::TimedOut => "timed out",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A form submission waiting for the next poll to act on it.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    pub credentials: Credentials,
    pub sta_static: Option<StaticNetworkConfig>,
}

/// Bookkeeping for one portal run.
#[derive(Debug)]
pub struct PortalSession {
    role: PortalRole,
    started_at: Instant,
    /// Effective start of the timeout window; activity slides it forward.
    window_started_at: Instant,
    last_activity_at: Option<Instant>,
    pending: Option<PendingSubmission>,
    outcome: SessionOutcome,
    abort_requested: bool,
}

impl PortalSession {
    pub fn new(role: PortalRole, now: Instant) -> Self {
        Self {
            role,
            started_at: now,
            window_started_at: now,
            last_activity_at: None,
            pending: None,
            outcome: SessionOutcome::Pending,
            abort_requested: false,
        }
    }

    pub fn role(&self) -> PortalRole {
        self.role
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn window_started_at(&self) -> Instant {
        self.window_started_at
    }

    pub fn last_activity_at(&self) -> Option<Instant> {
        self.last_activity_at
    }

    /// Record web activity; the timeout policy grants grace from it.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity_at = Some(now);
    }

    /// Slide the effective start of the timeout window forward.
    pub(crate) fn slide_window_to(&mut self, at: Instant) {
        self.window_started_at = at;
    }

    /// Stash a submission for the next poll. Rejected once the session is
    /// terminal; a second submission before the attempt replaces the first.
    pub fn submit(&mut self, submission: PendingSubmission) -> bool {
        if self.outcome.is_terminal() {
            return false;
        }
        self.pending = Some(submission);
        true
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn take_pending(&mut self) -> Option<PendingSubmission> {
        self.pending.take()
    }

    /// Set by the exit/reset handlers only; observed once per poll cycle.
    pub fn request_abort(&mut self) {
        self.abort_requested = true;
    }

    pub fn abort_requested(&self) -> bool {
        self.abort_requested
    }

    pub fn outcome(&self) -> SessionOutcome {
        self.outcome
    }

    /// Terminal transition. Clears any pending submission: credentials must
    /// not outlive the session (they zero themselves on drop).
    pub fn finish(&mut self, outcome: SessionOutcome) {
        self.outcome = outcome;
        self.pending = None;
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }

    pub fn uptime(&self, now: Instant) -> Duration {
        now.duration_since(self.started_at)
    }
}
