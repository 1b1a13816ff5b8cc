use log::{debug, info};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::{SystemStatus, SPECIAL_FUNCTION_CYLINDER_BOOST, SPECIAL_FUNCTION_QUICK_VETO};

/// The single override the client believes is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuickMode {
    #[default]
    None,
    Hotwater,
    Heating,
    /// Strategy start found nothing worth boosting; the caller's "enable"
    /// is acknowledged without a remote override.
    Idle,
}

impl QuickMode {
    pub fn is_active(&self) -> bool {
        *self != QuickMode::None
    }

    /// Reads the override markers of a status snapshot. Hot water wins when
    /// both are present.
    pub fn observe(status: &SystemStatus) -> QuickMode {
        let boosted = |function: &str| function == SPECIAL_FUNCTION_CYLINDER_BOOST;
        if status
            .state
            .dhw
            .iter()
            .any(|d| boosted(&d.current_special_function))
            || status
                .state
                .domestic_hot_water
                .iter()
                .any(|d| boosted(&d.current_special_function))
        {
            QuickMode::Hotwater
        } else if status
            .state
            .zones
            .iter()
            .any(|z| z.current_special_function == SPECIAL_FUNCTION_QUICK_VETO)
        {
            QuickMode::Heating
        } else {
            QuickMode::None
        }
    }
}

impl fmt::Display for QuickMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuickMode::None => "none",
            QuickMode::Hotwater => "hotwater boost",
            QuickMode::Heating => "heating quick veto",
            QuickMode::Idle => "idle",
        };
        f.write_str(s)
    }
}

/// Locally tracked quick mode, reconciled against remote observations.
///
/// Transitions coming from observation are debounced: clearing waits
/// `debounce` after the last start, adopting a new mode waits `debounce`
/// after the last stop, and a locally set `Idle` survives for `idle_grace`.
#[derive(Debug, Clone)]
pub struct QuickModeTracker {
    current: QuickMode,
    started: Instant,
    /// `None` until something stopped; treated as long ago.
    stopped: Option<Instant>,
    debounce: Duration,
    idle_grace: Duration,
}

impl QuickModeTracker {
    pub fn new(debounce: Duration, idle_grace: Duration) -> Self {
        Self {
            current: QuickMode::None,
            started: Instant::now(),
            stopped: None,
            debounce,
            idle_grace,
        }
    }

    pub fn current(&self) -> QuickMode {
        self.current
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn stopped(&self) -> Option<Instant> {
        self.stopped
    }

    /// Records a mode this client just started.
    pub fn mark_started(&mut self, mode: QuickMode, now: Instant) {
        info!("Quick mode: \"{}\" -> \"{}\"", self.current, mode);
        self.current = mode;
        self.started = now;
    }

    /// Records that this client just stopped the active mode.
    pub fn mark_stopped(&mut self, now: Instant) {
        info!("Quick mode: \"{}\" -> \"{}\"", self.current, QuickMode::None);
        self.current = QuickMode::None;
        self.stopped = Some(now);
    }

    /// Folds one remote snapshot into the tracked mode. Returns `true` if
    /// the tracked mode changed.
    pub fn reconcile(&mut self, status: &SystemStatus, now: Instant) -> bool {
        self.reconcile_observed(QuickMode::observe(status), now)
    }

    pub fn reconcile_observed(&mut self, observed: QuickMode, now: Instant) -> bool {
        if observed == self.current {
            return false;
        }

        if observed == QuickMode::None {
            if now.saturating_duration_since(self.started) < self.debounce {
                debug!(
                    "Remote shows no quick mode, keeping \"{}\" until it is older than {:?}",
                    self.current, self.debounce
                );
                return false;
            }
            if self.current == QuickMode::Idle
                && now.saturating_duration_since(self.started) < self.idle_grace
            {
                debug!(
                    "Idle mode active for less than {:?}, keeping it",
                    self.idle_grace
                );
                return false;
            }
            self.mark_stopped(now);
            return true;
        }

        if let Some(stopped) = self.stopped {
            if now.saturating_duration_since(stopped) < self.debounce {
                debug!(
                    "Remote shows \"{}\" but a quick mode was stopped less than {:?} ago",
                    observed, self.debounce
                );
                return false;
            }
        }
        self.mark_started(observed, now);
        true
    }
}
