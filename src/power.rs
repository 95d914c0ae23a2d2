//! Coarse power states and the sleep triggers.

use crate::config::{NavConfig, MIN_SATELLITES};
use crate::time::{elapsed, Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    Boot,
    AwaitingFix,
    Navigating,
    /// Terminal for the session.
    Sleeping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepReason {
    Inactivity,
    FixTimeout,
    LongPress,
    /// Asked for directly by the firmware.
    Requested,
}

/// What may wake the unit from deep sleep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeSource {
    /// The single key, active low.
    Key,
}

/// Power hardware collaborator.
pub trait PowerControl {
    /// Enter deep sleep. The next thing to run is a fresh boot.
    fn suspend_until_wake(&mut self, wake: WakeSource) -> !;
}

#[derive(Debug)]
pub struct PowerStateMachine {
    state: PowerState,
    awaiting_since: Instant,
    last_activity: Instant,
    inactivity_timeout: Duration,
    fix_timeout: Duration,
    sleep_reason: Option<SleepReason>,
}

impl PowerStateMachine {
    pub fn new(config: &NavConfig, now: Instant) -> Self {
        Self {
            state: PowerState::Boot,
            awaiting_since: now,
            last_activity: now,
            inactivity_timeout: config.inactivity_timeout,
            fix_timeout: config.fix_timeout,
            sleep_reason: None,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn sleep_reason(&self) -> Option<SleepReason> {
        self.sleep_reason
    }

    /// Boot has nothing to wait for.
    pub fn start(&mut self, now: Instant) {
        if self.state == PowerState::Boot {
            self.transition(PowerState::AwaitingFix);
            self.awaiting_since = now;
            self.last_activity = now;
        }
    }

    /// Satellite count from the latest accepted fix.
    pub fn on_satellites(&mut self, satellites: u8) {
        if self.state == PowerState::AwaitingFix && satellites >= MIN_SATELLITES {
            self.transition(PowerState::Navigating);
        }
    }

    /// Movement or a key press restarts the inactivity window.
    pub fn note_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Check the timers. Returns the reason once a timeout has elapsed; the
    /// caller is expected to follow up with [`Self::enter_sleep`].
    pub fn check_timeouts(&self, now: Instant) -> Option<SleepReason> {
        match self.state {
            PowerState::AwaitingFix if elapsed(now, self.awaiting_since) >= self.fix_timeout => {
                Some(SleepReason::FixTimeout)
            }
            PowerState::AwaitingFix | PowerState::Navigating
                if elapsed(now, self.last_activity) >= self.inactivity_timeout =>
            {
                Some(SleepReason::Inactivity)
            }
            _ => None,
        }
    }

    /// Move to Sleeping. Returns false if already there.
    pub fn enter_sleep(&mut self, reason: SleepReason) -> bool {
        if self.state == PowerState::Sleeping {
            return false;
        }
        log_info!("sleeping: {:?}", reason);
        self.sleep_reason = Some(reason);
        self.transition(PowerState::Sleeping);
        true
    }

    fn transition(&mut self, next: PowerState) {
        log_info!("power {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
