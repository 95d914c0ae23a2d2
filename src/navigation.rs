//! The navigation session: one owner for every piece of state.
//!
//! Everything runs to completion per call. The firmware feeds fixes, key
//! events, timer ticks and remote commands in from its tasks, all through a
//! single lock around [`NavigationCore`].

use core::fmt::{self, Write};

use crate::battery;
use crate::button::ButtonEvent;
use crate::command::{self, CommandError, DecimalDegrees, RemoteCommand, Response};
use crate::config::NavConfig;
use crate::consumption::ConsumptionTracker;
use crate::fix::{ChangeEvent, Fix, FixOutcome, FixTracker, PositionSource};
use crate::geo::Coordinate;
use crate::mode::NavigationMode;
use crate::power::{PowerControl, PowerState, PowerStateMachine, SleepReason, WakeSource};
use crate::registry::{RegistryError, TargetRegistry};
use crate::route;
use crate::selector::{TargetFrame, TargetSelector};
use crate::storage::{StorageError, Store};
use crate::target::{ReferencePoint, SlotKind};
use crate::time::Instant;

/// Transient confirmation shown over the normal screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Banner {
    HomeSet,
    HomeRejected,
    Sleeping,
}

/// Headline state for the status line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    WaitingForFix,
    NoHome,
    WaitingForTakeoff,
    Navigating,
}

/// What the render sink gets to draw.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub targets: TargetFrame,
    pub status: Status,
    pub banner: Option<Banner>,
    pub mode: NavigationMode,
    pub power: PowerState,
    pub altitude_ft: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub satellites: u8,
    pub battery_percent: Option<u8>,
    /// Only while the fuel readout is switched on.
    pub fuel: Option<f64>,
}

/// Display collaborator.
pub trait RenderSink {
    fn render(&mut self, frame: &Frame);
}

pub struct NavigationCore<S> {
    store: S,
    config: NavConfig,
    tracker: FixTracker,
    registry: TargetRegistry,
    selector: TargetSelector,
    consumption: ConsumptionTracker,
    power: PowerStateMachine,
    banner: Option<(Banner, Instant)>,
    battery_percent: Option<u8>,
    fuel_visible: bool,
}

impl<S: Store> NavigationCore<S> {
    /// Restore persisted state from `store` and leave Boot.
    pub fn new(mut store: S, config: NavConfig, now: Instant) -> Self {
        let registry = TargetRegistry::load(&mut store);
        let consumption = ConsumptionTracker::load(&mut store);
        let mut power = PowerStateMachine::new(&config, now);
        power.start(now);

        Self {
            store,
            config,
            tracker: FixTracker::new(),
            registry,
            selector: TargetSelector::new(),
            consumption,
            power,
            banner: None,
            battery_percent: None,
            fuel_visible: true,
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn consumption(&self) -> &ConsumptionTracker {
        &self.consumption
    }

    pub fn tracker(&self) -> &FixTracker {
        &self.tracker
    }

    pub fn power_state(&self) -> PowerState {
        self.power.state()
    }

    pub fn sleep_reason(&self) -> Option<SleepReason> {
        self.power.sleep_reason()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// End the session and give the store back.
    pub fn into_store(self) -> S {
        self.store
    }

    pub fn set_battery_adc(&mut self, raw: u16) {
        self.battery_percent = Some(battery::percent_from_adc(raw));
    }

    fn banner(&self, now: Instant) -> Option<Banner> {
        if self.power.state() == PowerState::Sleeping {
            return Some(Banner::Sleeping);
        }
        self.banner
            .filter(|(_, until)| now < *until)
            .map(|(banner, _)| banner)
    }

    fn show_banner(&mut self, banner: Banner, now: Instant) {
        self.banner = Some((banner, now + self.config.banner_duration));
    }

    /// Take the next fix from `source` if it has one.
    pub fn poll<P: PositionSource>(&mut self, source: &mut P, now: Instant) -> Option<ChangeEvent> {
        if !source.has_new_fix() {
            return None;
        }
        let fix = source.latest_fix();
        self.on_fix(&fix, now)
    }

    /// Process one fix: hysteresis, power, takeoff, waypoint arrival and
    /// consumption. Fixes that arrive while a banner is up are dropped.
    pub fn on_fix(&mut self, fix: &Fix, now: Instant) -> Option<ChangeEvent> {
        if self.power.state() == PowerState::Sleeping {
            return None;
        }
        if self.banner(now).is_some() {
            log_debug!("fix dropped while banner is shown");
            return None;
        }

        let event = match self.tracker.ingest(fix) {
            FixOutcome::Accepted(event) => event,
            FixOutcome::Rejected(reason) => {
                log_debug!("fix rejected: {:?}", reason);
                return None;
            }
        };

        self.power.on_satellites(self.tracker.satellites());
        let moving = self.tracker.is_moving();
        if moving {
            self.power.note_activity(now);
        }

        self.registry.update_takeoff(&fix.position);

        if self.registry.mode() == NavigationMode::WaypointRoute {
            if let Some(current) = self.registry.current_waypoint() {
                let waypoints = self.registry.slots(SlotKind::Waypoint);
                if route::reached(&fix.position, waypoints, current as usize) {
                    self.registry
                        .advance_waypoint(&mut self.store, self.config.route_topology);
                }
            }
        }

        self.consumption.tick(&mut self.store, now, moving);
        event
    }

    /// Timer tick: consumption accrual and the sleep timeouts.
    pub fn tick(&mut self, now: Instant) {
        if self.power.state() == PowerState::Sleeping {
            return;
        }
        let moving = self.tracker.is_moving();
        self.consumption.tick(&mut self.store, now, moving);
        if moving {
            self.power.note_activity(now);
        }
        if let Some(reason) = self.power.check_timeouts(now) {
            self.enter_sleep(reason);
        }
    }

    pub fn on_button(&mut self, event: ButtonEvent, now: Instant) {
        if self.power.state() == PowerState::Sleeping {
            return;
        }
        self.power.note_activity(now);

        match event {
            ButtonEvent::ShortPress => self.selector.request_advance(),
            ButtonEvent::Release(held)
                if held >= self.config.home_hold && held < self.config.sleep_hold =>
            {
                let _ = self.set_home(now);
            }
            ButtonEvent::LongPressThreshold(held) if held >= self.config.sleep_hold => {
                self.enter_sleep(SleepReason::LongPress);
            }
            _ => {}
        }
    }

    /// Make the latest fix Home. Shows a banner either way.
    pub fn set_home(&mut self, now: Instant) -> Result<Coordinate, RegistryError> {
        let candidate = self.tracker.latest().copied().unwrap_or(Fix::invalid(now));
        let previous = self.tracker.previous_position();

        let result = self.registry.set_home(&mut self.store, &candidate, previous);
        let banner = match result {
            Ok(_) => Banner::HomeSet,
            Err(_) => Banner::HomeRejected,
        };
        self.show_banner(banner, now);
        result
    }

    /// Force the Sleeping transition, flushing on the way in.
    pub fn request_sleep(&mut self) {
        self.enter_sleep(SleepReason::Requested);
    }

    fn enter_sleep(&mut self, reason: SleepReason) {
        if self.power.enter_sleep(reason) {
            // Suspend goes ahead regardless
            let _ = self.prepare_for_sleep();
        }
    }

    /// Flush dirty registry fields, the consumption counters and the store.
    /// Every step runs even if an earlier one failed.
    pub fn prepare_for_sleep(&mut self) -> Result<(), StorageError> {
        let registry = self.registry.flush_dirty(&mut self.store);
        let consumption = self.consumption.flush(&mut self.store);
        let store = self.store.flush();

        let result = registry.and(consumption).and(store);
        if let Err(e) = result {
            log_warn!("flush before sleep incomplete: {:?}", e);
        }
        result
    }

    /// Hand over to the power hardware. Flushes first if Sleeping was not
    /// entered through the usual triggers.
    pub fn suspend<P: PowerControl>(&mut self, power: &mut P) -> ! {
        if self.power.state() != PowerState::Sleeping {
            self.request_sleep();
        }
        power.suspend_until_wake(WakeSource::Key)
    }

    pub fn apply_remote_command(&mut self, input: &str) -> Response {
        let mut response = Response::new();
        let result = command::parse(input).and_then(|cmd| self.execute(cmd, &mut response));
        if let Err(error) = result {
            log_warn!("remote command rejected: {:?}", error);
            response.clear();
            let _ = command::write_error(&mut response, error);
        }
        response
    }

    fn execute(&mut self, cmd: RemoteCommand, out: &mut Response) -> Result<(), CommandError> {
        let written = match cmd {
            RemoteCommand::SetSlot { kind, index, point } => {
                let index = self.registry.upsert(&mut self.store, kind, index, point)?;
                write!(out, "OK {}", kind.target(index))
            }
            RemoteCommand::ClearSlot { kind, index } => {
                self.registry.clear(&mut self.store, kind, index)?;
                write!(out, "OK {}", kind.target(index))
            }
            RemoteCommand::SetMode(mode) => {
                self.registry.set_mode(&mut self.store, mode);
                write!(out, "OK MODE-{}", mode)
            }
            RemoteCommand::GetLocations => self.write_locations(out),
            RemoteCommand::SetFuel {
                fuel,
                burn_rate,
                visible,
            } => {
                if !self.consumption.set_fuel(&mut self.store, fuel, burn_rate) {
                    return Err(CommandError::InvalidValue);
                }
                if let Some(visible) = visible {
                    self.fuel_visible = visible;
                }
                out.write_str("OK")
            }
            RemoteCommand::GetFuel => write!(
                out,
                "FUEL:{:.1}:{:.1}:{:.2}",
                self.consumption.fuel(),
                self.consumption.burn_rate(),
                self.consumption.flight_hours()
            ),
            RemoteCommand::SetPoi(points) => {
                for (index, position) in points.iter() {
                    let point = ReferencePoint::new(*position, true);
                    self.registry
                        .upsert(&mut self.store, SlotKind::Location, Some(*index), point)?;
                }
                write!(out, "Updated POIs:{}", points.len())
            }
        };
        written.map_err(|_| CommandError::ResponseTooLong)
    }

    fn write_locations(&self, out: &mut Response) -> fmt::Result {
        out.write_str("OK\n")?;
        match self.registry.home() {
            Some(home) => writeln!(out, "HOME-{}", DecimalDegrees(home))?,
            None => writeln!(out, "HOME-UNSET")?,
        }
        for kind in [SlotKind::Location, SlotKind::Waypoint] {
            for (index, point) in self.registry.slots(kind).iter().enumerate() {
                if let Some(point) = point {
                    command::write_slot(out, kind, index as u8, point)?;
                    out.write_char('\n')?;
                }
            }
        }
        write!(out, "MODE-{}", self.registry.mode())
    }

    fn status(&self) -> Status {
        if self.tracker.stable().is_none() || self.power.state() == PowerState::AwaitingFix {
            Status::WaitingForFix
        } else if self.registry.home().is_none() {
            Status::NoHome
        } else if self.registry.takeoff().is_none() {
            Status::WaitingForTakeoff
        } else {
            Status::Navigating
        }
    }

    /// Describe the current screen. Also advances target cycling.
    pub fn frame(&mut self, now: Instant) -> Frame {
        let stable = self.tracker.stable().copied();
        let (position, heading) = match stable {
            Some(reading) => (reading.position, reading.heading_deg),
            None => (Coordinate::new(f64::NAN, f64::NAN), 0.0),
        };

        let mode = self.registry.mode();
        let targets = self.registry.active_targets(mode);
        let route_km = match (mode, self.registry.current_waypoint(), stable) {
            (NavigationMode::WaypointRoute, Some(current), Some(_)) => Some(route::remaining_distance(
                &position,
                self.registry.slots(SlotKind::Waypoint),
                current as usize,
                self.config.route_topology,
            )),
            _ => None,
        };

        let targets = self
            .selector
            .compute_frame(&position, heading, &targets, route_km, &self.config, now);

        Frame {
            targets,
            status: self.status(),
            banner: self.banner(now),
            mode,
            power: self.power.state(),
            altitude_ft: stable.map(|s| s.altitude_ft),
            speed_kmh: stable.map(|s| s.speed_kmh),
            satellites: self.tracker.satellites(),
            battery_percent: self.battery_percent,
            fuel: self.fuel_visible.then(|| self.consumption.fuel()),
        }
    }

    pub fn render<R: RenderSink>(&mut self, sink: &mut R, now: Instant) {
        let frame = self.frame(now);
        sink.render(&frame);
    }
}
