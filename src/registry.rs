//! Home, Takeoff and the Location/Waypoint slot pools.
//!
//! Every mutation validates first and returns an error without touching
//! anything. Successful mutations persist only the field they changed; a
//! failed write is logged and the field is left dirty for the next
//! [`TargetRegistry::flush_dirty`].

use core::fmt;

use heapless::Vec;

use crate::config::{
    RouteTopology, HOME_JUMP_LIMIT_KM, MAX_LOCATIONS, MAX_WAYPOINTS, MIN_SATELLITES,
    TAKEOFF_DISTANCE_KM,
};
use crate::fix::Fix;
use crate::geo::Coordinate;
use crate::mode::NavigationMode;
use crate::route;
use crate::storage::{self, DirtyFields, Field, StorageError, Store};
use crate::target::{ReferencePoint, SlotKind, Target, TargetKind};

/// Most positional targets visible at once: Home, Takeoff and every Location.
pub const MAX_TARGETS: usize = 2 + MAX_LOCATIONS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    /// Fewer satellites than a Home fix needs.
    InsufficientSatellites,
    /// Candidate Home is too far from the previous position.
    RejectedJump,
    /// Home already exists and there is no previous position to check against.
    NoReferencePosition,
    InvalidCoordinate,
    SlotOutOfRange,
    /// No unset slot left for an unlabelled write.
    RegistryFull,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InsufficientSatellites => write!(f, "not enough satellites"),
            RegistryError::RejectedJump => write!(f, "position jumped too far"),
            RegistryError::NoReferencePosition => write!(f, "no previous position"),
            RegistryError::InvalidCoordinate => write!(f, "invalid coordinate"),
            RegistryError::SlotOutOfRange => write!(f, "slot out of range"),
            RegistryError::RegistryFull => write!(f, "no free slot"),
        }
    }
}

#[derive(Debug)]
pub struct TargetRegistry {
    home: Option<Coordinate>,
    takeoff: Option<Coordinate>,
    takeoff_processed: bool,
    locations: [Option<ReferencePoint>; MAX_LOCATIONS],
    waypoints: [Option<ReferencePoint>; MAX_WAYPOINTS],
    active_waypoint: u8,
    mode: NavigationMode,
    dirty: DirtyFields,
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn valid_point(point: &Option<ReferencePoint>) -> bool {
    point.map_or(true, |p| p.position.is_valid())
}

impl TargetRegistry {
    pub const fn new() -> Self {
        Self {
            home: None,
            takeoff: None,
            takeoff_processed: false,
            locations: [None; MAX_LOCATIONS],
            waypoints: [None; MAX_WAYPOINTS],
            active_waypoint: 0,
            mode: NavigationMode::Off,
            dirty: DirtyFields::new(),
        }
    }

    /// Restore everything persisted. Missing, corrupt or out-of-range fields
    /// fall back to unset / `Off` / slot 0.
    pub fn load<S: Store>(store: &mut S) -> Self {
        let mut registry = Self::new();

        registry.home = storage::load_validated(store, Field::Home, None, |home: &Option<Coordinate>| {
            home.map_or(true, |c| c.is_valid())
        });
        for (index, slot) in registry.locations.iter_mut().enumerate() {
            *slot = storage::load_validated(store, Field::Location(index as u8), None, valid_point);
        }
        for (index, slot) in registry.waypoints.iter_mut().enumerate() {
            *slot = storage::load_validated(store, Field::Waypoint(index as u8), None, valid_point);
        }
        registry.active_waypoint = storage::load_validated(store, Field::ActiveWaypoint, 0u8, |index| {
            (*index as usize) < MAX_WAYPOINTS
        });
        registry.mode = storage::load_validated(store, Field::Mode, NavigationMode::Off, |_| true);

        log_info!(
            "registry loaded: home {}, mode {:?}, waypoint {}",
            registry.home.is_some(),
            registry.mode,
            registry.active_waypoint
        );
        registry
    }

    pub fn home(&self) -> Option<Coordinate> {
        self.home
    }

    pub fn takeoff(&self) -> Option<Coordinate> {
        self.takeoff
    }

    pub fn takeoff_processed(&self) -> bool {
        self.takeoff_processed
    }

    pub fn mode(&self) -> NavigationMode {
        self.mode
    }

    pub fn active_waypoint(&self) -> u8 {
        self.active_waypoint
    }

    pub fn dirty(&self) -> DirtyFields {
        self.dirty
    }

    pub fn slots(&self, kind: SlotKind) -> &[Option<ReferencePoint>] {
        match kind {
            SlotKind::Location => &self.locations,
            SlotKind::Waypoint => &self.waypoints,
        }
    }

    pub fn slot(&self, kind: SlotKind, index: u8) -> Option<ReferencePoint> {
        self.slots(kind).get(index as usize).copied().flatten()
    }

    /// Take `candidate` as the new Home.
    ///
    /// Needs [`MIN_SATELLITES`]. Replacing an existing Home additionally needs
    /// the candidate to lie within [`HOME_JUMP_LIMIT_KM`] of `previous`, the
    /// position reported before it. Clears Takeoff so detection runs again.
    pub fn set_home<S: Store>(
        &mut self,
        store: &mut S,
        candidate: &Fix,
        previous: Option<Coordinate>,
    ) -> Result<Coordinate, RegistryError> {
        if candidate.satellites < MIN_SATELLITES {
            log_warn!("home rejected: {} satellites", candidate.satellites);
            return Err(RegistryError::InsufficientSatellites);
        }
        if !candidate.is_usable() {
            log_warn!("home rejected: unusable fix");
            return Err(RegistryError::InvalidCoordinate);
        }
        if self.home.is_some() {
            let Some(previous) = previous else {
                log_warn!("home rejected: no previous position to compare");
                return Err(RegistryError::NoReferencePosition);
            };
            let jump = previous.distance_km(&candidate.position);
            if jump > HOME_JUMP_LIMIT_KM {
                log_warn!("home rejected: jump of {} km", jump);
                return Err(RegistryError::RejectedJump);
            }
        }

        self.home = Some(candidate.position);
        self.takeoff = None;
        self.takeoff_processed = false;
        self.persist(store, Field::Home);

        log_info!(
            "home set to {}, {}",
            candidate.position.latitude,
            candidate.position.longitude
        );
        Ok(candidate.position)
    }

    /// Record Takeoff the first time `position` is far enough from Home.
    /// Returns true only on that first detection.
    pub fn update_takeoff(&mut self, position: &Coordinate) -> bool {
        if self.takeoff_processed || !position.is_valid() {
            return false;
        }
        let Some(home) = self.home else {
            return false;
        };
        if home.distance_km(position) <= TAKEOFF_DISTANCE_KM {
            return false;
        }

        self.takeoff = Some(*position);
        self.takeoff_processed = true;
        log_info!("takeoff detected at {}, {}", position.latitude, position.longitude);
        true
    }

    /// Write `point` into a slot. `index` of `None` picks the first unset slot.
    /// Rewriting a slot with identical contents touches nothing.
    pub fn upsert<S: Store>(
        &mut self,
        store: &mut S,
        kind: SlotKind,
        index: Option<u8>,
        point: ReferencePoint,
    ) -> Result<u8, RegistryError> {
        if !point.position.is_valid() {
            return Err(RegistryError::InvalidCoordinate);
        }
        let index = match index {
            Some(index) if (index as usize) < kind.capacity() => index,
            Some(_) => return Err(RegistryError::SlotOutOfRange),
            None => self
                .slots(kind)
                .iter()
                .position(Option::is_none)
                .map(|i| i as u8)
                .ok_or(RegistryError::RegistryFull)?,
        };

        let slot = self.slot_mut(kind, index);
        if *slot == Some(point) {
            return Ok(index);
        }
        *slot = Some(point);
        self.persist(store, slot_field(kind, index));

        log_info!("{} written (active {})", kind.target(index), point.active);
        Ok(index)
    }

    pub fn clear<S: Store>(&mut self, store: &mut S, kind: SlotKind, index: u8) -> Result<(), RegistryError> {
        if index as usize >= kind.capacity() {
            return Err(RegistryError::SlotOutOfRange);
        }
        let slot = self.slot_mut(kind, index);
        if slot.is_none() {
            return Ok(());
        }
        *slot = None;
        self.persist(store, slot_field(kind, index));

        log_info!("{} cleared", kind.target(index));
        Ok(())
    }

    pub fn set_mode<S: Store>(&mut self, store: &mut S, mode: NavigationMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        self.persist(store, Field::Mode);
        log_info!("navigation mode {:?}", mode);
    }

    pub fn set_active_waypoint<S: Store>(&mut self, store: &mut S, index: u8) -> Result<(), RegistryError> {
        if index as usize >= MAX_WAYPOINTS {
            return Err(RegistryError::SlotOutOfRange);
        }
        if self.active_waypoint != index {
            self.active_waypoint = index;
            self.persist(store, Field::ActiveWaypoint);
        }
        Ok(())
    }

    /// The waypoint the route currently heads for.
    pub fn current_waypoint(&self) -> Option<u8> {
        route::current_waypoint(&self.waypoints, self.active_waypoint as usize).map(|i| i as u8)
    }

    /// Move on to the next active waypoint after the current one. Stays put
    /// and returns `None` if there is none.
    pub fn advance_waypoint<S: Store>(&mut self, store: &mut S, topology: RouteTopology) -> Option<u8> {
        let current = self.current_waypoint()?;
        let next = route::next_waypoint(&self.waypoints, current as usize, topology)? as u8;
        self.active_waypoint = next;
        self.persist(store, Field::ActiveWaypoint);
        log_info!("waypoint {} reached, heading for {}", current as u16 + 1, next as u16 + 1);
        Some(next)
    }

    /// Positional targets visible under `mode`, in priority order. Slots with
    /// invalid coordinates never make it in.
    pub fn active_targets(&self, mode: NavigationMode) -> Vec<Target, MAX_TARGETS> {
        let mut targets = Vec::new();

        let singletons = [(TargetKind::Home, self.home), (TargetKind::Takeoff, self.takeoff)];
        for (kind, position) in singletons {
            if let Some(position) = position.filter(Coordinate::is_valid) {
                let _ = targets.push(Target { kind, position });
            }
        }

        match mode {
            NavigationMode::Off => {}
            NavigationMode::LocationSet => {
                for (index, point) in self.locations.iter().enumerate() {
                    if let Some(point) = point.filter(|p| p.active && p.position.is_valid()) {
                        let _ = targets.push(Target {
                            kind: TargetKind::Location(index as u8),
                            position: point.position,
                        });
                    }
                }
            }
            NavigationMode::WaypointRoute => {
                if let Some(index) = self.current_waypoint() {
                    if let Some(point) = self.slot(SlotKind::Waypoint, index).filter(|p| p.position.is_valid()) {
                        let _ = targets.push(Target {
                            kind: TargetKind::Waypoint(index),
                            position: point.position,
                        });
                    }
                }
            }
        }

        targets
    }

    /// Retry every field whose last write failed. Returns the last error seen;
    /// fields that still fail stay dirty.
    pub fn flush_dirty<S: Store>(&mut self, store: &mut S) -> Result<(), StorageError> {
        let mut result = Ok(());
        let pending = self.dirty;
        for field in pending.iter() {
            match self.write_field(store, field) {
                Ok(()) => self.dirty.clear(field),
                Err(e) => {
                    log_warn!("flush of {:?} failed: {:?}", field, e);
                    result = Err(e);
                }
            }
        }
        result
    }

    fn slot_mut(&mut self, kind: SlotKind, index: u8) -> &mut Option<ReferencePoint> {
        match kind {
            SlotKind::Location => &mut self.locations[index as usize],
            SlotKind::Waypoint => &mut self.waypoints[index as usize],
        }
    }

    fn write_field<S: Store>(&self, store: &mut S, field: Field) -> Result<(), StorageError> {
        match field {
            Field::Home => storage::save(store, field, &self.home),
            Field::Mode => storage::save(store, field, &self.mode),
            Field::ActiveWaypoint => storage::save(store, field, &self.active_waypoint),
            Field::Location(index) => storage::save(store, field, &self.locations[index as usize]),
            Field::Waypoint(index) => storage::save(store, field, &self.waypoints[index as usize]),
            // Owned by the consumption tracker
            Field::Consumption => Ok(()),
        }
    }

    fn persist<S: Store>(&mut self, store: &mut S, field: Field) {
        match self.write_field(store, field) {
            Ok(()) => self.dirty.clear(field),
            Err(e) => {
                log_warn!("persisting {:?} failed: {:?}", field, e);
                self.dirty.mark(field);
            }
        }
    }
}

fn slot_field(kind: SlotKind, index: u8) -> Field {
    match kind {
        SlotKind::Location => Field::Location(index),
        SlotKind::Waypoint => Field::Waypoint(index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset;
    use crate::storage::{FlashStore, RamFlash};
    use crate::time::at_millis;

    type TestStore = FlashStore<RamFlash<1024>>;

    fn store() -> TestStore {
        FlashStore::new(RamFlash::new(), 0)
    }

    fn fix(position: Coordinate, satellites: u8) -> Fix {
        Fix {
            position,
            altitude_ft: 500.0,
            speed_kmh: 0.0,
            heading_deg: 0.0,
            satellites,
            valid: true,
            timestamp: at_millis(1_000),
        }
    }

    #[test]
    fn test_first_home_needs_only_satellites() {
        let mut store = store();
        let mut registry = TargetRegistry::new();
        let here = Coordinate::new(10.0, 20.0);

        assert_eq!(
            registry.set_home(&mut store, &fix(here, 3), None),
            Err(RegistryError::InsufficientSatellites)
        );
        assert_eq!(registry.home(), None);

        assert_eq!(registry.set_home(&mut store, &fix(here, 4), None), Ok(here));
        assert_eq!(registry.home(), Some(here));
    }

    #[test]
    fn test_home_jump_guard() {
        let mut store = store();
        let mut registry = TargetRegistry::new();
        let home = Coordinate::new(10.0, 20.0);
        registry.set_home(&mut store, &fix(home, 6), None).expect("first home");

        let previous = offset(&home, 0.0, 3.0);
        let candidate = offset(&previous, 90.0, 2.0);
        assert_eq!(
            registry.set_home(&mut store, &fix(candidate, 6), Some(previous)),
            Err(RegistryError::RejectedJump)
        );
        assert_eq!(
            registry.set_home(&mut store, &fix(candidate, 6), None),
            Err(RegistryError::NoReferencePosition)
        );
        assert_eq!(registry.home(), Some(home));

        let nearby = offset(&previous, 90.0, 0.5);
        assert_eq!(registry.set_home(&mut store, &fix(nearby, 6), Some(previous)), Ok(nearby));
    }

    #[test]
    fn test_reset_home_clears_takeoff() {
        let mut store = store();
        let mut registry = TargetRegistry::new();
        let home = Coordinate::new(10.0, 20.0);
        registry.set_home(&mut store, &fix(home, 6), None).expect("home");

        let away = offset(&home, 0.0, 0.6);
        assert!(registry.update_takeoff(&away));
        assert!(!registry.update_takeoff(&offset(&home, 0.0, 0.9)));
        assert_eq!(registry.takeoff(), Some(away));

        registry.set_home(&mut store, &fix(away, 6), Some(away)).expect("re-home");
        assert_eq!(registry.takeoff(), None);
        assert!(!registry.takeoff_processed());
    }

    #[test]
    fn test_takeoff_needs_home_and_distance() {
        let mut registry = TargetRegistry::new();
        let here = Coordinate::new(10.0, 20.0);
        assert!(!registry.update_takeoff(&here));

        let mut store = store();
        registry.set_home(&mut store, &fix(here, 6), None).expect("home");
        assert!(!registry.update_takeoff(&offset(&here, 0.0, 0.4)));
        assert_eq!(registry.takeoff(), None);
    }

    #[test]
    fn test_upsert_by_label_and_first_free() {
        let mut store = store();
        let mut registry = TargetRegistry::new();
        let point = ReferencePoint::new(Coordinate::new(1.0, 2.0), true);

        assert_eq!(registry.upsert(&mut store, SlotKind::Location, Some(2), point), Ok(2));
        assert_eq!(registry.upsert(&mut store, SlotKind::Location, None, point), Ok(0));
        assert_eq!(registry.upsert(&mut store, SlotKind::Location, None, point), Ok(1));
        assert_eq!(registry.upsert(&mut store, SlotKind::Location, None, point), Ok(3));
        assert_eq!(registry.upsert(&mut store, SlotKind::Location, None, point), Ok(4));
        assert_eq!(
            registry.upsert(&mut store, SlotKind::Location, None, point),
            Err(RegistryError::RegistryFull)
        );
        assert_eq!(
            registry.upsert(&mut store, SlotKind::Location, Some(5), point),
            Err(RegistryError::SlotOutOfRange)
        );
        assert_eq!(
            registry.upsert(&mut store, SlotKind::Waypoint, Some(20), point),
            Err(RegistryError::SlotOutOfRange)
        );
    }

    #[test]
    fn test_identical_upsert_skips_write() {
        let mut store = store();
        let mut registry = TargetRegistry::new();
        let point = ReferencePoint::new(Coordinate::new(1.0, 2.0), true);

        registry.upsert(&mut store, SlotKind::Waypoint, Some(0), point).expect("write");
        let writes = store.flash().write_count();
        registry.upsert(&mut store, SlotKind::Waypoint, Some(0), point).expect("rewrite");
        assert_eq!(store.flash().write_count(), writes);
    }

    #[test]
    fn test_invalid_point_rejected_without_mutation() {
        let mut store = store();
        let mut registry = TargetRegistry::new();
        let bad = ReferencePoint::new(Coordinate::new(95.0, 2.0), true);
        assert_eq!(
            registry.upsert(&mut store, SlotKind::Location, Some(0), bad),
            Err(RegistryError::InvalidCoordinate)
        );
        assert_eq!(registry.slot(SlotKind::Location, 0), None);
    }

    #[test]
    fn test_registry_survives_reload() {
        let mut store = store();
        let mut registry = TargetRegistry::new();
        let home = Coordinate::new(-33.865_143, 151.209_900);
        registry.set_home(&mut store, &fix(home, 7), None).expect("home");
        let point = ReferencePoint::new(Coordinate::new(-33.9, 151.3), false);
        registry.upsert(&mut store, SlotKind::Waypoint, Some(7), point).expect("slot");
        registry.set_mode(&mut store, NavigationMode::WaypointRoute);
        registry.set_active_waypoint(&mut store, 7).expect("active");

        let loaded = TargetRegistry::load(&mut store);
        assert_eq!(loaded.home(), Some(home));
        assert_eq!(loaded.slot(SlotKind::Waypoint, 7), Some(point));
        assert_eq!(loaded.mode(), NavigationMode::WaypointRoute);
        assert_eq!(loaded.active_waypoint(), 7);
        assert_eq!(loaded.takeoff(), None);
    }

    #[test]
    fn test_corrupt_field_loads_default() {
        let mut store = store();
        let mut registry = TargetRegistry::new();
        registry.set_mode(&mut store, NavigationMode::LocationSet);
        storage::save(&mut store, Field::ActiveWaypoint, &200u8).expect("save");
        let mode_offset = Field::Mode.index() * crate::storage::SLOT_SIZE as usize + 2;
        store.flash_mut().corrupt(mode_offset);

        let loaded = TargetRegistry::load(&mut store);
        assert_eq!(loaded.mode(), NavigationMode::Off);
        assert_eq!(loaded.active_waypoint(), 0);
    }

    #[test]
    fn test_failed_write_marks_dirty_then_flushes() {
        let mut store = store();
        let mut registry = TargetRegistry::new();
        store.flash_mut().set_fail_writes(true);

        let point = ReferencePoint::new(Coordinate::new(1.0, 2.0), true);
        assert_eq!(registry.upsert(&mut store, SlotKind::Location, Some(1), point), Ok(1));
        assert_eq!(registry.slot(SlotKind::Location, 1), Some(point));
        assert!(registry.dirty().contains(Field::Location(1)));
        assert_eq!(registry.flush_dirty(&mut store), Err(StorageError::Io));

        store.flash_mut().set_fail_writes(false);
        assert_eq!(registry.flush_dirty(&mut store), Ok(()));
        assert!(registry.dirty().is_empty());
        assert_eq!(TargetRegistry::load(&mut store).slot(SlotKind::Location, 1), Some(point));
    }

    #[test]
    fn test_active_targets_per_mode() {
        let mut store = store();
        let mut registry = TargetRegistry::new();
        let home = Coordinate::new(10.0, 20.0);
        registry.set_home(&mut store, &fix(home, 6), None).expect("home");
        let on = ReferencePoint::new(Coordinate::new(10.1, 20.0), true);
        let off = ReferencePoint::new(Coordinate::new(10.2, 20.0), false);
        registry.upsert(&mut store, SlotKind::Location, Some(0), off).expect("l1");
        registry.upsert(&mut store, SlotKind::Location, Some(3), on).expect("l4");
        registry.upsert(&mut store, SlotKind::Waypoint, Some(1), on).expect("w2");
        registry.upsert(&mut store, SlotKind::Waypoint, Some(4), on).expect("w5");

        let kinds = |mode| {
            registry
                .active_targets(mode)
                .iter()
                .map(|t| t.kind)
                .collect::<Vec<TargetKind, MAX_TARGETS>>()
        };
        assert_eq!(kinds(NavigationMode::Off).as_slice(), &[TargetKind::Home]);
        assert_eq!(
            kinds(NavigationMode::LocationSet).as_slice(),
            &[TargetKind::Home, TargetKind::Location(3)]
        );
        assert_eq!(
            kinds(NavigationMode::WaypointRoute).as_slice(),
            &[TargetKind::Home, TargetKind::Waypoint(1)]
        );
    }

    #[test]
    fn test_advance_waypoint_persists() {
        let mut store = store();
        let mut registry = TargetRegistry::new();
        let on = ReferencePoint::new(Coordinate::new(10.1, 20.0), true);
        registry.upsert(&mut store, SlotKind::Waypoint, Some(1), on).expect("w2");
        registry.upsert(&mut store, SlotKind::Waypoint, Some(4), on).expect("w5");

        assert_eq!(registry.current_waypoint(), Some(1));
        assert_eq!(registry.advance_waypoint(&mut store, RouteTopology::Closed), Some(4));
        assert_eq!(registry.advance_waypoint(&mut store, RouteTopology::Closed), Some(1));
        assert_eq!(registry.advance_waypoint(&mut store, RouteTopology::Closed), Some(4));
        assert_eq!(registry.advance_waypoint(&mut store, RouteTopology::Open), None);
        assert_eq!(TargetRegistry::load(&mut store).active_waypoint(), 4);
    }
}
