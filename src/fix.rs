//! Fix tracking with per-field hysteresis.

use crate::config::{
    ALTITUDE_CHANGE_FT, HEADING_CHANGE_DEG, MOVING_SPEED_KMH, POSITION_CHANGE_KM,
    SPEED_CHANGE_KMH,
};
use libm::fabs;

use crate::geo::{angle_difference, Coordinate};
use crate::time::Instant;

/// One GPS sample as delivered by the position source.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fix {
    pub position: Coordinate,
    pub altitude_ft: f64,
    pub speed_kmh: f64,
    pub heading_deg: f64,
    pub satellites: u8,
    pub valid: bool,
    pub timestamp: Instant,
}

impl Fix {
    pub const fn invalid(timestamp: Instant) -> Self {
        Self {
            position: Coordinate::new(f64::NAN, f64::NAN),
            altitude_ft: 0.0,
            speed_kmh: 0.0,
            heading_deg: 0.0,
            satellites: 0,
            valid: false,
            timestamp,
        }
    }

    /// Flagged valid by the receiver and free of NaN/out-of-range numbers.
    pub fn is_usable(&self) -> bool {
        self.valid
            && self.position.is_valid()
            && self.altitude_ft.is_finite()
            && self.speed_kmh.is_finite()
            && self.speed_kmh >= 0.0
            && self.heading_deg.is_finite()
    }
}

/// Pull-model position collaborator.
pub trait PositionSource {
    /// Edge flag: true once per newly decoded fix, cleared by the call.
    fn has_new_fix(&mut self) -> bool;
    fn latest_fix(&self) -> Fix;
}

/// The last values that cleared their hysteresis thresholds.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StableReading {
    pub position: Coordinate,
    pub altitude_ft: f64,
    pub speed_kmh: f64,
    pub heading_deg: f64,
    pub satellites: u8,
}

/// Which stable values moved with the last accepted sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChangeEvent {
    pub position: bool,
    pub altitude: bool,
    pub speed: bool,
    pub heading: bool,
    pub satellites: bool,
    /// The moving predicate flipped.
    pub moving: bool,
}

impl ChangeEvent {
    fn any(&self) -> bool {
        self.position
            || self.altitude
            || self.speed
            || self.heading
            || self.satellites
            || self.moving
    }
}

/// Why a sample was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rejection {
    /// Not flagged valid, or carries NaN/out-of-range numbers.
    Unusable,
    /// Timestamp not after the last accepted sample.
    Stale,
}

/// Result of offering a sample to the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FixOutcome {
    Rejected(Rejection),
    /// Taken as the latest sample. Carries the stable values that moved,
    /// if any did.
    Accepted(Option<ChangeEvent>),
}

impl FixOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FixOutcome::Accepted(_))
    }

    pub fn changes(self) -> Option<ChangeEvent> {
        match self {
            FixOutcome::Accepted(changes) => changes,
            FixOutcome::Rejected(_) => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct FixTracker {
    stable: Option<StableReading>,
    latest: Option<Fix>,
    previous_position: Option<Coordinate>,
    moving: bool,
}

impl FixTracker {
    pub const fn new() -> Self {
        Self {
            stable: None,
            latest: None,
            previous_position: None,
            moving: false,
        }
    }

    /// Pull the next fix from `source` if its edge flag is raised.
    pub fn poll<P: PositionSource>(&mut self, source: &mut P) -> Option<ChangeEvent> {
        if !source.has_new_fix() {
            return None;
        }
        self.ingest(&source.latest_fix()).changes()
    }

    /// Accept a sample. Invalid or non-advancing fixes are dropped and the
    /// previous stable values are kept.
    pub fn ingest(&mut self, fix: &Fix) -> FixOutcome {
        if !fix.is_usable() {
            log_debug!("dropping unusable fix");
            return FixOutcome::Rejected(Rejection::Unusable);
        }
        if let Some(latest) = &self.latest {
            if fix.timestamp <= latest.timestamp {
                log_debug!("dropping stale fix");
                return FixOutcome::Rejected(Rejection::Stale);
            }
            self.previous_position = Some(latest.position);
        }
        self.latest = Some(*fix);

        let moving = fix.speed_kmh > MOVING_SPEED_KMH;
        let mut event = ChangeEvent {
            moving: moving != self.moving,
            ..ChangeEvent::default()
        };
        self.moving = moving;

        let Some(stable) = self.stable.as_mut() else {
            self.stable = Some(StableReading {
                position: fix.position,
                altitude_ft: fix.altitude_ft,
                speed_kmh: fix.speed_kmh,
                heading_deg: fix.heading_deg,
                satellites: fix.satellites,
            });
            event.position = true;
            event.altitude = true;
            event.speed = true;
            event.heading = true;
            event.satellites = true;
            return FixOutcome::Accepted(Some(event));
        };

        if stable.position.distance_km(&fix.position) > POSITION_CHANGE_KM {
            stable.position = fix.position;
            event.position = true;
        }
        if fabs(stable.altitude_ft - fix.altitude_ft) > ALTITUDE_CHANGE_FT {
            stable.altitude_ft = fix.altitude_ft;
            event.altitude = true;
        }
        if fabs(stable.speed_kmh - fix.speed_kmh) > SPEED_CHANGE_KMH {
            stable.speed_kmh = fix.speed_kmh;
            event.speed = true;
        }
        if angle_difference(stable.heading_deg, fix.heading_deg) > HEADING_CHANGE_DEG {
            stable.heading_deg = fix.heading_deg;
            event.heading = true;
        }
        if stable.satellites != fix.satellites {
            stable.satellites = fix.satellites;
            event.satellites = true;
        }

        FixOutcome::Accepted(event.any().then_some(event))
    }

    pub fn stable(&self) -> Option<&StableReading> {
        self.stable.as_ref()
    }

    /// The most recent accepted raw sample.
    pub fn latest(&self) -> Option<&Fix> {
        self.latest.as_ref()
    }

    /// Position of the accepted sample before the latest one.
    pub fn previous_position(&self) -> Option<Coordinate> {
        self.previous_position
    }

    /// Latched from the last accepted sample.
    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn satellites(&self) -> u8 {
        self.stable.map(|s| s.satellites).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset;
    use crate::time::at_millis;

    fn fix_at(ms: u64, position: Coordinate) -> Fix {
        Fix {
            position,
            altitude_ft: 1_000.0,
            speed_kmh: 0.0,
            heading_deg: 90.0,
            satellites: 6,
            valid: true,
            timestamp: at_millis(ms),
        }
    }

    #[test]
    fn test_first_fix_reports_everything() {
        let mut tracker = FixTracker::new();
        let event = tracker
            .ingest(&fix_at(1, Coordinate::new(47.0, 8.0)))
            .changes()
            .expect("first fix changes everything");
        assert!(event.position && event.altitude && event.speed && event.heading);
        assert!(event.satellites);
        assert!(!event.moving);
    }

    #[test]
    fn test_invalid_fix_is_ignored() {
        let mut tracker = FixTracker::new();
        let mut fix = fix_at(1, Coordinate::new(47.0, 8.0));
        fix.valid = false;
        assert_eq!(tracker.ingest(&fix), FixOutcome::Rejected(Rejection::Unusable));
        assert!(tracker.stable().is_none());

        let mut nan = fix_at(2, Coordinate::new(f64::NAN, 8.0));
        nan.valid = true;
        assert_eq!(tracker.ingest(&nan), FixOutcome::Rejected(Rejection::Unusable));
        assert!(tracker.latest().is_none());

        let no_fix = Fix::invalid(at_millis(3));
        assert!(!no_fix.position.is_valid());
        assert!(!tracker.ingest(&no_fix).is_accepted());
    }

    #[test]
    fn test_stale_timestamp_is_ignored() {
        let mut tracker = FixTracker::new();
        let origin = Coordinate::new(47.0, 8.0);
        tracker.ingest(&fix_at(10, origin));
        let moved = offset(&origin, 0.0, 1.0);
        assert_eq!(tracker.ingest(&fix_at(10, moved)), FixOutcome::Rejected(Rejection::Stale));
        assert_eq!(tracker.ingest(&fix_at(5, moved)), FixOutcome::Rejected(Rejection::Stale));
        assert_eq!(tracker.latest().map(|f| f.position), Some(origin));
        assert_eq!(tracker.stable().map(|s| s.position), Some(origin));
    }

    #[test]
    fn test_hysteresis_retains_previous_values() {
        let mut tracker = FixTracker::new();
        let origin = Coordinate::new(47.0, 8.0);
        tracker.ingest(&fix_at(1, origin));

        let mut jitter = fix_at(2, offset(&origin, 10.0, 0.0005));
        jitter.altitude_ft = 1_004.0;
        jitter.speed_kmh = 0.9;
        jitter.heading_deg = 94.0;
        assert_eq!(tracker.ingest(&jitter), FixOutcome::Accepted(None));

        let stable = tracker.stable().copied().expect("stable reading");
        assert_eq!(stable.position, origin);
        assert_eq!(stable.altitude_ft, 1_000.0);
        assert_eq!(stable.speed_kmh, 0.0);
        assert_eq!(stable.heading_deg, 90.0);
    }

    #[test]
    fn test_changes_above_threshold_are_reported() {
        let mut tracker = FixTracker::new();
        let origin = Coordinate::new(47.0, 8.0);
        tracker.ingest(&fix_at(1, origin));

        let mut next = fix_at(2, offset(&origin, 10.0, 0.002));
        next.altitude_ft = 1_006.0;
        next.heading_deg = 96.0;
        let event = tracker.ingest(&next).changes().expect("changes");
        assert!(event.position);
        assert!(event.altitude);
        assert!(event.heading);
        assert!(!event.speed);
        assert!(!event.satellites);
    }

    #[test]
    fn test_heading_hysteresis_wraps_north() {
        let mut tracker = FixTracker::new();
        let origin = Coordinate::new(47.0, 8.0);
        let mut first = fix_at(1, origin);
        first.heading_deg = 358.0;
        tracker.ingest(&first);

        let mut second = fix_at(2, origin);
        second.heading_deg = 2.0;
        assert_eq!(tracker.ingest(&second), FixOutcome::Accepted(None));
    }

    #[test]
    fn test_satellite_count_has_no_hysteresis() {
        let mut tracker = FixTracker::new();
        let origin = Coordinate::new(47.0, 8.0);
        tracker.ingest(&fix_at(1, origin));

        let mut next = fix_at(2, origin);
        next.satellites = 7;
        let event = tracker.ingest(&next).changes().expect("satellite change");
        assert!(event.satellites);
        assert_eq!(tracker.satellites(), 7);
    }

    #[test]
    fn test_moving_latch_follows_speed() {
        let mut tracker = FixTracker::new();
        let origin = Coordinate::new(47.0, 8.0);
        tracker.ingest(&fix_at(1, origin));
        assert!(!tracker.is_moving());

        let mut fast = fix_at(2, origin);
        fast.speed_kmh = 8.1;
        let event = tracker.ingest(&fast).changes().expect("moving flips");
        assert!(event.moving);
        assert!(tracker.is_moving());

        let mut slow = fix_at(3, origin);
        slow.speed_kmh = 8.0;
        let event = tracker.ingest(&slow).changes().expect("moving flips back");
        assert!(event.moving);
        assert!(!tracker.is_moving());
    }

    #[test]
    fn test_previous_position_tracks_last_sample() {
        let mut tracker = FixTracker::new();
        let a = Coordinate::new(47.0, 8.0);
        let b = offset(&a, 0.0, 0.3);
        tracker.ingest(&fix_at(1, a));
        assert_eq!(tracker.previous_position(), None);
        tracker.ingest(&fix_at(2, b));
        assert_eq!(tracker.previous_position(), Some(a));
    }

    struct OneShot {
        fix: Fix,
        fresh: bool,
    }

    impl PositionSource for OneShot {
        fn has_new_fix(&mut self) -> bool {
            core::mem::take(&mut self.fresh)
        }

        fn latest_fix(&self) -> Fix {
            self.fix
        }
    }

    #[test]
    fn test_poll_consumes_edge_flag() {
        let mut tracker = FixTracker::new();
        let mut source = OneShot {
            fix: fix_at(1, Coordinate::new(47.0, 8.0)),
            fresh: true,
        };
        assert!(tracker.poll(&mut source).is_some());
        assert!(tracker.poll(&mut source).is_none());
    }
}
