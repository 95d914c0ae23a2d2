//! Fixed thresholds and runtime tunables.

use crate::time::{millis, Duration};

/// Number of Location slots.
pub const MAX_LOCATIONS: usize = 5;
/// Number of Waypoint slots.
pub const MAX_WAYPOINTS: usize = 20;

/// Satellites required before a fix may set Home or leave AwaitingFix.
pub const MIN_SATELLITES: u8 = 4;

// Hysteresis applied by the fix tracker
pub const SPEED_CHANGE_KMH: f64 = 1.0;
pub const ALTITUDE_CHANGE_FT: f64 = 5.0;
pub const HEADING_CHANGE_DEG: f64 = 5.0;
pub const POSITION_CHANGE_KM: f64 = 0.001;

/// 5 mph. Anything faster counts as moving.
pub const MOVING_SPEED_KMH: f64 = 8.04672;

/// Home corrections further than this from the previous fix are rejected.
pub const HOME_JUMP_LIMIT_KM: f64 = 1.0;
/// Distance from Home that marks takeoff.
pub const TAKEOFF_DISTANCE_KM: f64 = 0.5;
/// A waypoint counts as reached inside this radius.
pub const WAYPOINT_REACHED_KM: f64 = 0.2;

pub const FUEL_MIN: f64 = 5.0;
pub const FUEL_MAX: f64 = 20.0;
pub const BURN_RATE_MIN: f64 = 3.0;
pub const BURN_RATE_MAX: f64 = 5.5;
pub const DEFAULT_BURN_RATE: f64 = 4.0;

/// Flight hours are written back every accumulated minute of flight.
pub const HOURS_PERSIST_INTERVAL: f64 = 1.0 / 60.0;

pub const FEET_PER_METER: f64 = 3.28084;

/// The key is sampled this often.
pub const BUTTON_POLL_INTERVAL: Duration = millis(20);
/// A level must hold this long before it counts.
pub const BUTTON_DEBOUNCE: Duration = millis(30);

/// How overlapping ring placements are resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CollisionPolicy {
    /// The lower-priority icon is dropped from the frame.
    Hide,
    /// The lower-priority icon is pushed away from the one it overlaps, and
    /// dropped only if it still overlaps something.
    Displace,
}

/// Whether the waypoint route loops back to the first slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RouteTopology {
    Closed,
    Open,
}

/// Pixel geometry of the 200x200 compass ring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayGeometry {
    pub center_x: i16,
    pub center_y: i16,
    pub ring_radius: i16,
    /// Placements this close to the centre are snapped back onto the ring.
    pub dead_zone: i16,
    /// Icons closer than this collide. Matches the 22 px icon diameter.
    pub collision_distance: i16,
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self {
            center_x: 100,
            center_y: 100,
            ring_radius: 72,
            dead_zone: 3,
            collision_distance: 22,
        }
    }
}

/// Runtime configuration of the navigation core.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NavConfig {
    pub display: DisplayGeometry,
    pub collision_policy: CollisionPolicy,
    pub route_topology: RouteTopology,
    /// Round-robin period between visible targets.
    pub cycle_interval: Duration,
    /// No movement for this long puts the unit to sleep.
    pub inactivity_timeout: Duration,
    /// Giving up on acquiring a fix.
    pub fix_timeout: Duration,
    /// Holding the key this long and releasing sets Home.
    pub home_hold: Duration,
    /// Holding the key this long sleeps.
    pub sleep_hold: Duration,
    /// Confirmation banners stay up (and fixes are dropped) this long.
    pub banner_duration: Duration,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            display: DisplayGeometry::default(),
            collision_policy: CollisionPolicy::Hide,
            route_topology: RouteTopology::Closed,
            cycle_interval: millis(5_000),
            inactivity_timeout: millis(600_000),
            fix_timeout: millis(600_000),
            home_hold: millis(2_000),
            sleep_hold: millis(5_000),
            banner_duration: millis(2_000),
        }
    }
}
