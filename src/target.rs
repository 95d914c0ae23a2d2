//! Reference point identities.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{MAX_LOCATIONS, MAX_WAYPOINTS};
use crate::geo::Coordinate;

/// Which reference point an entry refers to. Slot indices are zero based;
/// labels shown to users are one based (`L1`, `W12`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TargetKind {
    Home,
    Takeoff,
    Location(u8),
    Waypoint(u8),
    /// Remaining distance along the waypoint route. Has no position.
    Route,
}

impl TargetKind {
    /// Lower sorts first. Home outranks Takeoff outranks slots by index.
    pub fn priority(&self) -> u16 {
        match self {
            TargetKind::Home => 0,
            TargetKind::Takeoff => 1,
            TargetKind::Location(index) | TargetKind::Waypoint(index) => 2 + *index as u16,
            TargetKind::Route => u16::MAX,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Home => write!(f, "H"),
            TargetKind::Takeoff => write!(f, "T"),
            TargetKind::Location(index) => write!(f, "L{}", *index as u16 + 1),
            TargetKind::Waypoint(index) => write!(f, "W{}", *index as u16 + 1),
            TargetKind::Route => write!(f, "R"),
        }
    }
}

/// The two pools of configurable slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotKind {
    Location,
    Waypoint,
}

impl SlotKind {
    pub const fn capacity(&self) -> usize {
        match self {
            SlotKind::Location => MAX_LOCATIONS,
            SlotKind::Waypoint => MAX_WAYPOINTS,
        }
    }

    pub const fn target(&self, index: u8) -> TargetKind {
        match self {
            SlotKind::Location => TargetKind::Location(index),
            SlotKind::Waypoint => TargetKind::Waypoint(index),
        }
    }

    pub const fn prefix(&self) -> char {
        match self {
            SlotKind::Location => 'L',
            SlotKind::Waypoint => 'W',
        }
    }
}

/// A stored Location or Waypoint. Inactive points keep their coordinates but
/// are skipped by selection and routing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReferencePoint {
    pub position: Coordinate,
    pub active: bool,
}

impl ReferencePoint {
    pub const fn new(position: Coordinate, active: bool) -> Self {
        Self { position, active }
    }
}

/// A reference point resolved for the current frame.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Target {
    pub kind: TargetKind,
    pub position: Coordinate,
}
