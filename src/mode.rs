//! Navigation mode: which slot pool the selector sees.

use core::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NavigationMode {
    /// Only Home and Takeoff.
    #[default]
    Off,
    /// Every active Location.
    LocationSet,
    /// The current Waypoint plus the remaining route distance.
    WaypointRoute,
}

impl NavigationMode {
    /// Command keyword, as used by `MODE-<keyword>`.
    pub const fn keyword(&self) -> &'static str {
        match self {
            NavigationMode::Off => "OFF",
            NavigationMode::LocationSet => "LOC",
            NavigationMode::WaypointRoute => "WPT",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "OFF" => Some(NavigationMode::Off),
            "LOC" => Some(NavigationMode::LocationSet),
            "WPT" => Some(NavigationMode::WaypointRoute),
            _ => None,
        }
    }
}

impl fmt::Display for NavigationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}
