//! Great-circle geometry on a spherical earth.

use libm::{atan2, cos, sin, sqrt};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6_371.0;
const DEG_TO_RAD: f64 = core::f64::consts::PI / 180.0;
const RAD_TO_DEG: f64 = 180.0 / core::f64::consts::PI;

/// A latitude/longitude pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and inside the valid latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        distance_km(self, other)
    }

    pub fn bearing_deg(&self, other: &Coordinate) -> f64 {
        bearing_deg(self, other)
    }
}

/// Haversine distance in kilometres.
pub fn distance_km(from: &Coordinate, to: &Coordinate) -> f64 {
    let lat1 = from.latitude * DEG_TO_RAD;
    let lat2 = to.latitude * DEG_TO_RAD;
    let delta_lat = (to.latitude - from.latitude) * DEG_TO_RAD;
    let delta_lon = (to.longitude - from.longitude) * DEG_TO_RAD;

    let sin_dlat = sin(delta_lat / 2.0);
    let sin_dlon = sin(delta_lon / 2.0);
    let a = sin_dlat * sin_dlat + cos(lat1) * cos(lat2) * sin_dlon * sin_dlon;
    let c = 2.0 * atan2(sqrt(a), sqrt(1.0 - a));

    EARTH_RADIUS_KM * c
}

/// Initial bearing (forward azimuth) in degrees, 0..360.
pub fn bearing_deg(from: &Coordinate, to: &Coordinate) -> f64 {
    let lat1 = from.latitude * DEG_TO_RAD;
    let lat2 = to.latitude * DEG_TO_RAD;
    let delta_lon = (to.longitude - from.longitude) * DEG_TO_RAD;

    let y = sin(delta_lon) * cos(lat2);
    let x = cos(lat1) * sin(lat2) - sin(lat1) * cos(lat2) * cos(delta_lon);

    wrap_360(atan2(y, x) * RAD_TO_DEG)
}

/// Normalise an angle into 0..360.
pub fn wrap_360(angle: f64) -> f64 {
    let wrapped = angle % 360.0;
    if wrapped < 0.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Smallest absolute difference between two headings, 0..=180.
pub fn angle_difference(a: f64, b: f64) -> f64 {
    let diff = wrap_360(a - b);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Destination `distance_km` away from `from` along `bearing`.
pub fn offset(from: &Coordinate, bearing: f64, distance_km: f64) -> Coordinate {
    let angular = distance_km / EARTH_RADIUS_KM;
    let bearing = bearing * DEG_TO_RAD;
    let lat1 = from.latitude * DEG_TO_RAD;
    let lon1 = from.longitude * DEG_TO_RAD;

    let lat2 = libm::asin(sin(lat1) * cos(angular) + cos(lat1) * sin(angular) * cos(bearing));
    let lon2 = lon1
        + atan2(
            sin(bearing) * sin(angular) * cos(lat1),
            cos(angular) - sin(lat1) * sin(lat2),
        );

    Coordinate::new(lat2 * RAD_TO_DEG, lon2 * RAD_TO_DEG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_one_degree_latitude() {
        let a = Coordinate::new(35.0, 139.0);
        let b = Coordinate::new(36.0, 139.0);
        assert!((distance_km(&a, &b) - 111.19).abs() < 0.1);
    }

    #[test]
    fn test_distance_zero() {
        let a = Coordinate::new(47.3769, 8.5417);
        assert!(distance_km(&a, &a).abs() < 1e-9);
    }

    #[test]
    fn test_short_distance_precision() {
        let a = Coordinate::new(47.0, 8.0);
        let b = offset(&a, 45.0, 0.15);
        assert!((distance_km(&a, &b) - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_bearing_cardinals() {
        let origin = Coordinate::new(35.0, 139.0);
        let north = bearing_deg(&origin, &Coordinate::new(36.0, 139.0));
        let east = bearing_deg(&origin, &Coordinate::new(35.0, 140.0));
        let south = bearing_deg(&origin, &Coordinate::new(34.0, 139.0));
        let west = bearing_deg(&origin, &Coordinate::new(35.0, 138.0));

        assert!(north < 0.5 || north > 359.5);
        assert!((east - 90.0).abs() < 1.0);
        assert!((south - 180.0).abs() < 0.5);
        assert!((west - 270.0).abs() < 1.0);
    }

    #[test]
    fn test_wrap_360() {
        assert!((wrap_360(-90.0) - 270.0).abs() < 1e-9);
        assert!((wrap_360(450.0) - 90.0).abs() < 1e-9);
        assert!(wrap_360(360.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_difference_across_north() {
        assert!((angle_difference(358.0, 2.0) - 4.0).abs() < 1e-9);
        assert!((angle_difference(2.0, 358.0) - 4.0).abs() < 1e-9);
        assert!((angle_difference(90.0, 270.0) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(0.0, 0.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 1.0).is_valid());
        assert!(!Coordinate::new(91.0, 1.0).is_valid());
        assert!(!Coordinate::new(1.0, -181.0).is_valid());
        assert!(!Coordinate::new(1.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_offset_round_trip() {
        let home = Coordinate::new(10.0, 20.0);
        let moved = offset(&home, 90.0, 2.0);
        assert!((distance_km(&home, &moved) - 2.0).abs() < 1e-6);
        assert!((bearing_deg(&home, &moved) - 90.0).abs() < 0.1);
    }
}
