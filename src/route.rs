//! Waypoint route: remaining distance and arrival handling.
//!
//! A route is the active Waypoint slots in slot order, entered at the
//! current waypoint. With [`RouteTopology::Closed`] the walk continues past
//! the last slot back to slot 0 and stops just before the entry slot; with
//! [`RouteTopology::Open`] it stops at the last slot.

use crate::config::{RouteTopology, WAYPOINT_REACHED_KM};
use crate::geo::Coordinate;
use crate::target::ReferencePoint;

fn active_at(waypoints: &[Option<ReferencePoint>], index: usize) -> Option<&ReferencePoint> {
    waypoints.get(index)?.as_ref().filter(|point| point.active)
}

/// Slots visited after `start`, in route order.
fn legs_after(
    len: usize,
    start: usize,
    topology: RouteTopology,
) -> impl Iterator<Item = usize> {
    let wrapped = match topology {
        RouteTopology::Closed => 0..start.min(len),
        RouteTopology::Open => 0..0,
    };
    (start + 1..len).chain(wrapped)
}

/// Kilometres from `from` to waypoint `start`, then on through every later
/// active waypoint.
///
/// Returns 0 when the position or any visited waypoint is invalid, or when
/// `start` is not an active waypoint.
pub fn remaining_distance(
    from: &Coordinate,
    waypoints: &[Option<ReferencePoint>],
    start: usize,
    topology: RouteTopology,
) -> f64 {
    if !from.is_valid() {
        return 0.0;
    }
    let Some(first) = active_at(waypoints, start) else {
        return 0.0;
    };
    if !first.position.is_valid() {
        return 0.0;
    }

    let mut total = from.distance_km(&first.position);
    let mut previous = first.position;

    for index in legs_after(waypoints.len(), start, topology) {
        let Some(point) = active_at(waypoints, index) else {
            continue;
        };
        if !point.position.is_valid() {
            return 0.0;
        }
        total += previous.distance_km(&point.position);
        previous = point.position;
    }

    total
}

/// First active waypoint at or after `index`, searching circularly.
pub fn current_waypoint(waypoints: &[Option<ReferencePoint>], index: usize) -> Option<usize> {
    let len = waypoints.len();
    (0..len)
        .map(|step| (index + step) % len)
        .find(|&slot| active_at(waypoints, slot).is_some())
}

/// Next active waypoint after `index`. Returns `None` when there is nowhere
/// else to go and the route should stay where it is.
pub fn next_waypoint(
    waypoints: &[Option<ReferencePoint>],
    index: usize,
    topology: RouteTopology,
) -> Option<usize> {
    legs_after(waypoints.len(), index, topology).find(|&slot| active_at(waypoints, slot).is_some())
}

/// Whether `position` is inside the arrival radius of waypoint `index`.
pub fn reached(position: &Coordinate, waypoints: &[Option<ReferencePoint>], index: usize) -> bool {
    match active_at(waypoints, index) {
        Some(point) if point.position.is_valid() && position.is_valid() => {
            position.distance_km(&point.position) < WAYPOINT_REACHED_KM
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset;

    fn route(points: &[(Coordinate, bool)]) -> [Option<ReferencePoint>; 6] {
        let mut slots = [None; 6];
        for (slot, (position, active)) in slots.iter_mut().zip(points) {
            *slot = Some(ReferencePoint::new(*position, *active));
        }
        slots
    }

    #[test]
    fn test_closed_route_wraps_to_first_slot() {
        let origin = Coordinate::new(47.0, 8.0);
        let a = offset(&origin, 0.0, 1.0);
        let b = offset(&a, 90.0, 1.0);
        let c = offset(&b, 180.0, 1.0);
        let slots = route(&[(a, true), (b, true), (c, true)]);

        let expected = origin.distance_km(&b) + b.distance_km(&c) + c.distance_km(&a);
        let total = remaining_distance(&origin, &slots, 1, RouteTopology::Closed);
        assert!((total - expected).abs() < 1e-9);
    }

    #[test]
    fn test_open_route_stops_at_last_slot() {
        let origin = Coordinate::new(47.0, 8.0);
        let a = offset(&origin, 0.0, 1.0);
        let b = offset(&a, 90.0, 1.0);
        let c = offset(&b, 180.0, 1.0);
        let slots = route(&[(a, true), (b, true), (c, true)]);

        let expected = origin.distance_km(&b) + b.distance_km(&c);
        let total = remaining_distance(&origin, &slots, 1, RouteTopology::Open);
        assert!((total - expected).abs() < 1e-9);
    }

    #[test]
    fn test_inactive_waypoints_are_skipped() {
        let origin = Coordinate::new(47.0, 8.0);
        let a = offset(&origin, 0.0, 1.0);
        let b = offset(&a, 90.0, 1.0);
        let far = offset(&a, 45.0, 50.0);

        let with_detour = route(&[(a, true), (far, false), (b, true)]);
        let direct = route(&[(a, true), (b, true)]);
        let lhs = remaining_distance(&origin, &with_detour, 0, RouteTopology::Open);
        let rhs = remaining_distance(&origin, &direct, 0, RouteTopology::Open);
        assert!((lhs - rhs).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_coordinates_yield_zero() {
        let origin = Coordinate::new(47.0, 8.0);
        let a = offset(&origin, 0.0, 1.0);
        let slots = route(&[(a, true), (Coordinate::new(f64::NAN, 8.0), true)]);
        assert_eq!(remaining_distance(&origin, &slots, 0, RouteTopology::Closed), 0.0);

        let slots = route(&[(a, true)]);
        let nowhere = Coordinate::new(f64::NAN, 0.0);
        assert_eq!(remaining_distance(&nowhere, &slots, 0, RouteTopology::Closed), 0.0);
    }

    #[test]
    fn test_inactive_start_yields_zero() {
        let origin = Coordinate::new(47.0, 8.0);
        let slots = route(&[(offset(&origin, 0.0, 1.0), false)]);
        assert_eq!(remaining_distance(&origin, &slots, 0, RouteTopology::Closed), 0.0);
        assert_eq!(remaining_distance(&origin, &slots, 4, RouteTopology::Closed), 0.0);
    }

    #[test]
    fn test_next_waypoint_wraps_and_gives_up() {
        let origin = Coordinate::new(47.0, 8.0);
        let slots = route(&[(origin, true), (origin, false), (origin, true)]);
        assert_eq!(next_waypoint(&slots, 0, RouteTopology::Closed), Some(2));
        assert_eq!(next_waypoint(&slots, 2, RouteTopology::Closed), Some(0));
        assert_eq!(next_waypoint(&slots, 2, RouteTopology::Open), None);

        let lonely = route(&[(origin, true)]);
        assert_eq!(next_waypoint(&lonely, 0, RouteTopology::Closed), None);
    }

    #[test]
    fn test_current_waypoint_skips_inactive() {
        let origin = Coordinate::new(47.0, 8.0);
        let slots = route(&[(origin, true), (origin, false), (origin, true)]);
        assert_eq!(current_waypoint(&slots, 1), Some(2));
        assert_eq!(current_waypoint(&slots, 3), Some(0));
        assert_eq!(current_waypoint(&[None; 4], 0), None);
    }

    #[test]
    fn test_reached_inside_radius() {
        let origin = Coordinate::new(47.0, 8.0);
        let slots = route(&[(offset(&origin, 0.0, 0.15), true), (offset(&origin, 0.0, 0.25), true)]);
        assert!(reached(&origin, &slots, 0));
        assert!(!reached(&origin, &slots, 1));
    }
}
