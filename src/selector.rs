//! Target placement on the compass ring and round-robin selection.

use heapless::Vec;
use micromath::F32Ext;

use crate::config::{CollisionPolicy, DisplayGeometry, NavConfig};
use crate::geo::{wrap_360, Coordinate};
use crate::registry::MAX_TARGETS;
use crate::target::{Target, TargetKind};
use crate::time::{elapsed, Instant};

const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;

/// Snap directions, clockwise from north, 45 degrees apart.
const COMPASS_POINTS: [(i16, i16); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// Display pixel, origin top left.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

impl Point {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }

    fn distance_squared(&self, other: &Point) -> i32 {
        let dx = self.x as i32 - other.x as i32;
        let dy = self.y as i32 - other.y as i32;
        dx * dx + dy * dy
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Placement {
    At(Point),
    /// Lost a collision.
    Hidden,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameEntry {
    pub kind: TargetKind,
    pub distance_km: f64,
    pub bearing_deg: f64,
    pub relative_bearing_deg: f64,
    pub placement: Placement,
}

/// Everything the selector decided for one frame.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TargetFrame {
    /// Priority order. Includes hidden entries.
    pub entries: Vec<FrameEntry, MAX_TARGETS>,
    pub chosen: TargetKind,
    /// `None` when the chosen target has nothing to measure, such as an
    /// unset Home fallback.
    pub chosen_distance_km: Option<f64>,
    pub route_km: Option<f64>,
}

impl TargetFrame {
    pub fn entry(&self, kind: TargetKind) -> Option<&FrameEntry> {
        self.entries.iter().find(|entry| entry.kind == kind)
    }

    /// Entries that made it onto the ring.
    pub fn placed(&self) -> impl Iterator<Item = (&FrameEntry, Point)> {
        placed(&self.entries)
    }
}

fn placed(entries: &[FrameEntry]) -> impl Iterator<Item = (&FrameEntry, Point)> {
    entries.iter().filter_map(|entry| match entry.placement {
        Placement::At(point) => Some((entry, point)),
        Placement::Hidden => None,
    })
}

/// Ring position for a relative bearing, snapped off the centre if needed.
pub fn ring_position(relative_bearing_deg: f64, geometry: &DisplayGeometry) -> Point {
    let angle = relative_bearing_deg as f32 * DEG_TO_RAD;
    let radius = geometry.ring_radius as f32;
    let x = geometry.center_x as f32 + radius * F32Ext::sin(angle);
    let y = geometry.center_y as f32 - radius * F32Ext::cos(angle);
    let point = Point::new(F32Ext::round(x) as i16, F32Ext::round(y) as i16);

    let center = Point::new(geometry.center_x, geometry.center_y);
    let dead_zone = geometry.dead_zone as i32;
    if point.distance_squared(&center) > dead_zone * dead_zone {
        return point;
    }

    let sector = libm::round(wrap_360(relative_bearing_deg) / 45.0) as usize % COMPASS_POINTS.len();
    let (dx, dy) = COMPASS_POINTS[sector];
    let reach = geometry.ring_radius.max(geometry.dead_zone + 1);
    Point::new(center.x + dx * reach, center.y + dy * reach)
}

/// Push `point` directly away from `other` until they no longer collide.
/// `None` if the two coincide and there is no direction to push in.
fn displace(point: Point, other: Point, collision_distance: i16) -> Option<Point> {
    let dx = (point.x - other.x) as f64;
    let dy = (point.y - other.y) as f64;
    let length = libm::sqrt(dx * dx + dy * dy);
    if length == 0.0 {
        return None;
    }
    let push = collision_distance as f64 - length + 1.0;
    Some(Point::new(
        libm::round(point.x as f64 + dx / length * push) as i16,
        libm::round(point.y as f64 + dy / length * push) as i16,
    ))
}

fn resolve_collisions(entries: &mut [FrameEntry], geometry: &DisplayGeometry, policy: CollisionPolicy) {
    let threshold = geometry.collision_distance as i32 * geometry.collision_distance as i32;

    for index in 0..entries.len() {
        let Placement::At(point) = entries[index].placement else {
            continue;
        };
        let (kept, rest) = entries.split_at_mut(index);
        let entry = &mut rest[0];
        let mut kept_points = kept.iter().filter_map(|e| match e.placement {
            Placement::At(p) => Some(p),
            Placement::Hidden => None,
        });

        let Some(blocker) = kept_points
            .clone()
            .find(|p| p.distance_squared(&point) < threshold)
        else {
            continue;
        };

        entry.placement = match policy {
            CollisionPolicy::Hide => Placement::Hidden,
            CollisionPolicy::Displace => {
                match displace(point, blocker, geometry.collision_distance) {
                    Some(moved) if !kept_points.any(|p| p.distance_squared(&moved) < threshold) => {
                        Placement::At(moved)
                    }
                    _ => Placement::Hidden,
                }
            }
        };
        log_debug!("{} collides, now {:?}", entry.kind, entry.placement);
    }
}

/// Round-robin choice among the visible targets.
#[derive(Debug, Default)]
pub struct TargetSelector {
    current: Option<TargetKind>,
    last_cycle: Option<Instant>,
    advance_requested: bool,
}

impl TargetSelector {
    pub const fn new() -> Self {
        Self {
            current: None,
            last_cycle: None,
            advance_requested: false,
        }
    }

    pub fn current(&self) -> Option<TargetKind> {
        self.current
    }

    /// Move to the next candidate on the next frame without waiting for
    /// the cycle interval.
    pub fn request_advance(&mut self) {
        self.advance_requested = true;
    }

    /// Measure, place and choose.
    ///
    /// `targets` are the positional targets; `route_km` adds the route
    /// pseudo-target as a candidate. Targets with invalid coordinates are
    /// dropped up front, and so is everything if `position` is invalid.
    pub fn compute_frame(
        &mut self,
        position: &Coordinate,
        heading_deg: f64,
        targets: &[Target],
        route_km: Option<f64>,
        config: &NavConfig,
        now: Instant,
    ) -> TargetFrame {
        let mut entries: Vec<FrameEntry, MAX_TARGETS> = Vec::new();
        if position.is_valid() && heading_deg.is_finite() {
            for target in targets.iter().filter(|t| t.position.is_valid()) {
                let bearing_deg = position.bearing_deg(&target.position);
                let relative_bearing_deg = wrap_360(bearing_deg - heading_deg);
                let entry = FrameEntry {
                    kind: target.kind,
                    distance_km: position.distance_km(&target.position),
                    bearing_deg,
                    relative_bearing_deg,
                    placement: Placement::At(ring_position(relative_bearing_deg, &config.display)),
                };
                if entries.push(entry).is_err() {
                    break;
                }
            }
        }
        entries.sort_unstable_by_key(|entry| entry.kind.priority());
        resolve_collisions(&mut entries, &config.display, config.collision_policy);

        let route_km = route_km.filter(|km| km.is_finite());
        let mut candidates: Vec<TargetKind, { MAX_TARGETS + 1 }> = Vec::new();
        for (entry, _) in placed(&entries) {
            let _ = candidates.push(entry.kind);
        }
        if route_km.is_some() {
            let _ = candidates.push(TargetKind::Route);
        }

        let chosen = self.choose(&candidates, config, now);
        let chosen_distance_km = match chosen {
            TargetKind::Route => route_km,
            kind => entries
                .iter()
                .find(|entry| entry.kind == kind)
                .map(|entry| entry.distance_km),
        };

        TargetFrame {
            entries,
            chosen,
            chosen_distance_km,
            route_km,
        }
    }

    fn choose(&mut self, candidates: &[TargetKind], config: &NavConfig, now: Instant) -> TargetKind {
        let advance = core::mem::take(&mut self.advance_requested);

        let Some(first) = candidates.first().copied() else {
            self.current = None;
            self.last_cycle = None;
            return TargetKind::Home;
        };

        let position = self
            .current
            .and_then(|current| candidates.iter().position(|kind| *kind == current));

        let next = match (position, self.last_cycle) {
            (None, _) | (_, None) => {
                self.last_cycle = Some(now);
                first
            }
            (Some(index), Some(last)) => {
                if candidates.len() > 1
                    && (advance || elapsed(now, last) >= config.cycle_interval)
                {
                    self.last_cycle = Some(now);
                    candidates[(index + 1) % candidates.len()]
                } else {
                    if candidates.len() == 1 {
                        self.last_cycle = Some(now);
                    }
                    candidates[index]
                }
            }
        };

        self.current = Some(next);
        next
    }
}
