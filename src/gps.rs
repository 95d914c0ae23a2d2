//! NMEA receiver adapter.
//!
//! GGA carries position, altitude and satellites and publishes a fix; RMC
//! only refreshes speed and course for the next one.

use nmea0183::{ParseResult, Parser};

use crate::config::FEET_PER_METER;
use crate::fix::{Fix, PositionSource};
use crate::geo::Coordinate;
use crate::time::{at_millis, Instant};

pub struct NmeaFixSource {
    parser: Parser,
    latest: Fix,
    speed_kmh: f64,
    heading_deg: f64,
    fresh: bool,
}

impl Default for NmeaFixSource {
    fn default() -> Self {
        Self::new()
    }
}

impl NmeaFixSource {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            latest: Fix::invalid(at_millis(0)),
            speed_kmh: 0.0,
            heading_deg: 0.0,
            fresh: false,
        }
    }

    /// Push received bytes through the parser. `now` stamps any fix they
    /// complete. Returns the number of fixes published.
    pub fn feed(&mut self, bytes: &[u8], now: Instant) -> usize {
        let mut published = 0;

        for result in self.parser.parse_from_bytes(bytes) {
            match result {
                Ok(ParseResult::GGA(Some(gga))) => {
                    self.latest = Fix {
                        position: Coordinate::new(gga.latitude.as_f64(), gga.longitude.as_f64()),
                        altitude_ft: gga.altitude.meters as f64 * FEET_PER_METER,
                        speed_kmh: self.speed_kmh,
                        heading_deg: self.heading_deg,
                        satellites: gga.sat_in_use,
                        valid: true,
                        timestamp: now,
                    };
                    self.fresh = true;
                    published += 1;
                }
                Ok(ParseResult::GGA(None)) => {
                    // Receiver reports no fix
                    self.latest = Fix::invalid(now);
                    self.fresh = true;
                    published += 1;
                }
                Ok(ParseResult::RMC(Some(rmc))) => {
                    self.speed_kmh = rmc.speed.as_kph() as f64;
                    if let Some(course) = rmc.course {
                        self.heading_deg = course.degrees as f64;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log_debug!("NMEA parse error: {}", e);
                }
            }
        }

        published
    }
}

impl PositionSource for NmeaFixSource {
    fn has_new_fix(&mut self) -> bool {
        core::mem::take(&mut self.fresh)
    }

    fn latest_fix(&self) -> Fix {
        self.latest
    }
}
