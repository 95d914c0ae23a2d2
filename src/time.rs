//! Millisecond monotonic time shared by every component.
//!
//! The firmware feeds these from `embassy_time::Instant::now()`; nothing in
//! the library reads a clock on its own.

pub type Instant = fugit::Instant<u64, 1, 1_000>;
pub type Duration = fugit::Duration<u64, 1, 1_000>;

pub const fn millis(ms: u64) -> Duration {
    Duration::from_ticks(ms)
}

pub const fn at_millis(ms: u64) -> Instant {
    Instant::from_ticks(ms)
}

/// Time from `earlier` to `now`, saturating to zero if the clock went backwards.
pub fn elapsed(now: Instant, earlier: Instant) -> Duration {
    now.checked_duration_since(earlier)
        .unwrap_or(Duration::from_ticks(0))
}

pub fn as_hours(duration: Duration) -> f64 {
    duration.ticks() as f64 / 3_600_000.0
}
