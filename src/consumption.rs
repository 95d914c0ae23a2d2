//! Fuel burn and flight hours, accrued only while moving.

use serde::{Deserialize, Serialize};

use crate::config::{
    BURN_RATE_MAX, BURN_RATE_MIN, DEFAULT_BURN_RATE, FUEL_MAX, FUEL_MIN, HOURS_PERSIST_INTERVAL,
};
use crate::storage::{self, Field, StorageError, Store};
use crate::time::{as_hours, elapsed, Instant};

/// Persisted form of the consumption counters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConsumptionRecord {
    pub fuel: f64,
    pub burn_rate: f64,
    pub flight_hours: f64,
}

impl Default for ConsumptionRecord {
    fn default() -> Self {
        Self {
            fuel: FUEL_MAX,
            burn_rate: DEFAULT_BURN_RATE,
            flight_hours: 0.0,
        }
    }
}

impl ConsumptionRecord {
    /// Replace every NaN or out-of-range value with its default.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let fuel = if self.fuel.is_finite() && (0.0..=FUEL_MAX).contains(&self.fuel) {
            self.fuel
        } else {
            log_warn!("stored fuel invalid, using default");
            defaults.fuel
        };
        let burn_rate = if self.burn_rate.is_finite()
            && (BURN_RATE_MIN..=BURN_RATE_MAX).contains(&self.burn_rate)
        {
            self.burn_rate
        } else {
            log_warn!("stored burn rate invalid, using default");
            defaults.burn_rate
        };
        let flight_hours = if self.flight_hours.is_finite() && self.flight_hours >= 0.0 {
            self.flight_hours
        } else {
            log_warn!("stored flight hours invalid, using default");
            defaults.flight_hours
        };
        Self {
            fuel,
            burn_rate,
            flight_hours,
        }
    }
}

#[derive(Debug)]
pub struct ConsumptionTracker {
    record: ConsumptionRecord,
    anchor: Option<Instant>,
    was_moving: bool,
    /// Flight time accrued since the last successful write.
    unsaved_hours: f64,
    dirty: bool,
}

impl Default for ConsumptionTracker {
    fn default() -> Self {
        Self::new(ConsumptionRecord::default())
    }
}

impl ConsumptionTracker {
    pub fn new(record: ConsumptionRecord) -> Self {
        Self {
            record: record.sanitized(),
            anchor: None,
            was_moving: false,
            unsaved_hours: 0.0,
            dirty: false,
        }
    }

    pub fn load<S: Store>(store: &mut S) -> Self {
        let record = match storage::load::<S, ConsumptionRecord>(store, Field::Consumption) {
            Ok(record) => record,
            Err(StorageError::NotFound) => ConsumptionRecord::default(),
            Err(e) => {
                log_warn!("consumption unreadable ({:?}), using defaults", e);
                ConsumptionRecord::default()
            }
        };
        Self::new(record)
    }

    pub fn fuel(&self) -> f64 {
        self.record.fuel
    }

    pub fn burn_rate(&self) -> f64 {
        self.record.burn_rate
    }

    pub fn flight_hours(&self) -> f64 {
        self.record.flight_hours
    }

    pub fn record(&self) -> ConsumptionRecord {
        self.record
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Accrue the time since the previous moving tick. Stationary ticks only
    /// drop the anchor, so gaps spent standing still are never counted.
    pub fn tick<S: Store>(&mut self, store: &mut S, now: Instant, moving: bool) {
        if moving {
            if let Some(anchor) = self.anchor {
                self.accrue(as_hours(elapsed(now, anchor)));
            }
            self.anchor = Some(now);
            if self.unsaved_hours >= HOURS_PERSIST_INTERVAL {
                self.persist(store);
            }
        } else {
            self.anchor = None;
            if self.was_moving {
                self.persist(store);
            }
        }
        self.was_moving = moving;
    }

    fn accrue(&mut self, hours: f64) {
        if hours <= 0.0 {
            return;
        }
        self.record.fuel = (self.record.fuel - self.record.burn_rate * hours).max(0.0);
        self.record.flight_hours += hours;
        self.unsaved_hours += hours;
    }

    /// Configure fuel on board and burn rate, clamped to their limits.
    /// Non-finite values are refused and nothing changes.
    pub fn set_fuel<S: Store>(&mut self, store: &mut S, fuel: f64, burn_rate: f64) -> bool {
        if !fuel.is_finite() || !burn_rate.is_finite() {
            return false;
        }
        self.record.fuel = fuel.clamp(FUEL_MIN, FUEL_MAX);
        self.record.burn_rate = burn_rate.clamp(BURN_RATE_MIN, BURN_RATE_MAX);
        self.persist(store);
        log_info!("fuel {} burn {}", self.record.fuel, self.record.burn_rate);
        true
    }

    /// Write the counters unconditionally.
    pub fn flush<S: Store>(&mut self, store: &mut S) -> Result<(), StorageError> {
        let result = storage::save(store, Field::Consumption, &self.record);
        match result {
            Ok(()) => {
                self.unsaved_hours = 0.0;
                self.dirty = false;
            }
            Err(_) => self.dirty = true,
        }
        result
    }

    fn persist<S: Store>(&mut self, store: &mut S) {
        if let Err(e) = self.flush(store) {
            log_warn!("persisting consumption failed: {:?}", e);
        }
    }
}
