//! Single key, active low, turned into discrete press events.

use embedded_hal::digital::InputPin;

use crate::config::{NavConfig, BUTTON_DEBOUNCE};
use crate::time::{at_millis, elapsed, Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonEvent {
    /// Released before the first long-press threshold.
    ShortPress,
    /// Still held, and the hold just crossed a threshold.
    LongPressThreshold(Duration),
    /// Released after at least the first threshold.
    Release(Duration),
}

/// Polled debouncer. Call [`ButtonDebouncer::poll`] every
/// [`crate::config::BUTTON_POLL_INTERVAL`].
pub struct ButtonDebouncer<P> {
    pin: P,
    thresholds: [Duration; 2],
    raw_pressed: bool,
    raw_since: Instant,
    pressed: bool,
    pressed_at: Instant,
    crossed: usize,
}

impl<P: InputPin> ButtonDebouncer<P> {
    pub fn new(pin: P, config: &NavConfig) -> Self {
        Self {
            pin,
            thresholds: [config.home_hold, config.sleep_hold],
            raw_pressed: false,
            raw_since: at_millis(0),
            pressed: false,
            pressed_at: at_millis(0),
            crossed: 0,
        }
    }

    pub fn pin_mut(&mut self) -> &mut P {
        &mut self.pin
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn poll(&mut self, now: Instant) -> Option<ButtonEvent> {
        // A failed read keeps the previous level
        if let Ok(low) = self.pin.is_low() {
            if low != self.raw_pressed {
                self.raw_pressed = low;
                self.raw_since = now;
            }
        }

        if self.raw_pressed != self.pressed && elapsed(now, self.raw_since) >= BUTTON_DEBOUNCE {
            self.pressed = self.raw_pressed;
            if self.pressed {
                self.pressed_at = self.raw_since;
                self.crossed = 0;
                return None;
            }

            let held = elapsed(self.raw_since, self.pressed_at);
            return Some(if held < self.thresholds[0] {
                ButtonEvent::ShortPress
            } else {
                ButtonEvent::Release(held)
            });
        }

        if self.pressed {
            let held = elapsed(now, self.pressed_at);
            if let Some(threshold) = self.thresholds.get(self.crossed) {
                if held >= *threshold {
                    self.crossed += 1;
                    return Some(ButtonEvent::LongPressThreshold(held));
                }
            }
        }

        None
    }
}
