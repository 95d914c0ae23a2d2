//! Battery level from the divided-down cell voltage.

const ADC_FULL_SCALE: f32 = 4095.0;
const ADC_REFERENCE_V: f32 = 3.3;
const DIVIDER_RATIO: f32 = 2.0;

const EMPTY_V: f32 = 3.0;
const FULL_V: f32 = 4.2;

/// Cell voltage for a raw 12-bit reading.
pub fn voltage_from_adc(raw: u16) -> f32 {
    raw.min(ADC_FULL_SCALE as u16) as f32 / ADC_FULL_SCALE * ADC_REFERENCE_V * DIVIDER_RATIO
}

/// Linear placeholder curve: 3.0 V is empty, 4.2 V is full.
pub fn percent_from_voltage(volts: f32) -> u8 {
    if !volts.is_finite() || volts <= EMPTY_V {
        return 0;
    }
    if volts >= FULL_V {
        return 100;
    }
    libm::roundf((volts - EMPTY_V) / (FULL_V - EMPTY_V) * 100.0) as u8
}

pub fn percent_from_adc(raw: u16) -> u8 {
    percent_from_voltage(voltage_from_adc(raw))
}
