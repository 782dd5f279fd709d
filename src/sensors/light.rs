//! Ambient-light sensor (photoresistor divider on ADC2).
//!
//! ADC2 is shared with the Wi-Fi driver, so individual reads can fail.
//! The sensor latches the last good sample: a failed read reports the
//! previous value rather than 0, because a raw 0 means "pitch dark" and
//! would engage the servo.

use crate::drivers::hw_init;

pub struct LightSensor {
    last_raw: u16,
}

impl LightSensor {
    /// Starts saturated-bright so the latch stays at rest until the first
    /// real sample arrives.
    pub fn new() -> Self {
        Self { last_raw: u16::MAX }
    }

    /// Sample the ADC.  On read failure the last good value is returned.
    pub fn read(&mut self) -> u16 {
        if let Some(raw) = hw_init::adc_light_read() {
            self.last_raw = raw;
        }
        self.last_raw
    }

    /// Host-side test hook: inject a raw sample.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_raw(&mut self, raw: u16) {
        self.last_raw = raw;
    }
}

impl Default for LightSensor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boots_bright() {
        let mut sensor = LightSensor::new();
        assert_eq!(sensor.read(), u16::MAX);
    }

    #[test]
    fn failed_read_keeps_last_sample() {
        let mut sensor = LightSensor::new();
        sensor.sim_set_raw(42);
        // Host adc_light_read() always fails, so the latched value survives.
        assert_eq!(sensor.read(), 42);
        assert_eq!(sensor.read(), 42);
    }
}
