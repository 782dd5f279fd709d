//! Hardware adapter — bridges real peripherals to domain port traits.
//!
//! Owns the button, light sensor, and servo drivers, exposing them
//! through [`SensorPort`] and [`ActuatorPort`].  This is the only module
//! in the system that touches actual hardware.  On non-espidf targets,
//! the underlying drivers use cfg-gated simulation stubs.

use crate::app::ports::{ActuatorPort, SensorPort};
use crate::drivers::button::{ButtonDriver, ButtonEvent};
use crate::drivers::servo::{ServoDriver, ServoPosition};
use crate::sensors::light::LightSensor;

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter {
    button: ButtonDriver,
    light: LightSensor,
    servo: ServoDriver,
    /// Set by `poll_button`, consumed by `button_pressed` (one-tick pulse).
    press_pending: bool,
}

impl HardwareAdapter {
    pub fn new(button: ButtonDriver, light: LightSensor, servo: ServoDriver) -> Self {
        Self {
            button,
            light,
            servo,
            press_pending: false,
        }
    }

    /// Advance the button debounce machine.  Call once per control tick
    /// before `AppService::tick`.
    pub fn poll_button(&mut self, now_ms: u32) {
        if self.button.tick(now_ms) == Some(ButtonEvent::Press) {
            self.press_pending = true;
        }
    }

    /// Host-side test hook: inject an ambient-light reading.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_light(&mut self, raw: u16) {
        self.light.sim_set_raw(raw);
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl SensorPort for HardwareAdapter {
    fn button_pressed(&mut self) -> bool {
        core::mem::take(&mut self.press_pending)
    }

    fn light_raw(&mut self) -> u16 {
        self.light.read()
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl ActuatorPort for HardwareAdapter {
    fn set_position(&mut self, position: ServoPosition) {
        self.servo.set(position);
    }

    fn position(&self) -> ServoPosition {
        self.servo.position()
    }
}
