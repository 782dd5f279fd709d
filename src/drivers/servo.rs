//! SG90-class servo driver on LEDC PWM.
//!
//! Standard hobby-servo signalling: 50 Hz frame, 500 µs pulse at 0° and
//! 2500 µs at 180°.  The latch only ever uses the two endpoints, so the
//! public API is the [`ServoPosition`] enum rather than raw angles.

use log::debug;

use crate::drivers::hw_init;
use crate::pins;

const MIN_PULSE_US: u32 = 500; // 0°
const MAX_PULSE_US: u32 = 2500; // 180°
const PERIOD_US: u32 = 20_000; // 50 Hz frame

/// The two commanded servo endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoPosition {
    /// Latch retracted (0°).
    Rest,
    /// Latch engaged (180°).
    Engaged,
}

impl ServoPosition {
    /// Mechanical angle in degrees.
    pub fn angle(self) -> u8 {
        match self {
            Self::Rest => 0,
            Self::Engaged => 180,
        }
    }
}

impl core::fmt::Display for ServoPosition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Rest => write!(f, "rest"),
            Self::Engaged => write!(f, "engaged"),
        }
    }
}

/// Servo driver on LEDC channel [`hw_init::LEDC_CH_SERVO`].
///
/// Tracks the last commanded position so repeated commands skip the
/// duty-register write.
pub struct ServoDriver {
    position: ServoPosition,
}

impl ServoDriver {
    /// Create the driver and park the servo at [`ServoPosition::Rest`].
    pub fn new() -> Self {
        hw_init::ledc_set(hw_init::LEDC_CH_SERVO, angle_to_duty(ServoPosition::Rest.angle()));
        Self {
            position: ServoPosition::Rest,
        }
    }

    /// Drive the servo to `position`.  No-op if already there.
    pub fn set(&mut self, position: ServoPosition) {
        if position == self.position {
            return;
        }
        let duty = angle_to_duty(position.angle());
        hw_init::ledc_set(hw_init::LEDC_CH_SERVO, duty);
        debug!("servo: {} (duty={})", position, duty);
        self.position = position;
    }

    /// Last commanded position.
    pub fn position(&self) -> ServoPosition {
        self.position
    }
}

impl Default for ServoDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a servo angle (0–180°) to an LEDC duty value at the configured
/// timer resolution.
fn angle_to_duty(angle: u8) -> u32 {
    let angle = angle.min(180) as u32;
    let pulse_us = MIN_PULSE_US + (angle * (MAX_PULSE_US - MIN_PULSE_US)) / 180;
    (pulse_us * pins::SERVO_PWM_MAX_DUTY) / PERIOD_US
}
