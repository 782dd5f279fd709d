//! GPIO / peripheral pin assignments for the Nightlatch board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// Servo actuator (SG90-class, LEDC PWM)
// ---------------------------------------------------------------------------

/// LEDC PWM output driving the servo signal line.
pub const MOTOR_PWM_GPIO: i32 = 33;

// ---------------------------------------------------------------------------
// User button (external pull-down, logical HIGH = pressed).
// GPIO 37 is input-only and has no internal pull resistors.
// ---------------------------------------------------------------------------

pub const BUTTON_GPIO: i32 = 37;

// ---------------------------------------------------------------------------
// Ambient light sensor — photoresistor divider on ADC
// ---------------------------------------------------------------------------

pub const LIGHT_ADC_GPIO: i32 = 15;
/// ADC channel for [`LIGHT_ADC_GPIO`].
pub const LIGHT_ADC_CHANNEL: u32 = 3;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// Servo PWM frame rate (standard hobby-servo 50 Hz, 20 ms frame).
pub const SERVO_PWM_FREQ_HZ: u32 = 50;
/// LEDC timer resolution (bits).  14-bit gives ~1.2 µs pulse granularity
/// at 50 Hz, enough for clean 0°/180° endpoints.
pub const SERVO_PWM_RESOLUTION_BITS: u32 = 14;
/// Full-scale LEDC duty at [`SERVO_PWM_RESOLUTION_BITS`].
pub const SERVO_PWM_MAX_DUTY: u32 = (1 << SERVO_PWM_RESOLUTION_BITS) - 1;
