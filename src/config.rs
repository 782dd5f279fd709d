//! System configuration parameters
//!
//! All tunable parameters for the Nightlatch system.
//! Values can be overridden via NVS (non-volatile storage).

use serde::{Deserialize, Serialize};

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Operation window ---
    /// Hour (0–23) at which automatic operation becomes allowed.
    pub window_start_hour: u8,
    /// Minute (0–59) within `window_start_hour`.  The window runs from this
    /// time until midnight.
    pub window_start_minute: u8,

    // --- Light sensor ---
    /// Raw ADC reading below which ambient light counts as "dark".
    pub light_dark_threshold: u16,

    // --- Button ---
    /// Hold period after a press during which the press stays latched and
    /// repeated edges are ignored (replaces the old blocking delay).
    pub button_hold_ms: u32,

    // --- Remote command channel ---
    /// Whether a BLE "on" command actuates even while the operation gate is
    /// closed.  Defaults to `true`: the remote channel acts as a manual
    /// override unless explicitly restricted.
    pub remote_bypasses_gate: bool,

    // --- Timing ---
    /// Control loop interval (milliseconds).
    pub control_loop_interval_ms: u32,
    /// Interval between time-service fetches (seconds).
    pub time_fetch_interval_secs: u32,

    // --- Time fetch ---
    /// Upper bound on accepted HTTP response body size (bytes).
    pub max_response_bytes: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // 23:30 until midnight
            window_start_hour: 23,
            window_start_minute: 30,

            light_dark_threshold: 10,

            button_hold_ms: 500,

            remote_bypasses_gate: true,

            control_loop_interval_ms: 100, // 10 Hz
            time_fetch_interval_secs: 60,

            max_response_bytes: 2048,
        }
    }
}
