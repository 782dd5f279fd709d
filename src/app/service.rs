//! Application service — the hexagonal core.
//!
//! [`AppService`] owns the operation gate, the button hold timer, and the
//! actuation decision.  All I/O flows through port traits injected at
//! call sites, making the entire service testable with mock adapters.
//!
//! ```text
//!  SensorPort ──▶ ┌────────────────────────┐ ──▶ EventSink
//!                 │      AppService         │
//! ActuatorPort ◀──│  gate · hold · decide   │
//!                 └────────────────────────┘
//! ```
//!
//! Input precedence within a tick: remote commands are handled out of
//! band via [`handle_command`](AppService::handle_command); inside
//! [`tick`](AppService::tick) an active button hold wins over the light
//! sensor, so a fresh press is never immediately undone by a bright room.

use log::{info, warn};

use crate::config::SystemConfig;
use crate::drivers::servo::ServoPosition;
use crate::timegate::{OperationWindow, TimeGate};

use super::commands::AppCommand;
use super::events::{ActuationSource, AppEvent};
use super::ports::{ActuatorPort, ConfigPort, EventSink, SensorPort, TimeFetchPort};

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService {
    config: SystemConfig,
    gate: TimeGate,
    /// Remaining milliseconds of the current button hold (0 = idle).
    hold_remaining_ms: u32,
    /// Last position commanded through the actuator port.
    position: ServoPosition,
    /// Level of the button at the previous tick, for edge detection.
    button_was_pressed: bool,
    tick_count: u64,
    config_dirty: bool,
    dirty_since_tick: u64,
    /// Set by an explicit `SaveConfig`; skips the auto-save debounce.
    flush_requested: bool,
}

impl AppService {
    /// Construct the service from configuration.
    ///
    /// An out-of-range window start in the config falls back to the
    /// default 23:30 window rather than aborting boot.
    pub fn new(config: SystemConfig) -> Self {
        let window =
            OperationWindow::starting_at(config.window_start_hour, config.window_start_minute)
                .unwrap_or_else(|| {
                    warn!(
                        "Invalid window start {:02}:{:02} in config, using default",
                        config.window_start_hour, config.window_start_minute
                    );
                    OperationWindow::default()
                });

        Self {
            config,
            gate: TimeGate::new(window),
            hold_remaining_ms: 0,
            position: ServoPosition::Rest,
            button_was_pressed: false,
            tick_count: 0,
            config_dirty: false,
            dirty_since_tick: 0,
            flush_requested: false,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Started);
        info!("AppService started, gate closed until first time sync");
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle: read inputs → decide → drive the servo.
    ///
    /// The `hw` parameter satisfies **both** [`SensorPort`] and
    /// [`ActuatorPort`] — this avoids a double mutable borrow while
    /// keeping the port boundary explicit.
    pub fn tick(&mut self, hw: &mut (impl SensorPort + ActuatorPort), sink: &mut impl EventSink) {
        self.tick_count += 1;

        // 1. Sample inputs
        let pressed = hw.button_pressed();
        let light = hw.light_raw();

        // 2. Advance the hold timer
        self.hold_remaining_ms = self
            .hold_remaining_ms
            .saturating_sub(self.config.control_loop_interval_ms);

        // 3. Decide. Gate closed => neither button nor light actuates.
        let press_edge = pressed && !self.button_was_pressed;
        self.button_was_pressed = pressed;

        if self.gate.is_open() {
            if press_edge && self.hold_remaining_ms == 0 {
                // Fresh press: engage and latch for the hold period.
                self.hold_remaining_ms = self.config.button_hold_ms;
                self.command(ServoPosition::Engaged, ActuationSource::Button, hw, sink);
            } else if self.hold_remaining_ms == 0 {
                // No active hold: the light sensor owns the servo.
                let target = if light < self.config.light_dark_threshold {
                    ServoPosition::Engaged
                } else {
                    ServoPosition::Rest
                };
                self.command(target, ActuationSource::Light, hw, sink);
            }
            // Hold active: ignore light and repeated edges until it expires.
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command (from BLE, the main loop, etc.).
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) {
        match cmd {
            AppCommand::RemoteEngage => {
                if self.config.remote_bypasses_gate || self.gate.is_open() {
                    self.command(ServoPosition::Engaged, ActuationSource::Remote, hw, sink);
                } else {
                    info!("Remote engage blocked: gate closed and bypass disabled");
                    sink.emit(&AppEvent::RemoteBlocked);
                }
            }
            AppCommand::UpdateConfig(new_config) => {
                if let Some(window) = OperationWindow::starting_at(
                    new_config.window_start_hour,
                    new_config.window_start_minute,
                ) {
                    self.gate.set_window(window);
                } else {
                    warn!("Rejected config window update: start time out of range");
                }
                self.config = new_config;
                self.mark_config_dirty();
                info!("Configuration updated at runtime");
            }
            AppCommand::SaveConfig => {
                self.mark_config_dirty();
                self.flush_requested = true;
                info!("Explicit config save requested (will flush on next auto-save check)");
            }
        }
    }

    // ── Time synchronisation ──────────────────────────────────

    /// Fetch the remote time service and re-evaluate the gate.
    ///
    /// Every failure (network, HTTP, parse) leaves the gate latched at
    /// its previous value; nothing here drives the servo directly.
    pub fn poll_time(&mut self, fetcher: &mut impl TimeFetchPort, sink: &mut impl EventSink) {
        let body = match fetcher.fetch_body() {
            Ok(body) => body,
            Err(e) => {
                warn!("Time fetch failed: {}", e);
                return;
            }
        };

        let was_open = self.gate.is_open();
        match self.gate.observe_body(&body) {
            Ok(time) => {
                let gate_open = self.gate.is_open();
                sink.emit(&AppEvent::TimeSynced { time, gate_open });
                if gate_open != was_open {
                    info!("Operation gate {} at {}", if gate_open { "opened" } else { "closed" }, time);
                    sink.emit(&AppEvent::GateChanged { open: gate_open });
                }
            }
            Err(e) => {
                warn!("Time body parse failed ({}), gate unchanged", e);
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Whether automatic actuation is currently allowed.
    pub fn gate_open(&self) -> bool {
        self.gate.is_open()
    }

    /// Last position commanded through the actuator port.
    pub fn position(&self) -> ServoPosition {
        self.position
    }

    /// Whether a button hold is currently latched.
    pub fn hold_active(&self) -> bool {
        self.hold_remaining_ms > 0
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Clone of the live configuration.
    pub fn current_config(&self) -> SystemConfig {
        self.config.clone()
    }

    // ── Internal ──────────────────────────────────────────────

    /// Drive the servo and emit an event only when the position changes.
    fn command(
        &mut self,
        target: ServoPosition,
        source: ActuationSource,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) {
        hw.set_position(target);
        if target != self.position {
            self.position = target;
            sink.emit(&AppEvent::MotorCommanded {
                position: target,
                source,
            });
        }
    }

    // ── Config dirty-flag management ──────────────────────────

    /// Mark the config as modified. Called by `handle_command(UpdateConfig)`.
    pub fn mark_config_dirty(&mut self) {
        if !self.config_dirty {
            self.config_dirty = true;
            self.dirty_since_tick = self.tick_count;
        }
    }

    /// Check if auto-save should trigger (5 seconds after last change, or
    /// immediately after an explicit `SaveConfig`).
    /// Returns `true` if the config was saved.
    pub fn auto_save_if_needed(&mut self, storage: &impl ConfigPort) -> bool {
        if !self.config_dirty {
            return false;
        }
        if !self.flush_requested {
            let ticks_since_dirty = self.tick_count.saturating_sub(self.dirty_since_tick);
            let ms_since_dirty = ticks_since_dirty * self.config.control_loop_interval_ms as u64;
            if ms_since_dirty < 5000 {
                return false;
            }
        }
        match storage.save(&self.config) {
            Ok(()) => {
                self.config_dirty = false;
                self.flush_requested = false;
                info!("Config auto-saved to NVS");
                true
            }
            Err(e) => {
                warn!("Config auto-save failed: {}", e);
                false
            }
        }
    }

    /// Whether the config has unsaved changes.
    pub fn is_config_dirty(&self) -> bool {
        self.config_dirty
    }
}
