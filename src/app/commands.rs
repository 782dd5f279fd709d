//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (BLE, the
//! main loop) that the [`AppService`](super::service::AppService)
//! interprets and acts upon.

use crate::config::SystemConfig;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// A validated "on" write arrived on the BLE command characteristic.
    /// Engages the servo; whether the operation gate applies is decided
    /// by `SystemConfig::remote_bypasses_gate`.
    RemoteEngage,

    /// Hot-reload configuration (e.g. from NVS).
    UpdateConfig(SystemConfig),

    /// Explicitly persist the current config to NVS immediately.
    SaveConfig,
}
