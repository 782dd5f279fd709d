//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them — log to serial, notify over BLE, etc.

use crate::drivers::servo::ServoPosition;
use crate::timegate::TimeOfDay;

/// Which input caused a servo command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuationSource {
    /// Physical button press.
    Button,
    /// Ambient-light threshold decision.
    Light,
    /// BLE "on" command.
    Remote,
}

/// Structured events emitted by the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// The application service has started.
    Started,

    /// A time-service fetch parsed successfully.
    TimeSynced { time: TimeOfDay, gate_open: bool },

    /// The operation gate flipped.
    GateChanged { open: bool },

    /// The servo was commanded to a new position.
    MotorCommanded {
        position: ServoPosition,
        source: ActuationSource,
    },

    /// A remote engage arrived while the gate was closed and the bypass
    /// flag is off.
    RemoteBlocked,
}
