//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! A BLE-notification sink could implement the same trait later.

use log::info;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started => {
                info!("START | service up, gate closed until first sync");
            }
            AppEvent::TimeSynced { time, gate_open } => {
                info!(
                    "TIME  | {} | gate={}",
                    time,
                    if *gate_open { "open" } else { "closed" }
                );
            }
            AppEvent::GateChanged { open } => {
                info!("GATE  | {}", if *open { "opened" } else { "closed" });
            }
            AppEvent::MotorCommanded { position, source } => {
                info!("MOTOR | {} (source={:?})", position, source);
            }
            AppEvent::RemoteBlocked => {
                info!("BLE   | engage blocked (gate closed, bypass off)");
            }
        }
    }
}
