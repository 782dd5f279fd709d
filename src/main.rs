//! Nightlatch Firmware — Main Entry Point
//!
//! Hexagonal architecture with event-driven execution.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter   LogEventSink    NvsAdapter   MonotonicClock │
//! │  (Sensor+Actuator) (EventSink)     (Config+NVS)                │
//! │  WifiAdapter       BleAdapter      HttpTimeAdapter             │
//! │  (Connectivity)    (RemoteCommand) (TimeFetch)                 │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  TimeGate · hold timer · actuation decision            │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Module declarations ───────────────────────────────────────
pub mod config;
mod events;
mod pins;
mod timegate;

pub mod app;
mod adapters;
mod drivers;
mod sensors;

// ── Imports ───────────────────────────────────────────────────
use anyhow::Result;
use log::{debug, info, warn};

use adapters::ble::{BleAdapter, RemoteCommand, RemoteCommandPort};
use adapters::hardware::HardwareAdapter;
use adapters::http_time::{HttpTimeAdapter, DEFAULT_TIME_URL};
use adapters::log_sink::LogEventSink;
use adapters::nvs::NvsAdapter;
use adapters::time::MonotonicClock;
use adapters::wifi::{ConnectivityPort, WifiAdapter};
use app::commands::AppCommand;
use app::ports::ConfigPort;
use app::service::AppService;
use config::SystemConfig;
use drivers::button::ButtonDriver;
use drivers::servo::ServoDriver;
use events::{drain_events, push_event, Event};
use sensors::light::LightSensor;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }

    info!("nightlatch v{} starting", env!("CARGO_PKG_VERSION"));

    // ── 2. Hardware peripherals ───────────────────────────────
    if let Err(e) = drivers::hw_init::init_peripherals() {
        // Peripheral init failure is critical: log and halt until the
        // watchdog resets the chip.
        log::error!("HAL init failed: {} — halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }
    if let Err(e) = drivers::hw_init::init_isr_service() {
        warn!("ISR service init failed: {} — button falls back to polling", e);
    }

    // ── 3. Persistent storage + configuration ─────────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow::anyhow!("NVS init failed: {}", e))?;
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };

    let clock = MonotonicClock::new();

    // ── 4. Connectivity ───────────────────────────────────────
    #[cfg(target_os = "espidf")]
    let mut wifi = {
        use esp_idf_hal::peripherals::Peripherals;
        use esp_idf_svc::eventloop::EspSystemEventLoop;
        use esp_idf_svc::nvs::EspDefaultNvsPartition;
        use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

        let peripherals = Peripherals::take()?;
        let sys_loop = EspSystemEventLoop::take()?;
        let nvs_partition = EspDefaultNvsPartition::take()?;
        let esp_wifi = EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs_partition))?;
        WifiAdapter::new(BlockingWifi::wrap(esp_wifi, sys_loop)?)
    };
    #[cfg(not(target_os = "espidf"))]
    let mut wifi = WifiAdapter::new();

    // Missing credentials leave the device in BLE-only mode: the servo
    // still answers remote commands, but the gate stays closed until the
    // user provisions the network and the first time sync lands.
    match nvs.load_credentials() {
        Ok(creds) => {
            if let Err(e) = wifi.set_credentials(creds) {
                warn!("Stored WiFi credentials rejected: {}", e);
            } else if let Err(e) = wifi.connect() {
                warn!("Initial WiFi connect failed ({}), will retry with backoff", e);
            }
        }
        Err(e) => {
            warn!("No usable WiFi credentials ({}), running BLE-only", e);
        }
    }

    // ── 5. Remaining adapters ─────────────────────────────────
    let mut ble = BleAdapter::new(heapless::String::try_from("nightlatch").unwrap_or_default());
    ble.start();

    let mut hw = HardwareAdapter::new(
        ButtonDriver::new(pins::BUTTON_GPIO),
        LightSensor::new(),
        ServoDriver::new(),
    );
    let mut fetcher = HttpTimeAdapter::new(DEFAULT_TIME_URL, config.max_response_bytes);
    let mut log_sink = LogEventSink::new();

    // ── 6. Application service ────────────────────────────────
    let mut app = AppService::new(config.clone());
    app.start(&mut log_sink);

    info!("System ready. Entering event loop.");

    // ── 7. Event loop ─────────────────────────────────────────
    let mut next_fetch_at: u64 = 0;

    loop {
        // std::thread::sleep maps to vTaskDelay on ESP-IDF, so the idle
        // task runs and the watchdog stays fed between ticks.
        std::thread::sleep(std::time::Duration::from_millis(
            config.control_loop_interval_ms as u64,
        ));
        push_event(Event::ControlTick);

        // Time-fetch cadence. Skipped while offline: the gate simply
        // stays latched at its last known state.
        let now_secs = clock.uptime_secs();
        if wifi.is_connected() && now_secs >= next_fetch_at {
            push_event(Event::TimeFetchTick);
            next_fetch_at = now_secs + config.time_fetch_interval_secs as u64;
        }

        // Advance the button debounce machine before consuming ticks.
        hw.poll_button(clock.uptime_ms());

        // Process all pending events.
        drain_events(|event| match event {
            Event::ControlTick => {
                app.tick(&mut hw, &mut log_sink);
            }

            Event::TimeFetchTick => {
                app.poll_time(&mut fetcher, &mut log_sink);
            }

            Event::RemoteCommand => {
                // Raw bytes from the GATT write callback; validation and
                // the gate/bypass decision happen in the service.
                if let Some(raw) = adapters::ble::take_command_data() {
                    if ble.on_command_write(&raw).is_ok() {
                        if let Some(RemoteCommand::Engage) = ble.take_command() {
                            app.handle_command(AppCommand::RemoteEngage, &mut hw, &mut log_sink);
                        }
                    }
                }
            }

            Event::ButtonPress => {
                // The debounced press is delivered through SensorPort on
                // the next ControlTick; this event only marks the edge.
                debug!("button ISR edge at {} ms", clock.uptime_ms());
            }
        });

        // WiFi reconnection poll (exponential backoff).
        wifi.poll(now_secs);

        // Config auto-save (5 s debounce after last change).
        app.auto_save_if_needed(&nvs);
    }
}
