//! Integration tests: time fetch → gate → AppService → servo.
//!
//! Exercises the full decision pipeline through the port traits, with the
//! HTTP adapter running in simulation mode and mock hardware recording
//! every actuator call.

#![cfg(not(target_os = "espidf"))]

use std::collections::HashMap;

use nightlatch::adapters::http_time::{HttpTimeAdapter, DEFAULT_TIME_URL};
use nightlatch::app::commands::AppCommand;
use nightlatch::app::events::{ActuationSource, AppEvent};
use nightlatch::app::ports::{
    ActuatorPort, ConfigError, ConfigPort, EventSink, FetchError, SensorPort,
};
use nightlatch::app::service::AppService;
use nightlatch::config::SystemConfig;
use nightlatch::drivers::servo::ServoPosition;

// ── Mock implementations ──────────────────────────────────────

struct MockHw {
    pressed: bool,
    light: u16,
    position: ServoPosition,
    set_calls: u32,
}

impl MockHw {
    fn new() -> Self {
        Self {
            pressed: false,
            light: 500,
            position: ServoPosition::Rest,
            set_calls: 0,
        }
    }
}

impl SensorPort for MockHw {
    fn button_pressed(&mut self) -> bool {
        // One-tick pulse semantics, like the hardware adapter.
        std::mem::take(&mut self.pressed)
    }
    fn light_raw(&mut self) -> u16 {
        self.light
    }
}

impl ActuatorPort for MockHw {
    fn set_position(&mut self, position: ServoPosition) {
        self.position = position;
        self.set_calls += 1;
    }
    fn position(&self) -> ServoPosition {
        self.position
    }
}

struct RecordingSink(Vec<AppEvent>);

impl EventSink for RecordingSink {
    fn emit(&mut self, e: &AppEvent) {
        self.0.push(*e);
    }
}

struct MemConfigStore {
    saved: std::cell::RefCell<HashMap<String, SystemConfig>>,
}

impl MemConfigStore {
    fn new() -> Self {
        Self {
            saved: std::cell::RefCell::new(HashMap::new()),
        }
    }
    fn last_saved(&self) -> Option<SystemConfig> {
        self.saved.borrow().get("config").cloned()
    }
}

impl ConfigPort for MemConfigStore {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        self.saved
            .borrow()
            .get("config")
            .cloned()
            .ok_or(ConfigError::NotFound)
    }
    fn save(&self, c: &SystemConfig) -> Result<(), ConfigError> {
        self.saved.borrow_mut().insert("config".into(), c.clone());
        Ok(())
    }
}

fn make_app() -> (AppService, MockHw, RecordingSink) {
    let mut app = AppService::new(SystemConfig::default());
    let hw = MockHw::new();
    let mut sink = RecordingSink(Vec::new());
    app.start(&mut sink);
    (app, hw, sink)
}

fn sync_time(app: &mut AppService, sink: &mut RecordingSink, body: &str) {
    let mut fetcher = HttpTimeAdapter::new(DEFAULT_TIME_URL, 2048);
    fetcher.sim_set_response(Ok(body.to_string()));
    app.poll_time(&mut fetcher, sink);
}

// ── Pipeline: fetch → parse → gate → actuation ────────────────

#[test]
fn time_sync_opens_gate_and_dark_engages() {
    let (mut app, mut hw, mut sink) = make_app();
    assert!(!app.gate_open(), "gate must boot closed");

    sync_time(&mut app, &mut sink, "datetime: 2024-05-01T23:45:00-07:00\n");
    assert!(app.gate_open());

    hw.light = 2;
    app.tick(&mut hw, &mut sink);
    assert_eq!(hw.position, ServoPosition::Engaged);
    assert!(sink.0.iter().any(|e| matches!(
        e,
        AppEvent::MotorCommanded {
            source: ActuationSource::Light,
            ..
        }
    )));
}

#[test]
fn before_first_sync_nothing_actuates() {
    let (mut app, mut hw, mut sink) = make_app();

    hw.light = 0;
    hw.pressed = true;
    for _ in 0..50 {
        app.tick(&mut hw, &mut sink);
        hw.pressed = true;
    }
    assert_eq!(hw.set_calls, 0, "closed gate must never touch the servo");
}

#[test]
fn leaving_window_closes_gate_and_freezes_servo() {
    let (mut app, mut hw, mut sink) = make_app();
    sync_time(&mut app, &mut sink, "datetime: 2024-05-01T23:40:00-07:00\n");
    hw.light = 0;
    app.tick(&mut hw, &mut sink);
    assert_eq!(hw.position, ServoPosition::Engaged);

    // Midnight rolls over: gate closes.
    sync_time(&mut app, &mut sink, "datetime: 2024-05-02T00:10:00-07:00\n");
    assert!(!app.gate_open());
    assert!(sink.0.contains(&AppEvent::GateChanged { open: false }));

    // Bright light would normally retract, but the gate is closed.
    let calls_before = hw.set_calls;
    hw.light = 500;
    for _ in 0..20 {
        app.tick(&mut hw, &mut sink);
    }
    assert_eq!(hw.set_calls, calls_before);
    assert_eq!(hw.position, ServoPosition::Engaged, "position holds as-is");
}

#[test]
fn fetch_failures_latch_gate_open() {
    let (mut app, mut hw, mut sink) = make_app();
    sync_time(&mut app, &mut sink, "datetime: 2024-05-01T23:45:00-07:00\n");
    assert!(app.gate_open());

    let mut fetcher = HttpTimeAdapter::new(DEFAULT_TIME_URL, 2048);
    for err in [
        FetchError::NotConnected,
        FetchError::BadStatus(503),
        FetchError::ReadFailed,
    ] {
        fetcher.sim_set_response(Err(err));
        app.poll_time(&mut fetcher, &mut sink);
        assert!(app.gate_open(), "fetch failure must not move the gate");
    }

    // The open gate still drives actuation normally.
    hw.light = 0;
    app.tick(&mut hw, &mut sink);
    assert_eq!(hw.position, ServoPosition::Engaged);
}

#[test]
fn malformed_body_latches_gate() {
    let (mut app, _hw, mut sink) = make_app();
    sync_time(&mut app, &mut sink, "datetime: 2024-05-01T23:45:00-07:00\n");
    assert!(app.gate_open());

    for bad in [
        "",
        "abbreviation: PDT\nutc_offset: -07:00\n",
        "datetime: 2024-13-99T99:99:99\n",
        "datetime: garbage\n",
    ] {
        sync_time(&mut app, &mut sink, bad);
        assert!(app.gate_open(), "parse error must not move the gate: {bad:?}");
    }
}

#[test]
fn oversize_body_never_reaches_parser() {
    let (mut app, _hw, mut sink) = make_app();

    // A huge but valid-looking body is rejected by the transport bound.
    let mut body = "datetime: 2024-05-01T23:45:00-07:00\n".to_string();
    body.push_str(&"x".repeat(4096));
    let mut fetcher = HttpTimeAdapter::new(DEFAULT_TIME_URL, 1024);
    fetcher.sim_set_response(Ok(body));
    app.poll_time(&mut fetcher, &mut sink);

    assert!(!app.gate_open(), "bounded transport must drop the response");
    assert!(!sink.0.iter().any(|e| matches!(e, AppEvent::TimeSynced { .. })));
}

// ── Button hold + light interplay ─────────────────────────────

#[test]
fn button_hold_then_light_takes_over() {
    let config = SystemConfig::default();
    let hold_ticks = (config.button_hold_ms / config.control_loop_interval_ms) as usize;
    let (mut app, mut hw, mut sink) = make_app();
    sync_time(&mut app, &mut sink, "datetime: 2024-05-01T23:45:00-07:00\n");

    // Press in a bright room.
    hw.light = 500;
    hw.pressed = true;
    app.tick(&mut hw, &mut sink);
    assert_eq!(hw.position, ServoPosition::Engaged);
    assert!(app.hold_active());

    // The hold pins the servo against the bright reading.
    for _ in 0..hold_ticks - 1 {
        app.tick(&mut hw, &mut sink);
        assert_eq!(hw.position, ServoPosition::Engaged);
    }

    // Hold expires, light wins again.
    app.tick(&mut hw, &mut sink);
    assert_eq!(hw.position, ServoPosition::Rest);
    assert!(!app.hold_active());
}

// ── Remote command gating ─────────────────────────────────────

#[test]
fn remote_engage_bypasses_closed_gate_by_default() {
    let (mut app, mut hw, mut sink) = make_app();
    assert!(!app.gate_open());

    app.handle_command(AppCommand::RemoteEngage, &mut hw, &mut sink);
    assert_eq!(hw.position, ServoPosition::Engaged);
    assert!(sink.0.iter().any(|e| matches!(
        e,
        AppEvent::MotorCommanded {
            source: ActuationSource::Remote,
            ..
        }
    )));
}

#[test]
fn remote_engage_respects_gate_when_bypass_off() {
    let config = SystemConfig {
        remote_bypasses_gate: false,
        ..Default::default()
    };
    let mut app = AppService::new(config);
    let mut hw = MockHw::new();
    let mut sink = RecordingSink(Vec::new());
    app.start(&mut sink);

    app.handle_command(AppCommand::RemoteEngage, &mut hw, &mut sink);
    assert_eq!(hw.set_calls, 0);
    assert!(sink.0.contains(&AppEvent::RemoteBlocked));

    sync_time(&mut app, &mut sink, "datetime: 2024-05-01T23:31:00-07:00\n");
    app.handle_command(AppCommand::RemoteEngage, &mut hw, &mut sink);
    assert_eq!(hw.position, ServoPosition::Engaged);
}

#[test]
fn repeated_on_is_idempotent_and_junk_never_reverts() {
    use nightlatch::adapters::ble::BleAdapter;

    let (mut app, mut hw, mut sink) = make_app();
    let mut ble = BleAdapter::new(heapless::String::try_from("test-latch").unwrap());

    let mut deliver = |ble: &mut BleAdapter, raw: &[u8], app: &mut AppService, hw: &mut MockHw, sink: &mut RecordingSink| {
        use nightlatch::adapters::ble::{RemoteCommand, RemoteCommandPort};
        if ble.on_command_write(raw).is_ok() {
            if let Some(RemoteCommand::Engage) = ble.take_command() {
                app.handle_command(AppCommand::RemoteEngage, hw, sink);
            }
        }
    };

    deliver(&mut ble, b"on", &mut app, &mut hw, &mut sink);
    assert_eq!(hw.position, ServoPosition::Engaged);

    // Repeats land on the same position and emit no further events.
    let events_after_first = sink.0.len();
    deliver(&mut ble, b"on", &mut app, &mut hw, &mut sink);
    deliver(&mut ble, b"on\0", &mut app, &mut hw, &mut sink);
    assert_eq!(hw.position, ServoPosition::Engaged);
    assert_eq!(sink.0.len(), events_after_first);

    // Junk writes are rejected at the adapter and never reach the servo.
    let calls_before = hw.set_calls;
    for junk in [&b"off"[..], b"ON", b"onn", b"", &[0xff, 0xfe]] {
        deliver(&mut ble, junk, &mut app, &mut hw, &mut sink);
    }
    assert_eq!(hw.set_calls, calls_before);
    assert_eq!(hw.position, ServoPosition::Engaged);
}

// ── Config persistence ────────────────────────────────────────

#[test]
fn updated_config_auto_saves_and_reloads() {
    let (mut app, mut hw, mut sink) = make_app();
    let store = MemConfigStore::new();

    let new_config = SystemConfig {
        light_dark_threshold: 42,
        window_start_hour: 22,
        window_start_minute: 0,
        ..Default::default()
    };
    app.handle_command(AppCommand::UpdateConfig(new_config), &mut hw, &mut sink);
    assert!(app.is_config_dirty());
    assert!(!app.auto_save_if_needed(&store), "save debounce not elapsed");

    // 5 s of ticks at the default 100 ms cadence.
    for _ in 0..51 {
        app.tick(&mut hw, &mut sink);
    }
    assert!(app.auto_save_if_needed(&store));
    assert!(!app.is_config_dirty());

    let reloaded = store.last_saved().expect("config must be persisted");
    assert_eq!(reloaded.light_dark_threshold, 42);
    assert_eq!(reloaded.window_start_hour, 22);

    // A service rebuilt from the stored config honours the moved window.
    let mut app2 = AppService::new(store.load().unwrap());
    let mut sink2 = RecordingSink(Vec::new());
    sync_time(&mut app2, &mut sink2, "datetime: 2024-05-01T22:30:00-07:00\n");
    assert!(app2.gate_open());
}

#[test]
fn updated_threshold_applies_immediately() {
    let (mut app, mut hw, mut sink) = make_app();
    sync_time(&mut app, &mut sink, "datetime: 2024-05-01T23:45:00-07:00\n");

    // 50 is bright under the default threshold of 10.
    hw.light = 50;
    app.tick(&mut hw, &mut sink);
    assert_eq!(hw.position, ServoPosition::Rest);

    let new_config = SystemConfig {
        light_dark_threshold: 100,
        ..Default::default()
    };
    app.handle_command(AppCommand::UpdateConfig(new_config), &mut hw, &mut sink);

    // The same reading is now dark.
    app.tick(&mut hw, &mut sink);
    assert_eq!(hw.position, ServoPosition::Engaged);
}
