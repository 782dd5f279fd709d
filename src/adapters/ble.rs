//! BLE remote-command adapter.
//!
//! Implements [`RemoteCommandPort`] — the hexagonal boundary for the
//! Bluetooth Low Energy command channel.  A phone app writes a short
//! ASCII command to the command characteristic; only the validated
//! `"on"` payload becomes an engage request.  Anything else is logged
//! and dropped without touching the servo.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid BLE GATT server via raw
//!   `esp_idf_svc::sys` calls.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                                   | Perms        |
//! |----------------|----------------------------------------|--------------|
//! | Command        | `beb5483e-36e1-4688-b7f5-ea07361b26a8` | Read + Write |

use core::fmt;
use log::{info, warn};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x4fafc201_1fb5_459e_8fcc_c5c9c331914b;
pub const CHAR_COMMAND: u128 = 0xbeb5483e_36e1_4688_b7f5_ea07361b26a8;

const MAX_COMMAND_BYTES: usize = 16;

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    DataTooLong,
    InvalidUtf8,
    UnknownCommand,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataTooLong => write!(f, "BLE write exceeds max command length"),
            Self::InvalidUtf8 => write!(f, "BLE write contains invalid UTF-8"),
            Self::UnknownCommand => write!(f, "unrecognised command payload"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

/// A validated remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Drive the servo to the engaged position.
    Engage,
}

pub trait RemoteCommandPort {
    fn start(&mut self);
    fn stop(&mut self);
    fn is_active(&self) -> bool;
    /// Consume the pending command, if a valid one arrived.
    fn take_command(&mut self) -> Option<RemoteCommand>;
}

// ───────────────────────────────────────────────────────────────
// BLE state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Connected,
    Failed,
}

// ───────────────────────────────────────────────────────────────
// Payload validation
// ───────────────────────────────────────────────────────────────

/// Parse a raw characteristic write into a command.
///
/// Trailing NULs and ASCII whitespace are stripped (some BLE apps append
/// them); the remaining bytes must match a known command exactly.
fn parse_command(raw: &[u8]) -> Result<RemoteCommand, CommandError> {
    if raw.len() > MAX_COMMAND_BYTES {
        return Err(CommandError::DataTooLong);
    }
    let s = core::str::from_utf8(raw).map_err(|_| CommandError::InvalidUtf8)?;
    let s = s.trim_end_matches(['\0', '\r', '\n', ' ']);
    match s {
        "on" => Ok(RemoteCommand::Engage),
        _ => Err(CommandError::UnknownCommand),
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF BLE static state
// ───────────────────────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures.  These statics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONN_ID: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CMD_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);

// Attribute value buffer for the command characteristic.  With auto
// response the stack answers GATT reads from here and mirrors accepted
// writes into it; the firmware itself never reads it back.
#[cfg(target_os = "espidf")]
static mut CHAR_COMMAND_VALUE: [u8; MAX_COMMAND_BYTES] = *b"off\0\0\0\0\0\0\0\0\0\0\0\0\0";

// Data buffer bridging the GATTS write callback → BleAdapter.
// GATTS callbacks run in the Bluedroid task (not ISR), so std Mutex is safe.
#[cfg(target_os = "espidf")]
static BLE_CMD_BUF: std::sync::Mutex<heapless::Vec<u8, MAX_COMMAND_BYTES>> =
    std::sync::Mutex::new(heapless::Vec::new());

/// Consume command bytes written by a BLE client via GATT.
#[cfg(target_os = "espidf")]
pub fn take_command_data() -> Option<heapless::Vec<u8, MAX_COMMAND_BYTES>> {
    BLE_CMD_BUF.lock().ok().and_then(|mut buf| {
        if buf.is_empty() {
            return None;
        }
        let data = buf.clone();
        buf.clear();
        Some(data)
    })
}

#[cfg(not(target_os = "espidf"))]
pub fn take_command_data() -> Option<heapless::Vec<u8, MAX_COMMAND_BYTES>> {
    None
}

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    unsafe {
        t.uuid.uuid128 = uuid.to_le_bytes();
    }
    t
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising stopped");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    BLE_GATTS_IF.store(gatts_if as u32, AtomicOrdering::Relaxed);

    // SAFETY: `param` is valid for the duration of the callback per the
    // Bluedroid contract; raw-sys calls below only use handles the stack
    // itself delivered in earlier events.
    unsafe {
        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                log::info!("BLE GATTS: app registered (if={})", gatts_if);
                let svc_uuid = uuid128_to_esp(SERVICE_UUID);
                let mut svc_id = esp_gatt_srvc_id_t {
                    id: esp_gatt_id_t {
                        uuid: svc_uuid,
                        inst_id: 0,
                    },
                    is_primary: true,
                };
                esp_ble_gatts_create_service(gatts_if, &mut svc_id, 4);
            }
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                let p = &(*param).create;
                let svc_handle = p.service_handle;
                BLE_SVC_HANDLE.store(svc_handle as u32, AtomicOrdering::Relaxed);
                log::info!("BLE GATTS: service created (handle={})", svc_handle);
                esp_ble_gatts_start_service(svc_handle);

                let mut char_uuid = uuid128_to_esp(CHAR_COMMAND);
                let mut char_val = esp_attr_value_t {
                    attr_max_len: MAX_COMMAND_BYTES as u16,
                    attr_len: 3,
                    attr_value: (&raw mut CHAR_COMMAND_VALUE).cast::<u8>(),
                };
                let mut char_control = esp_attr_control_t {
                    auto_rsp: ESP_GATT_AUTO_RSP as u8,
                };
                esp_ble_gatts_add_char(
                    svc_handle,
                    &mut char_uuid,
                    (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                    (ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_WRITE)
                        as esp_gatt_char_prop_t,
                    &mut char_val,
                    &mut char_control,
                );
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                let p = &(*param).add_char;
                BLE_CMD_CHAR_HANDLE.store(p.attr_handle as u32, AtomicOrdering::Relaxed);
                log::info!("BLE GATTS: command char (handle={})", p.attr_handle);
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                let p = &(*param).connect;
                BLE_CONN_ID.store(p.conn_id as u32, AtomicOrdering::Relaxed);
                log::info!("BLE GATTS: client connected (conn_id={})", p.conn_id);
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                BLE_CONN_ID.store(0, AtomicOrdering::Relaxed);
                log::info!("BLE GATTS: client disconnected");
                // Restart advertising after disconnect.
                let mut adv_params = esp_ble_adv_params_t {
                    adv_int_min: 0x20,
                    adv_int_max: 0x40,
                    adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
                    own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                    channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
                    adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
                    ..core::mem::zeroed()
                };
                esp_ble_gap_start_advertising(&mut adv_params);
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = &(*param).write;
                if p.handle as u32 == BLE_CMD_CHAR_HANDLE.load(AtomicOrdering::Relaxed) {
                    let data = core::slice::from_raw_parts(p.value, p.len as usize);
                    if let Ok(mut buf) = BLE_CMD_BUF.lock() {
                        buf.clear();
                        let _ = buf.extend_from_slice(data);
                    }
                    crate::events::push_event(crate::events::Event::RemoteCommand);
                }
            }
            _ => {}
        }
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleAdapter {
    state: BleState,
    pending: Option<RemoteCommand>,
    device_name: heapless::String<24>,
}

impl BleAdapter {
    pub fn new(device_name: heapless::String<24>) -> Self {
        Self {
            state: BleState::Idle,
            pending: None,
            device_name,
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    /// Feed a raw characteristic write through validation.
    ///
    /// Called from the main loop after a `RemoteCommand` event (espidf)
    /// or directly from tests (host).
    pub fn on_command_write(&mut self, raw: &[u8]) -> Result<(), CommandError> {
        match parse_command(raw) {
            Ok(cmd) => {
                info!("BLE: command accepted: {:?}", cmd);
                self.pending = Some(cmd);
                Ok(())
            }
            Err(e) => {
                warn!("BLE: command rejected ({} bytes): {}", raw.len(), e);
                Err(e)
            }
        }
    }

    pub fn on_central_connected(&mut self) {
        info!("BLE: central connected");
        self.state = BleState::Connected;
    }

    pub fn on_central_disconnected(&mut self) {
        info!("BLE: central disconnected");
        if self.state != BleState::Idle {
            self.state = BleState::Advertising;
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) {
        use esp_idf_svc::sys::*;
        use log::error;
        unsafe {
            // Release classic BT memory (BLE-only mode saves ~30 KB).
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            let ret = esp_bt_controller_init(&mut bt_cfg);
            if ret != ESP_OK as i32 {
                error!("BLE: bt_controller_init failed ({})", ret);
                self.state = BleState::Failed;
                return;
            }

            let ret = esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE);
            if ret != ESP_OK as i32 {
                error!("BLE: bt_controller_enable failed ({})", ret);
                self.state = BleState::Failed;
                return;
            }

            let ret = esp_bluedroid_init();
            if ret != ESP_OK as i32 {
                error!("BLE: bluedroid_init failed ({})", ret);
                self.state = BleState::Failed;
                return;
            }

            let ret = esp_bluedroid_enable();
            if ret != ESP_OK as i32 {
                error!("BLE: bluedroid_enable failed ({})", ret);
                self.state = BleState::Failed;
                return;
            }

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            esp_ble_gatts_app_register(0);

            let name = self.device_name.as_bytes();
            esp_ble_gap_set_device_name(name.as_ptr() as *const _);

            let mut adv_params = esp_ble_adv_params_t {
                adv_int_min: 0x20,
                adv_int_max: 0x40,
                adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
                own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
                adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
                ..core::mem::zeroed()
            };
            esp_ble_gap_start_advertising(&mut adv_params);

            info!(
                "BLE(espidf): Bluedroid stack initialized, advertising as '{}'",
                self.device_name
            );
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_ble_gap_stop_advertising();
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
        info!("BLE(espidf): stack shut down");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        info!("BLE(sim): stopped");
    }
}

// ───────────────────────────────────────────────────────────────
// RemoteCommandPort implementation
// ───────────────────────────────────────────────────────────────

impl RemoteCommandPort for BleAdapter {
    fn start(&mut self) {
        info!("BLE: starting advertising as '{}'", self.device_name);
        self.platform_start();
        if self.state != BleState::Failed {
            self.state = BleState::Advertising;
        }
    }

    fn stop(&mut self) {
        self.platform_stop();
        self.state = BleState::Idle;
        self.pending = None;
        info!("BLE: stopped");
    }

    fn is_active(&self) -> bool {
        matches!(self.state, BleState::Advertising | BleState::Connected)
    }

    fn take_command(&mut self) -> Option<RemoteCommand> {
        self.pending.take()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_adapter() -> BleAdapter {
        let mut name = heapless::String::<24>::new();
        name.push_str("nightlatch-test").ok();
        BleAdapter::new(name)
    }

    #[test]
    fn start_stop_lifecycle() {
        let mut adapter = make_adapter();
        assert_eq!(adapter.state(), BleState::Idle);
        assert!(!adapter.is_active());
        adapter.start();
        assert_eq!(adapter.state(), BleState::Advertising);
        assert!(adapter.is_active());
        adapter.stop();
        assert_eq!(adapter.state(), BleState::Idle);
    }

    #[test]
    fn connection_state_callbacks() {
        let mut adapter = make_adapter();
        adapter.start();
        adapter.on_central_connected();
        assert_eq!(adapter.state(), BleState::Connected);
        adapter.on_central_disconnected();
        assert_eq!(adapter.state(), BleState::Advertising);
    }

    #[test]
    fn on_payload_accepted() {
        let mut adapter = make_adapter();
        assert!(adapter.on_command_write(b"on").is_ok());
        assert_eq!(adapter.take_command(), Some(RemoteCommand::Engage));
        // Consumed.
        assert_eq!(adapter.take_command(), None);
    }

    #[test]
    fn trailing_nul_and_newline_tolerated() {
        assert_eq!(parse_command(b"on\0"), Ok(RemoteCommand::Engage));
        assert_eq!(parse_command(b"on\r\n"), Ok(RemoteCommand::Engage));
    }

    #[test]
    fn unknown_payload_rejected() {
        let mut adapter = make_adapter();
        assert_eq!(
            adapter.on_command_write(b"off"),
            Err(CommandError::UnknownCommand)
        );
        assert_eq!(adapter.on_command_write(b"ON"), Err(CommandError::UnknownCommand));
        assert_eq!(adapter.on_command_write(b""), Err(CommandError::UnknownCommand));
        assert_eq!(adapter.take_command(), None);
    }

    #[test]
    fn oversize_payload_rejected() {
        assert_eq!(parse_command(&[b'x'; 17]), Err(CommandError::DataTooLong));
    }

    #[test]
    fn non_utf8_payload_rejected() {
        assert_eq!(parse_command(&[0xFF, 0x01]), Err(CommandError::InvalidUtf8));
    }

    #[test]
    fn stop_clears_pending_command() {
        let mut adapter = make_adapter();
        adapter.start();
        adapter.on_command_write(b"on").unwrap();
        adapter.stop();
        assert_eq!(adapter.take_command(), None);
    }
}
