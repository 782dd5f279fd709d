//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`], and loads the
//! Wi-Fi credentials the provisioning tool writes under the `storage`
//! namespace (`ssid` / `pass` keys).
//!
//! - Config validation: all fields are range-checked before persistence.
//! - Namespace isolation: config and credentials live in separate
//!   namespaces.
//! - Atomic writes: ESP-IDF NVS commits are atomic per nvs_commit().

use core::fmt;

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::SystemConfig;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "nightlatch";
const CONFIG_KEY: &str = "latchcfg";

/// Namespace and keys used by the provisioning tool for Wi-Fi credentials.
const CRED_NAMESPACE: &str = "storage";
const CRED_KEY_SSID: &str = "ssid";
const CRED_KEY_PASS: &str = "pass";

#[allow(dead_code)]
const MAX_BLOB_SIZE: usize = 4000;

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

/// Why stored Wi-Fi credentials could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    /// No `ssid` key in the credential namespace (device not provisioned).
    NotFound,
    /// Stored bytes are not valid UTF-8.
    InvalidUtf8,
    /// SSID empty or longer than 32 bytes.
    SsidOutOfBounds,
    /// Password longer than 64 bytes (empty is allowed for open networks).
    PasswordOutOfBounds,
    /// Storage backend error.
    IoError,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no stored credentials"),
            Self::InvalidUtf8 => write!(f, "stored credentials are not UTF-8"),
            Self::SsidOutOfBounds => write!(f, "SSID must be 1-32 bytes"),
            Self::PasswordOutOfBounds => write!(f, "password must be at most 64 bytes"),
            Self::IoError => write!(f, "credential storage I/O error"),
        }
    }
}

/// Bounds-checked owned Wi-Fi credentials.
///
/// The buffers match the 802.11 limits, so a corrupted or hostile blob
/// can never overflow into neighbouring state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

impl Credentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, CredentialError> {
        if ssid.is_empty() {
            return Err(CredentialError::SsidOutOfBounds);
        }
        let mut s = heapless::String::<32>::new();
        s.push_str(ssid)
            .map_err(|_| CredentialError::SsidOutOfBounds)?;
        let mut p = heapless::String::<64>::new();
        p.push_str(password)
            .map_err(|_| CredentialError::PasswordOutOfBounds)?;
        Ok(Self { ssid: s, password: p })
    }
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// Returns `Err(ConfigError::IoError)` if flash initialisation fails
    /// unrecoverably. On first boot or after a version mismatch the NVS
    /// partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret2 = unsafe { nvs_flash_erase() };
                if ret2 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                let ret3 = unsafe { nvs_flash_init() };
                if ret3 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    // ── Wi-Fi credentials ─────────────────────────────────────

    /// Load the provisioned Wi-Fi credentials from NVS.
    ///
    /// Missing `pass` with a present `ssid` is treated as an open network.
    pub fn load_credentials(&self) -> Result<Credentials, CredentialError> {
        let mut ssid_buf = [0u8; 33];
        let ssid_len = match self.read(CRED_NAMESPACE, CRED_KEY_SSID, &mut ssid_buf) {
            Ok(len) => len,
            Err(StorageError::NotFound) => return Err(CredentialError::NotFound),
            Err(_) => return Err(CredentialError::IoError),
        };
        let ssid = str_from_nvs(&ssid_buf[..ssid_len]).ok_or(CredentialError::InvalidUtf8)?;

        let mut pass_buf = [0u8; 65];
        let password = match self.read(CRED_NAMESPACE, CRED_KEY_PASS, &mut pass_buf) {
            Ok(len) => str_from_nvs(&pass_buf[..len]).ok_or(CredentialError::InvalidUtf8)?,
            Err(StorageError::NotFound) => "",
            Err(_) => return Err(CredentialError::IoError),
        };

        let creds = Credentials::new(ssid, password)?;
        info!("NvsAdapter: credentials loaded (SSID='{}')", creds.ssid);
        Ok(creds)
    }

    /// Persist Wi-Fi credentials (provisioning path).
    pub fn store_credentials(&mut self, creds: &Credentials) -> Result<(), CredentialError> {
        self.write(CRED_NAMESPACE, CRED_KEY_SSID, creds.ssid.as_bytes())
            .map_err(|_| CredentialError::IoError)?;
        self.write(CRED_NAMESPACE, CRED_KEY_PASS, creds.password.as_bytes())
            .map_err(|_| CredentialError::IoError)?;
        info!("NvsAdapter: credentials stored (SSID='{}')", creds.ssid);
        Ok(())
    }

    /// Delete stored credentials (factory reset).
    pub fn erase_credentials(&mut self) -> Result<(), StorageError> {
        self.delete(CRED_NAMESPACE, CRED_KEY_SSID)?;
        self.delete(CRED_NAMESPACE, CRED_KEY_PASS)
    }
}

/// NVS string values may carry a trailing NUL; strip it before UTF-8 check.
fn str_from_nvs(raw: &[u8]) -> Option<&str> {
    let trimmed = match raw.last() {
        Some(0) => &raw[..raw.len() - 1],
        _ => raw,
    };
    core::str::from_utf8(trimmed).ok()
}

fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if cfg.window_start_hour > 23 {
        return Err(ConfigError::ValidationFailed("window_start_hour must be 0-23"));
    }
    if cfg.window_start_minute > 59 {
        return Err(ConfigError::ValidationFailed("window_start_minute must be 0-59"));
    }
    if !(10..=5000).contains(&cfg.control_loop_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "control_loop_interval_ms must be 10-5000",
        ));
    }
    if !(5..=3600).contains(&cfg.time_fetch_interval_secs) {
        return Err(ConfigError::ValidationFailed(
            "time_fetch_interval_secs must be 5-3600",
        ));
    }
    if !(50..=10_000).contains(&cfg.button_hold_ms) {
        return Err(ConfigError::ValidationFailed("button_hold_ms must be 50-10000"));
    }
    if !(64..=16_384).contains(&cfg.max_response_bytes) {
        return Err(ConfigError::ValidationFailed(
            "max_response_bytes must be 64-16384",
        ));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            if let Some(bytes) = self.store.borrow().get(&key) {
                let cfg: SystemConfig =
                    postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config from store");
                Ok(cfg)
            } else {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, false, |handle| {
                let key_cstr = b"latchcfg\0";
                let mut size: usize = 0;

                // First call: get size
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    return Err(ESP_ERR_NVS_NOT_FOUND);
                }
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }

                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let cfg: SystemConfig =
                        postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                    info!("NvsAdapter: loaded config from NVS ({} bytes)", bytes.len());
                    Ok(cfg)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => {
                    info!("NvsAdapter: no stored config, using defaults");
                    Ok(SystemConfig::default())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS read error {}, using defaults", e);
                    Ok(SystemConfig::default())
                }
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
            self.store.borrow_mut().insert(key, bytes);
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, true, |handle| {
                let key_cstr = b"latchcfg\0";
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.borrow().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    // The provisioning tool writes credentials with
                    // nvs_set_str; fall back to a string read.
                    let mut size = buf.len();
                    let ret = unsafe {
                        nvs_get_str(
                            handle,
                            key_buf.as_ptr() as *const _,
                            buf.as_mut_ptr() as *mut _,
                            &mut size,
                        )
                    };
                    if ret == ESP_ERR_NVS_NOT_FOUND {
                        return Err(ESP_ERR_NVS_NOT_FOUND);
                    }
                    if ret != ESP_OK {
                        return Err(ret);
                    }
                    return Ok(size);
                }
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow().contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let ret = unsafe {
                    nvs_find_key(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}
