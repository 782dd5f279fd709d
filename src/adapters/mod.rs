//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements          | Connects to              |
//! |-------------|---------------------|--------------------------|
//! | `ble`       | RemoteCommandPort   | Bluedroid GATT server    |
//! | `hardware`  | SensorPort          | ESP32 ADC, GPIO          |
//! |             | ActuatorPort        | ESP32 LEDC PWM           |
//! | `http_time` | TimeFetchPort       | plaintext time service   |
//! | `log_sink`  | EventSink           | Serial log output        |
//! | `nvs`       | ConfigPort          | NVS / in-memory store    |
//! |             | StoragePort         |                          |
//! | `time`      | (uptime queries)    | ESP32 system timer       |
//! | `wifi`      | ConnectivityPort    | ESP-IDF WiFi STA         |

pub mod ble;
pub mod hardware;
pub mod http_time;
pub mod log_sink;
pub mod nvs;
pub mod time;
pub mod wifi;
