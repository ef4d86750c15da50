//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements                    | Connects to                  |
//! |---------------|-------------------------------|------------------------------|
//! | `firebase`    | AuthPort                      | Identity Toolkit / STS       |
//! |               | DocumentStore                 | Firestore REST               |
//! |               | RealtimePort                  | Realtime Database (SSE)      |
//! | `http_server` | (provisioning transport)      | ESP-IDF HTTP server          |
//! | `log_sink`    | EventSink                     | Serial log output            |
//! | `nvs`         | ConfigPort, StoragePort       | NVS / in-memory store        |
//! | `time`        | ClockPort                     | esp_timer + SNTP wall clock  |
//! | `wifi`        | ConnectivityPort              | ESP-IDF Wi-Fi STA (+ soft AP)|

#[cfg(all(target_os = "espidf", feature = "espidf"))]
pub mod firebase;
#[cfg(all(target_os = "espidf", feature = "espidf"))]
pub mod http_server;
pub mod log_sink;
pub mod nvs;
pub mod time;
pub(super) mod utils;
pub mod wifi;
