//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Orchestrator (domain)
//! ```
//!
//! Driven adapters (storage, Wi-Fi, cloud, clock, event sinks) implement
//! these traits.  The [`Orchestrator`](super::orchestrator::Orchestrator)
//! consumes them via generics, so the domain core never touches hardware or
//! sockets directly.
//!
//! ## Security notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **StoragePort** holds the Wi-Fi password; prefer the encrypted NVS
//!   partition on the device.
//! - All port errors are typed; callers must handle every variant explicitly.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::cloud::rtdb::StreamEvent;
use crate::config::FeederConfig;
use crate::scheduler::Schedule;

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists feeder configuration.
///
/// # Security
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges should be rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`FeederConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<FeederConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &FeederConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for credentials and identity.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic: no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; in-memory simulation
///   achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Connectivity port (driven adapter: domain ↔ Wi-Fi station)
// ───────────────────────────────────────────────────────────────

/// One access point seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessPoint {
    pub ssid: String,
    /// RSSI in dBm.
    pub signal_strength: i8,
}

/// Wi-Fi station control.
pub trait ConnectivityPort {
    /// Store credentials for the next connection attempt.
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError>;

    /// Start associating.  Returns immediately; poll [`is_connected`].
    ///
    /// [`is_connected`]: ConnectivityPort::is_connected
    fn begin_connect(&mut self) -> Result<(), ConnectivityError>;

    /// Whether the link is up with an IP address.
    fn is_connected(&self) -> bool;

    /// Drop the link.
    fn disconnect(&mut self) -> Result<(), ConnectivityError>;

    /// Background maintenance: reconnect with backoff after a drop.
    fn poll(&mut self);

    /// Signal strength of the current link, if connected.
    fn rssi(&self) -> Option<i8>;

    /// Discover nearby access points.
    fn scan(&mut self) -> Result<Vec<AccessPoint>, ConnectivityError>;
}

// ───────────────────────────────────────────────────────────────
// Cloud ports (driven adapters: domain ↔ backend)
// ───────────────────────────────────────────────────────────────

/// Backend authentication.  Token mechanics stay inside the adapter.
pub trait AuthPort {
    /// Start acquiring a session token.
    fn begin(&mut self) -> Result<(), CloudError>;

    /// Whether a usable token is available (refreshing it if needed).
    fn is_ready(&mut self) -> bool;
}

/// Document store calls.  Responses are returned as raw JSON text and
/// decoded by the domain (see [`crate::cloud::firestore`]).
pub trait DocumentStore {
    /// Create a document with a store-assigned id in `collection`.
    fn create_document(&mut self, collection: &str, body: &str) -> Result<String, CloudError>;

    /// Patch the fields named in `update_mask` on the document at `path`.
    fn patch_document(&mut self, path: &str, body: &str, update_mask: &str)
    -> Result<(), CloudError>;

    /// List one page of documents under `collection_path`.
    fn list_documents(
        &mut self,
        collection_path: &str,
        page_size: u16,
        page_token: Option<&str>,
    ) -> Result<String, CloudError>;
}

/// Realtime command channel.
pub trait RealtimePort {
    /// Open (or reopen) a long-lived read stream on `path`.
    fn begin_stream(&mut self, path: &str) -> Result<(), CloudError>;

    /// Drain the events received since the previous call.
    /// An `Err` means the stream itself failed and must be reopened.
    fn read_stream(&mut self) -> Result<Vec<StreamEvent>, CloudError>;

    /// Remove the node at `path`.
    fn delete_node(&mut self, path: &str) -> Result<(), CloudError>;

    /// Write `null` to the node at `path`.
    fn set_null(&mut self, path: &str) -> Result<(), CloudError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic uptime plus local wall-clock time.
pub trait ClockPort {
    /// Milliseconds since boot.
    fn uptime_ms(&self) -> u64;

    /// Local date and time, or `None` until the wall clock is synchronised.
    fn local_time(&self) -> Option<NaiveDateTime>;
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (decouples scheduler from actuation)
// ───────────────────────────────────────────────────────────────

/// Callback trait that the schedule engine invokes when a schedule fires.
///
/// The engine knows nothing about servos; the orchestrator implements this
/// by forwarding to the [`ActuationController`](crate::actuation::ActuationController).
pub trait SchedulerDelegate {
    fn on_schedule_fired(&mut self, schedule: &Schedule);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Stored bytes are not what the caller expects (e.g. not UTF-8).
    Corrupted,
}

/// Errors from [`ConnectivityPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    /// SSID is empty, too long, or not printable ASCII.
    InvalidSsid,
    /// Password is not 8–64 bytes (and not empty for open networks).
    InvalidPassword,
    /// No credentials have been set.
    NoCredentials,
    /// The radio driver rejected the request.
    DriverError,
}

/// Errors from the cloud ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudError {
    /// No usable token yet.
    NotReady,
    /// Backend answered with a non-success status.
    Http(u16),
    /// Connection could not be opened or broke mid-request.
    Transport,
    /// No answer in time.
    Timeout,
    /// Backend answered with something we could not decode.
    InvalidResponse,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "stored value corrupted"),
        }
    }
}

impl core::fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "invalid SSID"),
            Self::InvalidPassword => write!(f, "invalid password"),
            Self::NoCredentials => write!(f, "no credentials"),
            Self::DriverError => write!(f, "driver error"),
        }
    }
}

impl core::fmt::Display for CloudError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotReady => write!(f, "not authenticated"),
            Self::Http(status) => write!(f, "HTTP status {}", status),
            Self::Transport => write!(f, "transport failure"),
            Self::Timeout => write!(f, "timed out"),
            Self::InvalidResponse => write!(f, "invalid response"),
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for StorageError {}
impl std::error::Error for ConnectivityError {}
impl std::error::Error for CloudError {}
