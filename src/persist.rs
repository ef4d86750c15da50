//! Typed access to the persisted device record.
//!
//! Everything the feeder remembers across restarts lives in one NVS
//! namespace:
//!
//! | key           | written by            | read at                      |
//! |---------------|-----------------------|------------------------------|
//! | `ssid`        | provisioning listener | boot (initial state), CONNECTING |
//! | `pass`        | provisioning listener | CONNECTING                   |
//! | `owner_id`    | provisioning listener | REGISTERING                  |
//! | `identity_id` | registration          | AUTHENTICATING               |
//!
//! Values are stored as raw UTF-8 bytes.

use heapless::String;
use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};
use crate::identity::Identity;

pub const NAMESPACE: &str = "pawfeeds";

pub mod keys {
    pub const SSID: &str = "ssid";
    pub const PASS: &str = "pass";
    pub const OWNER_ID: &str = "owner_id";
    pub const IDENTITY_ID: &str = "identity_id";
}

/// Backend identifiers (owner uid, feeder id).
pub type IdString = String<64>;

/// Station credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String<32>,
    pub password: String<64>,
}

/// Everything captured by the provisioning listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRecord {
    pub wifi: WifiCredentials,
    pub owner_id: IdString,
}

/// Read buffer; one byte longer than the longest value so truncation shows.
const READ_BUF: usize = 65;

fn read_string<const N: usize>(
    storage: &impl StoragePort,
    key: &str,
) -> Result<Option<String<N>>, StorageError> {
    let mut buf = [0u8; READ_BUF];
    let len = match storage.read(NAMESPACE, key, &mut buf) {
        Ok(len) => len,
        Err(StorageError::NotFound) => return Ok(None),
        Err(e) => return Err(e),
    };
    let text = core::str::from_utf8(&buf[..len]).map_err(|_| StorageError::Corrupted)?;
    let mut out = String::new();
    out.push_str(text).map_err(|()| StorageError::Corrupted)?;
    Ok(Some(out))
}

fn write_string(
    storage: &mut impl StoragePort,
    key: &str,
    value: &str,
) -> Result<(), StorageError> {
    storage.write(NAMESPACE, key, value.as_bytes())
}

/// Whether an SSID has been stored.  Decides the boot state.
pub fn has_wifi_credentials(storage: &impl StoragePort) -> bool {
    storage.exists(NAMESPACE, keys::SSID)
}

/// Saved station credentials.  A missing password reads as an open network.
pub fn load_wifi_credentials(
    storage: &impl StoragePort,
) -> Result<Option<WifiCredentials>, StorageError> {
    let Some(ssid) = read_string::<32>(storage, keys::SSID)? else {
        return Ok(None);
    };
    let password = read_string::<64>(storage, keys::PASS)?.unwrap_or_default();
    Ok(Some(WifiCredentials { ssid, password }))
}

/// Saved owner uid; `None` if absent or empty.
pub fn load_owner_id(storage: &impl StoragePort) -> Result<Option<IdString>, StorageError> {
    Ok(read_string::<64>(storage, keys::OWNER_ID)?.filter(|s| !s.is_empty()))
}

/// Registered identity; `None` if absent or empty.
pub fn load_identity(storage: &impl StoragePort) -> Result<Option<Identity>, StorageError> {
    Ok(read_string::<64>(storage, keys::IDENTITY_ID)?
        .filter(|s| !s.is_empty())
        .map(Identity::new))
}

pub fn save_identity(
    storage: &mut impl StoragePort,
    identity: &Identity,
) -> Result<(), StorageError> {
    write_string(storage, keys::IDENTITY_ID, identity.as_str())?;
    info!("Persist: identity {} stored", identity.as_str());
    Ok(())
}

/// Store credentials and owner.  The password is written before the SSID
/// so a power cut mid-save never leaves an SSID with a stale password.
pub fn save_provisioning(
    storage: &mut impl StoragePort,
    record: &ProvisioningRecord,
) -> Result<(), StorageError> {
    write_string(storage, keys::PASS, &record.wifi.password)?;
    write_string(storage, keys::OWNER_ID, &record.owner_id)?;
    write_string(storage, keys::SSID, &record.wifi.ssid)?;
    info!("Persist: credentials for '{}' stored", record.wifi.ssid);
    Ok(())
}

/// Forget everything.  The only way to drop a registered identity.
pub fn factory_reset(storage: &mut impl StoragePort) -> Result<(), StorageError> {
    warn!("Persist: factory reset");
    for key in [keys::SSID, keys::PASS, keys::OWNER_ID, keys::IDENTITY_ID] {
        storage.delete(NAMESPACE, key)?;
    }
    Ok(())
}
