//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for the feeder.
//!
//! - Credentials, owner id and identity live as raw byte values in the
//!   `pawfeeds` namespace (see [`crate::persist`]).
//! - The [`FeederConfig`] is one postcard blob under `feedercfg`, validated
//!   before every save.
//! - ESP-IDF NVS commits are atomic per key; the simulation backend is a
//!   plain in-memory map for host tests.

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::FeederConfig;
use crate::persist::NAMESPACE;

#[cfg(not(all(target_os = "espidf", feature = "espidf")))]
use std::collections::HashMap;

#[cfg(all(target_os = "espidf", feature = "espidf"))]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

const CONFIG_KEY: &str = "feedercfg";

/// Upper bound on the serialised config.
const MAX_CONFIG_BLOB: usize = 256;

pub struct NvsAdapter {
    #[cfg(all(target_os = "espidf", feature = "espidf"))]
    partition: EspDefaultNvsPartition,
    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Wrap the default NVS partition.  The partition handle is shared with
    /// the Wi-Fi driver, which keeps its calibration data there.
    #[cfg(all(target_os = "espidf", feature = "espidf"))]
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, ConfigError> {
        info!("NvsAdapter: ESP-IDF NVS ready");
        Ok(Self { partition })
    }

    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    pub fn new() -> Result<Self, ConfigError> {
        info!("NvsAdapter: simulation backend");
        Ok(Self {
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(all(target_os = "espidf", feature = "espidf"))]
    fn open(&self, namespace: &str, write: bool) -> Result<EspNvs<NvsDefault>, StorageError> {
        EspNvs::new(self.partition.clone(), namespace, write).map_err(|e| {
            warn!("NvsAdapter: cannot open '{}': {}", namespace, e);
            StorageError::IoError
        })
    }

    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }
}

/// Range checks applied before a config is persisted.
pub fn validate_config(cfg: &FeederConfig) -> Result<(), ConfigError> {
    if !(1..=10_000).contains(&cfg.dispense_ms_per_gram) {
        return Err(ConfigError::ValidationFailed(
            "dispense_ms_per_gram must be 1–10000",
        ));
    }
    if !(1..=crate::actuation::MAX_BOWLS as u8).contains(&cfg.bowl_count) {
        return Err(ConfigError::ValidationFailed("bowl_count must be 1–4"));
    }
    if cfg.wifi_connect_attempts == 0 {
        return Err(ConfigError::ValidationFailed(
            "wifi_connect_attempts must be at least 1",
        ));
    }
    if !(50..=10_000).contains(&cfg.wifi_retry_delay_ms) {
        return Err(ConfigError::ValidationFailed(
            "wifi_retry_delay_ms must be 50–10000",
        ));
    }
    if !(1..=3600).contains(&cfg.schedule_check_interval_secs) {
        return Err(ConfigError::ValidationFailed(
            "schedule_check_interval_secs must be 1–3600",
        ));
    }
    if cfg.schedule_fetch_interval_secs < 60 {
        return Err(ConfigError::ValidationFailed(
            "schedule_fetch_interval_secs must be at least 60",
        ));
    }
    if cfg.schedule_fetch_retry_secs == 0
        || cfg.schedule_fetch_retry_secs > cfg.schedule_fetch_interval_secs
    {
        return Err(ConfigError::ValidationFailed(
            "schedule_fetch_retry_secs must be 1..=schedule_fetch_interval_secs",
        ));
    }
    if !(1..=300).contains(&cfg.schedule_page_size) {
        return Err(ConfigError::ValidationFailed(
            "schedule_page_size must be 1–300",
        ));
    }
    if !(-12 * 3600..=14 * 3600).contains(&cfg.utc_offset_secs) {
        return Err(ConfigError::ValidationFailed(
            "utc_offset_secs must be within -12h..=+14h",
        ));
    }
    if !(10..=5000).contains(&cfg.tick_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "tick_interval_ms must be 10–5000",
        ));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<FeederConfig, ConfigError> {
        let mut buf = [0u8; MAX_CONFIG_BLOB];
        match self.read(NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => {
                let cfg: FeederConfig =
                    postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config ({} bytes)", len);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(FeederConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: config read failed ({}), using defaults", e);
                Ok(FeederConfig::default())
            }
        }
    }

    fn save(&self, config: &FeederConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
        {
            self.store
                .borrow_mut()
                .insert(Self::composite_key(NAMESPACE, CONFIG_KEY), bytes);
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(all(target_os = "espidf", feature = "espidf"))]
        {
            let mut nvs = self.open(NAMESPACE, true).map_err(|_| ConfigError::IoError)?;
            nvs.set_raw(CONFIG_KEY, &bytes).map_err(|e| {
                warn!("NvsAdapter: config write failed: {}", e);
                ConfigError::IoError
            })?;
            info!("NvsAdapter: config saved ({} bytes)", bytes.len());
            Ok(())
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
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

        #[cfg(all(target_os = "espidf", feature = "espidf"))]
        {
            let nvs = self.open(namespace, false)?;
            match nvs.get_raw(key, buf) {
                Ok(Some(data)) => Ok(data.len()),
                Ok(None) => Err(StorageError::NotFound),
                Err(e) => {
                    warn!("NvsAdapter: read {}::{} failed: {}", namespace, key, e);
                    Err(StorageError::IoError)
                }
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(all(target_os = "espidf", feature = "espidf"))]
        {
            let mut nvs = self.open(namespace, true)?;
            nvs.set_raw(key, data).map(|_| ()).map_err(|e| {
                warn!("NvsAdapter: write {}::{} failed: {}", namespace, key, e);
                StorageError::IoError
            })
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(all(target_os = "espidf", feature = "espidf"))]
        {
            let mut nvs = self.open(namespace, true)?;
            nvs.remove(key).map(|_| ()).map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow().contains_key(&composite)
        }

        #[cfg(all(target_os = "espidf", feature = "espidf"))]
        {
            self.open(namespace, false)
                .ok()
                .and_then(|nvs| nvs.contains(key).ok())
                .unwrap_or(false)
        }
    }
}
