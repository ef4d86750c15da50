//! PawFeeds feeder firmware library.
//!
//! Exposes the pure-logic modules for integration testing and fuzzing.
//! All ESP-IDF-specific code is guarded by
//! `#[cfg(all(target_os = "espidf", feature = "espidf"))]` within each
//! module, so the crate builds and tests on the host.

#![deny(unused_must_use)]

// Host test binaries need a critical-section implementation for embassy-sync.
#[cfg(test)]
use critical_section as _;

pub mod actuation;
pub mod app;
pub mod cloud;
pub mod config;
pub mod error;
pub mod fsm;
pub mod identity;
pub mod persist;
pub mod pins;
pub mod provisioning;
pub mod scheduler;
pub mod stream;

pub mod adapters;
pub mod drivers;
