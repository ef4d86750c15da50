//! Application core: pure domain logic, zero I/O.
//!
//! This module holds the business rules for the feeder: bring-up
//! orchestration, command decoding, and the events the core reports.
//! All interaction with hardware and the network happens through **port
//! traits** defined in [`ports`], keeping this layer testable without real
//! peripherals.

pub mod commands;
pub mod events;
pub mod orchestrator;
pub mod ports;
