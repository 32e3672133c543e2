//! BLE Signer MCU Library
//!
//! Hardware independent core of a BLE signing oracle: a client writes a
//! message, the device signs its SHA-256 digest with a private key and notifies
//! the base64 signature back. Idle clients are disconnected.
//!
//! This crate provides:
//! - the `Peripheral` trait and events a BLE stack plugs into
//! - key parsing, the random source and the signing engine
//! - the idle-disconnect lifecycle monitor
//! - `Device`, which owns all of the above and runs the event loop
//!
//! # Example MCU implementations
//! - ESP32: See `ble-signer-esp32`

pub mod ble;
pub mod device;
pub mod keys;
pub mod monitor;
pub mod rng;
pub mod signer;

#[cfg(test)]
mod testing;

pub use ble::*;
pub use device::{Device, DeviceError, SignerConfig};
pub use keys::{KeyError, SigningKey, VerifyingKey};
pub use monitor::{LifecycleMonitor, LinkState};
pub use rng::RandomSource;
pub use signer::{SignError, SignResult, Signer, SigningEngine};
