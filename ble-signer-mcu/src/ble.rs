//! BLE peripheral types and traits for the signing oracle
//!
//! Protocol constants (UUIDs, device name) are in ble_signer_proto::ble.
//! This module provides the events a BLE stack feeds into the device and the
//! commands the device sends back.

// Re-export protocol constants for convenience
pub use ble_signer_proto::ble::{
    DEVICE_NAME, MAX_ATTRIBUTE_LEN, MESSAGE_CHARACTERISTIC_UUID, SERVICE_UUID,
    SIGNATURE_CHARACTERISTIC_UUID,
};

/// Connection handle assigned by the BLE stack
pub type ConnHandle = u16;

/// Event delivered by the BLE stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    /// A central connected
    Connected(ConnHandle),
    /// A central went away, either on its own or because we dropped it
    Disconnected(ConnHandle),
    /// A central wrote to the message characteristic
    Written { handle: ConnHandle, payload: Vec<u8> },
}

/// Trait for BLE GATT server implementations
///
/// MCU-specific crates implement this trait using their BLE stack.
pub trait Peripheral {
    /// Error type for BLE operations
    type Error: std::fmt::Debug;

    /// Replace the signature characteristic value and notify subscribers
    fn notify(&mut self, value: &[u8]) -> Result<(), Self::Error>;

    /// Terminate a connection
    ///
    /// Must succeed for a handle that is already gone, the connection list the
    /// device works from can be stale by the time this is called.
    fn disconnect(&mut self, handle: ConnHandle) -> Result<(), Self::Error>;

    /// Make the device discoverable and connectable again
    fn start_advertising(&mut self) -> Result<(), Self::Error>;
}
