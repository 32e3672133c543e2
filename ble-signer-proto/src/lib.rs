//! BLE signer protocol constants
//!
//! Everything a device and a client must agree on: GATT identifiers, the
//! advertised name and the timing policy. All values are compiled in, there is
//! no runtime reconfiguration.

pub mod ble;

pub use ble::*;

/// Idle time after which the device drops every connected client
pub const IDLE_TIMEOUT_MS: u64 = 30_000;

/// How often the device checks for idle clients
pub const TICK_PERIOD_MS: u64 = 1_000;

/// Personalization string mixed into the signing RNG seed
pub const RNG_PERSONALIZATION: &[u8] = b"ble_signature";

#[cfg(test)]
mod tests {
    #[test]
    fn tick_is_well_below_idle_timeout() {
        assert!(super::TICK_PERIOD_MS * 5 <= super::IDLE_TIMEOUT_MS);
    }

    #[test]
    fn characteristics_share_service_prefix() {
        let prefix = &super::SERVICE_UUID[..8];
        assert!(super::MESSAGE_CHARACTERISTIC_UUID.starts_with(prefix));
        assert!(super::SIGNATURE_CHARACTERISTIC_UUID.starts_with(prefix));
        assert_ne!(
            super::MESSAGE_CHARACTERISTIC_UUID,
            super::SIGNATURE_CHARACTERISTIC_UUID
        );
    }
}
