//! BLE GATT Service Protocol Constants for the signing oracle
//!
//! A client writes a message to the message characteristic and receives the
//! base64 signature over it as a notification on the signature characteristic.
//! There is no envelope or correlation id: the raw write is the request and the
//! notified text is the response.

/// BLE Service UUID: abcd1234-0000-0000-0000-abcdef123456
pub const SERVICE_UUID: &str = "abcd1234-0000-0000-0000-abcdef123456";

/// Message Characteristic UUID (write)
pub const MESSAGE_CHARACTERISTIC_UUID: &str = "abcd1234-0001-0001-0001-abcdef123456";

/// Signature Characteristic UUID (notify)
pub const SIGNATURE_CHARACTERISTIC_UUID: &str = "abcd1234-0002-0002-0002-abcdef123456";

/// Name the peripheral advertises under
pub const DEVICE_NAME: &str = "ESP32-Signer";

/// Largest value a single GATT write can carry (ATT_MAX_ATTR_LEN)
pub const MAX_ATTRIBUTE_LEN: usize = 512;
