//! BLE Client for the signing oracle
//!
//! Provides functions to scan for signers, request a signature over a message
//! and check it against the signer's public key.

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use data_encoding::BASE64;
use futures::StreamExt;
use std::time::Duration;
use uuid::Uuid;

use ble_signer_mcu::VerifyingKey;
use ble_signer_proto::ble::{DEVICE_NAME, MESSAGE_CHARACTERISTIC_UUID, SIGNATURE_CHARACTERISTIC_UUID};

/// A discovered BLE device
#[derive(Debug, Clone)]
pub struct SignerDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub is_signer: bool,
}

/// Signature as notified by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedSignature {
    /// base64 text exactly as notified
    pub encoded: String,
    /// decoded signature bytes
    pub raw: Vec<u8>,
}

/// Match "ESP32-Signer" or "nimble [ESP32-Signer]" format
pub fn is_signer_name(name: &str) -> bool {
    name == DEVICE_NAME || name.contains(&format!("[{DEVICE_NAME}"))
}

/// Decode a signature characteristic value
pub fn decode_signature(value: &[u8]) -> Result<ReceivedSignature, Box<dyn std::error::Error>> {
    let text = std::str::from_utf8(value)?.trim_end_matches('\0').trim();
    if text.is_empty() {
        return Err("empty signature notification".into());
    }
    let raw = BASE64.decode(text.as_bytes())?;
    Ok(ReceivedSignature { encoded: text.to_string(), raw })
}

/// Check a signature over `message` with a PEM or DER public key
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, Box<dyn std::error::Error>> {
    let key = VerifyingKey::parse(public_key)?;
    Ok(key.verify(message, signature))
}

/// Whether a scanned peripheral is the one the user asked for
///
/// With no target, any signer matches. A target matches a substring of the
/// advertised name or the address.
pub fn matches_target(target: Option<&str>, name: &str, address: &str) -> bool {
    match target {
        Some(t) => name.contains(t) || address.contains(t),
        None => is_signer_name(name),
    }
}

async fn get_adapter() -> Result<Adapter, Box<dyn std::error::Error>> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or_else(|| "No Bluetooth adapter found".into())
}

/// Listen for advertisements for `duration`, returning every peripheral that
/// reported its properties
async fn discover(
    duration: Duration,
) -> Result<Vec<(Peripheral, PeripheralProperties)>, Box<dyn std::error::Error>> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let mut found = Vec::new();
    for peripheral in adapter.peripherals().await? {
        if let Some(props) = peripheral.properties().await? {
            found.push((peripheral, props));
        }
    }

    adapter.stop_scan().await?;
    Ok(found)
}

/// Scan for BLE devices
///
/// Returns a list of discovered devices. Signers have `is_signer = true`.
pub async fn scan(duration_secs: u64) -> Result<Vec<SignerDevice>, Box<dyn std::error::Error>> {
    let found = discover(Duration::from_secs(duration_secs)).await?;
    Ok(found
        .into_iter()
        .map(|(peripheral, props)| {
            let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
            SignerDevice {
                is_signer: is_signer_name(&name),
                address: peripheral.address().to_string(),
                rssi: props.rssi,
                name,
            }
        })
        .collect())
}

/// Find a signer by name/address pattern, or find any signer
pub async fn find_device(target: Option<&str>) -> Result<Peripheral, Box<dyn std::error::Error>> {
    discover(Duration::from_secs(5))
        .await?
        .into_iter()
        .find(|(peripheral, props)| {
            let name = props.local_name.as_deref().unwrap_or_default();
            matches_target(target, name, &peripheral.address().to_string())
        })
        .map(|(peripheral, _)| peripheral)
        .ok_or_else(|| "No signer found".into())
}

fn find_characteristic(device: &Peripheral, uuid: &str) -> Result<Characteristic, Box<dyn std::error::Error>> {
    let uuid = Uuid::parse_str(uuid)?;
    device
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or_else(|| format!("characteristic {uuid} not found").into())
}

/// Ask a signer to sign `message`
///
/// Subscribes to the signature characteristic, writes the message and waits up
/// to `timeout` for the notification. The device answers nothing on failure,
/// so a timeout is the only failure signal.
///
/// # Arguments
/// * `target` - Device name/address pattern, or None to find any signer
/// * `message` - Bytes to sign, at most one GATT write
/// * `timeout` - How long to wait for the signature
pub async fn request_signature(
    target: Option<&str>,
    message: &[u8],
    timeout: Duration,
) -> Result<ReceivedSignature, Box<dyn std::error::Error>> {
    if message.is_empty() {
        return Err("device ignores empty messages".into());
    }
    if message.len() > ble_signer_proto::MAX_ATTRIBUTE_LEN {
        return Err(format!(
            "message is {} bytes, a single write carries at most {}",
            message.len(),
            ble_signer_proto::MAX_ATTRIBUTE_LEN
        )
        .into());
    }

    let device = find_device(target).await?;

    device.connect().await?;
    device.discover_services().await?;

    let message_char = find_characteristic(&device, MESSAGE_CHARACTERISTIC_UUID)?;
    let signature_char = find_characteristic(&device, SIGNATURE_CHARACTERISTIC_UUID)?;

    device.subscribe(&signature_char).await?;
    let mut notifications = device.notifications().await?;
    // give the CCCD write time to land before the device answers
    tokio::time::sleep(Duration::from_secs(1)).await;

    device.write(&message_char, message, WriteType::WithResponse).await?;

    let signature_uuid = signature_char.uuid;
    let received = tokio::time::timeout(timeout, async {
        while let Some(notification) = notifications.next().await {
            if notification.uuid == signature_uuid {
                return Some(notification.value);
            }
        }
        None
    })
    .await;

    let _ = device.unsubscribe(&signature_char).await;
    let _ = device.disconnect().await;

    match received {
        Ok(Some(value)) => decode_signature(&value),
        Ok(None) => Err("notification stream closed before a signature arrived".into()),
        Err(_) => Err("no signature received".into()),
    }
}
