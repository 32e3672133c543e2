//! BLE Signer for ESP32
//!
//! This firmware turns an ESP32 into a BLE signing oracle. A client writes a
//! message to the message characteristic; the device signs its SHA-256 digest
//! with the private key baked into the image and notifies the base64 signature
//! on the signature characteristic. Clients idle for longer than the timeout
//! are disconnected.

mod ble;

use ble_signer_mcu::{Device, RandomSource, SignerConfig, SigningEngine, SigningKey};
use ble_signer_proto::{DEVICE_NAME, RNG_PERSONALIZATION};
use log::*;
use std::sync::mpsc;
use std::time::Instant;

// Copied into OUT_DIR by build.rs
const PRIVATE_KEY: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/private_key.pem"));

fn main() -> anyhow::Result<()> {
    // Initialize ESP-IDF
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("BLE Signer v{}", env!("CARGO_PKG_VERSION"));
    info!("Initializing...");

    // Without a valid key there is nothing to serve
    let signing_key = match SigningKey::parse(PRIVATE_KEY) {
        Ok(key) => key,
        Err(e) => {
            error!("Private key rejected, halting: {}", e);
            return Err(e.into());
        }
    };
    info!("Loaded {} key", signing_key.algorithm());

    let rng = RandomSource::from_entropy(RNG_PERSONALIZATION)?;
    let engine = SigningEngine::new(signing_key, rng);

    let (events_tx, events_rx) = mpsc::channel();
    let peripheral = ble::start_ble_server(DEVICE_NAME, events_tx)
        .map_err(|e| anyhow::anyhow!("BLE setup failed: {:?}", e))?;

    let config = SignerConfig::default();
    info!(
        "Idle timeout {}ms, checking every {}ms",
        config.idle_timeout.as_millis(),
        config.tick_period.as_millis()
    );

    let mut device = Device::new(peripheral, engine, config, Instant::now());
    device
        .start()
        .map_err(|e| anyhow::anyhow!("failed to start advertising: {}", e))?;
    info!("BLE advertising started as '{}'", DEVICE_NAME);

    // The BLE callbacks hold the senders for the life of the program
    device.run(&events_rx);

    warn!("Event loop exited");
    Ok(())
}
