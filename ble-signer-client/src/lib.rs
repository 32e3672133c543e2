//! BLE Signer Client
//!
//! Host-side BLE client for the signing oracle.
//!
//! # Example
//!
//! ```ignore
//! use ble_signer_client::ble;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Scan for devices
//!     let devices = ble::scan(5).await?;
//!     for device in &devices {
//!         println!("{} ({})", device.name, device.address);
//!     }
//!
//!     // Have any signer sign a message
//!     let signature = ble::request_signature(None, b"Hello!", Duration::from_secs(5)).await?;
//!
//!     // Check it against the device's public key
//!     let public_key = std::fs::read("public.pem")?;
//!     assert!(ble::verify(&public_key, b"Hello!", &signature.raw)?);
//!
//!     Ok(())
//! }
//! ```

pub mod ble;
