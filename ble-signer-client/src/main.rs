//! BLE signer CLI
//!
//! Scans for signers, requests signatures and verifies them.
//!
//! Usage:
//!   ble-signer scan [--duration SECS]
//!   ble-signer sign [--device NAME] --message TEXT [--public-key PEM] [--timeout SECS]
//!   ble-signer verify --public-key PEM --message TEXT --signature BASE64

use ble_signer_client::ble;
use clap::{Parser, Subcommand};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ble-signer")]
#[command(about = "Request and verify signatures from a BLE signer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for signers
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Have a device sign a message
    Sign {
        /// Device name or address to connect to
        #[arg(short, long)]
        device: Option<String>,
        /// Message to sign
        #[arg(short, long, default_value = "Hello!")]
        message: String,
        /// Public key (PEM or DER) to verify the signature with
        #[arg(short, long)]
        public_key: Option<String>,
        /// Seconds to wait for the signature
        #[arg(short, long, default_value = "5")]
        timeout: u64,
    },
    /// Verify a signature offline
    Verify {
        /// Public key (PEM or DER)
        #[arg(short, long)]
        public_key: String,
        /// Message that was signed
        #[arg(short, long)]
        message: String,
        /// Base64 signature as notified by the device
        #[arg(short, long)]
        signature: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { duration } => {
            println!("Scanning for signers ({} seconds)...", duration);
            let devices = ble::scan(duration).await?;

            println!("\nFound {} devices:", devices.len());
            for device in devices {
                let rssi = device.rssi.map(|r| format!("{} dBm", r)).unwrap_or_else(|| "N/A".to_string());
                let marker = if device.is_signer { " [SIGNER]" } else { "" };
                println!("  {} ({}) RSSI: {}{}", device.name, device.address, rssi, marker);
            }
        }
        Commands::Sign { device, message, public_key, timeout } => {
            // read the key first so a bad path fails before any BLE work
            let public_key = public_key.map(std::fs::read).transpose()?;

            println!("Sending message: {}", message);
            let signature = ble::request_signature(
                device.as_deref(),
                message.as_bytes(),
                Duration::from_secs(timeout),
            )
            .await?;
            println!("Signature received (base64): {}", signature.encoded);

            if let Some(public_key) = public_key {
                report(ble::verify(&public_key, message.as_bytes(), &signature.raw)?)?;
            }
        }
        Commands::Verify { public_key, message, signature } => {
            let public_key = std::fs::read(&public_key)?;
            let signature = ble::decode_signature(signature.as_bytes())?;
            report(ble::verify(&public_key, message.as_bytes(), &signature.raw)?)?;
        }
    }

    Ok(())
}

fn report(valid: bool) -> Result<(), Box<dyn std::error::Error>> {
    if valid {
        println!("Signature is valid.");
        Ok(())
    } else {
        Err("Signature is NOT valid.".into())
    }
}
