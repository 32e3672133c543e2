//! NimBLE GATT server for the signing oracle
//!
//! Exposes a write-only message characteristic and a notify-only signature
//! characteristic. NimBLE callbacks run on the BLE host task, so they only
//! forward events over a channel; the main task owns the device state and
//! drives this peripheral through `ble_signer_mcu::Peripheral`.
//!
//! Uses UUIDs from ble_signer_proto.

use esp32_nimble::utilities::{mutex::Mutex, BleUuid};
use esp32_nimble::{
    uuid128, BLEAdvertisementData, BLEAdvertising, BLECharacteristic, BLEDevice, BLEError,
    BLEServer, NimbleProperties,
};
use ble_signer_mcu::{ConnHandle, Peripheral, PeripheralEvent};
use log::*;
use std::sync::mpsc::Sender;
use std::sync::Arc;

// These must match ble_signer_proto::{SERVICE_UUID, MESSAGE_CHARACTERISTIC_UUID, ...}
// We use uuid128! macro for compile-time generation of BleUuid
const SERVICE_UUID: BleUuid = uuid128!("abcd1234-0000-0000-0000-abcdef123456");
const MESSAGE_UUID: BleUuid = uuid128!("abcd1234-0001-0001-0001-abcdef123456");
const SIGNATURE_UUID: BleUuid = uuid128!("abcd1234-0002-0002-0002-abcdef123456");

/// BLE stack handles the main task talks to
pub struct NimblePeripheral {
    server: &'static mut BLEServer,
    advertising: &'static Mutex<BLEAdvertising>,
    signature: Arc<Mutex<BLECharacteristic>>,
}

/// Start the BLE GATT server and begin forwarding events to `events`
pub fn start_ble_server(
    device_name: &str,
    events: Sender<PeripheralEvent>,
) -> Result<NimblePeripheral, BLEError> {
    // Set the device name (this is what shows up in BLE scans)
    BLEDevice::set_device_name(device_name)?;

    // take() hands out the same singleton, one call per 'static handle
    let server: &'static mut BLEServer = BLEDevice::take().get_server();
    // advertising restarts are the device's call, see Device::on_disconnect
    server.advertise_on_disconnect(false);

    let connect_events = events.clone();
    server.on_connect(move |_server, desc| {
        let _ = connect_events.send(PeripheralEvent::Connected(desc.conn_handle()));
    });

    let disconnect_events = events.clone();
    server.on_disconnect(move |desc, reason| {
        debug!("BLE link {} closed: {:?}", desc.conn_handle(), reason);
        let _ = disconnect_events.send(PeripheralEvent::Disconnected(desc.conn_handle()));
    });

    let service = server.create_service(SERVICE_UUID);

    // Message characteristic (write only)
    let message_char = service
        .lock()
        .create_characteristic(MESSAGE_UUID, NimbleProperties::WRITE);
    message_char.lock().on_write(move |args| {
        let event = PeripheralEvent::Written {
            handle: args.desc().conn_handle(),
            payload: args.recv_data().to_vec(),
        };
        if events.send(event).is_err() {
            warn!("BLE: device loop gone, dropping write");
        }
    });

    // Signature characteristic (notify, NimBLE adds the CCCD)
    let signature = service
        .lock()
        .create_characteristic(SIGNATURE_UUID, NimbleProperties::NOTIFY);

    let advertising: &'static Mutex<BLEAdvertising> = BLEDevice::take().get_advertising();
    advertising.lock().set_data(
        BLEAdvertisementData::new()
            .name(device_name)
            .add_service_uuid(SERVICE_UUID),
    )?;

    Ok(NimblePeripheral {
        server,
        advertising,
        signature,
    })
}

impl Peripheral for NimblePeripheral {
    type Error = BLEError;

    fn notify(&mut self, value: &[u8]) -> Result<(), Self::Error> {
        self.signature.lock().set_value(value).notify();
        Ok(())
    }

    fn disconnect(&mut self, handle: ConnHandle) -> Result<(), Self::Error> {
        // the link may have dropped since the handle was recorded
        if !self.server.connections().any(|desc| desc.conn_handle() == handle) {
            debug!("BLE link {} already closed", handle);
            return Ok(());
        }
        self.server.disconnect(handle)
    }

    fn start_advertising(&mut self) -> Result<(), Self::Error> {
        let mut advertising = self.advertising.lock();
        if advertising.is_advertising() {
            return Ok(());
        }
        advertising.start()
    }
}
