//! Test double for the BLE stack

use crate::ble::{ConnHandle, Peripheral};

/// Records every command the device issues
#[derive(Debug, Default)]
pub struct RecordingPeripheral {
    pub notified: Vec<Vec<u8>>,
    pub disconnected: Vec<ConnHandle>,
    pub advertising_starts: usize,
    pub fail_notify: bool,
    pub fail_disconnect: bool,
}

impl Peripheral for RecordingPeripheral {
    type Error = &'static str;

    fn notify(&mut self, value: &[u8]) -> Result<(), Self::Error> {
        if self.fail_notify {
            return Err("notify failed");
        }
        self.notified.push(value.to_vec());
        Ok(())
    }

    fn disconnect(&mut self, handle: ConnHandle) -> Result<(), Self::Error> {
        self.disconnected.push(handle);
        if self.fail_disconnect {
            return Err("disconnect failed");
        }
        Ok(())
    }

    fn start_advertising(&mut self) -> Result<(), Self::Error> {
        self.advertising_starts += 1;
        Ok(())
    }
}
