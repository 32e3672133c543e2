//! Device state and event loop
//!
//! `Device` owns everything the signer needs at runtime: the BLE peripheral,
//! the signing engine (key + RNG) and the lifecycle monitor. BLE callbacks
//! never touch it directly; they send [`PeripheralEvent`]s over a channel and
//! [`Device::run`] drains that channel on a single thread, interleaving idle
//! checks once per tick period.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use log::*;

use crate::ble::{ConnHandle, Peripheral, PeripheralEvent};
use crate::keys::SigningKey;
use crate::monitor::LifecycleMonitor;
use crate::signer::{SignError, Signer, SigningEngine};

/// Timing policy, compiled in from ble_signer_proto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignerConfig {
    pub idle_timeout: Duration,
    pub tick_period: Duration,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(ble_signer_proto::IDLE_TIMEOUT_MS),
            tick_period: Duration::from_millis(ble_signer_proto::TICK_PERIOD_MS),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError<E: std::fmt::Debug> {
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error("peripheral error: {0:?}")]
    Peripheral(E),
}

pub struct Device<P, S = SigningKey> {
    peripheral: P,
    engine: SigningEngine<S>,
    monitor: LifecycleMonitor,
    config: SignerConfig,
}

impl<P: Peripheral, S: Signer> Device<P, S> {
    pub fn new(peripheral: P, engine: SigningEngine<S>, config: SignerConfig, now: Instant) -> Self {
        Self {
            peripheral,
            engine,
            monitor: LifecycleMonitor::new(config.idle_timeout, now),
            config,
        }
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    pub fn monitor(&self) -> &LifecycleMonitor {
        &self.monitor
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    /// Begin advertising so the first client can find us
    pub fn start(&mut self) -> Result<(), DeviceError<P::Error>> {
        self.peripheral
            .start_advertising()
            .map_err(DeviceError::Peripheral)?;
        info!("BLE ready");
        Ok(())
    }

    pub fn handle_event(
        &mut self,
        event: PeripheralEvent,
        now: Instant,
    ) -> Result<(), DeviceError<P::Error>> {
        match event {
            PeripheralEvent::Connected(handle) => {
                self.on_connect(handle, now);
                Ok(())
            }
            PeripheralEvent::Disconnected(handle) => self.on_disconnect(handle),
            PeripheralEvent::Written { handle, payload } => {
                self.on_write(handle, &payload, now).map(|_| ())
            }
        }
    }

    pub fn on_connect(&mut self, handle: ConnHandle, now: Instant) {
        info!("Client connected ({})", handle);
        self.monitor.on_connect(handle, now);
    }

    /// Every disconnect, ours or the client's, puts the device back on air
    pub fn on_disconnect(&mut self, handle: ConnHandle) -> Result<(), DeviceError<P::Error>> {
        self.monitor.on_disconnect(handle);
        info!("Client disconnected ({}), restarting advertising", handle);
        self.peripheral
            .start_advertising()
            .map_err(DeviceError::Peripheral)
    }

    /// Sign a written message and notify the signature
    ///
    /// Any write counts as activity. An empty write is ignored and yields
    /// `Ok(None)`; on failure nothing is pushed and the connection stays up.
    pub fn on_write(
        &mut self,
        handle: ConnHandle,
        payload: &[u8],
        now: Instant,
    ) -> Result<Option<String>, DeviceError<P::Error>> {
        self.monitor.touch(now);

        if payload.is_empty() {
            debug!("Empty write from {}, ignoring", handle);
            return Ok(None);
        }
        debug!("Received {} bytes via BLE from {}", payload.len(), handle);

        let signature = self.engine.sign(payload)?;
        self.peripheral
            .notify(signature.as_bytes())
            .map_err(DeviceError::Peripheral)?;
        info!("Signature sent via BLE ({} chars)", signature.len());

        Ok(Some(signature))
    }

    /// Run the idle check; returns the handles that were dropped
    pub fn tick(&mut self, now: Instant) -> Result<Vec<ConnHandle>, DeviceError<P::Error>> {
        let dropped = self.monitor.tick(&mut self.peripheral, now);
        if !dropped.is_empty() {
            // acknowledgments may never arrive for a link that is already gone
            self.peripheral
                .start_advertising()
                .map_err(DeviceError::Peripheral)?;
        }
        Ok(dropped)
    }

    /// Drain `events` until every sender is gone, ticking once per tick period
    pub fn run(&mut self, events: &Receiver<PeripheralEvent>) {
        let mut next_tick = Instant::now() + self.config.tick_period;

        loop {
            let wait = next_tick.saturating_duration_since(Instant::now());
            match events.recv_timeout(wait) {
                Ok(event) => {
                    if let Err(e) = self.handle_event(event, Instant::now()) {
                        error!("{}", e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Event source closed, stopping");
                    return;
                }
            }

            let now = Instant::now();
            if now >= next_tick {
                if let Err(e) = self.tick(now) {
                    warn!("Idle check: {}", e);
                }
                next_tick = now + self.config.tick_period;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::LinkState;
    use crate::rng::RandomSource;
    use crate::testing::RecordingPeripheral;
    use data_encoding::BASE64;
    use std::sync::mpsc;

    const RSA_KEY: &[u8] = include_bytes!("../testdata/rsa_pkcs8.pem");

    fn config() -> SignerConfig {
        SignerConfig {
            idle_timeout: Duration::from_millis(5000),
            tick_period: Duration::from_millis(1000),
        }
    }

    fn device(t0: Instant) -> Device<RecordingPeripheral> {
        let engine = SigningEngine::new(
            SigningKey::parse(RSA_KEY).unwrap(),
            RandomSource::from_seed([5; 32], ble_signer_proto::RNG_PERSONALIZATION),
        );
        Device::new(RecordingPeripheral::default(), engine, config(), t0)
    }

    /// Delegates to the real key unless told to fail
    struct Flaky {
        key: SigningKey,
        fail: std::cell::Cell<bool>,
    }

    impl Signer for Flaky {
        fn sign_digest(&self, digest: &[u8; 32], rng: &mut RandomSource) -> Result<Vec<u8>, SignError> {
            if self.fail.get() {
                return Err(SignError::Sign("forced".to_string()));
            }
            self.key.sign_digest(digest, rng)
        }

        fn max_signature_len(&self) -> usize {
            self.key.max_signature_len()
        }
    }

    fn at(t0: Instant, ms: u64) -> Instant {
        t0 + Duration::from_millis(ms)
    }

    #[test]
    fn default_config_matches_protocol_constants() {
        let config = SignerConfig::default();
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.tick_period, Duration::from_secs(1));
    }

    #[test]
    fn start_advertises() {
        let mut device = device(Instant::now());
        device.start().unwrap();
        assert_eq!(device.peripheral().advertising_starts, 1);
    }

    #[test]
    fn write_is_signed_and_notified() {
        let t0 = Instant::now();
        let mut device = device(t0);

        device.handle_event(PeripheralEvent::Connected(1), t0).unwrap();
        let signature = device.on_write(1, b"Hello!", at(t0, 100)).unwrap().unwrap();

        assert_eq!(device.peripheral().notified, vec![signature.clone().into_bytes()]);
        let raw = BASE64.decode(signature.as_bytes()).unwrap();
        let key = SigningKey::parse(RSA_KEY).unwrap();
        assert!(key.verifying_key().verify(b"Hello!", &raw));
    }

    #[test]
    fn empty_write_only_refreshes_activity() {
        let t0 = Instant::now();
        let mut device = device(t0);

        device.on_connect(1, t0);
        let result = device
            .handle_event(PeripheralEvent::Written { handle: 1, payload: Vec::new() }, at(t0, 3000));

        assert!(result.is_ok());
        assert!(device.peripheral().notified.is_empty());
        assert_eq!(device.monitor().last_activity(), at(t0, 3000));
        assert_eq!(device.monitor().state(), LinkState::Connected);
    }

    #[test]
    fn idle_client_is_dropped_and_advertising_resumes() {
        let t0 = Instant::now();
        let mut device = device(t0);

        device.on_connect(1, t0);
        for ms in (1000..=5000).step_by(1000) {
            assert!(device.tick(at(t0, ms)).unwrap().is_empty());
        }
        assert_eq!(device.tick(at(t0, 6000)).unwrap(), vec![1]);
        assert_eq!(device.peripheral().disconnected, vec![1]);
        assert_eq!(device.peripheral().advertising_starts, 1);

        // the stack acknowledges later; still a disconnect event, still advertise
        device.handle_event(PeripheralEvent::Disconnected(1), at(t0, 6050)).unwrap();
        assert_eq!(device.peripheral().advertising_starts, 2);
        assert_eq!(device.monitor().state(), LinkState::Idle);
    }

    #[test]
    fn write_extends_the_deadline() {
        let t0 = Instant::now();
        let mut device = device(t0);

        device.on_connect(1, t0);
        device.on_write(1, b"ping", at(t0, 4000)).unwrap();

        assert!(device.tick(at(t0, 6000)).unwrap().is_empty());
        assert!(device.tick(at(t0, 9000)).unwrap().is_empty());
        assert_eq!(device.tick(at(t0, 10_000)).unwrap(), vec![1]);
    }

    #[test]
    fn both_clients_dropped_in_one_tick() {
        let t0 = Instant::now();
        let mut device = device(t0);

        device.on_connect(1, t0);
        device.on_connect(2, at(t0, 10));

        assert_eq!(device.tick(at(t0, 6000)).unwrap(), vec![1, 2]);
        assert_eq!(device.monitor().connections().count(), 0);
        assert_eq!(device.peripheral().disconnected, vec![1, 2]);
    }

    #[test]
    fn client_disconnect_restarts_advertising() {
        let t0 = Instant::now();
        let mut device = device(t0);

        device.on_connect(3, t0);
        device.on_disconnect(3).unwrap();

        assert_eq!(device.monitor().state(), LinkState::Idle);
        assert_eq!(device.peripheral().advertising_starts, 1);
    }

    #[test]
    fn sign_failure_is_isolated() {
        let t0 = Instant::now();
        let signer = Flaky {
            key: SigningKey::parse(RSA_KEY).unwrap(),
            fail: std::cell::Cell::new(true),
        };
        let engine = SigningEngine::new(signer, RandomSource::from_seed([0; 32], b""));
        let mut device = Device::new(RecordingPeripheral::default(), engine, config(), t0);

        device.on_connect(1, t0);
        let err = device.on_write(1, b"first", at(t0, 1000)).unwrap_err();
        assert!(matches!(err, DeviceError::Sign(SignError::Sign(_))));
        assert!(device.peripheral().notified.is_empty());
        assert_eq!(device.monitor().state(), LinkState::Connected);
        assert_eq!(device.monitor().last_activity(), at(t0, 1000));
        assert!(device.tick(at(t0, 2000)).unwrap().is_empty());

        device.engine.signer().fail.set(false);
        assert!(device.on_write(1, b"second", at(t0, 2500)).unwrap().is_some());
        assert_eq!(device.peripheral().notified.len(), 1);
    }

    #[test]
    fn notify_failure_surfaces_as_peripheral_error() {
        let t0 = Instant::now();
        let mut device = device(t0);
        device.peripheral.fail_notify = true;

        device.on_connect(1, t0);
        let err = device.on_write(1, b"msg", t0).unwrap_err();
        assert!(matches!(err, DeviceError::Peripheral(_)));
        assert_eq!(device.monitor().state(), LinkState::Connected);
    }

    #[test]
    fn run_drains_events_until_senders_drop() {
        let t0 = Instant::now();
        let mut device = device(t0);
        let (tx, rx) = mpsc::channel();

        tx.send(PeripheralEvent::Connected(4)).unwrap();
        tx.send(PeripheralEvent::Written { handle: 4, payload: b"one".to_vec() }).unwrap();
        tx.send(PeripheralEvent::Written { handle: 4, payload: Vec::new() }).unwrap();
        tx.send(PeripheralEvent::Written { handle: 4, payload: b"two".to_vec() }).unwrap();
        tx.send(PeripheralEvent::Disconnected(4)).unwrap();
        drop(tx);

        device.run(&rx);

        assert_eq!(device.peripheral().notified.len(), 2);
        assert_eq!(device.peripheral().advertising_starts, 1);
        assert_eq!(device.monitor().state(), LinkState::Idle);
    }

    #[test]
    fn run_drops_idle_client_between_events() {
        let config = SignerConfig {
            idle_timeout: Duration::from_millis(30),
            tick_period: Duration::from_millis(10),
        };
        let engine = SigningEngine::new(
            SigningKey::parse(RSA_KEY).unwrap(),
            RandomSource::from_seed([5; 32], b""),
        );
        let mut device = Device::new(RecordingPeripheral::default(), engine, config, Instant::now());
        let (tx, rx) = mpsc::channel();

        tx.send(PeripheralEvent::Connected(9)).unwrap();
        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            drop(tx);
        });

        device.run(&rx);
        sender.join().unwrap();

        assert_eq!(device.peripheral().disconnected, vec![9]);
        assert!(device.peripheral().advertising_starts >= 1);
        assert_eq!(device.monitor().state(), LinkState::Idle);
    }
}
