//! Connection lifecycle monitor
//!
//! Tracks connected clients and the time of the last interaction. On every
//! tick it drops all clients once nobody has written or connected for longer
//! than the idle timeout.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use log::*;

use crate::ble::{ConnHandle, Peripheral};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No clients connected
    Idle,
    /// At least one client connected, idle timer armed
    Connected,
}

#[derive(Debug)]
pub struct LifecycleMonitor {
    idle_timeout: Duration,
    connections: BTreeSet<ConnHandle>,
    last_activity: Instant,
}

impl LifecycleMonitor {
    pub fn new(idle_timeout: Duration, now: Instant) -> Self {
        Self {
            idle_timeout,
            connections: BTreeSet::new(),
            last_activity: now,
        }
    }

    pub fn state(&self) -> LinkState {
        if self.connections.is_empty() {
            LinkState::Idle
        } else {
            LinkState::Connected
        }
    }

    pub fn connections(&self) -> impl Iterator<Item = ConnHandle> + '_ {
        self.connections.iter().copied()
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// When the current clients will be dropped, if any are connected
    pub fn deadline(&self) -> Option<Instant> {
        match self.state() {
            LinkState::Idle => None,
            LinkState::Connected => Some(self.last_activity + self.idle_timeout),
        }
    }

    pub fn on_connect(&mut self, handle: ConnHandle, now: Instant) {
        self.connections.insert(handle);
        self.touch(now);
    }

    /// Returns false when the handle was not tracked, e.g. it was already
    /// dropped by an idle disconnect
    pub fn on_disconnect(&mut self, handle: ConnHandle) -> bool {
        self.connections.remove(&handle)
    }

    /// Record client activity
    pub fn touch(&mut self, now: Instant) {
        // events can arrive late, keep the newest reading
        self.last_activity = self.last_activity.max(now);
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        self.state() == LinkState::Connected
            && now.saturating_duration_since(self.last_activity) > self.idle_timeout
    }

    /// Disconnect every client if the idle timeout has passed
    ///
    /// Returns the handles that were dropped. A handle whose disconnect fails
    /// stays tracked, so the next expiry tries it again.
    pub fn tick<P: Peripheral>(&mut self, peripheral: &mut P, now: Instant) -> Vec<ConnHandle> {
        if !self.is_idle(now) {
            return Vec::new();
        }

        info!(
            "Client inactive for over {}ms, disconnecting {} connection(s)",
            self.idle_timeout.as_millis(),
            self.connections.len()
        );

        let mut dropped = Vec::with_capacity(self.connections.len());
        self.connections.retain(|handle| match peripheral.disconnect(*handle) {
            Ok(()) => {
                dropped.push(*handle);
                false
            }
            Err(e) => {
                warn!("Failed to disconnect {}: {:?}", handle, e);
                true
            }
        });

        // reset so a client reconnecting right away is not dropped on the next tick
        self.last_activity = now;
        dropped
    }
}
