// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Table of pipe device instances.
//!
//! Owns one [`Channel`] per minor. Channel metadata lives as long as the
//! table (plus any session still holding it); storage comes and goes with
//! the sessions.

use std::fmt::Write as _;
use std::sync::Arc;

use log::{info, warn};

use crate::channel::{Channel, ChannelSnapshot};
use crate::config::PipeConfig;
use crate::notify::{ChannelId, NotifySink};
use crate::session::{AccessMode, Session};
use crate::{PipeError, Result};

/// Registered pipe devices, indexed by minor.
pub struct PipeDevices {
    channels: Vec<Arc<Channel>>,
}

impl PipeDevices {
    /// Creates `config.devices` channels sharing `sink`.
    pub fn register(config: &PipeConfig, sink: Arc<dyn NotifySink>) -> Result<Self> {
        let channels = (0..config.devices)
            .map(|minor| {
                Channel::new(ChannelId::new(minor), config.buffer_size, Arc::clone(&sink))
            })
            .collect::<Result<Vec<_>>>()?;
        info!(
            "pipe: registered {} devices with {} byte buffers",
            channels.len(),
            config.buffer_size
        );
        Ok(Self { channels })
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` when no device is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Looks up the channel for `minor`.
    pub fn channel(&self, minor: u32) -> Result<&Arc<Channel>> {
        self.channels.get(minor as usize).ok_or(PipeError::NoDevice(minor))
    }

    /// Opens a session on device `minor`.
    pub fn open(&self, minor: u32, mode: AccessMode) -> Result<Session> {
        self.channel(minor)?.open(mode)
    }

    /// Snapshots every channel in minor order.
    pub fn snapshot(&self) -> Vec<ChannelSnapshot> {
        self.channels.iter().map(|channel| channel.snapshot()).collect()
    }

    /// Renders a human readable status block per device.
    pub fn status_report(&self) -> String {
        let mut out = String::new();
        for snap in self.snapshot() {
            let _ = writeln!(out, "Device {}: buffer size {}", snap.id.minor(), snap.buffer_size);
            if snap.allocated {
                let _ = writeln!(
                    out,
                    "  ring {} bytes, rp {} wp {} ({} buffered, {} free)",
                    snap.capacity,
                    snap.read_cursor,
                    snap.write_cursor,
                    snap.buffered,
                    snap.free_space
                );
            } else {
                let _ = writeln!(out, "  ring not allocated");
            }
            let _ = writeln!(
                out,
                "  readers {} writers {} async {}",
                snap.readers, snap.writers, snap.async_readers
            );
            let _ = writeln!(out, "  read {} written {}", snap.bytes_read, snap.bytes_written);
        }
        out
    }

    /// Tears the table down.
    ///
    /// Returns how many channels were still referenced by open sessions; those
    /// stay usable through their sessions until the last one closes.
    pub fn unregister(self) -> usize {
        let busy = self.channels.iter().filter(|channel| !channel.is_idle()).count();
        if busy > 0 {
            warn!("pipe: unregistering with {busy} devices still open");
        }
        info!("pipe: unregistered {} devices", self.channels.len());
        busy
    }
}
