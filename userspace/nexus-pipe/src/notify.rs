// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous read-ready notification.
//!
//! The channel only calls [`NotifySink::notify_readers`]; delivering the
//! signal to subscribed readers is the host's business.

use core::fmt;

/// Identifies one pipe device instance (its minor number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u32);

impl ChannelId {
    /// Wraps a device minor.
    pub const fn new(minor: u32) -> Self {
        Self(minor)
    }

    /// Returns the raw minor number.
    pub const fn minor(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipe{}", self.0)
    }
}

/// Receiver of "input available" events.
///
/// Called after the channel lock has been released, once per successful
/// write while at least one session is subscribed. Fire-and-forget.
pub trait NotifySink: Send + Sync {
    /// Signals subscribed readers of `channel` that data became available.
    fn notify_readers(&self, channel: ChannelId);
}

/// Sink that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotifySink for NullSink {
    fn notify_readers(&self, _channel: ChannelId) {}
}

impl<F> NotifySink for F
where
    F: Fn(ChannelId) + Send + Sync,
{
    fn notify_readers(&self, channel: ChannelId) {
        self(channel)
    }
}
