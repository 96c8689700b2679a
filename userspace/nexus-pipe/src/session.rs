// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Session handles bound to a [`Channel`].
//!
//! A session is one open reader, writer or reader+writer. Dropping it (or
//! calling [`Session::close`]) detaches it from the channel exactly once.

use core::fmt;
use std::sync::{Arc, Weak};

use crate::channel::{Channel, PollEvents};
use crate::user::{UserDst, UserSrc};
use crate::{PipeError, Result, Wait};

/// Direction(s) a session was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Reader only.
    Read,
    /// Writer only.
    Write,
    /// Counts as both a reader and a writer.
    ReadWrite,
}

impl AccessMode {
    /// Returns `true` if the session counts as a reader.
    pub const fn can_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Returns `true` if the session counts as a writer.
    pub const fn can_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Per-channel session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Exposes the raw value primarily for diagnostics.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One open handle on a pipe channel.
pub struct Session {
    channel: Arc<Channel>,
    id: SessionId,
    mode: AccessMode,
}

impl Session {
    pub(crate) fn new(channel: Arc<Channel>, id: SessionId, mode: AccessMode) -> Self {
        Self { channel, id, mode }
    }

    /// Returns the identifier assigned at open.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the access mode requested at open.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Returns the channel this session is bound to.
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Reads at most `max_len` bytes.
    ///
    /// Never returns an empty vector for a positive request; an empty ring
    /// either sleeps or fails according to `wait`.
    pub fn read(&self, max_len: usize, wait: Wait) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max_len.min(self.channel.max_transfer())];
        let count = self.read_into(buf.as_mut_slice(), wait)?;
        buf.truncate(count);
        Ok(buf)
    }

    /// Reads into a caller buffer, returning the number of bytes copied.
    pub fn read_into<D: UserDst + ?Sized>(&self, dst: &mut D, wait: Wait) -> Result<usize> {
        if !self.mode.can_read() {
            return Err(PipeError::BadAccess);
        }
        self.channel.read_into(self.id, dst, wait)
    }

    /// Writes a prefix of `data`, returning how many bytes were accepted.
    ///
    /// Partial writes are normal: a write stops at free space and at the
    /// physical end of the ring. Callers loop for the remainder.
    pub fn write(&self, data: &[u8], wait: Wait) -> Result<usize> {
        self.write_from(data, wait)
    }

    /// Writes from a caller buffer, returning the number of bytes copied.
    pub fn write_from<S: UserSrc + ?Sized>(&self, src: &S, wait: Wait) -> Result<usize> {
        if !self.mode.can_write() {
            return Err(PipeError::BadAccess);
        }
        self.channel.write_from(self.id, src, wait)
    }

    /// Keeps writing until all of `data` has been accepted.
    ///
    /// On error some prefix of `data` may already be in the channel.
    pub fn write_all(&self, mut data: &[u8], wait: Wait) -> Result<()> {
        while !data.is_empty() {
            let count = self.write(data, wait)?;
            data = &data[count..];
        }
        Ok(())
    }

    /// Reports readiness for this session's direction(s).
    pub fn poll(&self) -> PollEvents {
        self.channel.poll(self.mode)
    }

    /// Subscribes or unsubscribes this session for asynchronous notification.
    pub fn set_async(&self, on: bool) {
        self.channel.set_async(self.id, on);
    }

    /// Returns a handle that can cancel this session's waits from another thread.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter { channel: Arc::downgrade(&self.channel), id: self.id }
    }

    /// Detaches the session from its channel.
    pub fn close(self) {
        drop(self);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("channel", &self.channel.id())
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.channel.close(self.id);
    }
}

/// Cancels the current or next wait of one session.
#[derive(Clone)]
pub struct Interrupter {
    channel: Weak<Channel>,
    id: SessionId,
}

impl Interrupter {
    /// Marks an interruption pending and wakes every waiter on the channel.
    ///
    /// The target session fails its current sleep, or its next read/write
    /// if it is not sleeping, with [`PipeError::Interrupted`]. No-op once the
    /// session has closed.
    pub fn interrupt(&self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.interrupt(self.id);
        }
    }
}

impl fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupter").field("id", &self.id).finish()
    }
}
