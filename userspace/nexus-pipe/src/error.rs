// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for pipe channels.
//!
//! Every failing path either returns before touching channel state or after a
//! complete commit, so callers may retry `WouldBlock`, `Interrupted` and
//! `TimedOut` without re-synchronising.

use thiserror::Error;

use crate::user::Fault;

/// Errors produced by pipe channels and the device table.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PipeError {
    /// Ring storage could not be allocated on first open.
    #[error("pipe storage allocation failed")]
    OutOfMemory,
    /// Non-blocking call cannot make progress right now.
    #[error("operation would block")]
    WouldBlock,
    /// The wait was aborted by an external cancellation request.
    #[error("wait interrupted")]
    Interrupted,
    /// The caller supplied buffer could not be copied to or from.
    #[error("bad caller buffer")]
    Fault,
    /// The opposite side departed while this session needed it.
    #[error("no peer left on the other side of the channel")]
    BrokenChannel,
    /// A timed wait expired before the operation could progress.
    #[error("operation timed out")]
    TimedOut,
    /// Requested ring capacity is outside the supported range.
    #[error("invalid pipe capacity {0}")]
    InvalidCapacity(usize),
    /// The session was not opened for the requested direction.
    #[error("session not opened for this direction")]
    BadAccess,
    /// No pipe device is registered under the given minor.
    #[error("no pipe device with minor {0}")]
    NoDevice(u32),
}

impl PipeError {
    /// Converts to the negative errno a device dispatcher hands back to callers.
    pub fn to_errno(&self) -> isize {
        match self {
            PipeError::OutOfMemory => -12,
            PipeError::WouldBlock => -11,
            PipeError::Interrupted => -4,
            PipeError::Fault => -14,
            PipeError::BrokenChannel => -32,
            PipeError::TimedOut => -110,
            PipeError::InvalidCapacity(_) => -22,
            PipeError::BadAccess => -9,
            PipeError::NoDevice(_) => -19,
        }
    }

    /// Returns `true` for conditions the caller may simply retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipeError::WouldBlock | PipeError::Interrupted | PipeError::TimedOut)
    }
}

impl From<Fault> for PipeError {
    fn from(_: Fault) -> Self {
        PipeError::Fault
    }
}
