// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Bounded byte-pipe devices shared by concurrent reader/writer sessions
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module, integration tests in `tests/`
//!
//! PUBLIC API:
//!   - PipeDevices: table of pipe channels, one per device minor
//!   - Channel: fixed-capacity ring buffer guarded by one lock and two wait conditions
//!   - Session: one open reader/writer handle bound to a channel
//!   - Wait enum: blocking policy for read/write
//!   - PipeError: pipe error taxonomy
//!
//! DEPENDENCIES:
//!   - parking_lot::{Mutex, Condvar}: channel lock and data/space wait conditions
//!   - log: sleep/wake and lifecycle diagnostics
//!   - serde/toml: device table configuration

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

use core::time::Duration;

pub mod channel;
pub mod config;
pub mod devices;
pub mod error;
pub mod notify;
pub mod ring;
pub mod session;
pub mod user;

pub use channel::{Channel, ChannelSnapshot, PollEvents};
pub use config::{ConfigError, PipeConfig};
pub use devices::PipeDevices;
pub use error::PipeError;
pub use notify::{ChannelId, NotifySink, NullSink};
pub use session::{AccessMode, Interrupter, Session, SessionId};
pub use user::{Fault, UserDst, UserSrc};

/// Result type returned by pipe operations.
pub type Result<T> = core::result::Result<T, PipeError>;

/// Behaviour of a read or write that cannot make progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Sleep until the operation can complete.
    Blocking,
    /// Return [`PipeError::WouldBlock`] instead of sleeping.
    NonBlocking,
    /// Sleep until the operation can complete or the timeout expires.
    Timeout(Duration),
}

impl Wait {
    /// Maps an `O_NONBLOCK`-style flag onto a wait policy.
    pub const fn from_non_blocking(non_blocking: bool) -> Self {
        if non_blocking {
            Self::NonBlocking
        } else {
            Self::Blocking
        }
    }

    /// Returns `true` when the caller must never be put to sleep.
    ///
    /// A zero timeout counts as non-blocking.
    pub const fn is_non_blocking(self) -> bool {
        match self {
            Self::NonBlocking => true,
            Self::Timeout(duration) => duration.is_zero(),
            Self::Blocking => false,
        }
    }

    /// Converts a [`Wait::Timeout`] variant into its [`Duration`].
    pub const fn timeout(self) -> Option<Duration> {
        match self {
            Self::Timeout(duration) => Some(duration),
            Self::Blocking | Self::NonBlocking => None,
        }
    }
}
