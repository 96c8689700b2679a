// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Caller buffer abstraction.
//!
//! The channel never touches caller memory directly; it goes through
//! [`UserDst`] for reads and [`UserSrc`] for writes. Either side may report a
//! [`Fault`], in which case the channel commits nothing.

use core::fmt;

/// Copy into or out of a caller buffer failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fault;

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("caller buffer fault")
    }
}

impl std::error::Error for Fault {}

/// Destination of a pipe read.
pub trait UserDst {
    /// Number of bytes the caller is willing to receive.
    fn len(&self) -> usize;

    /// Returns `true` when the caller asked for zero bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `src` to the start of the caller buffer.
    ///
    /// `src.len()` never exceeds [`UserDst::len`].
    fn copy_to_user(&mut self, src: &[u8]) -> Result<(), Fault>;
}

/// Source of a pipe write.
pub trait UserSrc {
    /// Number of bytes the caller offers.
    fn len(&self) -> usize;

    /// Returns `true` when the caller offers zero bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fills `dst` from the start of the caller buffer.
    ///
    /// `dst.len()` never exceeds [`UserSrc::len`].
    fn copy_from_user(&self, dst: &mut [u8]) -> Result<(), Fault>;
}

impl UserDst for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_to_user(&mut self, src: &[u8]) -> Result<(), Fault> {
        self.get_mut(..src.len()).ok_or(Fault)?.copy_from_slice(src);
        Ok(())
    }
}

impl UserSrc for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_from_user(&self, dst: &mut [u8]) -> Result<(), Fault> {
        dst.copy_from_slice(self.get(..dst.len()).ok_or(Fault)?);
        Ok(())
    }
}

impl<T: UserDst + ?Sized> UserDst for &mut T {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn copy_to_user(&mut self, src: &[u8]) -> Result<(), Fault> {
        (**self).copy_to_user(src)
    }
}

impl<T: UserSrc + ?Sized> UserSrc for &T {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn copy_from_user(&self, dst: &mut [u8]) -> Result<(), Fault> {
        (**self).copy_from_user(dst)
    }
}
