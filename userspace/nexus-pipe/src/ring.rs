// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Fixed-capacity byte ring with one reserved slot
//!
//! OWNERS: @runtime
//!
//! INVARIANTS:
//!   - `read < capacity` and `write < capacity`
//!   - empty iff `read == write`; at most `capacity - 1` bytes are ever buffered
//!   - a transfer never wraps inside one call; callers loop for the remainder
//!   - a faulted copy leaves both cursors untouched
//!
//! The ring has no locking of its own. [`crate::Channel`] serialises all access.

use crate::user::{Fault, UserDst, UserSrc};
use crate::PipeError;

/// Smallest usable capacity: one byte is always reserved to tell empty from full.
pub const MIN_CAPACITY: usize = 2;

/// Owned ring storage with read/write cursors.
#[derive(Debug)]
pub struct RingStorage {
    buf: Vec<u8>,
    read: usize,
    write: usize,
}

impl RingStorage {
    /// Allocates a zeroed ring of `capacity` bytes with both cursors at 0.
    pub fn allocate(capacity: usize) -> Result<Self, PipeError> {
        if capacity < MIN_CAPACITY {
            return Err(PipeError::InvalidCapacity(capacity));
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity).map_err(|_| PipeError::OutOfMemory)?;
        buf.resize(capacity, 0);
        Ok(Self { buf, read: 0, write: 0 })
    }

    /// Returns the storage to the allocator, reporting how many bytes it held.
    pub fn release(self) -> usize {
        self.buf.len()
    }

    /// Total slot count, including the reserved slot.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Current read cursor.
    pub fn read_cursor(&self) -> usize {
        self.read
    }

    /// Current write cursor.
    pub fn write_cursor(&self) -> usize {
        self.write
    }

    /// Returns `true` when no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        (self.write + self.capacity() - self.read) % self.capacity()
    }

    /// Bytes that can still be stored before the ring is full.
    pub fn free_space(&self) -> usize {
        if self.read == self.write {
            return self.capacity() - 1;
        }
        ((self.read + self.capacity() - self.write) % self.capacity()) - 1
    }

    /// Longest run readable from `read` without crossing the physical end.
    pub fn readable_run(&self) -> usize {
        if self.write >= self.read {
            self.write - self.read
        } else {
            self.capacity() - self.read
        }
    }

    /// Longest run writable at `write` without crossing the physical end
    /// or overrunning the reserved slot.
    pub fn writable_run(&self) -> usize {
        let to_edge = if self.write >= self.read {
            self.capacity() - self.write
        } else {
            self.read - self.write - 1
        };
        to_edge.min(self.free_space())
    }

    /// Copies up to `dst.len()` bytes out of the ring.
    ///
    /// Returns the number of bytes moved; the read cursor advances only after
    /// the copy succeeded.
    pub fn read_to<D: UserDst + ?Sized>(&mut self, dst: &mut D) -> Result<usize, Fault> {
        let count = dst.len().min(self.readable_run());
        if count == 0 {
            return Ok(0);
        }
        dst.copy_to_user(&self.buf[self.read..self.read + count])?;
        self.read = self.advance(self.read, count);
        Ok(count)
    }

    /// Copies up to `src.len()` bytes into the ring.
    ///
    /// Returns the number of bytes accepted; the write cursor advances only
    /// after the copy succeeded.
    pub fn write_from<S: UserSrc + ?Sized>(&mut self, src: &S) -> Result<usize, Fault> {
        let count = src.len().min(self.writable_run());
        if count == 0 {
            return Ok(0);
        }
        let start = self.write;
        src.copy_from_user(&mut self.buf[start..start + count])?;
        self.write = self.advance(start, count);
        Ok(count)
    }

    fn advance(&self, cursor: usize, count: usize) -> usize {
        let next = cursor + count;
        if next == self.capacity() {
            0
        } else {
            next
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct FaultyDst(usize);

    impl UserDst for FaultyDst {
        fn len(&self) -> usize {
            self.0
        }

        fn copy_to_user(&mut self, _src: &[u8]) -> Result<(), Fault> {
            Err(Fault)
        }
    }

    struct FaultySrc(usize);

    impl UserSrc for FaultySrc {
        fn len(&self) -> usize {
            self.0
        }

        fn copy_from_user(&self, _dst: &mut [u8]) -> Result<(), Fault> {
            Err(Fault)
        }
    }

    fn drain(ring: &mut RingStorage) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let mut chunk = [0u8; 64];
            let n = ring.read_to(chunk.as_mut_slice()).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    #[test]
    fn rejects_tiny_capacity() {
        assert_eq!(RingStorage::allocate(1).unwrap_err(), PipeError::InvalidCapacity(1));
        assert_eq!(RingStorage::allocate(0).unwrap_err(), PipeError::InvalidCapacity(0));
        assert_eq!(RingStorage::allocate(2).unwrap().free_space(), 1);
    }

    #[test]
    fn fresh_ring_is_empty() {
        let ring = RingStorage::allocate(8).unwrap();
        assert!(ring.is_empty());
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.free_space(), 7);
        assert_eq!(ring.readable_run(), 0);
        assert_eq!(ring.writable_run(), 7);
    }

    #[test]
    fn stores_capacity_minus_one() {
        let mut ring = RingStorage::allocate(8).unwrap();
        assert_eq!(ring.write_from(b"ABCDEFGHIJ".as_slice()).unwrap(), 7);
        assert_eq!(ring.free_space(), 0);
        assert_eq!(ring.write_from(b"Z".as_slice()).unwrap(), 0);
        assert_eq!(ring.len(), 7);
    }

    #[test]
    fn write_stops_at_physical_end() {
        let mut ring = RingStorage::allocate(8).unwrap();
        ring.write_from(b"ABCDEF".as_slice()).unwrap();
        let mut sink = [0u8; 4];
        ring.read_to(sink.as_mut_slice()).unwrap();
        // read=4, write=6: two slots to the edge even though five are free.
        assert_eq!(ring.free_space(), 5);
        assert_eq!(ring.write_from(b"GHIJK".as_slice()).unwrap(), 2);
        assert_eq!(ring.write_cursor(), 0);
        assert_eq!(ring.write_from(b"IJK".as_slice()).unwrap(), 3);
        assert_eq!(drain(&mut ring), b"EFGHIJK");
    }

    #[test]
    fn read_stops_at_physical_end() {
        let mut ring = RingStorage::allocate(4).unwrap();
        ring.write_from(b"abc".as_slice()).unwrap();
        let mut two = [0u8; 2];
        ring.read_to(two.as_mut_slice()).unwrap();
        ring.write_from(b"d".as_slice()).unwrap();
        ring.write_from(b"e".as_slice()).unwrap();
        let mut all = [0u8; 8];
        assert_eq!(ring.read_to(all.as_mut_slice()).unwrap(), 2);
        assert_eq!(&all[..2], b"cd");
        assert_eq!(ring.read_to(all.as_mut_slice()).unwrap(), 1);
        assert_eq!(&all[..1], b"e");
    }

    #[test]
    fn faulted_copies_commit_nothing() {
        let mut ring = RingStorage::allocate(8).unwrap();
        assert_eq!(ring.write_from(&FaultySrc(3)), Err(Fault));
        assert!(ring.is_empty());
        ring.write_from(b"xyz".as_slice()).unwrap();
        assert_eq!(ring.read_to(&mut FaultyDst(2)), Err(Fault));
        assert_eq!(ring.read_cursor(), 0);
        assert_eq!(drain(&mut ring), b"xyz");
    }

    #[test]
    fn release_reports_capacity() {
        assert_eq!(RingStorage::allocate(16).unwrap().release(), 16);
    }

    proptest! {
        #[test]
        fn chunked_transfer_preserves_order(
            capacity in 2usize..64,
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..20), 0..12),
        ) {
            let mut ring = RingStorage::allocate(capacity).unwrap();
            let mut written = Vec::new();
            let mut read = Vec::new();
            for chunk in &chunks {
                let mut offset = 0;
                while offset < chunk.len() {
                    let n = ring.write_from(&chunk[offset..]).unwrap();
                    if n == 0 {
                        read.extend(drain(&mut ring));
                        continue;
                    }
                    written.extend_from_slice(&chunk[offset..offset + n]);
                    offset += n;
                    prop_assert!(ring.len() <= capacity - 1);
                    prop_assert!(ring.read_cursor() < capacity && ring.write_cursor() < capacity);
                }
            }
            read.extend(drain(&mut ring));
            prop_assert_eq!(read, written);
        }
    }
}
