// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Shared pipe channel: ring storage, session registry and blocking I/O
//!
//! OWNERS: @runtime
//!
//! PUBLIC API:
//!   - Channel::new(): create channel metadata (no storage yet)
//!   - Channel::open(): attach a session, allocating storage on first open
//!   - Channel::snapshot(): point-in-time view for status dumps
//!   - Channel::set_buffer_size()/buffer_size(): capacity used by the next allocation
//!
//! INVARIANTS:
//!   - storage exists iff `readers + writers > 0`
//!   - cursors, counters and the session table only change under `state`
//!   - the lock is never held across a sleep; every wake re-checks its precondition
//!   - a failing read/write commits nothing
//!
//! ERROR CONDITIONS:
//!   - PipeError::OutOfMemory: storage allocation failed on first open
//!   - PipeError::WouldBlock: non-blocking call found no data / no space
//!   - PipeError::Interrupted: session was interrupted before or while sleeping
//!   - PipeError::TimedOut: timed wait expired
//!   - PipeError::BrokenChannel: peer side emptied while this side needed it
//!   - PipeError::Fault: caller buffer copy failed

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use bitflags::bitflags;
use log::{debug, info, trace, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::MAX_BUFFER_SIZE;
use crate::notify::{ChannelId, NotifySink};
use crate::ring::{RingStorage, MIN_CAPACITY};
use crate::session::{AccessMode, Session, SessionId};
use crate::user::{UserDst, UserSrc};
use crate::{PipeError, Result, Wait};

bitflags! {
    /// Readiness reported by [`Session::poll`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollEvents: u32 {
        /// At least one byte can be read without sleeping.
        const READABLE = 0x0001;
        /// At least one byte can be written without sleeping.
        const WRITABLE = 0x0004;
        /// The opposite side has departed.
        const HANGUP = 0x0010;
    }
}

/// Point-in-time view of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSnapshot {
    /// Device instance the channel belongs to.
    pub id: ChannelId,
    /// Whether ring storage is currently allocated.
    pub allocated: bool,
    /// Capacity the next allocation will use.
    pub buffer_size: usize,
    /// Capacity of the live ring, 0 when unallocated.
    pub capacity: usize,
    /// Read cursor of the live ring.
    pub read_cursor: usize,
    /// Write cursor of the live ring.
    pub write_cursor: usize,
    /// Bytes waiting to be read.
    pub buffered: usize,
    /// Bytes that can be written before the ring is full.
    pub free_space: usize,
    /// Open sessions with read access.
    pub readers: usize,
    /// Open sessions with write access.
    pub writers: usize,
    /// Sessions subscribed to asynchronous notification.
    pub async_readers: usize,
    /// Bytes delivered to readers over the channel lifetime.
    pub bytes_read: u64,
    /// Bytes accepted from writers over the channel lifetime.
    pub bytes_written: u64,
}

struct SessionEntry {
    mode: AccessMode,
    async_notify: bool,
    interrupt_pending: bool,
}

struct ChannelState {
    storage: Option<RingStorage>,
    buffer_size: usize,
    readers: usize,
    writers: usize,
    // Set once a peer of that direction attached during the current storage
    // lifecycle; a side that never had a peer waits for one instead of breaking.
    had_reader: bool,
    had_writer: bool,
    sessions: BTreeMap<SessionId, SessionEntry>,
    next_session: u64,
    async_readers: usize,
    bytes_read: u64,
    bytes_written: u64,
}

impl ChannelState {
    fn new(buffer_size: usize) -> Self {
        Self {
            storage: None,
            buffer_size,
            readers: 0,
            writers: 0,
            had_reader: false,
            had_writer: false,
            sessions: BTreeMap::new(),
            next_session: 1,
            async_readers: 0,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    fn ring(&self) -> Result<&RingStorage> {
        self.storage.as_ref().ok_or(PipeError::BrokenChannel)
    }

    fn ring_mut(&mut self) -> Result<&mut RingStorage> {
        self.storage.as_mut().ok_or(PipeError::BrokenChannel)
    }

    fn take_interrupt(&mut self, session: SessionId) -> bool {
        match self.sessions.get_mut(&session) {
            Some(entry) => core::mem::take(&mut entry.interrupt_pending),
            None => false,
        }
    }

    fn writers_departed(&self) -> bool {
        self.writers == 0 && self.had_writer
    }

    fn readers_departed(&self) -> bool {
        self.readers == 0 && self.had_reader
    }
}

/// Shared ring buffer state for one pipe device instance.
pub struct Channel {
    id: ChannelId,
    state: Mutex<ChannelState>,
    data_ready: Condvar,
    space_ready: Condvar,
    sink: Arc<dyn NotifySink>,
}

impl Channel {
    /// Creates channel metadata; storage is allocated by the first [`Channel::open`].
    pub fn new(id: ChannelId, buffer_size: usize, sink: Arc<dyn NotifySink>) -> Result<Arc<Self>> {
        validate_capacity(buffer_size)?;
        Ok(Arc::new(Self {
            id,
            state: Mutex::new(ChannelState::new(buffer_size)),
            data_ready: Condvar::new(),
            space_ready: Condvar::new(),
            sink,
        }))
    }

    /// Returns the device instance this channel belongs to.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Attaches a new session.
    ///
    /// Allocates zeroed storage with both cursors at 0 when none exists, so a
    /// channel reopened after its last close always starts empty.
    pub fn open(self: &Arc<Self>, mode: AccessMode) -> Result<Session> {
        let mut state = self.state.lock();
        if state.storage.is_none() {
            let size = state.buffer_size;
            let storage = RingStorage::allocate(size).map_err(|err| {
                warn!("pipe: {} failed to allocate {size} byte ring: {err}", self.id);
                err
            })?;
            info!("pipe: {} allocated {} byte ring", self.id, storage.capacity());
            state.storage = Some(storage);
            state.had_reader = false;
            state.had_writer = false;
        }
        if mode.can_read() {
            state.readers += 1;
            state.had_reader = true;
        }
        if mode.can_write() {
            state.writers += 1;
            state.had_writer = true;
        }
        let id = SessionId::new(state.next_session);
        state.next_session += 1;
        state.sessions.insert(
            id,
            SessionEntry { mode, async_notify: false, interrupt_pending: false },
        );
        debug!(
            "pipe: {} opened session {id} ({mode:?}), readers {} writers {}",
            self.id, state.readers, state.writers
        );
        Ok(Session::new(Arc::clone(self), id, mode))
    }

    /// Capacity the next storage allocation will use.
    pub fn buffer_size(&self) -> usize {
        self.state.lock().buffer_size
    }

    /// Changes the capacity used by the next storage allocation.
    ///
    /// A live ring is never resized; the new size applies after the last
    /// session closed and a new one opens.
    pub fn set_buffer_size(&self, size: usize) -> Result<()> {
        validate_capacity(size)?;
        let mut state = self.state.lock();
        state.buffer_size = size;
        info!("pipe: {} buffer size set to {size}", self.id);
        Ok(())
    }

    /// Capacity of the live ring, if storage is allocated.
    pub fn capacity(&self) -> Option<usize> {
        self.state.lock().storage.as_ref().map(RingStorage::capacity)
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Returns `true` when no session is attached.
    pub fn is_idle(&self) -> bool {
        self.session_count() == 0
    }

    /// Captures cursors, counters and statistics under the lock.
    pub fn snapshot(&self) -> ChannelSnapshot {
        let state = self.state.lock();
        let ring = state.storage.as_ref();
        ChannelSnapshot {
            id: self.id,
            allocated: ring.is_some(),
            buffer_size: state.buffer_size,
            capacity: ring.map_or(0, RingStorage::capacity),
            read_cursor: ring.map_or(0, RingStorage::read_cursor),
            write_cursor: ring.map_or(0, RingStorage::write_cursor),
            buffered: ring.map_or(0, RingStorage::len),
            free_space: ring.map_or(0, RingStorage::free_space),
            readers: state.readers,
            writers: state.writers,
            async_readers: state.async_readers,
            bytes_read: state.bytes_read,
            bytes_written: state.bytes_written,
        }
    }

    /// Largest byte count a single read can return.
    pub(crate) fn max_transfer(&self) -> usize {
        let state = self.state.lock();
        state.storage.as_ref().map_or(state.buffer_size, RingStorage::capacity).saturating_sub(1)
    }

    pub(crate) fn close(&self, session: SessionId) {
        let mut state = self.state.lock();
        let Some(entry) = state.sessions.remove(&session) else {
            return;
        };
        if entry.mode.can_read() {
            state.readers = state.readers.saturating_sub(1);
        }
        if entry.mode.can_write() {
            state.writers = state.writers.saturating_sub(1);
        }
        if entry.async_notify {
            state.async_readers = state.async_readers.saturating_sub(1);
        }
        debug!(
            "pipe: {} closed session {session}, readers {} writers {}",
            self.id, state.readers, state.writers
        );
        if state.readers + state.writers == 0 {
            if let Some(storage) = state.storage.take() {
                info!("pipe: {} released {} byte ring", self.id, storage.release());
            }
            state.had_reader = false;
            state.had_writer = false;
        }
        drop(state);
        // Waiters must observe the new counts.
        self.data_ready.notify_all();
        self.space_ready.notify_all();
    }

    pub(crate) fn read_into<D: UserDst + ?Sized>(
        &self,
        session: SessionId,
        dst: &mut D,
        wait: Wait,
    ) -> Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        let deadline = deadline_for(wait);
        let mut state = self.lock_interruptible(session)?;
        let mut expired = false;
        loop {
            if !state.ring()?.is_empty() {
                break;
            }
            if state.writers_departed() {
                return Err(PipeError::BrokenChannel);
            }
            if wait.is_non_blocking() {
                return Err(PipeError::WouldBlock);
            }
            if expired {
                return Err(PipeError::TimedOut);
            }
            debug!("pipe: {} session {session} reading: going to sleep", self.id);
            expired = !self.sleep(&self.data_ready, &mut state, session, deadline)?;
        }
        let count = state.ring_mut()?.read_to(dst)?;
        state.bytes_read += count as u64;
        drop(state);

        self.space_ready.notify_all();
        trace!("pipe: {} session {session} did read {count} bytes", self.id);
        Ok(count)
    }

    pub(crate) fn write_from<S: UserSrc + ?Sized>(
        &self,
        session: SessionId,
        src: &S,
        wait: Wait,
    ) -> Result<usize> {
        if src.is_empty() {
            return Ok(0);
        }
        let deadline = deadline_for(wait);
        let mut state = self.lock_interruptible(session)?;
        let mut expired = false;
        loop {
            if state.ring()?.free_space() > 0 {
                break;
            }
            if state.readers_departed() {
                return Err(PipeError::BrokenChannel);
            }
            if wait.is_non_blocking() {
                return Err(PipeError::WouldBlock);
            }
            if expired {
                return Err(PipeError::TimedOut);
            }
            debug!("pipe: {} session {session} writing: going to sleep", self.id);
            expired = !self.sleep(&self.space_ready, &mut state, session, deadline)?;
        }
        let count = state.ring_mut()?.write_from(src)?;
        state.bytes_written += count as u64;
        let notify = state.async_readers > 0;
        drop(state);

        self.data_ready.notify_all();
        if notify {
            self.sink.notify_readers(self.id);
        }
        trace!("pipe: {} session {session} did write {count} bytes", self.id);
        Ok(count)
    }

    pub(crate) fn poll(&self, mode: AccessMode) -> PollEvents {
        let state = self.state.lock();
        let mut events = PollEvents::empty();
        let Some(ring) = state.storage.as_ref() else {
            return events;
        };
        if mode.can_read() {
            events.set(PollEvents::READABLE, !ring.is_empty());
            if state.writers_departed() {
                events |= PollEvents::HANGUP;
            }
        }
        if mode.can_write() {
            events.set(PollEvents::WRITABLE, ring.free_space() > 0);
            if state.readers_departed() {
                events |= PollEvents::HANGUP;
            }
        }
        events
    }

    pub(crate) fn set_async(&self, session: SessionId, on: bool) {
        let mut state = self.state.lock();
        let Some(entry) = state.sessions.get_mut(&session) else {
            return;
        };
        if entry.async_notify == on {
            return;
        }
        entry.async_notify = on;
        if on {
            state.async_readers += 1;
        } else {
            state.async_readers = state.async_readers.saturating_sub(1);
        }
    }

    pub(crate) fn interrupt(&self, session: SessionId) {
        let mut state = self.state.lock();
        let Some(entry) = state.sessions.get_mut(&session) else {
            return;
        };
        entry.interrupt_pending = true;
        drop(state);
        debug!("pipe: {} interrupting session {session}", self.id);
        self.data_ready.notify_all();
        self.space_ready.notify_all();
    }

    fn lock_interruptible(&self, session: SessionId) -> Result<MutexGuard<'_, ChannelState>> {
        let mut state = self.state.lock();
        if state.take_interrupt(session) {
            return Err(PipeError::Interrupted);
        }
        Ok(state)
    }

    /// Sleeps on `cond` with the lock released.
    ///
    /// Returns `Ok(false)` when the deadline passed; the caller re-checks its
    /// precondition either way.
    fn sleep(
        &self,
        cond: &Condvar,
        state: &mut MutexGuard<'_, ChannelState>,
        session: SessionId,
        deadline: Option<Instant>,
    ) -> Result<bool> {
        let woke = match deadline {
            Some(deadline) => !cond.wait_until(state, deadline).timed_out(),
            None => {
                cond.wait(state);
                true
            }
        };
        if state.take_interrupt(session) {
            debug!("pipe: {} session {session} interrupted while sleeping", self.id);
            return Err(PipeError::Interrupted);
        }
        Ok(woke)
    }
}

// A timeout too large to represent as an instant waits without a deadline.
fn deadline_for(wait: Wait) -> Option<Instant> {
    wait.timeout().and_then(|timeout| Instant::now().checked_add(timeout))
}

fn validate_capacity(size: usize) -> Result<()> {
    if !(MIN_CAPACITY..=MAX_BUFFER_SIZE).contains(&size) {
        return Err(PipeError::InvalidCapacity(size));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn channel(capacity: usize) -> Arc<Channel> {
        Channel::new(ChannelId::new(0), capacity, Arc::new(NullSink)).unwrap()
    }

    #[test]
    fn storage_follows_session_count() {
        let ch = channel(8);
        assert_eq!(ch.capacity(), None);
        let reader = ch.open(AccessMode::Read).unwrap();
        let writer = ch.open(AccessMode::Write).unwrap();
        assert_eq!(ch.capacity(), Some(8));
        drop(reader);
        assert_eq!(ch.capacity(), Some(8));
        writer.close();
        assert_eq!(ch.capacity(), None);
        assert!(ch.is_idle());
    }

    #[test]
    fn reopen_starts_empty() {
        let ch = channel(8);
        let writer = ch.open(AccessMode::Write).unwrap();
        writer.write(b"stale", Wait::NonBlocking).unwrap();
        writer.close();
        let reader = ch.open(AccessMode::Read).unwrap();
        assert_eq!(reader.read(8, Wait::NonBlocking), Err(PipeError::WouldBlock));
        assert_eq!(ch.snapshot().buffered, 0);
    }

    #[test]
    fn invalid_sizes_rejected() {
        assert_eq!(
            Channel::new(ChannelId::new(1), 1, Arc::new(NullSink)).err(),
            Some(PipeError::InvalidCapacity(1))
        );
        let ch = channel(8);
        assert_eq!(
            ch.set_buffer_size(MAX_BUFFER_SIZE + 1),
            Err(PipeError::InvalidCapacity(MAX_BUFFER_SIZE + 1))
        );
        assert_eq!(ch.buffer_size(), 8);
    }

    #[test]
    fn buffer_size_applies_to_next_allocation() {
        let ch = channel(8);
        let session = ch.open(AccessMode::ReadWrite).unwrap();
        ch.set_buffer_size(32).unwrap();
        assert_eq!(ch.capacity(), Some(8));
        assert_eq!(ch.buffer_size(), 32);
        drop(session);
        let _session = ch.open(AccessMode::ReadWrite).unwrap();
        assert_eq!(ch.capacity(), Some(32));
    }

    #[test]
    fn zero_length_transfers_never_block() {
        let ch = channel(4);
        let session = ch.open(AccessMode::ReadWrite).unwrap();
        assert_eq!(session.read(0, Wait::Blocking).unwrap(), Vec::<u8>::new());
        assert_eq!(session.write(b"", Wait::Blocking).unwrap(), 0);
    }

    #[test]
    fn timed_read_expires() {
        let ch = channel(4);
        let _writer = ch.open(AccessMode::Write).unwrap();
        let reader = ch.open(AccessMode::Read).unwrap();
        let err = reader.read(1, Wait::Timeout(Duration::from_millis(10))).unwrap_err();
        assert_eq!(err, PipeError::TimedOut);
        assert_eq!(
            reader.read(1, Wait::Timeout(Duration::ZERO)).unwrap_err(),
            PipeError::WouldBlock
        );
    }

    #[test]
    fn timed_write_expires_without_committing() {
        let ch = channel(4);
        let _reader = ch.open(AccessMode::Read).unwrap();
        let writer = ch.open(AccessMode::Write).unwrap();
        writer.write_all(b"abc", Wait::NonBlocking).unwrap();
        let err = writer.write(b"d", Wait::Timeout(Duration::from_millis(10))).unwrap_err();
        assert_eq!(err, PipeError::TimedOut);
        assert_eq!(ch.snapshot().bytes_written, 3);
    }

    #[test]
    fn unrepresentable_timeout_waits_without_deadline() {
        let ch = channel(4);
        let session = ch.open(AccessMode::ReadWrite).unwrap();
        assert_eq!(session.write(b"x", Wait::Timeout(Duration::MAX)), Ok(1));
        assert_eq!(session.read(1, Wait::Timeout(Duration::MAX)).unwrap(), b"x");
        assert_eq!(deadline_for(Wait::Timeout(Duration::MAX)), None);
        assert!(deadline_for(Wait::Timeout(Duration::from_secs(1))).is_some());
        assert_eq!(deadline_for(Wait::Blocking), None);
    }

    #[test]
    fn pending_interrupt_fails_next_call_once() {
        let ch = channel(4);
        let session = ch.open(AccessMode::ReadWrite).unwrap();
        session.interrupter().interrupt();
        assert_eq!(session.write(b"a", Wait::NonBlocking), Err(PipeError::Interrupted));
        assert_eq!(session.write(b"a", Wait::NonBlocking), Ok(1));
    }

    #[test]
    fn poll_reports_direction_and_hangup() {
        let ch = channel(4);
        let reader = ch.open(AccessMode::Read).unwrap();
        let writer = ch.open(AccessMode::Write).unwrap();
        assert_eq!(reader.poll(), PollEvents::empty());
        assert_eq!(writer.poll(), PollEvents::WRITABLE);
        writer.write(b"abc", Wait::NonBlocking).unwrap();
        assert_eq!(reader.poll(), PollEvents::READABLE);
        assert_eq!(writer.poll(), PollEvents::empty());
        drop(writer);
        assert_eq!(reader.poll(), PollEvents::READABLE | PollEvents::HANGUP);
    }

    #[test]
    fn sink_only_fires_with_async_subscribers() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sink = move |_: ChannelId| {
            counter.fetch_add(1, Ordering::SeqCst);
        };
        let ch = Channel::new(ChannelId::new(2), 16, Arc::new(sink)).unwrap();
        let reader = ch.open(AccessMode::Read).unwrap();
        let writer = ch.open(AccessMode::Write).unwrap();
        writer.write(b"a", Wait::NonBlocking).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        reader.set_async(true);
        writer.write(b"b", Wait::NonBlocking).unwrap();
        writer.write(b"c", Wait::NonBlocking).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(ch.snapshot().async_readers, 1);
        drop(reader);
        assert_eq!(ch.snapshot().async_readers, 0);
    }

    #[test]
    fn snapshot_tracks_traffic() {
        let ch = channel(8);
        let session = ch.open(AccessMode::ReadWrite).unwrap();
        session.write(b"hello", Wait::NonBlocking).unwrap();
        session.read(2, Wait::NonBlocking).unwrap();
        let snap = ch.snapshot();
        assert!(snap.allocated);
        assert_eq!((snap.read_cursor, snap.write_cursor), (2, 5));
        assert_eq!(snap.buffered, 3);
        assert_eq!(snap.free_space, 4);
        assert_eq!((snap.readers, snap.writers), (1, 1));
        assert_eq!((snap.bytes_read, snap.bytes_written), (2, 5));
    }
}
