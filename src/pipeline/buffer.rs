use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A frame as handed to readers. Cloning only bumps the refcount.
#[derive(Debug)]
pub struct Published<T> {
    /// Production order, starting at 1
    pub seq: u64,
    pub frame: Arc<T>,
}

impl<T> Clone for Published<T> {
    fn clone(&self) -> Self {
        Self {
            seq: self.seq,
            frame: Arc::clone(&self.frame),
        }
    }
}

#[derive(Debug)]
pub enum WaitOutcome<T> {
    Frame(Published<T>),
    /// Nothing newer arrived in time; the caller may check its own liveness.
    Timeout,
    /// The producer stopped; no further frames will arrive.
    Closed,
}

#[derive(Debug)]
struct Slot<T> {
    latest: Option<Published<T>>,
    seq: u64,
    closed: bool,
}

/// Single-slot, single-writer/multi-reader frame buffer.
///
/// `publish` overwrites the slot and wakes every waiting reader. There is no
/// backlog: a reader that falls behind simply sees the newest frame next.
/// Readers only hold the lock long enough to clone an `Arc`, so they cannot
/// stall the producer.
#[derive(Debug)]
pub struct SharedFrameBuffer<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Default for SharedFrameBuffer<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(Slot {
                latest: None,
                seq: 0,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }
}

impl<T> SharedFrameBuffer<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the current frame and notify all readers. Returns the frame's
    /// sequence number, or `None` once the buffer is closed.
    pub fn publish(&self, frame: T) -> Option<u64> {
        let seq = {
            let mut slot = self.lock();
            if slot.closed {
                return None;
            }
            slot.seq += 1;
            let seq = slot.seq;
            slot.latest = Some(Published {
                seq,
                frame: Arc::new(frame),
            });
            seq
        };
        self.ready.notify_all();
        Some(seq)
    }

    pub fn latest(&self) -> Option<Published<T>> {
        self.lock().latest.clone()
    }

    /// Number of frames published so far.
    pub fn published(&self) -> u64 {
        self.lock().seq
    }

    /// Stop accepting frames and wake every waiter.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn reader(self: &Arc<Self>) -> FrameReader<T> {
        FrameReader {
            buffer: Arc::clone(self),
            last_seen: 0,
        }
    }
}

/// Per-consumer cursor into a [`SharedFrameBuffer`].
///
/// Dropping a reader has no effect on the producer or other readers.
#[derive(Debug)]
pub struct FrameReader<T> {
    buffer: Arc<SharedFrameBuffer<T>>,
    last_seen: u64,
}

impl<T> FrameReader<T> {
    /// Block until a frame newer than the last one returned is available,
    /// the buffer closes, or `timeout` passes.
    pub fn wait_next(&mut self, timeout: Duration) -> WaitOutcome<T> {
        let last_seen = self.last_seen;
        let slot = self.buffer.lock();
        let (slot, _) = self
            .buffer
            .ready
            .wait_timeout_while(slot, timeout, |s| s.seq <= last_seen && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);

        match &slot.latest {
            Some(published) if published.seq > last_seen => {
                self.last_seen = published.seq;
                WaitOutcome::Frame(published.clone())
            }
            _ if slot.closed => WaitOutcome::Closed,
            _ => WaitOutcome::Timeout,
        }
    }

    /// Sequence number of the last frame this reader returned.
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}
