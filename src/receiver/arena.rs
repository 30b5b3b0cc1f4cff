//! Pooled datagram buffers
//!
//! Every datagram read from an RTP socket lands in a [`Packet`] taken from a
//! [`PacketArena`]. Dropping the packet (or calling [`Packet::release`])
//! hands the buffer back, so sustained streaming does not allocate per packet.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::protocol::rtp::constants::MAX_PACKET_SIZE;
use crate::protocol::rtp::{RtpHeader, SeqNo, payload_type_byte};

/// Default number of idle buffers kept for reuse
pub const DEFAULT_MAX_POOLED: usize = 512;

/// Thread-safe pool of datagram buffers
#[derive(Clone)]
pub struct PacketArena {
    inner: Arc<ArenaInner>,
}

struct ArenaInner {
    free: Mutex<Vec<Vec<u8>>>,
    buffer_size: usize,
    max_pooled: usize,
    allocated: AtomicUsize,
    outstanding: AtomicUsize,
}

/// Allocation accounting for a [`PacketArena`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArenaStats {
    /// Buffers ever allocated by the arena
    pub allocated: usize,
    /// Buffers currently idle in the pool
    pub pooled: usize,
    /// Packets currently handed out
    pub outstanding: usize,
}

impl PacketArena {
    /// Create an arena of [`MAX_PACKET_SIZE`] buffers
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_PACKET_SIZE, DEFAULT_MAX_POOLED)
    }

    /// Create an arena with a custom buffer size and idle-pool cap
    #[must_use]
    pub fn with_capacity(buffer_size: usize, max_pooled: usize) -> Self {
        Self {
            inner: Arc::new(ArenaInner {
                free: Mutex::new(Vec::new()),
                buffer_size,
                max_pooled,
                allocated: AtomicUsize::new(0),
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Take a packet ready to receive a datagram
    #[must_use]
    pub fn acquire(&self) -> Packet {
        let recycled = self
            .inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let buf = recycled.unwrap_or_else(|| {
            self.inner.allocated.fetch_add(1, Ordering::Relaxed);
            vec![0u8; self.inner.buffer_size]
        });
        self.inner.outstanding.fetch_add(1, Ordering::Relaxed);

        Packet {
            seqno: SeqNo::default(),
            retransmitted: false,
            start: 0,
            end: 0,
            buf,
            home: Some(Arc::clone(&self.inner)),
        }
    }

    /// Return a packet to the pool. Same as dropping it.
    pub fn release(&self, packet: Packet) {
        drop(packet);
    }

    /// Size of each buffer
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Current accounting
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let pooled = self
            .inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        ArenaStats {
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            pooled,
            outstanding: self.inner.outstanding.load(Ordering::Relaxed),
        }
    }
}

impl Default for PacketArena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PacketArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketArena")
            .field("buffer_size", &self.inner.buffer_size)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ArenaInner {
    fn reclaim(&self, buf: Vec<u8>) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);

        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_pooled {
            free.push(buf);
        }
    }
}

/// A received datagram tagged with its audio sequence number
pub struct Packet {
    seqno: SeqNo,
    retransmitted: bool,
    start: usize,
    end: usize,
    buf: Vec<u8>,
    home: Option<Arc<ArenaInner>>,
}

impl Packet {
    /// Build a packet outside any arena, copying `data`
    #[must_use]
    pub fn from_bytes(seqno: SeqNo, data: &[u8], retransmitted: bool) -> Self {
        Self {
            seqno,
            retransmitted,
            start: 0,
            end: data.len(),
            buf: data.to_vec(),
            home: None,
        }
    }

    /// Audio sequence number
    #[must_use]
    pub fn seqno(&self) -> SeqNo {
        self.seqno
    }

    /// Set the audio sequence number
    pub fn set_seqno(&mut self, seqno: SeqNo) {
        self.seqno = seqno;
    }

    /// Whether the packet arrived as a retransmit response
    #[must_use]
    pub fn is_retransmitted(&self) -> bool {
        self.retransmitted
    }

    /// Mark the packet as recovered (or not)
    pub fn set_retransmitted(&mut self, retransmitted: bool) {
        self.retransmitted = retransmitted;
    }

    /// The whole backing buffer, for a socket read.
    ///
    /// Follow with [`Packet::set_len`].
    pub fn recv_buf(&mut self) -> &mut [u8] {
        self.start = 0;
        self.end = 0;
        &mut self.buf
    }

    /// Record how many bytes the socket read wrote
    pub fn set_len(&mut self, len: usize) {
        self.start = 0;
        self.end = len.min(self.buf.len());
    }

    /// Drop `n` leading bytes from the content
    pub fn strip_prefix(&mut self, n: usize) {
        self.start = (self.start + n).min(self.end);
    }

    /// Datagram bytes (after any stripped prefix)
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Bytes following the 12-byte RTP header
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.content().get(RtpHeader::SIZE..).unwrap_or(&[])
    }

    /// Payload type of the content (low 7 bits of byte 1)
    #[must_use]
    pub fn payload_type(&self) -> Option<u8> {
        payload_type_byte(self.content())
    }

    /// Content length
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the content is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand the buffer back to its arena
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Packet {
    fn drop(&mut self) {
        if let Some(home) = self.home.take() {
            home.reclaim(std::mem::take(&mut self.buf));
        }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("seqno", &self.seqno)
            .field("retransmitted", &self.retransmitted)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
