//! Wraparound-aware RTP sequence numbers

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

/// Width of the band on either side of the wrap point in which a small value
/// is treated as having wrapped past a large one.
pub const SEQNO_GUARD: u16 = 8192;

const SEQNO_MODULUS: i32 = 65536;

/// 16-bit RTP sequence number.
///
/// Equality is plain equality, ordering is circular and only available through
/// [`SeqNo::delta`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqNo(pub u16);

impl SeqNo {
    /// Signed circular distance from `other` to `self`.
    ///
    /// Positive when `self` is ahead of `other`, negative when behind, zero
    /// when equal. Values within [`SEQNO_GUARD`] of zero compare as just
    /// wrapped relative to values within [`SEQNO_GUARD`] of 65535.
    #[must_use]
    pub fn delta(self, other: SeqNo) -> i32 {
        delta(self, other)
    }

    /// Sequence number `n` steps ahead, wrapping at 65536
    #[must_use]
    pub fn wrapping_add(self, n: u16) -> SeqNo {
        SeqNo(self.0.wrapping_add(n))
    }

    /// The sequence number immediately after this one
    #[must_use]
    pub fn next(self) -> SeqNo {
        self.wrapping_add(1)
    }

    /// Write as big-endian into the first two bytes of `buf`
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than two bytes.
    pub fn encode(self, buf: &mut [u8]) {
        BigEndian::write_u16(buf, self.0);
    }

    /// Read a big-endian sequence number from the first two bytes of `buf`
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than two bytes.
    #[must_use]
    pub fn decode(buf: &[u8]) -> SeqNo {
        SeqNo(BigEndian::read_u16(buf))
    }
}

/// Signed circular distance `a - b` between two sequence numbers.
///
/// `delta(a, b) == -delta(b, a)` for every pair, and `delta(a, b) == 0` only
/// when `a == b`.
#[must_use]
pub fn delta(a: SeqNo, b: SeqNo) -> i32 {
    let (a, b) = (i32::from(a.0), i32::from(b.0));
    let guard = i32::from(SEQNO_GUARD);

    if a == b {
        0
    } else if a < guard && b > SEQNO_MODULUS - guard {
        SEQNO_MODULUS - (b - a)
    } else if b < guard && a > SEQNO_MODULUS - guard {
        (a - b) - SEQNO_MODULUS
    } else {
        a - b
    }
}

impl From<u16> for SeqNo {
    fn from(value: u16) -> Self {
        SeqNo(value)
    }
}

impl From<SeqNo> for u16 {
    fn from(value: SeqNo) -> Self {
        value.0
    }
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
