//! Stream capability flags

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// Capability and status bitset of a stream.
///
/// `READ`, `WRITE` and `NONBLOCKING` are chosen by whoever wraps the handle.
/// `EOF` and `TX` are status bits owned by the stream itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct StreamFlags(u8);

impl StreamFlags {
    /// Stream supports `read`
    pub const READ: Self = Self(1 << 0);
    /// Stream supports `write`
    pub const WRITE: Self = Self(1 << 1);
    /// Handle is in non-blocking mode; pumps never block
    pub const NONBLOCKING: Self = Self(1 << 2);
    /// Peer closed or an error was stored
    pub const EOF: Self = Self(1 << 3);
    /// A pump pass is running; guards against re-entrant pumps
    pub const TX: Self = Self(1 << 4);

    /// Bits a caller may pass when wrapping a handle.
    pub const CAPABILITIES: Self = Self(Self::READ.0 | Self::WRITE.0 | Self::NONBLOCKING.0);

    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build from raw bits, dropping unknown ones.
    #[inline]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & 0x1f)
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    #[inline]
    pub const fn readable(self) -> bool {
        self.contains(Self::READ)
    }

    #[inline]
    pub const fn writable(self) -> bool {
        self.contains(Self::WRITE)
    }

    #[inline]
    pub const fn nonblocking(self) -> bool {
        self.contains(Self::NONBLOCKING)
    }

    #[inline]
    pub const fn eof(self) -> bool {
        self.contains(Self::EOF)
    }

    /// Number of buffers a stream with these flags owns.
    #[inline]
    pub const fn buffer_count(self) -> usize {
        if self.writable() { 2 } else { 1 }
    }
}

impl BitOr for StreamFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for StreamFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl fmt::Debug for StreamFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(StreamFlags, &str); 5] = [
            (StreamFlags::READ, "READ"),
            (StreamFlags::WRITE, "WRITE"),
            (StreamFlags::NONBLOCKING, "NONBLOCKING"),
            (StreamFlags::EOF, "EOF"),
            (StreamFlags::TX, "TX"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("(empty)")?;
        }
        Ok(())
    }
}
