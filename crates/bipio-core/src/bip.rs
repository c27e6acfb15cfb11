//! `BipBuffer` - fixed-capacity circular buffer with contiguous windows.
//!
//! Every producer call (`reserve`) and every consumer call (`get`) is handed
//! exactly one contiguous span, so each maps onto a single `read(2)` or
//! `write(2)` without copying into scratch space.
//!
//! # Layout
//!
//! ```text
//! contiguous (head >= tail):
//!   [ free | tail ......... head | free ]
//!            ^ valid data
//!
//! wrapped (head < tail):
//!   [ new ... head | free | tail ... current_size | slack ]
//!     ^ written after wrap  ^ old data still unread
//! ```
//!
//! When the space ahead of `head` is too small and the space behind `tail`
//! is larger, `reserve` wraps: `current_size` remembers where the old data
//! ends and writing restarts at offset 0. The slack between `current_size`
//! and `size` is abandoned until the reader drains the old region.
//!
//! # Sentinel
//!
//! One byte of capacity is never handed out, so `used < size` always holds
//! and `head == tail` can only mean "empty". Usable capacity is `size - 1`.

use core::ops::Range;

/// Circular byte buffer with bip-buffer semantics.
pub struct BipBuffer {
    /// Declared capacity (length of `data`)
    size: usize,
    /// Bytes currently holding data
    used: usize,
    /// Write cursor
    head: usize,
    /// Read cursor
    tail: usize,
    /// End of the valid old region while wrapped; `size` otherwise
    current_size: usize,
    /// Bytes requested by the last read/write call but not yet transferred
    pending: usize,
    data: Box<[u8]>,
}

impl BipBuffer {
    /// Create a buffer with `size` bytes of backing storage.
    ///
    /// # Panics
    ///
    /// Panics if `size` is smaller than [`MIN_BUF_SIZE`](crate::constants::MIN_BUF_SIZE).
    pub fn new(size: usize) -> Self {
        assert!(
            size >= crate::constants::MIN_BUF_SIZE,
            "bip buffer needs at least {} bytes",
            crate::constants::MIN_BUF_SIZE
        );
        Self {
            size,
            used: 0,
            head: 0,
            tail: 0,
            current_size: size,
            pending: 0,
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.pending
    }

    #[inline]
    pub fn head(&self) -> usize {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> usize {
        self.tail
    }

    #[inline]
    pub fn current_size(&self) -> usize {
        self.current_size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// `true` while valid data is the single run `[tail, head)`.
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.head >= self.tail
    }

    /// Record more outstanding request bytes. Saturates.
    #[inline]
    pub fn add_pending(&mut self, n: usize) {
        self.pending = self.pending.saturating_add(n);
    }

    /// Retire `n` outstanding request bytes. Saturates at zero.
    #[inline]
    pub fn consume_pending(&mut self, n: usize) {
        self.pending = self.pending.saturating_sub(n);
    }

    /// Free space usable at `head` without wrapping.
    pub fn ahead(&self) -> usize {
        if self.is_contiguous() {
            let sentinel = if self.tail == 0 { 1 } else { 0 };
            self.size - self.head - sentinel
        } else {
            self.tail - self.head - 1
        }
    }

    /// Free space at the front, usable only by wrapping.
    pub fn behind(&self) -> usize {
        if self.is_contiguous() && self.tail != 0 {
            self.tail - 1
        } else {
            0
        }
    }

    /// Reserve up to `requested` bytes and return the granted range.
    ///
    /// Wraps to the front when that yields more room than the space ahead.
    /// The grant may be shorter than `requested` (possibly empty).
    pub fn reserve_span(&mut self, requested: usize) -> Range<usize> {
        let ahead = self.ahead();
        let behind = self.behind();
        if ahead < requested && behind > ahead {
            self.current_size = self.head;
            self.head = 0;
            return 0..behind.min(requested);
        }
        self.head..self.head + ahead.min(requested)
    }

    /// Reserve up to `requested` bytes and return the writable window.
    pub fn reserve(&mut self, requested: usize) -> &mut [u8] {
        let span = self.reserve_span(requested);
        &mut self.data[span]
    }

    /// Publish `n` bytes written into the last reserved window.
    ///
    /// Clamped to the space ahead of `head`; returns the committed count.
    pub fn commit(&mut self, n: usize) -> usize {
        let n = n.min(self.ahead());
        self.head += n;
        self.used += n;
        n
    }

    /// Range of the next contiguous readable run.
    pub fn get_span(&self) -> Range<usize> {
        if self.is_contiguous() {
            self.tail..self.head
        } else {
            self.tail..self.current_size
        }
    }

    /// Next contiguous readable run.
    pub fn get(&self) -> &[u8] {
        &self.data[self.get_span()]
    }

    /// Release `n` bytes from the front of the readable run.
    ///
    /// Clamped to the length of the run returned by [`get`](Self::get).
    pub fn remove(&mut self, n: usize) {
        let n = n.min(self.get_span().len());
        let new_tail = self.tail + n;
        if self.is_contiguous() {
            if new_tail < self.head {
                self.tail = new_tail;
            } else {
                self.head = 0;
                self.tail = 0;
            }
        } else if new_tail < self.current_size {
            self.tail = new_tail;
        } else {
            // Old region drained: the front run becomes the contiguous one.
            self.tail = 0;
            self.current_size = self.size;
        }
        self.used -= n;
    }

    /// Copy `src` into the buffer using one reservation.
    ///
    /// Returns how many leading bytes of `src` were accepted.
    pub fn push(&mut self, src: &[u8]) -> usize {
        let window = self.reserve(src.len());
        let n = window.len();
        window.copy_from_slice(&src[..n]);
        self.commit(n)
    }
}

impl core::fmt::Debug for BipBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BipBuffer")
            .field("size", &self.size)
            .field("used", &self.used)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("current_size", &self.current_size)
            .field("pending", &self.pending)
            .finish()
    }
}
