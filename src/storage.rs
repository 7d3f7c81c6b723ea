//! The contiguous byte region shared by both buffer modes.

use bytes::BytesMut;

use crate::decoding::error::{DecodeError, UnexpectedEofSnafu};
use crate::encoding::error::{EncodeError, RegionFullSnafu};
use crate::frame::EXTRA_SPACE;

/// Nominal capacity of a freshly allocated region, in bytes.
pub(crate) const INITIAL_CAPACITY: usize = 1024;

/// Smallest region the buffer will allocate.
pub(crate) const MIN_CAPACITY: usize = 8;

/// A byte region with a cursor, a readable watermark and a growth policy.
///
/// The backing allocation is always `cap + EXTRA_SPACE` bytes; the extra
/// bytes are never addressed by the cursor. Invariant: `pos <= max <= cap`.
/// A non-growable region carries the bytes of an external caller; growing it
/// is a fault rather than a reallocation.
#[derive(Debug)]
pub(crate) struct ByteRegion {
    data: BytesMut,
    cap: usize,
    max: usize,
    pos: usize,
    growable: bool,
}

impl ByteRegion {
    /// Allocates a growable region of at least `MIN_CAPACITY` bytes.
    pub(crate) fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(MIN_CAPACITY);
        ByteRegion {
            data: BytesMut::zeroed(cap + EXTRA_SPACE),
            cap,
            max: cap,
            pos: 0,
            growable: true,
        }
    }

    /// Wraps an externally supplied region. A `size` of 0 uses the region's
    /// own length.
    pub(crate) fn adopt(mut region: BytesMut, size: usize, growable: bool) -> Self {
        let cap = if size == 0 { region.len() } else { size };
        if region.len() < cap + EXTRA_SPACE {
            region.resize(cap + EXTRA_SPACE, 0);
        }
        ByteRegion {
            data: region,
            cap,
            max: cap,
            pos: 0,
            growable,
        }
    }

    /// Replaces the backing region, resetting the cursor to 0. A `size` of 0
    /// keeps the previous capacity.
    pub(crate) fn set_region(&mut self, mut region: BytesMut, size: usize, growable: bool) {
        let cap = if size == 0 { self.cap } else { size };
        if region.len() < cap + EXTRA_SPACE {
            region.resize(cap + EXTRA_SPACE, 0);
        }
        self.data = region;
        self.cap = cap;
        self.max = cap;
        self.pos = 0;
        self.growable = growable;
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn capacity(&self) -> usize {
        self.cap
    }

    pub(crate) fn watermark(&self) -> usize {
        self.max
    }

    pub(crate) fn remaining(&self) -> usize {
        self.max - self.pos
    }

    pub(crate) fn is_growable(&self) -> bool {
        self.growable
    }

    /// Moves the cursor. Callers validate the target against the watermark.
    pub(crate) fn seek(&mut self, pos: usize) {
        debug_assert!(pos <= self.max);
        self.pos = pos;
    }

    pub(crate) fn skip(&mut self, n: usize) {
        debug_assert!(self.pos + n <= self.max);
        self.pos += n;
    }

    /// Reallocates to `new_cap + EXTRA_SPACE`, preserving `[0, pos)` and
    /// leaving the cursor alone. Never shrinks below the cursor.
    pub(crate) fn expand(&mut self, new_cap: usize) {
        let new_cap = new_cap.max(self.pos);
        self.data.resize(new_cap + EXTRA_SPACE, 0);
        self.cap = new_cap;
        self.max = new_cap;
    }

    /// Ensures room for an `n`-byte write at the cursor, growing to
    /// `max(2 * cap, cap + n)` when permitted.
    pub(crate) fn ensure(&mut self, n: usize) -> Result<(), EncodeError> {
        if self.pos + n <= self.cap {
            return Ok(());
        }
        if !self.growable {
            return RegionFullSnafu {
                pos: self.pos,
                needed: n,
                capacity: self.cap,
            }
            .fail();
        }
        self.expand(usize::max(2 * self.cap, self.cap + n));
        Ok(())
    }

    /// Checks that `n` bytes are readable at the cursor.
    pub(crate) fn require(&self, n: usize) -> Result<(), DecodeError> {
        if self.pos + n <= self.max {
            Ok(())
        } else {
            UnexpectedEofSnafu {
                pos: self.pos,
                needed: n,
                available: self.remaining(),
            }
            .fail()
        }
    }

    /// Consumes and returns `n` bytes at the cursor.
    pub(crate) fn take(&mut self, n: usize) -> Result<&[u8], DecodeError> {
        self.require(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Reserves `n` bytes at the cursor for in-place encoding.
    pub(crate) fn alloc(&mut self, n: usize) -> Result<&mut [u8], EncodeError> {
        self.ensure(n)?;
        let slice = &mut self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Copies `src` at the cursor, growing first if needed.
    pub(crate) fn write_raw(&mut self, src: &[u8]) -> Result<(), EncodeError> {
        if src.is_empty() {
            return Ok(());
        }
        self.alloc(src.len())?.copy_from_slice(src);
        Ok(())
    }

    /// Copies up to `dst.len()` bytes from the cursor, returning the number
    /// of bytes actually read.
    pub(crate) fn read_raw(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.remaining());
        dst[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    /// In-place overwrite of bytes reserved earlier; the cursor is unmoved.
    pub(crate) fn patch(&mut self, at: usize, bytes: &[u8]) {
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
    }

    /// The unread bytes between the cursor and the watermark.
    pub(crate) fn lookahead(&self) -> &[u8] {
        &self.data[self.pos..self.max]
    }

    /// The bytes written so far, `[0, pos)`.
    pub(crate) fn written(&self) -> &[u8] {
        &self.data[..self.pos]
    }

    /// Converts a just-written region into a readable one: the watermark
    /// drops to the cursor, the cursor rewinds to 0 and growth stops.
    pub(crate) fn rewind_for_read(&mut self) {
        self.max = self.pos;
        self.pos = 0;
        self.growable = false;
    }

    pub(crate) fn into_inner(self) -> BytesMut {
        self.data
    }
}
