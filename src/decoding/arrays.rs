//! Bulk array read forms.
//!
//! Three flavors, mirroring the write side: `read_array` allocates from a
//! leading length word, `read_static_array` fills a caller-provided
//! destination from a leading length word and refuses to allocate, and
//! `read_fast_array` takes the count from the caller entirely.

use snafu::ensure;

use super::error::{DecodeError, StaticArrayOverflowSnafu};
use super::ReadBuffer;
use crate::marshal::Marshal;

impl ReadBuffer {
    /// Reads a length-prefixed array, allocating the result.
    ///
    /// A zero length reads nothing past the length word and returns an
    /// empty vector.
    pub fn read_array<T: Marshal>(&mut self) -> Result<Vec<T>, DecodeError> {
        let n = self.read::<i32>()?;
        if n <= 0 {
            return Ok(Vec::new());
        }
        let mut values = vec![T::default(); n as usize];
        self.read_fast_array(&mut values)?;
        Ok(values)
    }

    /// Reads a length-prefixed array into a caller-provided destination,
    /// returning the element count.
    ///
    /// Never allocates. An incoming length larger than the destination is
    /// an error and leaves the cursor just past the length word.
    pub fn read_static_array<T: Marshal>(&mut self, dst: &mut [T]) -> Result<usize, DecodeError> {
        let n = self.read::<i32>()?;
        if n <= 0 {
            return Ok(0);
        }
        let n = n as usize;
        ensure!(
            n <= dst.len(),
            StaticArrayOverflowSnafu {
                incoming: n,
                capacity: dst.len()
            }
        );
        self.read_fast_array(&mut dst[..n])?;
        Ok(n)
    }

    /// Reads exactly `dst.len()` elements; the count travels out of band.
    pub fn read_fast_array<T: Marshal>(&mut self, dst: &mut [T]) -> Result<(), DecodeError> {
        if dst.is_empty() {
            return Ok(());
        }
        let raw = self.region.take(dst.len() * T::WIDTH)?;
        for (value, chunk) in dst.iter_mut().zip(raw.chunks_exact(T::WIDTH)) {
            *value = T::get(chunk);
        }
        Ok(())
    }

    /// Reads a length-prefixed array of wide integers.
    pub fn read_array_wide(&mut self) -> Result<Vec<i64>, DecodeError> {
        let n = self.read::<i32>()?;
        if n <= 0 {
            return Ok(Vec::new());
        }
        let mut values = vec![0i64; n as usize];
        self.read_fast_array_wide(&mut values)?;
        Ok(values)
    }

    /// Reads a length-prefixed array of wide integers into a
    /// caller-provided destination, returning the element count.
    pub fn read_static_array_wide(&mut self, dst: &mut [i64]) -> Result<usize, DecodeError> {
        let n = self.read::<i32>()?;
        if n <= 0 {
            return Ok(0);
        }
        let n = n as usize;
        ensure!(
            n <= dst.len(),
            StaticArrayOverflowSnafu {
                incoming: n,
                capacity: dst.len()
            }
        );
        self.read_fast_array_wide(&mut dst[..n])?;
        Ok(n)
    }

    /// Reads exactly `dst.len()` wide integers; the count travels out of
    /// band. Honors the container's format-version gate.
    pub fn read_fast_array_wide(&mut self, dst: &mut [i64]) -> Result<(), DecodeError> {
        if dst.is_empty() {
            return Ok(());
        }
        if self.legacy_wide() {
            let raw = self.region.take(dst.len() * 8)?;
            for (value, chunk) in dst.iter_mut().zip(raw.chunks_exact(8)) {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(chunk);
                *value = i64::from_be_bytes(bytes);
            }
        } else {
            let raw = self.region.take(dst.len() * 4)?;
            for (value, chunk) in dst.iter_mut().zip(raw.chunks_exact(4)) {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(chunk);
                *value = i64::from(i32::from_be_bytes(bytes));
            }
        }
        Ok(())
    }
}
