//! Bulk array write forms.
//!
//! Two flavors: `write_array` puts the element count on the wire ahead of
//! the elements, `write_fast_array` assumes the count travels out of band.
//! Wide integers get dedicated forms because their wire width depends on
//! the enclosing container's format version.

use super::{EncodeError, WriteBuffer};
use crate::marshal::Marshal;

impl WriteBuffer {
    /// Writes the element count as a length word, then the elements.
    ///
    /// An empty slice writes only the length word.
    pub fn write_array<T: Marshal>(&mut self, values: &[T]) -> Result<(), EncodeError> {
        self.write(values.len() as i32)?;
        self.write_fast_array(values)
    }

    /// Writes the elements only; the count travels out of band.
    pub fn write_fast_array<T: Marshal>(&mut self, values: &[T]) -> Result<(), EncodeError> {
        if values.is_empty() {
            return Ok(());
        }
        let dst = self.region.alloc(values.len() * T::WIDTH)?;
        for (chunk, value) in dst.chunks_exact_mut(T::WIDTH).zip(values) {
            value.put(chunk);
        }
        Ok(())
    }

    /// Writes the element count as a length word, then the wide elements.
    pub fn write_array_wide(&mut self, values: &[i64]) -> Result<(), EncodeError> {
        self.write(values.len() as i32)?;
        self.write_fast_array_wide(values)
    }

    /// Writes the wide elements only; the count travels out of band.
    pub fn write_fast_array_wide(&mut self, values: &[i64]) -> Result<(), EncodeError> {
        if values.is_empty() {
            return Ok(());
        }
        if self.legacy_wide() {
            let dst = self.region.alloc(values.len() * 8)?;
            for (chunk, value) in dst.chunks_exact_mut(8).zip(values) {
                chunk.copy_from_slice(&value.to_be_bytes());
            }
        } else {
            let dst = self.region.alloc(values.len() * 4)?;
            for (chunk, value) in dst.chunks_exact_mut(4).zip(values) {
                chunk.copy_from_slice(&(*value as i32).to_be_bytes());
            }
        }
        Ok(())
    }
}
