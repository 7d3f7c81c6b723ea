//! Write-mode buffer: marshals primitives, arrays, strings and object
//! graphs into the self-describing wire format.

mod arrays;
pub(crate) mod error;

use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;

pub use self::error::EncodeError;
use self::error::{CountOverflowSnafu, RegionFullSnafu, UnresolvedClassSnafu};
use crate::config::BufferOptions;
use crate::frame::{
    BYTE_COUNT_MASK, BYTE_COUNT_VMASK, CLASS_MASK, LEGACY_WIDE_VERSION, MAP_OFFSET, MAX_COUNT,
    MAX_VERSION, NEW_CLASS_TAG, NULL_TAG,
};
use crate::marshal::Marshal;
use crate::refmap::WriteRefMap;
use crate::registry::{ClassId, ClassRegistry, MapToken, ObjectId, StreamParent, WriteOutcome};
use crate::storage::ByteRegion;

/// Write-mode serialization buffer.
///
/// A `WriteBuffer` represents a single in-progress serialization: it owns a
/// growable byte region, a cursor and the reference map that deduplicates
/// repeated objects and class descriptors. It is single-threaded by
/// construction; the wire protocol is inherently sequential.
pub struct WriteBuffer {
    region: ByteRegion,
    map: WriteRefMap,
    parent: Option<Arc<dyn StreamParent>>,
    strict_counts: bool,
}

impl WriteBuffer {
    /// Creates a buffer with default options.
    pub fn new() -> Self {
        Self::with_options(&BufferOptions::default())
    }

    /// Creates a buffer with the given options.
    pub fn with_options(options: &BufferOptions) -> Self {
        WriteBuffer {
            region: ByteRegion::with_capacity(options.initial_capacity),
            map: WriteRefMap::new(options.map_capacity),
            parent: None,
            strict_counts: options.strict_counts,
        }
    }

    /// Creates a buffer over an externally supplied region.
    ///
    /// A `size` of 0 uses the region's own length. A non-growable region is
    /// never expanded: writing past its end is a fault.
    pub fn with_region(
        region: BytesMut,
        size: usize,
        growable: bool,
        options: &BufferOptions,
    ) -> Self {
        WriteBuffer {
            region: ByteRegion::adopt(region, size, growable),
            map: WriteRefMap::new(options.map_capacity),
            parent: None,
            strict_counts: options.strict_counts,
        }
    }

    /// Replaces the byte region, resetting the cursor to 0. A `size` of 0
    /// keeps the previous capacity.
    pub fn set_region(&mut self, region: BytesMut, size: usize, growable: bool) {
        self.region.set_region(region, size, growable);
    }

    /// Current cursor position: the number of bytes written.
    pub fn len(&self) -> usize {
        self.region.pos()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.region.pos() == 0
    }

    /// Nominal capacity of the region.
    pub fn capacity(&self) -> usize {
        self.region.capacity()
    }

    /// Reallocates to `new_cap`, preserving the written bytes and cursor.
    /// Fixed regions cannot be expanded.
    pub fn expand(&mut self, new_cap: usize) -> Result<(), EncodeError> {
        if !self.region.is_growable() {
            return RegionFullSnafu {
                pos: self.len(),
                needed: new_cap.saturating_sub(self.capacity()),
                capacity: self.capacity(),
            }
            .fail();
        }
        self.region.expand(new_cap);
        Ok(())
    }

    /// The enclosing container, if any.
    pub fn parent(&self) -> Option<&Arc<dyn StreamParent>> {
        self.parent.as_ref()
    }

    /// Attaches the enclosing container supplying the format version.
    pub fn set_parent(&mut self, parent: Option<Arc<dyn StreamParent>>) {
        self.parent = parent;
    }

    /// Number of identities recorded in the reference map.
    pub fn map_count(&self) -> usize {
        self.map.len()
    }

    /// Adjusts the reference map's initial capacity. Must be called before
    /// the first object is mapped.
    pub fn set_map_capacity(&mut self, capacity: usize) {
        self.map.set_capacity(capacity);
    }

    /// Drops the reference map; the byte cursor is left alone.
    pub fn reset_map(&mut self) {
        self.map.reset();
    }

    /// Rewinds the cursor to 0 and drops the reference map, keeping the
    /// region for reuse.
    pub fn reset(&mut self) {
        self.region.seek(0);
        self.map.reset();
    }

    /// The bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        self.region.written()
    }

    /// Releases the backing region.
    pub fn into_inner(self) -> BytesMut {
        self.region.into_inner()
    }

    /// Flips the buffer into a reader over the bytes written so far.
    ///
    /// The reference map is rebuilt from scratch on the read side; the
    /// parent carries over.
    pub fn into_reader(self) -> crate::decoding::ReadBuffer {
        let mut region = self.region;
        region.rewind_for_read();
        crate::decoding::ReadBuffer::from_parts(region, self.map.capacity(), self.parent)
    }

    pub(crate) fn legacy_wide(&self) -> bool {
        self.parent
            .as_ref()
            .is_some_and(|p| p.format_version() < LEGACY_WIDE_VERSION)
    }

    /// Writes one fixed-width primitive in its big-endian wire form.
    pub fn write<T: Marshal>(&mut self, value: T) -> Result<(), EncodeError> {
        value.put(self.region.alloc(T::WIDTH)?);
        Ok(())
    }

    /// Writes `src` verbatim at the cursor, growing first if needed.
    pub fn write_raw(&mut self, src: &[u8]) -> Result<(), EncodeError> {
        self.region.write_raw(src)
    }

    /// Writes the bytes of `s` plus the terminating zero byte.
    pub fn write_string(&mut self, s: &str) -> Result<(), EncodeError> {
        self.region.write_raw(s.as_bytes())?;
        self.region.write_raw(&[0])
    }

    /// Writes a wide integer.
    ///
    /// Containers older than the wide-integer gate receive the legacy
    /// host-width representation (the full 64-bit value, byte-swapped to
    /// wire order); modern containers receive the 32-bit wire form.
    pub fn write_wide(&mut self, value: i64) -> Result<(), EncodeError> {
        if self.legacy_wide() {
            self.region.write_raw(&value.to_be_bytes())
        } else {
            self.write(value as i32)
        }
    }

    /// Guards a prospective offset or byte count against the wire maximum.
    ///
    /// Overflow is reported as a diagnostic; with strict counts enabled it
    /// aborts the write.
    pub fn check_count(&self, value: u32) -> Result<(), EncodeError> {
        if value >= MAX_COUNT {
            error!(
                message = "buffer offset or byte count too large",
                value,
                max = MAX_COUNT
            );
            if self.strict_counts {
                return CountOverflowSnafu { count: value }.fail();
            }
        }
        Ok(())
    }

    /// Records an object identity at the given biased offset.
    ///
    /// Must be called just before the object's streamer runs, so that the
    /// streamer's recursive encounters of the same object resolve to
    /// back-references instead of recursing forever.
    pub fn map_object(&mut self, obj: ObjectId, offset: u32) -> Result<(), EncodeError> {
        self.map_token(MapToken::Object(obj), offset)
    }

    fn map_token(&mut self, token: MapToken, offset: u32) -> Result<(), EncodeError> {
        self.check_count(offset)?;
        self.map.add(token, offset);
        Ok(())
    }

    /// Writes a class descriptor: a 4-byte back-reference when the class
    /// was already emitted in this buffer, otherwise the new-class tag
    /// followed by the registry's descriptor payload.
    pub fn write_class(
        &mut self,
        registry: &dyn ClassRegistry,
        class: ClassId,
    ) -> Result<(), EncodeError> {
        if let Some(offset) = self.map.get(MapToken::Class(class)) {
            self.write(offset | CLASS_MASK)
        } else {
            let offset = self.region.pos() as u32;
            self.write(NEW_CLASS_TAG)?;
            registry.store_class(class, self)?;
            self.map_token(MapToken::Class(class), offset + MAP_OFFSET)
        }
    }

    /// Writes an object under its actual class.
    ///
    /// A null object is the 4-byte null tag; an already-seen object is its
    /// recorded offset as a back-reference tag; otherwise a byte count is
    /// reserved, the class descriptor and the object's own stream follow,
    /// and the count is back-patched.
    pub fn write_object(
        &mut self,
        registry: &dyn ClassRegistry,
        obj: Option<ObjectId>,
        actual_class: ClassId,
    ) -> Result<(), EncodeError> {
        let Some(obj) = obj else {
            return self.write(NULL_TAG);
        };

        if let Some(offset) = self.map.get(MapToken::Object(obj)) {
            // already stored: a 4-byte back-reference is all it takes
            return self.write(offset);
        }

        let cntpos = self.region.pos() as u32;
        self.write(0u32)?;
        self.write_class(registry, actual_class)?;
        // map before streaming so self references resolve
        self.map_token(MapToken::Object(obj), cntpos + MAP_OFFSET)?;
        registry.stream_write(actual_class, obj, self)?;
        self.set_byte_count(cntpos, false)
    }

    /// Writes an object held as a `declared` class, deriving its actual
    /// class through the registry.
    ///
    /// Returns [`WriteOutcome::Truncated`] when the actual class has no
    /// descriptor and the declared class was used verbatim.
    pub fn write_object_any(
        &mut self,
        registry: &dyn ClassRegistry,
        obj: Option<ObjectId>,
        declared: ClassId,
    ) -> Result<WriteOutcome, EncodeError> {
        let Some(id) = obj else {
            self.write(NULL_TAG)?;
            return Ok(WriteOutcome::Complete);
        };

        match registry.actual_class(declared, id) {
            Some(actual) => {
                self.write_object(registry, Some(id), actual)?;
                Ok(WriteOutcome::Complete)
            }
            None => {
                self.write_object(registry, Some(id), declared)?;
                Ok(WriteOutcome::Truncated)
            }
        }
    }

    /// Invokes a class's streamer directly, without any framing.
    pub fn stream_object(
        &mut self,
        registry: &dyn ClassRegistry,
        obj: ObjectId,
        class: ClassId,
    ) -> Result<(), EncodeError> {
        registry.stream_write(class, obj, self)
    }

    /// Streams an object under the class registered for `name`.
    pub fn stream_object_by_name(
        &mut self,
        registry: &dyn ClassRegistry,
        obj: ObjectId,
        name: &str,
    ) -> Result<(), EncodeError> {
        let class = registry
            .class_by_name(name)
            .ok_or_else(|| UnresolvedClassSnafu { name }.build())?;
        registry.stream_write(class, obj, self)
    }

    /// Streams an object under the class registered for its runtime type.
    pub fn stream_object_by_type_id(
        &mut self,
        registry: &dyn ClassRegistry,
        obj: ObjectId,
        type_id: std::any::TypeId,
    ) -> Result<(), EncodeError> {
        let class = registry
            .class_by_type_id(type_id)
            .ok_or_else(|| UnresolvedClassSnafu { name: format!("{type_id:?}") }.build())?;
        registry.stream_write(class, obj, self)
    }

    /// Writes a class version, optionally reserving 4 bytes for a packed
    /// byte count. Returns the position of the reserved count word for the
    /// later [`set_byte_count`](Self::set_byte_count) call.
    pub fn write_version(
        &mut self,
        registry: &dyn ClassRegistry,
        class: ClassId,
        use_bcnt: bool,
    ) -> Result<u32, EncodeError> {
        let mut cntpos = 0;
        if use_bcnt {
            cntpos = self.region.pos() as u32;
            self.write(0u32)?;
        }

        let mut version = registry.class_version(class);
        if version > MAX_VERSION {
            error!(
                message = "class version exceeds the wire maximum",
                class = registry.class_name(class),
                version,
                max = MAX_VERSION
            );
            version = MAX_VERSION;
        }
        self.write(version)?;
        Ok(cntpos)
    }

    /// Back-patches the byte count reserved at `cntpos` to the bytes
    /// written since, excluding the count word itself.
    ///
    /// With `pack_in_version` the count is written as two big-endian shorts
    /// with the high short OR'd with the version flag bit, so that a legacy
    /// reader still sees "a version with the flag bit set" in the first
    /// short.
    pub fn set_byte_count(&mut self, cntpos: u32, pack_in_version: bool) -> Result<(), EncodeError> {
        let cnt = self.region.pos() as u32 - cntpos - 4;

        if pack_in_version {
            let mut raw = [0u8; 4];
            raw[..2].copy_from_slice(&(((cnt >> 16) as u16) | BYTE_COUNT_VMASK).to_be_bytes());
            raw[2..].copy_from_slice(&(cnt as u16).to_be_bytes());
            self.region.patch(cntpos as usize, &raw);
        } else {
            self.region
                .patch(cntpos as usize, &(cnt | BYTE_COUNT_MASK).to_be_bytes());
        }

        self.check_count(cnt)
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WriteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("map_count", &self.map_count())
            .field("strict_counts", &self.strict_counts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_big_endian_on_the_wire() {
        let mut buf = WriteBuffer::new();
        buf.write(0x0102_0304i32).unwrap();
        buf.write(0x0506u16).unwrap();
        assert_eq!(buf.as_bytes(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn null_object_is_the_null_tag() {
        let mut buf = WriteBuffer::new();
        buf.write(NULL_TAG).unwrap();
        assert_eq!(buf.as_bytes(), &[0, 0, 0, 0]);
    }

    #[test]
    fn byte_count_word_carries_the_mask() {
        let mut buf = WriteBuffer::new();
        buf.write(0u32).unwrap();
        buf.write_raw(&[0u8; 12]).unwrap();
        buf.set_byte_count(0, false).unwrap();
        assert_eq!(&buf.as_bytes()[..4], &0x4000_000Cu32.to_be_bytes());
    }

    #[test]
    fn packed_byte_count_flags_the_high_short() {
        let mut buf = WriteBuffer::new();
        buf.write(0u32).unwrap();
        buf.write_raw(&[0u8; 0x0203 - 4]).unwrap();
        buf.set_byte_count(0, true).unwrap();
        // count 0x000001FF -> shorts 0x4000, 0x01FF
        assert_eq!(&buf.as_bytes()[..4], &[0x40, 0x00, 0x01, 0xFF]);
    }

    #[test]
    fn reset_rewinds_but_keeps_the_region() {
        let mut buf = WriteBuffer::new();
        buf.write(1u32).unwrap();
        let cap = buf.capacity();
        buf.reset();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), cap);
    }

    #[test]
    fn strict_counts_turn_overflow_into_an_error() {
        let options = BufferOptions {
            strict_counts: true,
            ..BufferOptions::default()
        };
        let buf = WriteBuffer::with_options(&options);
        assert!(matches!(
            buf.check_count(MAX_COUNT),
            Err(EncodeError::CountOverflow { .. })
        ));
        assert!(buf.check_count(MAX_COUNT - 1).is_ok());
    }

    #[test]
    fn lenient_counts_only_report() {
        let buf = WriteBuffer::new();
        assert!(buf.check_count(MAX_COUNT).is_ok());
    }
}
