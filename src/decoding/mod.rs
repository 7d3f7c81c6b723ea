//! Read-mode buffer: parses the self-describing wire format back into
//! primitives, arrays, strings and object graphs.

mod arrays;
pub(crate) mod error;

use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;
use snafu::ensure;
use tracing::instrument;

pub use self::error::DecodeError;
use self::error::{CorruptTagSnafu, UnexpectedEofSnafu, UnresolvedClassSnafu};
use crate::config::BufferOptions;
use crate::frame::{
    FrameWord, BYTE_COUNT_MASK, BYTE_COUNT_VMASK, LEGACY_WIDE_VERSION, MAP_OFFSET,
};
use crate::marshal::Marshal;
use crate::refmap::{ReadRefMap, Slot};
use crate::registry::{ClassId, ClassRegistry, MapToken, ObjectId, StreamParent};
use crate::storage::ByteRegion;

/// Outcome of reading a class tag.
///
/// The wire overloads the word in class position three ways; decoding
/// yields one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassOutcome {
    /// A resolved class descriptor opening a fresh object payload.
    Class {
        /// The resolved class.
        class: ClassId,
        /// Byte count of the enclosing record; 0 for legacy layouts.
        bcnt: u32,
    },
    /// The class dictionary is missing; the record must be skipped via its
    /// byte count.
    Unavailable {
        /// Byte count of the enclosing record; 0 for legacy layouts.
        bcnt: u32,
    },
    /// The word was no class tag at all but an object back-reference
    /// (legacy streams write bare object tags where a class is expected).
    ObjectRef {
        /// The raw object tag.
        tag: u32,
    },
}

/// Read-mode deserialization buffer.
///
/// A `ReadBuffer` represents a single in-progress deserialization over a
/// sized memory region. The cursor advances monotonically except for the
/// explicit seek performed to lazily materialize an object that was skipped
/// inside an outer skipped record.
pub struct ReadBuffer {
    region: ByteRegion,
    map: ReadRefMap,
    parent: Option<Arc<dyn StreamParent>>,
    /// Additive correction applied to incoming back-reference tags when
    /// this buffer is read as a sub-range of a larger stream.
    displacement: i32,
    /// Latched once a byte-count word is seen; gates offset-keyed (modern)
    /// versus index-keyed (legacy) reference-map addressing.
    saw_bcnt_framing: bool,
}

impl ReadBuffer {
    /// Creates a reader over the given region with default options.
    pub fn new(data: BytesMut) -> Self {
        Self::with_options(data, &BufferOptions::default())
    }

    /// Creates a reader over the given region.
    pub fn with_options(data: BytesMut, options: &BufferOptions) -> Self {
        ReadBuffer {
            region: ByteRegion::adopt(data, 0, false),
            map: ReadRefMap::new(options.map_capacity),
            parent: None,
            displacement: 0,
            saw_bcnt_framing: false,
        }
    }

    /// Creates a reader over a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(BytesMut::from(data))
    }

    pub(crate) fn from_parts(
        region: ByteRegion,
        map_capacity: usize,
        parent: Option<Arc<dyn StreamParent>>,
    ) -> Self {
        ReadBuffer {
            region,
            map: ReadRefMap::new(map_capacity),
            parent,
            displacement: 0,
            saw_bcnt_framing: false,
        }
    }

    /// Current cursor position.
    pub fn len(&self) -> usize {
        self.region.pos()
    }

    /// Whether the cursor is still at the start.
    pub fn is_empty(&self) -> bool {
        self.region.pos() == 0
    }

    /// Nominal capacity of the region.
    pub fn capacity(&self) -> usize {
        self.region.capacity()
    }

    /// Bytes left before the readable watermark.
    pub fn remaining(&self) -> usize {
        self.region.remaining()
    }

    /// Replaces the byte region, resetting the cursor to 0. A `size` of 0
    /// uses the region's own length.
    pub fn set_region(&mut self, region: BytesMut, size: usize) {
        self.region.set_region(region, size, false);
    }

    /// The enclosing container, if any.
    pub fn parent(&self) -> Option<&Arc<dyn StreamParent>> {
        self.parent.as_ref()
    }

    /// Attaches the enclosing container supplying the format version.
    pub fn set_parent(&mut self, parent: Option<Arc<dyn StreamParent>>) {
        self.parent = parent;
    }

    /// The additive correction applied to incoming back-reference tags.
    pub fn displacement(&self) -> i32 {
        self.displacement
    }

    /// Sets the back-reference displacement; used when a buffer is read as
    /// a relocated sub-range of a larger stream.
    pub fn set_displacement(&mut self, displacement: i32) {
        self.displacement = displacement;
    }

    /// Whether a byte-count word has been seen yet.
    pub fn byte_count_framing(&self) -> bool {
        self.saw_bcnt_framing
    }

    /// Number of entries in the reference map.
    pub fn map_count(&self) -> usize {
        self.map.len()
    }

    /// Adjusts the reference map's initial capacity. Must be called before
    /// the first read maps anything.
    pub fn set_map_capacity(&mut self, capacity: usize) {
        self.map.set_capacity(capacity);
    }

    /// Drops the reference map and clears the displacement; the byte
    /// cursor is left alone.
    pub fn reset_map(&mut self) {
        self.map.reset();
        self.displacement = 0;
    }

    fn legacy_wide(&self) -> bool {
        self.parent
            .as_ref()
            .is_some_and(|p| p.format_version() < LEGACY_WIDE_VERSION)
    }

    /// Reads one fixed-width primitive from its big-endian wire form.
    pub fn read<T: Marshal>(&mut self) -> Result<T, DecodeError> {
        Ok(T::get(self.region.take(T::WIDTH)?))
    }

    /// Copies up to `dst.len()` bytes from the cursor, returning the number
    /// of bytes actually read.
    pub fn read_raw(&mut self, dst: &mut [u8]) -> usize {
        self.region.read_raw(dst)
    }

    /// Reads a wide integer, honoring the container's format-version gate:
    /// legacy containers stream the full 64-bit host value, modern ones the
    /// 32-bit wire form (sign-extended here).
    pub fn read_wide(&mut self) -> Result<i64, DecodeError> {
        if self.legacy_wide() {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(self.region.take(8)?);
            Ok(i64::from_be_bytes(raw))
        } else {
            Ok(i64::from(self.read::<i32>()?))
        }
    }

    /// Reads a null-terminated string.
    ///
    /// Reads until the first zero byte or until `max - 1` bytes, whichever
    /// comes first; `None` removes the limit. The zero byte, when reached,
    /// is consumed.
    pub fn read_string(&mut self, max: Option<usize>) -> Result<String, DecodeError> {
        let limit = match max {
            Some(m) => m.saturating_sub(1),
            None => usize::MAX,
        };
        let window = self.region.lookahead();
        let scan = window.len().min(limit);
        let (len, consumed) = match memchr::memchr(0, &window[..scan]) {
            Some(i) => (i, i + 1),
            None if scan == limit => (scan, scan),
            None => {
                return UnexpectedEofSnafu {
                    pos: self.region.pos(),
                    needed: scan + 1,
                    available: window.len(),
                }
                .fail()
            }
        };
        let s = String::from_utf8_lossy(&window[..len]).into_owned();
        self.region.skip(consumed);
        Ok(s)
    }

    /// Reads a bare class version, skipping over a packed byte count if one
    /// is present.
    pub fn read_version(&mut self) -> Result<u16, DecodeError> {
        let first = self.read::<u16>()?;
        if first & BYTE_COUNT_VMASK != 0 {
            // the two shorts were a packed byte count; the version follows
            let _low = self.read::<u16>()?;
            return self.read::<u16>();
        }
        Ok(first)
    }

    /// Reads a class version together with its packed byte count.
    ///
    /// Returns `(version, startpos, bcnt)`. Old streams stored only the
    /// bare version; they yield a `bcnt` of 0 and cost a net two bytes.
    pub fn read_version_with_count(&mut self) -> Result<(u16, u32, u32), DecodeError> {
        let startpos = self.region.pos() as u32;
        let word = self.read::<u32>()?;
        let bcnt = if word & BYTE_COUNT_MASK == 0 {
            // no byte count: back up and reread the word as the version
            self.region.seek(startpos as usize);
            0
        } else {
            word & !BYTE_COUNT_MASK
        };
        let version = self.read::<u16>()?;
        Ok((version, startpos, bcnt))
    }

    /// Reads a class tag: a fresh descriptor, a back-reference to one, or
    /// the bare object tag of a legacy stream.
    ///
    /// `expected` cross-checks that the resolved class inherits from the
    /// requested one; a mismatch is reported and parsing continues.
    pub fn read_class(
        &mut self,
        registry: &mut dyn ClassRegistry,
        expected: Option<ClassId>,
    ) -> Result<ClassOutcome, DecodeError> {
        self.map.init();

        // read byte count and/or tag (older streams carry no count)
        let first = self.read::<u32>()?;
        let (raw_tag, bcnt, startpos) = match FrameWord::decode(first) {
            FrameWord::ByteCount(bcnt) => {
                self.saw_bcnt_framing = true;
                let startpos = self.region.pos() as u32;
                (self.read::<u32>()?, bcnt, startpos)
            }
            _ => (first, 0, 0),
        };

        let class = match FrameWord::decode(raw_tag) {
            // the word in class position is the object tag itself
            FrameWord::Null | FrameWord::ObjectRef(_) | FrameWord::ByteCount(_) => {
                return Ok(ClassOutcome::ObjectRef { tag: raw_tag });
            }

            FrameWord::NewClass => {
                // a fresh descriptor follows; unresolvable ones still occupy
                // their map slot so later back-references find the sentinel
                let class = registry.load_class(self)?;
                let slot = match class {
                    Some(c) => Slot::Token(MapToken::Class(c)),
                    None => Slot::Unavailable,
                };
                if self.saw_bcnt_framing {
                    if self.map.get(startpos + MAP_OFFSET) != Some(slot) {
                        self.map.insert(startpos + MAP_OFFSET, slot);
                    }
                } else {
                    self.map.insert_next(slot);
                }
                class
            }

            FrameWord::ClassRef(offset) => {
                let mut cl_tag = offset;
                if self.saw_bcnt_framing {
                    cl_tag = cl_tag.wrapping_add(self.displacement as u32);
                    cl_tag = self.check_object(registry, cl_tag, expected, true)?;
                } else {
                    ensure!(
                        cl_tag != 0 && (cl_tag as usize) <= self.map.len(),
                        CorruptTagSnafu {
                            tag: cl_tag,
                            map_len: self.map.len()
                        }
                    );
                }
                match self.map.get(cl_tag) {
                    Some(Slot::Token(MapToken::Class(c))) => Some(c),
                    _ => None,
                }
            }
        };

        if let (Some(class), Some(expected)) = (class, expected) {
            if !registry.inherits_from(class, expected) {
                error!(
                    message = "got wrong class",
                    class = registry.class_name(class),
                    expected = registry.class_name(expected)
                );
            }
        }

        Ok(match class {
            Some(class) => ClassOutcome::Class { class, bcnt },
            None => ClassOutcome::Unavailable { bcnt },
        })
    }

    /// Checks a back-reference against the reference map, lazily
    /// materializing entries that were skipped inside an outer record.
    ///
    /// Offset 0 is the null object and passes straight through. A slot that
    /// is still pending saves the cursor, seeks back to where the record
    /// was written, parses it recursively, then restores the cursor. An
    /// unresolvable record yields 0.
    #[instrument(skip_all, level = "trace")]
    pub fn check_object(
        &mut self,
        registry: &mut dyn ClassRegistry,
        offset: u32,
        expected: Option<ClassId>,
        read_class: bool,
    ) -> Result<u32, DecodeError> {
        if offset == 0 {
            return Ok(0);
        }

        match self.map.get(offset) {
            Some(Slot::Unavailable) => Ok(0),
            Some(Slot::Null) | Some(Slot::Token(_)) => Ok(offset),
            Some(Slot::Pending) | None => {
                // skipped as part of a skipped object; materialize it now
                let back = MAP_OFFSET as usize + if read_class { 4 } else { 0 };
                let target = (offset as usize)
                    .checked_sub(back)
                    .filter(|&t| t <= self.region.watermark());
                let Some(target) = target else {
                    return CorruptTagSnafu {
                        tag: offset,
                        map_len: self.map.len(),
                    }
                    .fail();
                };

                let saved = self.region.pos();
                self.region.seek(target);
                let resolved = if read_class {
                    matches!(
                        self.read_class(registry, expected)?,
                        ClassOutcome::Class { .. } | ClassOutcome::ObjectRef { .. }
                    )
                } else {
                    self.read_object_any(registry, expected)?.is_some()
                };
                self.region.seek(saved);

                if !resolved {
                    // mark as really not available
                    self.map.remove(offset);
                    self.map.insert(offset, Slot::Unavailable);
                    warn!(
                        message = "reference to unavailable class, pointers of this type will be null",
                        expected = ?expected.map(|c| registry.class_name(c).to_owned())
                    );
                    return Ok(0);
                }
                Ok(offset)
            }
        }
    }

    /// Reads an object without a requested cast class.
    pub fn read_object(
        &mut self,
        registry: &mut dyn ClassRegistry,
    ) -> Result<Option<ObjectId>, DecodeError> {
        self.read_object_any(registry, None)
    }

    /// Reads an object, optionally cross-checked against a requested cast
    /// class.
    ///
    /// Returns `Ok(None)` for the null object, for records whose class
    /// dictionary is missing (the record is skipped through its byte
    /// count), and for construction failures. Objects are registered in the
    /// reference map *before* their streamer runs, which is what resolves
    /// cycles and self-references.
    #[instrument(skip_all, level = "trace")]
    pub fn read_object_any(
        &mut self,
        registry: &mut dyn ClassRegistry,
        cast: Option<ClassId>,
    ) -> Result<Option<ObjectId>, DecodeError> {
        self.map.init();

        let startpos = self.region.pos() as u32;

        match self.read_class(registry, cast)? {
            ClassOutcome::Class { class, bcnt } => {
                if let Some(cast) = cast {
                    if registry.base_class_offset(class, cast).is_none() {
                        // not a subclass of the request; fall back to the
                        // class's own layout
                        error!(
                            message = "got object of wrong class",
                            class = registry.class_name(class),
                            requested = registry.class_name(cast)
                        );
                    }
                }

                // the object may have been read already when this record is
                // re-entered through check_object
                if self.saw_bcnt_framing {
                    if let Some(Slot::Token(MapToken::Object(obj))) =
                        self.map.get(startpos + MAP_OFFSET)
                    {
                        self.check_byte_count(startpos, bcnt, None);
                        return Ok(Some(obj));
                    }
                }

                let Some(obj) = registry.construct(class) else {
                    error!(
                        message = "could not create object",
                        class = registry.class_name(class)
                    );
                    return Ok(None);
                };

                // map before streaming so self references resolve
                if self.saw_bcnt_framing {
                    self.map
                        .insert(startpos + MAP_OFFSET, Slot::Token(MapToken::Object(obj)));
                } else {
                    self.map.insert_next(Slot::Token(MapToken::Object(obj)));
                }

                registry.stream_read(class, obj, self)?;

                let name = registry.class_name(class);
                self.check_byte_count(startpos, bcnt, Some(name));
                Ok(Some(obj))
            }

            ClassOutcome::Unavailable { bcnt } => {
                // unknown class: leave a sentinel and skip to the next record
                if self.saw_bcnt_framing {
                    self.map.insert(startpos + MAP_OFFSET, Slot::Unavailable);
                } else {
                    self.map.insert_next(Slot::Pending);
                }
                self.check_byte_count(startpos, bcnt, None);
                Ok(None)
            }

            ClassOutcome::ObjectRef { tag } => {
                let tag = if self.saw_bcnt_framing {
                    let tag = tag.wrapping_add(self.displacement as u32);
                    self.check_object(registry, tag, cast, false)?
                } else {
                    ensure!(
                        (tag as usize) <= self.map.len(),
                        CorruptTagSnafu {
                            tag,
                            map_len: self.map.len()
                        }
                    );
                    tag
                };
                match self.map.get(tag) {
                    Some(Slot::Token(MapToken::Object(obj))) => Ok(Some(obj)),
                    _ => Ok(None),
                }
            }
        }
    }

    /// Validates that the bytes consumed since `startpos` match the
    /// declared count.
    ///
    /// A zero count (legacy stream) is a no-op. On mismatch the problem is
    /// reported with the class name and the cursor is forcibly repositioned
    /// to the declared endpoint so subsequent reads stay aligned. Returns
    /// the signed delta (negative: read too few, positive: read too many).
    pub fn check_byte_count(&mut self, startpos: u32, bcnt: u32, class: Option<&str>) -> i64 {
        if bcnt == 0 {
            return 0;
        }

        let endpos = startpos as usize + bcnt as usize + 4;
        let delta = self.region.pos() as i64 - endpos as i64;
        if delta != 0 {
            if let Some(name) = class {
                if delta < 0 {
                    error!(
                        message = "object read too few bytes",
                        class = name,
                        read = bcnt as i64 + delta,
                        expected = bcnt
                    );
                } else {
                    error!(
                        message = "object read too many bytes",
                        class = name,
                        read = bcnt as i64 + delta,
                        expected = bcnt
                    );
                }
                warn!(
                    message = "streamer not in sync with wire data, fix streamer",
                    class = name
                );
            }
            self.region.seek(endpos.min(self.region.watermark()));
        }
        delta
    }

    /// Invokes a class's streamer directly, without any framing.
    pub fn stream_object(
        &mut self,
        registry: &mut dyn ClassRegistry,
        obj: ObjectId,
        class: ClassId,
    ) -> Result<(), DecodeError> {
        registry.stream_read(class, obj, self)
    }

    /// Streams an object under the class registered for `name`.
    pub fn stream_object_by_name(
        &mut self,
        registry: &mut dyn ClassRegistry,
        obj: ObjectId,
        name: &str,
    ) -> Result<(), DecodeError> {
        let class = registry
            .class_by_name(name)
            .ok_or_else(|| UnresolvedClassSnafu { name }.build())?;
        registry.stream_read(class, obj, self)
    }

    /// Streams an object under the class registered for its runtime type.
    pub fn stream_object_by_type_id(
        &mut self,
        registry: &mut dyn ClassRegistry,
        obj: ObjectId,
        type_id: std::any::TypeId,
    ) -> Result<(), DecodeError> {
        let class = registry
            .class_by_type_id(type_id)
            .ok_or_else(|| UnresolvedClassSnafu { name: format!("{type_id:?}") }.build())?;
        registry.stream_read(class, obj, self)
    }
}

impl fmt::Debug for ReadBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("map_count", &self.map_count())
            .field("displacement", &self.displacement)
            .field("byte_count_framing", &self.saw_bcnt_framing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::WriteBuffer;

    #[test]
    fn scalar_roundtrip_preserves_cursor_parity() {
        let mut writer = WriteBuffer::new();
        writer.write(true).unwrap();
        writer.write(-7i8).unwrap();
        writer.write(0x1234i16).unwrap();
        writer.write(-56_789_012i32).unwrap();
        writer.write(2.5f32).unwrap();
        writer.write(-1.25e-3f64).unwrap();
        let written = writer.len();

        let mut reader = writer.into_reader();
        assert!(reader.read::<bool>().unwrap());
        assert_eq!(reader.read::<i8>().unwrap(), -7);
        assert_eq!(reader.read::<i16>().unwrap(), 0x1234);
        assert_eq!(reader.read::<i32>().unwrap(), -56_789_012);
        assert_eq!(reader.read::<f32>().unwrap(), 2.5);
        assert_eq!(reader.read::<f64>().unwrap(), -1.25e-3);
        assert_eq!(reader.len(), written);
    }

    #[test]
    fn reading_past_the_end_is_an_error() {
        let mut reader = ReadBuffer::from_slice(&[0, 0]);
        assert!(matches!(
            reader.read::<u32>(),
            Err(DecodeError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn string_roundtrip() {
        let mut writer = WriteBuffer::new();
        writer.write_string("persistent").unwrap();
        writer.write(0xABu8).unwrap();

        let mut reader = writer.into_reader();
        assert_eq!(reader.read_string(None).unwrap(), "persistent");
        assert_eq!(reader.read::<u8>().unwrap(), 0xAB);
    }

    #[test]
    fn read_string_honors_the_limit() {
        let mut reader = ReadBuffer::from_slice(b"abcdef\0");
        // room for 3 characters plus the terminator
        assert_eq!(reader.read_string(Some(4)).unwrap(), "abc");
        // the unread tail is still there
        assert_eq!(reader.read_string(None).unwrap(), "def");
    }

    #[test]
    fn read_string_unbounded_stops_at_the_terminator() {
        let mut reader = ReadBuffer::from_slice(b"x\0y\0");
        assert_eq!(reader.read_string(None).unwrap(), "x");
        assert_eq!(reader.read_string(None).unwrap(), "y");
    }

    #[test]
    fn read_version_skips_a_packed_count() {
        // packed count 0x00010203 flagged in the high short, then version 3
        let bytes = [0x40, 0x01, 0x02, 0x03, 0x00, 0x03];
        let mut reader = ReadBuffer::from_slice(&bytes);
        assert_eq!(reader.read_version().unwrap(), 3);
    }

    #[test]
    fn read_version_takes_a_bare_version_as_is() {
        let mut reader = ReadBuffer::from_slice(&[0x00, 0x07]);
        assert_eq!(reader.read_version().unwrap(), 7);
    }

    #[test]
    fn read_version_with_count_handles_both_layouts() {
        let framed = [0x40, 0x01, 0x02, 0x03, 0x00, 0x03];
        let mut reader = ReadBuffer::from_slice(&framed);
        assert_eq!(
            reader.read_version_with_count().unwrap(),
            (3, 0, 0x0001_0203)
        );

        // legacy: a bare version costs a net two bytes
        let bare = [0x00, 0x09, 0xAA, 0xBB];
        let mut reader = ReadBuffer::from_slice(&bare);
        assert_eq!(reader.read_version_with_count().unwrap(), (9, 0, 0));
        assert_eq!(reader.len(), 2);
    }

    #[test]
    fn wide_integers_default_to_the_modern_form() {
        let mut writer = WriteBuffer::new();
        writer.write_wide(-40_000).unwrap();
        assert_eq!(writer.len(), 4);
        let mut reader = writer.into_reader();
        assert_eq!(reader.read_wide().unwrap(), -40_000);
    }
}
