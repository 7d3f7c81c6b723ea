//! Contracts between the buffer and its external collaborators.
//!
//! The buffer never owns the objects it streams and never understands their
//! layout. Everything class-shaped is delegated: a [`ClassRegistry`]
//! resolves descriptors, constructs instances and drives the per-class
//! streamers; a [`StreamParent`] supplies the format version of the
//! enclosing container. Identities are opaque handles allocated by the
//! registry's own object store, so the reference map never holds raw
//! addresses.

use std::any::TypeId;

use crate::decoding::{DecodeError, ReadBuffer};
use crate::encoding::{EncodeError, WriteBuffer};

/// Stable identity of a live object, allocated by the registry.
///
/// The buffer stores these in its reference map with no lifetime obligation;
/// keeping them valid for the duration of a serialization pass is the
/// registry's business.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// Identity of a class descriptor within the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

/// An identity recorded in a reference map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MapToken {
    /// A live object.
    Object(ObjectId),
    /// A class descriptor.
    Class(ClassId),
}

/// Result of [`WriteBuffer::write_object_any`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The object was written under its actual class.
    Complete,
    /// The actual class could not be derived; the declared class was used
    /// verbatim and any derived-class state was dropped.
    Truncated,
}

/// Enclosing container able to report the format version of the stream this
/// buffer belongs to.
///
/// The only consumer is the wide-integer codec: versions below
/// [`LEGACY_WIDE_VERSION`](crate::LEGACY_WIDE_VERSION) select the legacy
/// host-width representation. A buffer without a parent is modern.
pub trait StreamParent {
    /// Format version of the enclosing container.
    fn format_version(&self) -> i32;
}

/// Resolves class descriptors and drives per-class serialization.
///
/// Methods taking `&mut self` are the ones that touch the registry's object
/// store: constructing instances and streaming fields into them. The
/// read-direction entry points on [`ReadBuffer`] therefore take the registry
/// mutably, and a streamer implementation reads nested objects by passing
/// itself back in:
///
/// ```ignore
/// fn stream_read(&mut self, class: ClassId, obj: ObjectId, buf: &mut ReadBuffer)
///     -> Result<(), DecodeError>
/// {
///     let value = buf.read::<i32>()?;
///     let child = buf.read_object_any(self, None)?;
///     // ...store value and child into obj...
///     Ok(())
/// }
/// ```
pub trait ClassRegistry {
    /// Resolves a class by name.
    fn class_by_name(&self, name: &str) -> Option<ClassId>;

    /// Resolves a class by the runtime type of its instances.
    fn class_by_type_id(&self, type_id: TypeId) -> Option<ClassId>;

    /// Name of a class.
    fn class_name(&self, class: ClassId) -> &str;

    /// Stream version of a class, as written by `write_version`.
    fn class_version(&self, class: ClassId) -> u16;

    /// Whether `class` is `base` or inherits from it.
    fn inherits_from(&self, class: ClassId, base: ClassId) -> bool;

    /// Offset of the `base` subobject within `class`, or `None` when `base`
    /// is not a base of `class`.
    fn base_class_offset(&self, class: ClassId, base: ClassId) -> Option<isize>;

    /// Most-derived class of `obj`, given that it is held as a `declared`.
    /// `None` means the actual class has no descriptor.
    fn actual_class(&self, declared: ClassId, obj: ObjectId) -> Option<ClassId>;

    /// Constructs a default instance. `None` reports an allocation failure.
    fn construct(&mut self, class: ClassId) -> Option<ObjectId>;

    /// Writes the descriptor payload that follows a new-class tag,
    /// typically the class name.
    fn store_class(&self, class: ClassId, buf: &mut WriteBuffer) -> Result<(), EncodeError>;

    /// Reads the payload written by `store_class` and resolves it.
    ///
    /// `Ok(None)` means the dictionary has no such class; implementations
    /// should emit a diagnostic naming it, since the buffer no longer can.
    fn load_class(&mut self, buf: &mut ReadBuffer) -> Result<Option<ClassId>, DecodeError>;

    /// Per-class streamer, write direction: serializes the fields of `obj`.
    fn stream_write(
        &self,
        class: ClassId,
        obj: ObjectId,
        buf: &mut WriteBuffer,
    ) -> Result<(), EncodeError>;

    /// Per-class streamer, read direction: populates the fields of `obj`.
    fn stream_read(
        &mut self,
        class: ClassId,
        obj: ObjectId,
        buf: &mut ReadBuffer,
    ) -> Result<(), DecodeError>;
}
