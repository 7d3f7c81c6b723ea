//! Dual-mode byte buffers that marshal typed, possibly cyclic object graphs
//! into a self-describing big-endian wire format and reconstruct them on the
//! receiving end.
//!
//! A [`WriteBuffer`] serializes primitives, arrays, strings and whole object
//! graphs; a [`ReadBuffer`] parses them back. Repeated objects and class
//! descriptors are deduplicated through a per-buffer reference map, which is
//! also what makes back-edges and cycles expressible in a linear byte
//! stream: an object is registered in the map *before* its streamer runs, so
//! recursive encounters of the same object resolve to 4-byte back-reference
//! tags instead of recursing forever.
//!
//! Every framed object carries a leading byte count, letting a reader skip
//! records whose class dictionary is missing and validate that per-class
//! streamers consumed exactly the bytes they were supposed to. The class
//! registry, the per-class streamers and the enclosing container are
//! external collaborators reached through the contracts in [`registry`].

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod frame;
mod marshal;
mod refmap;
mod storage;

pub mod decoding;
pub mod encoding;
pub mod registry;

#[cfg(test)]
mod test;

pub use config::BufferOptions;
pub use decoding::{ClassOutcome, DecodeError, ReadBuffer};
pub use encoding::{EncodeError, WriteBuffer};
pub use frame::{
    FrameWord, BYTE_COUNT_MASK, BYTE_COUNT_VMASK, CLASS_MASK, LEGACY_WIDE_VERSION, MAP_OFFSET,
    MAX_COUNT, MAX_VERSION, NEW_CLASS_TAG, NULL_TAG,
};
pub use marshal::Marshal;
pub use refmap::{default_map_capacity, set_default_map_capacity, DEFAULT_MAP_CAPACITY};
pub use registry::{ClassId, ClassRegistry, MapToken, ObjectId, StreamParent, WriteOutcome};
