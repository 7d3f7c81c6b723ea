//! Reference maps: the per-buffer bookkeeping that makes shared objects and
//! cycles expressible in a linear byte stream.
//!
//! The write direction maps an identity to the buffer offset where its
//! payload was first written; the read direction maps an offset (or, for
//! streams predating byte-count framing, a running index) back to the
//! reconstructed identity. Both are created lazily on first use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::registry::MapToken;

/// Default initial capacity of a reference map. Prime, so the table
/// distributes well before its first resize.
pub const DEFAULT_MAP_CAPACITY: usize = 503;

static GLOBAL_MAP_CAPACITY: AtomicUsize = AtomicUsize::new(DEFAULT_MAP_CAPACITY);

/// Returns the process-wide default reference-map capacity.
pub fn default_map_capacity() -> usize {
    GLOBAL_MAP_CAPACITY.load(Ordering::Relaxed)
}

/// Sets the process-wide default reference-map capacity.
///
/// Intended to be called once during initialization, before buffers are
/// created. Larger values help when streaming many small objects; primes
/// give the fewest collisions.
pub fn set_default_map_capacity(capacity: usize) {
    GLOBAL_MAP_CAPACITY.store(capacity.max(1), Ordering::Relaxed);
}

/// Entry in the read-direction map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Slot 0: the null object.
    Null,
    /// Recorded but not yet materialized; the record was skipped as part of
    /// a skipped outer object and is parsed lazily on first reference.
    Pending,
    /// Known to be unresolvable: the class dictionary is missing.
    Unavailable,
    /// A reconstructed identity.
    Token(MapToken),
}

/// Write-direction map: identity to biased buffer offset.
#[derive(Debug)]
pub(crate) struct WriteRefMap {
    entries: Option<HashMap<MapToken, u32>>,
    capacity: usize,
}

impl WriteRefMap {
    pub(crate) fn new(capacity: usize) -> Self {
        WriteRefMap {
            entries: None,
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Adjusts the initial capacity. Must run before the map is first used.
    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        assert!(
            self.entries.is_none(),
            "map parameters must be set before the first object is mapped"
        );
        self.capacity = capacity;
    }

    fn init(&mut self) -> &mut HashMap<MapToken, u32> {
        let capacity = self.capacity;
        self.entries
            .get_or_insert_with(|| HashMap::with_capacity(capacity))
    }

    pub(crate) fn add(&mut self, key: MapToken, offset: u32) {
        self.init().insert(key, offset);
    }

    pub(crate) fn get(&self, key: MapToken) -> Option<u32> {
        self.entries.as_ref()?.get(&key).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, HashMap::len)
    }

    /// Drops the map; the next use rebuilds it from scratch.
    pub(crate) fn reset(&mut self) {
        self.entries = None;
    }
}

/// Read-direction map: biased offset (or legacy running index) to slot.
#[derive(Debug)]
pub(crate) struct ReadRefMap {
    entries: Option<HashMap<u32, Slot>>,
    capacity: usize,
}

impl ReadRefMap {
    pub(crate) fn new(capacity: usize) -> Self {
        ReadRefMap {
            entries: None,
            capacity,
        }
    }

    /// Adjusts the initial capacity. Must run before the map is first used.
    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        assert!(
            self.entries.is_none(),
            "map parameters must be set before the first object is mapped"
        );
        self.capacity = capacity;
    }

    /// Builds the map if needed, seeding slot 0 with the null entry.
    pub(crate) fn init(&mut self) {
        if self.entries.is_none() {
            let mut entries = HashMap::with_capacity(self.capacity);
            entries.insert(0, Slot::Null);
            self.entries = Some(entries);
        }
    }

    pub(crate) fn insert(&mut self, tag: u32, slot: Slot) {
        self.init();
        if let Some(entries) = self.entries.as_mut() {
            entries.insert(tag, slot);
        }
    }

    /// Inserts at the next running index; how streams without byte-count
    /// framing key their entries.
    pub(crate) fn insert_next(&mut self, slot: Slot) -> u32 {
        self.init();
        let tag = self.len() as u32;
        self.insert(tag, slot);
        tag
    }

    pub(crate) fn get(&self, tag: u32) -> Option<Slot> {
        self.entries.as_ref()?.get(&tag).copied()
    }

    pub(crate) fn remove(&mut self, tag: u32) -> Option<Slot> {
        self.entries.as_mut()?.remove(&tag)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, HashMap::len)
    }

    /// Drops the map; the next use rebuilds it from scratch.
    pub(crate) fn reset(&mut self) {
        self.entries = None;
    }
}
