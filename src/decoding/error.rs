//! Errors raised while reading from a buffer.

use snafu::Snafu;

/// An error that occurred while decoding the wire format.
///
/// The buffer favors resumption over termination: unknown classes,
/// byte-count mismatches and wrong-class casts are `tracing` diagnostics
/// and parsing continues. The conditions below abort the current record.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DecodeError {
    /// A read would pass the end of the readable region.
    #[snafu(display(
        "read of {needed} bytes at offset {pos} passes the end of the buffer ({available} available)"
    ))]
    UnexpectedEof {
        /// Cursor position at the failed read.
        pos: usize,
        /// Bytes the read required.
        needed: usize,
        /// Bytes remaining before the readable watermark.
        available: usize,
    },

    /// A back-reference tag points outside the reference map.
    #[snafu(display("illegal tag {tag} (map holds {map_len} entries), buffer corrupted"))]
    CorruptTag {
        /// The offending tag, after displacement.
        tag: u32,
        /// Number of entries in the reference map.
        map_len: usize,
    },

    /// An incoming array is larger than the caller-provided destination.
    #[snafu(display(
        "incoming array of {incoming} elements does not fit destination of {capacity}"
    ))]
    StaticArrayOverflow {
        /// Element count declared on the wire.
        incoming: usize,
        /// Capacity of the destination slice.
        capacity: usize,
    },

    /// A class name could not be resolved where a descriptor was required.
    #[snafu(display("no class descriptor registered for {name:?}"))]
    UnresolvedClass {
        /// The unresolved class name.
        name: String,
    },

    /// A registry streamer or class loader failed.
    #[snafu(display("streamer failed: {source}"))]
    Streamer {
        /// The underlying registry error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DecodeError {
    /// Wraps a registry-side error for propagation out of a streamer.
    pub fn streamer(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        DecodeError::Streamer {
            source: source.into(),
        }
    }
}
