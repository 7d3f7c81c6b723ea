//! Errors raised while writing into a buffer.

use snafu::Snafu;

/// An error that occurred while encoding into the wire format.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EncodeError {
    /// A write would pass the end of a fixed (non-growable) region.
    #[snafu(display(
        "write of {needed} bytes at offset {pos} passes the end of a fixed region of {capacity}"
    ))]
    RegionFull {
        /// Cursor position at the failed write.
        pos: usize,
        /// Bytes the write required.
        needed: usize,
        /// Capacity of the fixed region.
        capacity: usize,
    },

    /// An offset or byte count exceeds the wire maximum of `0x3FFFFFFE`.
    ///
    /// Only raised with strict counts enabled; otherwise the overflow is a
    /// diagnostic and the write proceeds.
    #[snafu(display("offset or byte count {count:#x} exceeds the wire maximum 0x3FFFFFFE"))]
    CountOverflow {
        /// The overflowing offset or count.
        count: u32,
    },

    /// A class name could not be resolved where a descriptor was required.
    #[snafu(display("no class descriptor registered for {name:?}"))]
    UnresolvedClass {
        /// The unresolved class name.
        name: String,
    },

    /// A registry streamer or class store failed.
    #[snafu(display("streamer failed: {source}"))]
    Streamer {
        /// The underlying registry error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl EncodeError {
    /// Wraps a registry-side error for propagation out of a streamer.
    pub fn streamer(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        EncodeError::Streamer {
            source: source.into(),
        }
    }
}
