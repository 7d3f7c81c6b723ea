//! Buffer construction options.

use serde::{Deserialize, Serialize};

use crate::refmap::default_map_capacity;
use crate::storage::INITIAL_CAPACITY;

/// Options for building a `ReadBuffer` or `WriteBuffer`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferOptions {
    /// Nominal capacity of a freshly allocated region, in bytes.
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// Initial entry capacity of the reference map.
    ///
    /// Larger values help when streaming many small objects; primes give
    /// the fewest collisions. Defaults to the process-wide setting.
    #[serde(default = "default_map_capacity")]
    pub map_capacity: usize,

    /// Whether offset and byte-count overflows abort the write instead of
    /// only being reported.
    #[serde(default)]
    pub strict_counts: bool,
}

const fn default_initial_capacity() -> usize {
    INITIAL_CAPACITY
}

impl Default for BufferOptions {
    fn default() -> Self {
        BufferOptions {
            initial_capacity: default_initial_capacity(),
            map_capacity: default_map_capacity(),
            strict_counts: false,
        }
    }
}
