//! Common wire protocol types.

pub use zerocopy::byteorder::big_endian::{I32 as I32BE, U16 as U16BE, U32 as U32BE, U64 as U64BE};

/// Cursor identifier, unique within one session.
pub type CursorId = u32;

/// Largest prefetch or batch size; sizes travel as a positive i32.
pub const MAX_BATCH_SIZE: u32 = i32::MAX as u32;

/// How a cursor computes its batches.
///
/// Fixed for the lifetime of a cursor once it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FetchMode {
    /// Compute at most the requested number of rows per fetch.
    Lazy = b'L',
    /// Compute every remaining row on the first fetch, whatever size was requested.
    #[default]
    Eager = b'G',
}

impl FetchMode {
    /// Wire byte meaning "use the session default" in an Execute message.
    pub const SESSION_DEFAULT: u8 = b'D';

    /// Create a FetchMode from a raw byte value.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'L' => Some(FetchMode::Lazy),
            b'G' => Some(FetchMode::Eager),
            _ => None,
        }
    }

    /// Map the `lazy_query_execution` flag to a mode.
    pub fn from_lazy(lazy: bool) -> Self {
        if lazy { FetchMode::Lazy } else { FetchMode::Eager }
    }

    /// Returns true for [`FetchMode::Lazy`].
    pub fn is_lazy(self) -> bool {
        matches!(self, FetchMode::Lazy)
    }

    /// Upper bound on the rows computed by one fetch of `requested` rows.
    pub fn batch_limit(self, requested: u32) -> usize {
        match self {
            FetchMode::Lazy => requested as usize,
            FetchMode::Eager => usize::MAX,
        }
    }
}

impl std::fmt::Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchMode::Lazy => f.write_str("lazy"),
            FetchMode::Eager => f.write_str("eager"),
        }
    }
}
