use core::alloc::Layout;
use core::fmt;

/// The error type for `try_reserve` and `try_with_capacity_in`.
///
/// Both variants are reported before the table is touched, so a failed call
/// leaves the table exactly as it was.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TryReserveError {
    /// The requested bucket count does not fit the 32-bit bucket index, or the
    /// arena size overflows `isize::MAX` bytes.
    CapacityOverflow,

    /// The allocator could not provide the arena.
    AllocError {
        /// The layout of the allocation request that failed.
        layout: Layout,
    },
}

impl fmt::Display for TryReserveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryReserveError::CapacityOverflow => {
                f.write_str("requested capacity exceeds the maximum bucket count")
            }
            TryReserveError::AllocError { layout } => write!(
                f,
                "memory allocation of {} bytes (align {}) failed",
                layout.size(),
                layout.align()
            ),
        }
    }
}

impl core::error::Error for TryReserveError {}
