#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Error types returned by the fallible allocation APIs.
pub mod error;

/// A HashMap built on the main-position table.
///
/// This module provides a `HashMap` that wraps the `HashTable` and provides
/// a standard key-value map interface with configurable hashers.
pub mod hash_map;

/// The raw main-position table behind the map and set.
pub mod hash_table;

/// A hash set built on the main-position table.
///
/// This module provides a `HashSet` that wraps the `HashTable` and provides
/// a standard set interface with configurable hashers.
pub mod hash_set;

pub use error::TryReserveError;
pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_set::HashSet;
pub use hash_table::HashTable;
pub use hash_table::MIN_BUCKETS;

cfg_if::cfg_if! {
    if #[cfg(feature = "load-factor-ninety-eight")] {
        /// Maximum load factor a new table starts with.
        pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.98;
    } else if #[cfg(feature = "load-factor-ninety")] {
        /// Maximum load factor a new table starts with.
        pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.90;
    } else {
        /// Maximum load factor a new table starts with.
        pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.80;
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// Hasher builder used when none is named.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// Hasher builder used when none is named.
        pub type DefaultHashBuilder = std::hash::RandomState;
    } else {
        /// Placeholder for builds without a default hasher. Maps must be
        /// created with an explicit hasher builder.
        pub enum DefaultHashBuilder {}
    }
}
