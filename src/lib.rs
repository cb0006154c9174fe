#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

/// A string-keyed hash table backed by separately-chained buckets.
///
/// This module provides the table itself, its entry API, and the error type
/// reported by the fallible insertion paths.
pub mod hash_table;

/// Occupancy statistics and diagnostic reporting types.
pub mod stats;

pub use hash_table::Entry;
pub use hash_table::HashTable;
pub use hash_table::OccupiedEntry;
pub use hash_table::TableError;
pub use hash_table::TableOp;
pub use hash_table::VacantEntry;
pub use stats::ChainLengths;
pub use stats::TableStats;
