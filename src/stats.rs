use std::fmt;

/// Chain-length distribution over the occupied buckets of a table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainLengths {
    /// Shortest non-empty chain.
    pub min: usize,
    /// Longest chain.
    pub max: usize,
    /// Mean chain length over occupied buckets.
    pub avg: f64,
}

/// A point-in-time snapshot of a table's occupancy, captured by
/// [`HashTable::stats`].
///
/// Diagnostic only: the snapshot is not kept in sync with later mutations.
///
/// [`HashTable::stats`]: crate::HashTable::stats
#[derive(Debug, Clone, PartialEq)]
pub struct TableStats {
    /// Number of entries in the table.
    pub len: usize,
    /// Number of bucket slots.
    pub capacity: usize,
    /// Bucket slots holding at least one entry.
    pub occupied_buckets: usize,
    /// Occupied buckets as a percentage of capacity.
    pub load_percent: f64,
    /// Chain-length distribution; `None` for an empty table.
    pub chains: Option<ChainLengths>,
}

impl TableStats {
    /// Pretty-print the statistics to stdout.
    pub fn print(&self) {
        println!("{self}");
    }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Hash Table Statistics ===")?;
        writeln!(f, "Entries: {}", self.len)?;
        writeln!(
            f,
            "Buckets: {}/{} occupied ({:.2}% load)",
            self.occupied_buckets, self.capacity, self.load_percent
        )?;
        match &self.chains {
            Some(chains) => write!(
                f,
                "Chains: min {}, max {}, avg {:.2}",
                chains.min, chains.max, chains.avg
            ),
            None => write!(f, "Chains: none"),
        }
    }
}
