use std::collections::TryReserveError;
use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Write as _;
use std::mem;

use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::stats::ChainLengths;
use crate::stats::TableStats;

/// Number of bucket slots a freshly created table starts with.
pub const INITIAL_CAPACITY: usize = 1024;

/// Capacity multiplier applied on each growth step. Capacities stay powers of
/// two so bucket addressing is a mask rather than a division.
const GROWTH_FACTOR: usize = 2;

#[inline(always)]
fn grow_threshold(capacity: usize) -> usize {
    // 0.75 load factor, computed without going through floats.
    ((capacity as u128 * 3) / 4) as usize
}

/// Polynomial accumulation over the key's bytes: `h = h * 31 + byte`.
///
/// Wrapping at 2^64 composes exactly with the power-of-two bucket mask, so
/// the masked index equals the full-precision polynomial reduced modulo the
/// capacity.
#[inline(always)]
fn polynomial_hash(key: &str) -> u64 {
    key.bytes()
        .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(u64::from(b)))
}

#[inline(always)]
fn bucket_index(key: &str, capacity: usize) -> usize {
    debug_assert!(capacity.is_power_of_two());
    polynomial_hash(key) as usize & (capacity - 1)
}

/// The table operation an allocation failure was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOp {
    /// Appending an entry to a bucket chain.
    Insert,
    /// Rebuilding the bucket array at a larger capacity.
    Grow,
}

impl Display for TableOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableOp::Insert => f.write_str("insert"),
            TableOp::Grow => f.write_str("grow"),
        }
    }
}

/// Error returned by the fallible mutation paths when the allocator refuses a
/// request.
///
/// The operation tag tells the two failure modes apart: [`TableOp::Insert`]
/// means the insert did not happen and the table is in its pre-operation
/// state; [`TableOp::Grow`] means the entry was stored but the bucket array
/// could not be rebuilt, leaving the table intact yet above its target load
/// factor.
#[derive(Debug, Error)]
#[error("allocation failed during {op}")]
pub struct TableError {
    /// The operation the allocator refused.
    pub op: TableOp,
    /// The reservation failure reported by the allocator.
    #[source]
    pub source: TryReserveError,
}

/// A key/value pair, owned exclusively by the chain of the bucket its key
/// hashes to.
#[derive(Clone)]
struct Node<V> {
    key: Box<str>,
    value: V,
}

type Chain<V> = Vec<Node<V>>;

/// A string-keyed hash table using separately-chained buckets.
///
/// `HashTable<V>` maps string keys to values of type `V`. Every bucket slot
/// is either vacant or owns a chain of entries whose keys hash to that slot;
/// chains are allocated lazily on first insert and released as soon as a
/// removal empties them. Once the entry count exceeds 75% of the bucket
/// count, the bucket array doubles and every entry is redistributed.
///
/// The table is single-threaded: it provides no internal locking, and callers
/// sharing one across threads must serialize access themselves.
///
/// ## Example
///
/// ```rust
/// use chain_hash::HashTable;
///
/// let mut table = HashTable::new();
/// table.insert("apple", 3);
/// table.insert("pear", 7);
///
/// assert_eq!(table.get("apple"), Some(&3));
/// assert_eq!(table.remove("pear"), Some(7));
/// assert_eq!(table.len(), 1);
/// ```
#[derive(Clone)]
pub struct HashTable<V> {
    buckets: Vec<Option<Chain<V>>>,
    /// Total live entries; always equals the sum of all chain lengths.
    len: usize,
    /// Bucket slots currently holding a chain; never counts an empty chain,
    /// since those are released eagerly.
    occupied: usize,
}

impl<V> Debug for HashTable<V>
where
    V: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in self.iter() {
            map.entry(&key, value);
        }
        map.finish()
    }
}

impl<V> Default for HashTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> HashTable<V> {
    /// Creates an empty table with the default capacity of
    /// [`INITIAL_CAPACITY`] bucket slots.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Creates an empty table with at least `capacity` bucket slots.
    ///
    /// The requested capacity is rounded up to the next power of two, with a
    /// minimum of one slot.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let mut buckets = Vec::new();
        buckets.resize_with(capacity, || None);
        Self {
            buckets,
            len: 0,
            occupied: 0,
        }
    }

    /// Returns the number of entries in the table.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of bucket slots.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the number of bucket slots currently holding at least one
    /// entry.
    pub fn occupied_buckets(&self) -> usize {
        self.occupied
    }

    /// Returns a reference to the value stored for `key`, if any.
    ///
    /// ```rust
    /// use chain_hash::HashTable;
    ///
    /// let mut table = HashTable::new();
    /// table.insert("a", 1);
    /// assert_eq!(table.get("a"), Some(&1));
    /// assert_eq!(table.get("b"), None);
    /// ```
    pub fn get(&self, key: &str) -> Option<&V> {
        let bucket = bucket_index(key, self.buckets.len());
        self.buckets[bucket]
            .as_ref()?
            .iter()
            .find(|node| &*node.key == key)
            .map(|node| &node.value)
    }

    /// Returns a mutable reference to the value stored for `key`, if any.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let bucket = bucket_index(key, self.buckets.len());
        self.buckets[bucket]
            .as_mut()?
            .iter_mut()
            .find(|node| &*node.key == key)
            .map(|node| &mut node.value)
    }

    /// Returns `true` if the table contains an entry for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Inserts a key-value pair.
    ///
    /// If `key` is already present its value is overwritten in place and the
    /// previous value is returned; no second entry is ever created for a key.
    /// Otherwise the entry is appended to its bucket's chain and `None` is
    /// returned. Empty keys are valid keys.
    ///
    /// Inserting may grow the bucket array, which relocates entries to new
    /// buckets internally.
    ///
    /// ```rust
    /// use chain_hash::HashTable;
    ///
    /// let mut table = HashTable::new();
    /// assert_eq!(table.insert("a", 10), None);
    /// assert_eq!(table.insert("a", 30), Some(10));
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn insert(&mut self, key: &str, value: V) -> Option<V> {
        match self.entry(key) {
            Entry::Occupied(mut entry) => Some(entry.insert(value)),
            Entry::Vacant(entry) => {
                entry.insert(value);
                None
            }
        }
    }

    /// Inserts a key-value pair, reporting allocation failures instead of
    /// aborting.
    ///
    /// Semantics match [`insert`], but chain and bucket-array allocations go
    /// through `try_reserve`. On `Err` the [`TableOp`] tag on the error says
    /// which state the table is in: a refused [`TableOp::Insert`] left the
    /// table unchanged, a refused [`TableOp::Grow`] stored the entry but left
    /// the table above its target load factor. Counters stay consistent with
    /// the actual contents either way.
    ///
    /// [`insert`]: HashTable::insert
    ///
    /// ```rust
    /// use chain_hash::HashTable;
    ///
    /// let mut table = HashTable::new();
    /// assert_eq!(table.try_insert("a", 1)?, None);
    /// assert_eq!(table.try_insert("a", 2)?, Some(1));
    /// # Ok::<(), chain_hash::TableError>(())
    /// ```
    pub fn try_insert(&mut self, key: &str, value: V) -> Result<Option<V>, TableError> {
        match self.entry(key) {
            Entry::Occupied(mut entry) => Ok(Some(entry.insert(value))),
            Entry::Vacant(entry) => {
                entry.try_insert(value)?;
                Ok(None)
            }
        }
    }

    /// Removes the entry for `key`, returning its value.
    ///
    /// Removing an absent key is a no-op returning `None`; counters and
    /// chains are untouched. When a removal empties a bucket's chain, the
    /// chain is released and the slot reads as vacant again.
    ///
    /// ```rust
    /// use chain_hash::HashTable;
    ///
    /// let mut table = HashTable::new();
    /// table.insert("a", 1);
    /// assert_eq!(table.remove("a"), Some(1));
    /// assert_eq!(table.remove("a"), None);
    /// ```
    pub fn remove(&mut self, key: &str) -> Option<V> {
        match self.entry(key) {
            Entry::Occupied(entry) => Some(entry.remove()),
            Entry::Vacant(_) => None,
        }
    }

    /// Gets `key`'s entry for in-place manipulation.
    ///
    /// The lookup traverses the key's chain exactly once; the returned view
    /// is the single authority on whether the key was present.
    ///
    /// ```rust
    /// use chain_hash::HashTable;
    ///
    /// let mut table = HashTable::new();
    /// *table.entry("hits").or_insert(0) += 1;
    /// *table.entry("hits").or_insert(0) += 1;
    /// assert_eq!(table.get("hits"), Some(&2));
    /// ```
    pub fn entry<'k>(&mut self, key: &'k str) -> Entry<'_, 'k, V> {
        let bucket = bucket_index(key, self.buckets.len());
        let at = self.buckets[bucket]
            .as_ref()
            .and_then(|chain| chain.iter().position(|node| &*node.key == key));
        match at {
            Some(at) => Entry::Occupied(OccupiedEntry {
                table: self,
                bucket,
                at,
            }),
            None => Entry::Vacant(VacantEntry {
                table: self,
                bucket,
                key,
            }),
        }
    }

    /// Removes every entry, releasing all chains but keeping the bucket
    /// array at its current capacity.
    pub fn clear(&mut self) {
        for slot in &mut self.buckets {
            *slot = None;
        }
        debug!(
            dropped = self.len,
            capacity = self.buckets.len(),
            "table cleared"
        );
        self.len = 0;
        self.occupied = 0;
    }

    /// Returns an iterator over all `(key, value)` pairs, in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.buckets
            .iter()
            .flatten()
            .flat_map(|chain| chain.iter().map(|node| (&*node.key, &node.value)))
    }

    fn grow(&mut self) {
        let old_capacity = self.buckets.len();
        let new_capacity = old_capacity * GROWTH_FACTOR;
        let mut new_buckets = Vec::new();
        new_buckets.resize_with(new_capacity, || None);
        self.occupied = Self::migrate(&mut self.buckets, &mut new_buckets);
        self.buckets = new_buckets;
        debug!(
            old_capacity,
            new_capacity,
            len = self.len,
            "bucket array grown"
        );
    }

    fn try_grow(&mut self) -> Result<(), TableError> {
        let old_capacity = self.buckets.len();
        let new_capacity = old_capacity * GROWTH_FACTOR;
        let mut new_buckets: Vec<Option<Chain<V>>> = Vec::new();
        if let Err(source) = new_buckets.try_reserve_exact(new_capacity) {
            warn!(
                old_capacity,
                new_capacity, "allocator refused bucket array growth"
            );
            return Err(TableError {
                op: TableOp::Grow,
                source,
            });
        }
        new_buckets.resize_with(new_capacity, || None);
        self.occupied = Self::migrate(&mut self.buckets, &mut new_buckets);
        self.buckets = new_buckets;
        debug!(
            old_capacity,
            new_capacity,
            len = self.len,
            "bucket array grown"
        );
        Ok(())
    }

    /// Drains every chain out of `old` and re-appends each entry under its
    /// index against the new capacity, creating chains lazily. Returns the
    /// occupied-bucket count of the rebuilt array.
    ///
    /// Entry order within and across buckets is not preserved.
    fn migrate(old: &mut Vec<Option<Chain<V>>>, new: &mut [Option<Chain<V>>]) -> usize {
        let new_capacity = new.len();
        let mut occupied = 0;
        for slot in old.drain(..) {
            let Some(chain) = slot else { continue };
            for node in chain {
                // Bucket indices are never cached: the mask changed, so the
                // index is recomputed from the key.
                let bucket = bucket_index(&node.key, new_capacity);
                let target = &mut new[bucket];
                if target.is_none() {
                    occupied += 1;
                }
                target
                    .get_or_insert_with(|| Vec::with_capacity(1))
                    .push(node);
            }
        }
        occupied
    }
}

impl<V> HashTable<V> {
    /// Captures a snapshot of the table's occupancy statistics.
    ///
    /// Diagnostic only; carries no correctness contract.
    pub fn stats(&self) -> TableStats {
        let mut min = usize::MAX;
        let mut max = 0;
        for chain in self.buckets.iter().flatten() {
            min = min.min(chain.len());
            max = max.max(chain.len());
        }
        let chains = (self.occupied > 0).then(|| ChainLengths {
            min,
            max,
            avg: self.len as f64 / self.occupied as f64,
        });
        TableStats {
            len: self.len,
            capacity: self.buckets.len(),
            occupied_buckets: self.occupied,
            load_percent: (self.occupied as f64 / self.buckets.len() as f64) * 100.0,
            chains,
        }
    }

    /// Renders up to `limit` occupied buckets as human-readable
    /// `key -> value` lines, converting values with `to_string`.
    ///
    /// A `limit` of 0 disables the bound. When buckets are elided, a trailing
    /// line reports how many were left out. The output is informal and not
    /// meant for round-tripping.
    pub fn render_with<F>(&self, limit: usize, mut to_string: F) -> String
    where
        F: FnMut(&V) -> String,
    {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} entries in {}/{} buckets ({:.2}% occupied)",
            self.len,
            self.occupied,
            self.buckets.len(),
            (self.occupied as f64 / self.buckets.len() as f64) * 100.0,
        );
        let mut shown = 0;
        for (index, slot) in self.buckets.iter().enumerate() {
            let Some(chain) = slot else { continue };
            if limit != 0 && shown == limit {
                let _ = writeln!(out, "  ... {} more occupied buckets", self.occupied - shown);
                break;
            }
            let _ = write!(out, "  [{index:>6}]");
            for (i, node) in chain.iter().enumerate() {
                let sep = if i == 0 { "" } else { "," };
                let _ = write!(out, "{sep} {:?} -> {}", node.key, to_string(&node.value));
            }
            let _ = writeln!(out);
            shown += 1;
        }
        out
    }

    /// Renders up to `limit` occupied buckets using the values' `Display`
    /// impl.
    ///
    /// Value types without a `Display` impl have no default rendering; pass a
    /// converter to [`render_with`] instead.
    ///
    /// [`render_with`]: HashTable::render_with
    ///
    /// ```rust
    /// use chain_hash::HashTable;
    ///
    /// let mut table = HashTable::new();
    /// table.insert("a", 30);
    /// assert!(table.render(8).contains("\"a\" -> 30"));
    /// ```
    pub fn render(&self, limit: usize) -> String
    where
        V: Display,
    {
        self.render_with(limit, |value| value.to_string())
    }
}

/// A view into a single key's slot in the table, either vacant or occupied.
///
/// Created by [`HashTable::entry`].
pub enum Entry<'t, 'k, V> {
    /// A vacant entry - the key is not present in the table.
    Vacant(VacantEntry<'t, 'k, V>),
    /// An occupied entry - the key is present in the table.
    Occupied(OccupiedEntry<'t, V>),
}

impl<'t, V> Entry<'t, '_, V> {
    /// Inserts `default` if the entry is vacant, then returns a mutable
    /// reference to the value.
    pub fn or_insert(self, default: V) -> &'t mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Applies `f` to the value if the entry is occupied.
    pub fn and_modify<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        if let Entry::Occupied(entry) = &mut self {
            f(entry.get_mut());
        }
        self
    }
}

/// A view into a vacant slot, holding the borrowed key it was probed with.
///
/// This struct is created by the [`entry`] method on [`HashTable`] when the
/// requested key is absent.
///
/// [`entry`]: HashTable::entry
pub struct VacantEntry<'t, 'k, V> {
    table: &'t mut HashTable<V>,
    bucket: usize,
    key: &'k str,
}

impl<'t, V> VacantEntry<'t, '_, V> {
    /// The key this entry was probed with.
    pub fn key(&self) -> &str {
        self.key
    }

    /// Inserts `value` under this entry's key and returns a mutable
    /// reference to it.
    ///
    /// The key is copied into the table at this point; the chain is created
    /// if the bucket had none, and the table grows afterwards if the insert
    /// pushed it past its load-factor threshold.
    pub fn insert(self, value: V) -> &'t mut V {
        let VacantEntry { table, bucket, key } = self;
        if table.buckets[bucket].is_none() {
            table.occupied += 1;
        }
        table.buckets[bucket]
            .get_or_insert_with(|| Vec::with_capacity(1))
            .push(Node {
                key: key.into(),
                value,
            });
        table.len += 1;
        if table.len > grow_threshold(table.buckets.len()) {
            table.grow();
            // Growth relocated the entry; look it up under the new capacity.
            match table.get_mut(key) {
                Some(value) => value,
                None => unreachable!("entry lost during growth"),
            }
        } else {
            match table.buckets[bucket]
                .as_mut()
                .and_then(|chain| chain.last_mut())
            {
                Some(node) => &mut node.value,
                None => unreachable!("freshly extended chain is non-empty"),
            }
        }
    }

    /// Fallible variant of [`insert`](VacantEntry::insert): every allocation
    /// goes through `try_reserve`.
    ///
    /// A refused chain allocation leaves the table untouched and reports
    /// [`TableOp::Insert`]; a refused growth keeps the stored entry and
    /// reports [`TableOp::Grow`].
    pub fn try_insert(self, value: V) -> Result<(), TableError> {
        let VacantEntry { table, bucket, key } = self;
        let slot = &mut table.buckets[bucket];
        let was_vacant = slot.is_none();
        let chain = slot.get_or_insert_with(Vec::new);
        if let Err(source) = chain.try_reserve(1) {
            if was_vacant {
                // Vec::new never allocates, so dropping the empty shell
                // restores the slot to its pre-insert state.
                *slot = None;
            }
            return Err(TableError {
                op: TableOp::Insert,
                source,
            });
        }
        chain.push(Node {
            key: key.into(),
            value,
        });
        if was_vacant {
            table.occupied += 1;
        }
        table.len += 1;
        if table.len > grow_threshold(table.buckets.len()) {
            table.try_grow()?;
        }
        Ok(())
    }
}

/// A view into an occupied entry in the table.
///
/// This struct is created by the [`entry`] method on [`HashTable`] when the
/// requested key is present. It provides access to the existing value and can
/// remove the entry.
///
/// [`entry`]: HashTable::entry
pub struct OccupiedEntry<'t, V> {
    table: &'t mut HashTable<V>,
    bucket: usize,
    at: usize,
}

impl<'t, V> OccupiedEntry<'t, V> {
    fn node(&self) -> &Node<V> {
        match self.table.buckets[self.bucket]
            .as_ref()
            .and_then(|chain| chain.get(self.at))
        {
            Some(node) => node,
            None => unreachable!("occupied entry points at a live node"),
        }
    }

    fn node_mut(&mut self) -> &mut Node<V> {
        match self.table.buckets[self.bucket]
            .as_mut()
            .and_then(|chain| chain.get_mut(self.at))
        {
            Some(node) => node,
            None => unreachable!("occupied entry points at a live node"),
        }
    }

    /// The stored key.
    pub fn key(&self) -> &str {
        &self.node().key
    }

    /// Returns a reference to the stored value.
    pub fn get(&self) -> &V {
        &self.node().value
    }

    /// Returns a mutable reference to the stored value.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.node_mut().value
    }

    /// Converts the view into a mutable reference whose lifetime is bound to
    /// the table.
    pub fn into_mut(self) -> &'t mut V {
        match self.table.buckets[self.bucket]
            .as_mut()
            .and_then(|chain| chain.get_mut(self.at))
        {
            Some(node) => &mut node.value,
            None => unreachable!("occupied entry points at a live node"),
        }
    }

    /// Overwrites the stored value in place, returning the previous one.
    ///
    /// The entry count is unchanged; no second entry is created for the key.
    pub fn insert(&mut self, value: V) -> V {
        mem::replace(self.get_mut(), value)
    }

    /// Removes the entry, returning its value.
    ///
    /// If this leaves the bucket's chain empty, the chain is released and
    /// the slot reads as vacant again.
    pub fn remove(self) -> V {
        let OccupiedEntry { table, bucket, at } = self;
        let Some(chain) = table.buckets[bucket].as_mut() else {
            unreachable!("occupied entry points at a live chain");
        };
        let node = chain.swap_remove(at);
        table.len -= 1;
        if chain.is_empty() {
            table.buckets[bucket] = None;
            table.occupied -= 1;
        }
        node.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Checks the counter invariants against the actual bucket contents.
    fn assert_counters<V>(table: &HashTable<V>) {
        let live: usize = table.buckets.iter().flatten().map(Vec::len).sum();
        let non_empty = table
            .buckets
            .iter()
            .flatten()
            .filter(|chain| !chain.is_empty())
            .count();
        assert_eq!(table.len, live, "len out of sync with chain contents");
        assert_eq!(
            table.occupied, non_empty,
            "occupied out of sync with buckets"
        );
        assert!(
            table
                .buckets
                .iter()
                .all(|slot| slot.as_ref().is_none_or(|chain| !chain.is_empty())),
            "empty chain left allocated"
        );
    }

    #[test]
    fn insert_and_find() {
        let mut table = HashTable::new();
        for k in 0..32u32 {
            let key = format!("key{k}");
            assert_eq!(table.insert(&key, k * 2), None);
            assert_eq!(table.get(&key), Some(&(k * 2)));
        }
        assert_eq!(table.len(), 32);
        for k in 0..32u32 {
            assert_eq!(table.get(&format!("key{k}")), Some(&(k * 2)));
        }
        assert_eq!(table.get("missing"), None);
        assert_counters(&table);
    }

    #[test]
    fn overwrite_updates_in_place() {
        let mut table = HashTable::new();
        assert_eq!(table.insert("a", 10), None);
        assert_eq!(table.insert("b", 20), None);
        assert_eq!(table.insert("a", 30), Some(10));

        assert_eq!(table.len(), 2, "{:#?}", table);
        assert_eq!(table.get("a"), Some(&30));
        assert_eq!(table.get("b"), Some(&20));
        assert_counters(&table);
    }

    #[test]
    fn remove_releases_empty_bucket() {
        let mut table = HashTable::new();
        table.insert("a", 10);
        table.insert("b", 20);
        let bucket = bucket_index("b", table.capacity());

        assert_eq!(table.remove("b"), Some(20));
        assert_eq!(table.get("b"), None);
        assert_eq!(table.len(), 1);
        assert!(
            table.buckets[bucket].is_none(),
            "emptied bucket still holds a chain"
        );
        assert_counters(&table);
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut table: HashTable<i32> = HashTable::new();
        assert_eq!(table.remove("ghost"), None);

        table.insert("a", 1);
        assert_eq!(table.remove("ghost"), None);
        assert_eq!(table.len(), 1);
        assert_eq!(table.occupied_buckets(), 1);

        assert_eq!(table.remove("a"), Some(1));
        assert_eq!(table.remove("a"), None);
        assert_eq!(table.len(), 0);
        assert_counters(&table);
    }

    #[test]
    fn colliding_keys_share_a_chain() {
        // Capacity 4 masks with 0b11: "a" (97), "e" (101), and "i" (105) all
        // land in bucket 1.
        let mut table = HashTable::with_capacity(4);
        table.insert("a", 1);
        table.insert("e", 2);
        table.insert("i", 3);

        assert_eq!(table.occupied_buckets(), 1, "{:#?}", table);
        assert_eq!(table.get("a"), Some(&1));
        assert_eq!(table.get("e"), Some(&2));
        assert_eq!(table.get("i"), Some(&3));

        assert_eq!(table.remove("e"), Some(2));
        assert_eq!(table.get("a"), Some(&1));
        assert_eq!(table.get("i"), Some(&3));
        assert_eq!(table.occupied_buckets(), 1);
        assert_counters(&table);
    }

    #[test]
    fn growth_triggers_once_per_crossing() {
        let mut table = HashTable::with_capacity(16);
        let mut capacity = table.capacity();
        let mut growths = 0;
        for k in 0..100u32 {
            table.insert(&format!("key{k}"), k);
            if table.capacity() != capacity {
                assert!(table.capacity() > capacity, "capacity shrank");
                growths += 1;
                capacity = table.capacity();
            }
        }
        // Thresholds crossed at 13, 25, 49, and 97 entries.
        assert_eq!(growths, 4);
        assert_eq!(capacity, 256);
        assert_counters(&table);
    }

    #[test]
    fn growth_preserves_entries() {
        let mut table = HashTable::with_capacity(16);
        for k in 0..100u32 {
            table.insert(&format!("key{k}"), k);
        }
        assert_eq!(table.len(), 100);
        for k in 0..100u32 {
            assert_eq!(
                table.get(&format!("key{k}")),
                Some(&k),
                "{k} lost in rehash"
            );
        }
        assert_counters(&table);
    }

    #[test]
    fn default_capacity() {
        let table: HashTable<i32> = HashTable::new();
        assert_eq!(table.capacity(), INITIAL_CAPACITY);
        assert_eq!(table.len(), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn with_capacity_rounds_up() {
        let table: HashTable<i32> = HashTable::with_capacity(100);
        assert_eq!(table.capacity(), 128);
        let table: HashTable<i32> = HashTable::with_capacity(0);
        assert_eq!(table.capacity(), 1);
    }

    #[test]
    fn hash_is_deterministic() {
        // 'a'*31^2 + 'b'*31 + 'c' = 96354; 96354 mod 1024 = 98.
        assert_eq!(polynomial_hash("abc"), 96354);
        assert_eq!(polynomial_hash("abc"), polynomial_hash("abc"));
        assert_eq!(bucket_index("abc", 1024), 98);
        assert_eq!(bucket_index("abc", 2048), 96354 % 2048);
    }

    #[test]
    fn empty_key_is_valid() {
        let mut table = HashTable::new();
        assert_eq!(table.insert("", 5), None);
        assert_eq!(table.get(""), Some(&5));
        assert_eq!(table.remove(""), Some(5));
        assert_counters(&table);
    }

    #[test]
    fn entry_api() {
        let mut table = HashTable::new();
        match table.entry("a") {
            Entry::Vacant(entry) => {
                assert_eq!(entry.key(), "a");
                let value = entry.insert(1);
                *value += 1;
            }
            Entry::Occupied(_) => panic!("should be vacant first time"),
        }
        match table.entry("a") {
            Entry::Occupied(mut entry) => {
                assert_eq!(entry.key(), "a");
                assert_eq!(entry.get(), &2);
                assert_eq!(entry.insert(5), 2);
            }
            Entry::Vacant(_) => panic!("should be occupied: {:#?}", table),
        }
        table.entry("a").and_modify(|v| *v += 1);
        assert_eq!(table.get("a"), Some(&6));

        match table.entry("a") {
            Entry::Occupied(entry) => assert_eq!(entry.remove(), 6),
            Entry::Vacant(_) => panic!("should be occupied"),
        }
        assert!(table.is_empty());
        assert_counters(&table);
    }

    #[test]
    fn try_insert_matches_insert() {
        let mut table = HashTable::with_capacity(16);
        for k in 0..50u32 {
            let key = format!("key{k}");
            assert_eq!(table.try_insert(&key, k).expect("allocator refused"), None);
        }
        assert_eq!(
            table.try_insert("key7", 700).expect("allocator refused"),
            Some(7)
        );
        assert_eq!(table.len(), 50);
        assert!(table.capacity() > 16, "fallible path never grew the table");
        for k in 0..50u32 {
            let expected = if k == 7 { 700 } else { k };
            assert_eq!(table.get(&format!("key{k}")), Some(&expected));
        }
        assert_counters(&table);
    }

    #[test]
    fn clear_releases_everything() {
        let mut table = HashTable::with_capacity(16);
        for k in 0..50u32 {
            table.insert(&format!("key{k}"), k);
        }
        let capacity = table.capacity();
        table.clear();

        assert_eq!(table.len(), 0);
        assert_eq!(table.occupied_buckets(), 0);
        assert_eq!(table.capacity(), capacity, "clear must keep capacity");
        assert_eq!(table.get("key0"), None);
        assert_counters(&table);

        // The table stays usable after a clear.
        table.insert("again", 1);
        assert_eq!(table.get("again"), Some(&1));
    }

    #[test]
    fn iter_visits_every_entry() {
        let mut table = HashTable::new();
        for k in 0..20u32 {
            table.insert(&format!("key{k}"), k);
        }
        let mut seen: Vec<u32> = table.iter().map(|(_, v)| *v).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn interleaved_inserts_and_removes() {
        let mut table = HashTable::with_capacity(8);
        for round in 0..3 {
            for k in 0..60u32 {
                table.insert(&format!("r{round}k{k}"), k);
                assert_counters(&table);
            }
            for k in (0..60u32).step_by(2) {
                assert_eq!(table.remove(&format!("r{round}k{k}")), Some(k));
                assert_counters(&table);
            }
        }
        // Three rounds of 60 inserts with 30 removals each.
        assert_eq!(table.len(), 90);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn insert_many() {
        let mut table = HashTable::new();
        for k in 0..100_000u64 {
            let key = format!("key_{k:016X}");
            table.insert(&key, k);
            assert_eq!(table.get(&key), Some(&k));
        }
        assert_eq!(table.len(), 100_000);
        for k in 0..100_000u64 {
            assert_eq!(table.get(&format!("key_{k:016X}")), Some(&k));
        }
        assert_counters(&table);
    }

    #[test]
    fn render_bounds_the_dump() {
        let mut table = HashTable::with_capacity(64);
        for k in 0..20u32 {
            table.insert(&format!("key{k}"), k);
        }
        let occupied = table.occupied_buckets();

        let full = table.render(0);
        assert!(full.contains("\"key0\" -> 0"));
        assert!(!full.contains("more occupied buckets"));

        let bounded = table.render(2);
        assert!(bounded.contains(&format!("... {} more occupied buckets", occupied - 2)));
    }

    #[test]
    fn render_with_custom_converter() {
        #[derive(Clone)]
        struct Opaque {
            level: u8,
        }

        let mut table = HashTable::new();
        table.insert("x", Opaque { level: 9 });
        let dump = table.render_with(0, |v| format!("level {}", v.level));
        assert!(dump.contains("\"x\" -> level 9"));
    }

    #[test]
    fn error_carries_operation_tag() {
        let mut probe: Vec<u8> = Vec::new();
        let source = probe
            .try_reserve(usize::MAX)
            .expect_err("reservation too large");
        let err = TableError {
            op: TableOp::Grow,
            source,
        };
        assert_eq!(err.op, TableOp::Grow);
        assert_eq!(err.to_string(), "allocation failed during grow");
        assert!(std::error::Error::source(&err).is_some());
    }
}
