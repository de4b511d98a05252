use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::FusedIterator;
use core::mem;
use core::ops::Index;

use allocator_api2::alloc::Allocator;
use allocator_api2::alloc::Global;
use equivalent::Equivalent;

use crate::DefaultHashBuilder;
use crate::error::TryReserveError;
use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;

/// Rehashes a stored pair by its key.
fn make_hasher<K, V, S>(hash_builder: &S) -> impl Fn(&(K, V)) -> u64 + '_
where
    K: Hash,
    S: BuildHasher,
{
    move |pair| hash_builder.hash_one(&pair.0)
}

fn equivalent_key<Q, K, V>(key: &Q) -> impl Fn(&(K, V)) -> bool + '_
where
    Q: ?Sized + Equivalent<K>,
{
    move |pair| key.equivalent(&pair.0)
}

/// A hash map implemented on the main-position [`HashTable`].
///
/// `HashMap<K, V, S>` stores key-value pairs where keys implement `Hash + Eq`
/// and uses a configurable hasher builder `S` to hash keys. Pairs live in a
/// dense store with no holes, so iteration is a slice walk.
///
/// # Removal moves the last pair
///
/// Removing a pair that is not last in store order moves the last pair into
/// the freed slot. Slot numbers returned by [`get_index_of`] and
/// [`OccupiedEntry::index`] are only stable until the next removal, and any
/// insertion may reallocate the store.
///
/// # Performance Characteristics
///
/// - **Memory**: 8 bytes per bucket, plus the size of `(K, V)` per value slot.
///   No hash is stored next to the pair.
///
/// [`get_index_of`]: HashMap::get_index_of
#[derive(Clone)]
pub struct HashMap<K, V, S = DefaultHashBuilder, A: Allocator = Global> {
    table: HashTable<(K, V), A>,
    hash_builder: S,
}

impl<K, V, S, A> Debug for HashMap<K, V, S, A>
where
    K: Debug,
    V: Debug,
    A: Allocator,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(k, v);
        }
        map.finish()
    }
}

#[cfg(any(feature = "foldhash", feature = "std"))]
impl<K, V> HashMap<K, V, DefaultHashBuilder> {
    /// Creates an empty map using the default hasher builder. Nothing is
    /// allocated until the first insertion.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let map: HashMap<i32, String> = HashMap::new();
    /// assert!(map.is_empty());
    /// assert_eq!(map.bucket_count(), 0);
    /// ```
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates a map able to hold `capacity` pairs without growing, using the
    /// default hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let map: HashMap<i32, String> = HashMap::with_capacity(100);
    /// assert!(map.capacity() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty map hashing with `hash_builder`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasherDefault;
    /// # use siphasher::sip::SipHasher13;
    /// # use mainpos_hash::HashMap;
    /// #
    /// type Sip = BuildHasherDefault<SipHasher13>;
    /// let map: HashMap<i32, String, Sip> = HashMap::with_hasher(Sip::default());
    /// assert!(map.is_empty());
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_hasher_in(hash_builder, Global)
    }

    /// Creates a map able to hold `capacity` pairs without growing, hashing
    /// with `hash_builder`.
    ///
    /// Bucket counts are powers of two, so the capacity reported afterwards
    /// may exceed the request.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasherDefault;
    /// # use siphasher::sip::SipHasher13;
    /// # use mainpos_hash::HashMap;
    /// #
    /// type Sip = BuildHasherDefault<SipHasher13>;
    /// let map: HashMap<i32, String, Sip> = HashMap::with_capacity_and_hasher(100, Sip::default());
    /// assert!(map.capacity() >= 100);
    /// ```
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self::with_capacity_and_hasher_in(capacity, hash_builder, Global)
    }
}

impl<K, V, S, A: Allocator> HashMap<K, V, S, A> {
    /// Creates an empty map with the given hasher builder and allocator.
    pub fn with_hasher_in(hash_builder: S, alloc: A) -> Self {
        Self {
            table: HashTable::new_in(alloc),
            hash_builder,
        }
    }

    /// Creates a map with the given capacity, hasher builder and allocator.
    pub fn with_capacity_and_hasher_in(capacity: usize, hash_builder: S, alloc: A) -> Self {
        Self {
            table: HashTable::with_capacity_in(capacity, alloc),
            hash_builder,
        }
    }

    /// Fallible version of
    /// [`with_capacity_and_hasher_in`](Self::with_capacity_and_hasher_in).
    pub fn try_with_capacity_and_hasher_in(
        capacity: usize,
        hash_builder: S,
        alloc: A,
    ) -> Result<Self, TryReserveError> {
        Ok(Self {
            table: HashTable::try_with_capacity_in(capacity, alloc)?,
            hash_builder,
        })
    }

    /// Returns a reference to the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns a reference to the underlying allocator.
    pub fn allocator(&self) -> &A {
        self.table.allocator()
    }

    /// Returns the number of elements in the map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut map = HashMap::new();
    /// assert_eq!(map.len(), 0);
    /// map.insert(1, "a");
    /// assert_eq!(map.len(), 1);
    /// ```
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of pairs the map can hold before it has to grow.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Number of buckets in the index. Zero before the first allocation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut map = HashMap::new();
    /// assert_eq!(map.bucket_count(), 0);
    /// map.insert(1, 1);
    /// assert_eq!(map.bucket_count(), 8);
    /// ```
    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    /// Current `len() / bucket_count()`.
    pub fn load_factor(&self) -> f32 {
        self.table.load_factor()
    }

    /// The load factor above which an insertion grows the map.
    pub fn max_load_factor(&self) -> f32 {
        self.table.max_load_factor()
    }

    /// Removes all elements from the map.
    ///
    /// This operation preserves the map's allocated capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns an iterator over the key-value pairs in store order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut map = HashMap::new();
    /// map.insert("a", 1);
    /// map.insert("b", 2);
    ///
    /// let pairs: Vec<_> = map.iter().collect();
    /// assert_eq!(pairs, vec![(&"a", &1), (&"b", &2)]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the pairs with mutable references to the
    /// values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Returns an iterator over the keys of the map.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values of the map.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator over mutable references to the values.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    /// Consumes the map and yields its keys.
    pub fn into_keys(self) -> IntoKeys<K, V, A> {
        IntoKeys {
            inner: self.into_iter(),
        }
    }

    /// Consumes the map and yields its values.
    pub fn into_values(self) -> IntoValues<K, V, A> {
        IntoValues {
            inner: self.into_iter(),
        }
    }

    /// Clears the map, returning all key-value pairs as an iterator.
    ///
    /// The map is empty as soon as this returns. Capacity is kept.
    pub fn drain(&mut self) -> Drain<'_, K, V, A> {
        Drain {
            inner: self.table.drain(),
        }
    }

    /// Returns the pair stored at `slot` of the dense store.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut map = HashMap::new();
    /// map.insert("a", 1);
    /// map.insert("b", 2);
    ///
    /// assert_eq!(map.get_index(1), Some((&"b", &2)));
    /// assert_eq!(map.get_index(2), None);
    /// ```
    pub fn get_index(&self, slot: usize) -> Option<(&K, &V)> {
        self.table.get_index(slot).map(|(k, v)| (k, v))
    }

    /// Returns the pair stored at `slot` with a mutable value.
    pub fn get_index_mut(&mut self, slot: usize) -> Option<(&K, &mut V)> {
        self.table.get_index_mut(slot).map(|(k, v)| (&*k, v))
    }

    /// Swaps the contents of two maps.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }
}

impl<K, V, S, A> HashMap<K, V, S, A>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    /// Reserves capacity for at least `additional` more elements.
    ///
    /// # Panics
    ///
    /// Panics if the new bucket count overflows the 32-bit index.
    pub fn reserve(&mut self, additional: usize) {
        self.table
            .reserve(additional, make_hasher(&self.hash_builder));
    }

    /// Tries to reserve capacity for at least `additional` more elements. On
    /// error the map is unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// # use mainpos_hash::TryReserveError;
    /// #
    /// let mut map: HashMap<u64, u64> = HashMap::new();
    /// assert!(map.try_reserve(10).is_ok());
    /// assert_eq!(map.try_reserve(usize::MAX), Err(TryReserveError::CapacityOverflow));
    /// ```
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.table
            .try_reserve(additional, make_hasher(&self.hash_builder))
    }

    /// Shrinks the map to the smallest bucket count able to hold its pairs.
    pub fn shrink_to_fit(&mut self) {
        self.table
            .shrink_to_fit(make_hasher(&self.hash_builder));
    }

    /// Rebuilds the index with at least `buckets` buckets, never fewer than
    /// the current population needs.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut map = HashMap::new();
    /// map.insert(1, "one");
    /// map.rehash(100);
    /// assert_eq!(map.bucket_count(), 128);
    /// assert_eq!(map.get(&1), Some(&"one"));
    /// ```
    pub fn rehash(&mut self, buckets: usize) {
        self.table
            .rehash(buckets, make_hasher(&self.hash_builder));
    }

    /// Sets the maximum load factor. Values outside `(0.2, 0.9999)` are
    /// ignored. Lowering it below the current load grows the map right away.
    pub fn set_max_load_factor(&mut self, max_load_factor: f32) {
        self.table
            .set_max_load_factor(max_load_factor, make_hasher(&self.hash_builder));
    }

    /// Inserts a pair if the key is absent.
    ///
    /// Returns a reference to the value stored under `key` and whether the
    /// insertion happened. An existing value is left untouched and `value`
    /// is dropped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut map = HashMap::new();
    /// assert_eq!(map.insert(37, "a"), (&mut "a", true));
    ///
    /// let (value, inserted) = map.insert(37, "b");
    /// assert!(!inserted);
    /// assert_eq!(*value, "a");
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> (&mut V, bool) {
        match self.entry(key) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => (entry.insert(value), true),
        }
    }

    /// Inserts a pair, overwriting the value if the key is present.
    ///
    /// The stored key is kept on overwrite. Returns whether a new pair was
    /// inserted.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut map = HashMap::new();
    /// map.insert_or_assign("x", 1);
    /// let (value, inserted) = map.insert_or_assign("x", 2);
    /// assert_eq!((*value, inserted), (2, false));
    /// assert_eq!(map.len(), 1);
    /// ```
    pub fn insert_or_assign(&mut self, key: K, value: V) -> (&mut V, bool) {
        match self.entry(key) {
            Entry::Occupied(entry) => {
                let slot = entry.into_mut();
                *slot = value;
                (slot, false)
            }
            Entry::Vacant(entry) => (entry.insert(value), true),
        }
    }

    /// Builds a value with `make` only if `key` is absent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut map: HashMap<&str, Vec<u8>> = HashMap::new();
    /// let (value, inserted) = map.try_emplace("buf", || Vec::with_capacity(64));
    /// assert!(inserted);
    /// value.push(1);
    ///
    /// let (_, inserted) = map.try_emplace("buf", || unreachable!());
    /// assert!(!inserted);
    /// ```
    pub fn try_emplace(&mut self, key: K, make: impl FnOnce() -> V) -> (&mut V, bool) {
        match self.entry(key) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => (entry.insert(make()), true),
        }
    }

    /// Inserts or overwrites, returning the previous value if there was one.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut map = HashMap::new();
    /// assert_eq!(map.replace(1, "a"), None);
    /// assert_eq!(map.replace(1, "b"), Some("a"));
    /// ```
    pub fn replace(&mut self, key: K, value: V) -> Option<V> {
        match self.entry(key) {
            Entry::Occupied(mut entry) => Some(entry.insert(value)),
            Entry::Vacant(entry) => {
                entry.insert(value);
                None
            }
        }
    }

    /// Overwrites the value of an existing key. Returns `false`, and drops
    /// `value`, if the key is absent.
    pub fn try_set<Q>(&mut self, key: &Q, value: V) -> bool
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        match self.get_mut(key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Returns a clone of the value for `key`, or `V::default()` if absent.
    /// The map is not modified.
    pub fn get_or_default<Q>(&self, key: &Q) -> V
    where
        Q: ?Sized + Hash + Equivalent<K>,
        V: Clone + Default,
    {
        self.get(key).cloned().unwrap_or_default()
    }

    /// Returns the value for `key`, inserting `V::default()` first if absent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut map = HashMap::new();
    /// *map.get_or_insert_default("x") = 1;
    /// *map.get_or_insert_default("x") = 2;
    /// assert_eq!(map.len(), 1);
    /// assert_eq!(map["x"], 2);
    /// ```
    pub fn get_or_insert_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.entry(key).or_default()
    }

    /// Inserts a pair whose key the caller guarantees is absent, skipping the
    /// key comparisons.
    ///
    /// Inserting a present key this way leaves the map holding two pairs with
    /// equal keys. Debug builds assert against it.
    pub fn insert_unique(&mut self, key: K, value: V) -> &mut V {
        debug_assert!(!self.contains_key(&key), "insert_unique called with a present key");
        let hash = self.hash_builder.hash_one(&key);
        &mut self
            .table
            .insert_unique(hash, (key, value), make_hasher(&self.hash_builder))
            .1
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut map = HashMap::new();
    /// map.insert("one".to_string(), 1);
    /// assert_eq!(map.get("one"), Some(&1));
    /// assert_eq!(map.get("two"), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find(hash, equivalent_key(key))
            .map(|(_, v)| v)
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find_mut(hash, equivalent_key(key))
            .map(|(_, v)| v)
    }

    /// Returns the stored key and its value.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find(hash, equivalent_key(key))
            .map(|(k, v)| (k, v))
    }

    /// Returns the store slot of `key`, if present.
    pub fn get_index_of<Q>(&self, key: &Q) -> Option<usize>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.find_index(hash, equivalent_key(key))
    }

    /// Returns `true` if the map contains a value for the specified key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.get(key).is_some()
    }

    /// Number of pairs stored under `key`: `0` or `1`.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        usize::from(self.contains_key(key))
    }

    /// Returns the value for a key the caller asserts is present.
    ///
    /// # Panics
    ///
    /// Panics if the key is absent.
    pub fn at<Q>(&self, key: &Q) -> &V
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        match self.get(key) {
            Some(value) => value,
            None => panic!("key not present in map"),
        }
    }

    /// Mutable version of [`at`](Self::at).
    ///
    /// # Panics
    ///
    /// Panics if the key is absent.
    pub fn at_mut<Q>(&mut self, key: &Q) -> &mut V
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        match self.get_mut(key) {
            Some(value) => value,
            None => panic!("key not present in map"),
        }
    }

    /// Removes a key from the map, returning its value if it was present.
    ///
    /// If the pair was not last in store order, the last pair moves into its
    /// slot.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut map = HashMap::new();
    /// map.insert("a", 1);
    /// map.insert("b", 2);
    /// map.insert("c", 3);
    ///
    /// assert_eq!(map.remove("a"), Some(1));
    /// assert_eq!(map.get_index(0), Some((&"c", &3)));
    /// assert_eq!(map.remove("a"), None);
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes a key from the map, returning the stored key and value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove(
            hash,
            equivalent_key(key),
            make_hasher(&self.hash_builder),
        )
    }

    /// Removes `key` and returns the number of pairs removed: `0` or `1`.
    pub fn erase<Q>(&mut self, key: &Q) -> usize
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        usize::from(self.remove_entry(key).is_some())
    }

    /// Removes the pair stored at `slot`.
    ///
    /// The pair that was last in store order now occupies `slot`, so a
    /// forward walk that removes at `slot` must visit `slot` again.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut map: HashMap<u32, u32> = (0..10).map(|i| (i, i)).collect();
    ///
    /// let mut slot = 0;
    /// while slot < map.len() {
    ///     let (_, v) = map.get_index(slot).unwrap();
    ///     if v % 3 == 0 {
    ///         map.swap_remove_index(slot);
    ///     } else {
    ///         slot += 1;
    ///     }
    /// }
    /// assert_eq!(map.len(), 6);
    /// ```
    pub fn swap_remove_index(&mut self, slot: usize) -> Option<(K, V)> {
        self.table
            .swap_remove_index(slot, make_hasher(&self.hash_builder))
    }

    /// Retains only the pairs for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        self.table.retain(
            |pair| f(&pair.0, &mut pair.1),
            make_hasher(&self.hash_builder),
        );
    }

    /// Moves every pair of `other` whose key is absent from `self` into
    /// `self`. Pairs whose key is already present stay in `other`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut a: HashMap<i32, &str> = [(1, "a"), (2, "b")].into_iter().collect();
    /// let mut b: HashMap<i32, &str> = [(2, "x"), (3, "c")].into_iter().collect();
    ///
    /// a.merge(&mut b);
    /// assert_eq!(a.len(), 3);
    /// assert_eq!(a[&2], "b");
    /// assert_eq!(b.len(), 1);
    /// assert_eq!(b[&2], "x");
    /// ```
    pub fn merge(&mut self, other: &mut Self) {
        if self.is_empty() {
            self.swap(other);
            return;
        }

        self.reserve(other.len());
        let mut slot = 0;
        while let Some((key, _)) = other.get_index(slot) {
            if self.contains_key(key) {
                slot += 1;
            } else if let Some((key, value)) = other.swap_remove_index(slot) {
                self.insert_unique(key, value);
            }
        }
    }

    /// Gets the given key's entry for in-place manipulation.
    ///
    /// Growth happens only when a vacant entry is created while the map is at
    /// its load-factor limit.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashMap;
    /// #
    /// let mut counts = HashMap::new();
    /// for word in ["a", "b", "a"] {
    ///     *counts.entry(word).or_insert(0) += 1;
    /// }
    /// assert_eq!(counts["a"], 2);
    /// assert_eq!(counts["b"], 1);
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V, S, A> {
        let hash = self.hash_builder.hash_one(&key);
        match self.table.entry(
            hash,
            equivalent_key(&key),
            make_hasher(&self.hash_builder),
        ) {
            TableEntry::Occupied(entry) => Entry::Occupied(OccupiedEntry {
                entry,
                hash_builder: &self.hash_builder,
            }),
            TableEntry::Vacant(entry) => Entry::Vacant(VacantEntry { entry, key }),
        }
    }

    /// Collects chain statistics for the map.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> crate::hash_table::TableStats {
        self.table.stats(make_hasher(&self.hash_builder))
    }
}

impl<K, V, S, A> Default for HashMap<K, V, S, A>
where
    S: Default,
    A: Allocator + Default,
{
    fn default() -> Self {
        Self::with_hasher_in(S::default(), A::default())
    }
}

impl<K, V, S, A> PartialEq for HashMap<K, V, S, A>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
    A: Allocator,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| v == o))
    }
}

impl<K, V, S, A> Eq for HashMap<K, V, S, A>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
    A: Allocator,
{
}

impl<K, Q, V, S, A> Index<&Q> for HashMap<K, V, S, A>
where
    K: Hash + Eq,
    Q: ?Sized + Hash + Equivalent<K>,
    S: BuildHasher,
    A: Allocator,
{
    type Output = V;

    /// # Panics
    ///
    /// Panics if the key is absent.
    fn index(&self, key: &Q) -> &V {
        self.at(key)
    }
}

/// Later pairs overwrite the values of earlier ones with an equal key.
impl<K, V, S, A> Extend<(K, V)> for HashMap<K, V, S, A>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let additional = if self.is_empty() {
            iter.size_hint().0
        } else {
            iter.size_hint().0.div_ceil(2)
        };
        self.reserve(additional);
        for (k, v) in iter {
            self.insert_or_assign(k, v);
        }
    }
}

impl<'a, K, V, S, A> Extend<(&'a K, &'a V)> for HashMap<K, V, S, A>
where
    K: Hash + Eq + Copy,
    V: Copy,
    S: BuildHasher,
    A: Allocator,
{
    fn extend<I: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: I) {
        self.extend(iter.into_iter().map(|(&k, &v)| (k, v)));
    }
}

impl<K, V, S, A> FromIterator<(K, V)> for HashMap<K, V, S, A>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
    A: Allocator + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

impl<K, V, S, A: Allocator> IntoIterator for HashMap<K, V, S, A> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, K, V, S, A: Allocator> IntoIterator for &'a HashMap<K, V, S, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S, A: Allocator> IntoIterator for &'a mut HashMap<K, V, S, A> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// A view into a single entry in the map, which may either be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashMap`].
///
/// [`entry`]: HashMap::entry
pub enum Entry<'a, K, V, S = DefaultHashBuilder, A: Allocator = Global> {
    /// A vacant entry.
    Vacant(VacantEntry<'a, K, V, A>),
    /// An occupied entry.
    Occupied(OccupiedEntry<'a, K, V, S, A>),
}

impl<'a, K, V, S, A> Entry<'a, K, V, S, A>
where
    K: Hash,
    S: BuildHasher,
    A: Allocator,
{
    /// Inserts a default value if the entry is vacant and returns a mutable
    /// reference.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts a value computed from a closure if the entry is vacant and
    /// returns a mutable reference.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Like [`or_insert_with`](Self::or_insert_with), with the key passed to
    /// the closure.
    pub fn or_insert_with_key<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce(&K) -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let value = default(entry.key());
                entry.insert(value)
            }
        }
    }

    /// Provides in-place mutable access to an occupied entry before any
    /// potential inserts.
    pub fn and_modify<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// Returns a reference to this entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }

    /// Inserts the default value if the entry is vacant and returns a mutable
    /// reference.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(Default::default)
    }
}

/// A view into a vacant entry in the map.
pub struct VacantEntry<'a, K, V, A: Allocator = Global> {
    entry: crate::hash_table::VacantEntry<'a, (K, V), A>,
    key: K,
}

impl<'a, K, V, A: Allocator> VacantEntry<'a, K, V, A> {
    /// Gets a reference to the key that would be used when inserting a value.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Take ownership of the key.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Store slot the pair will occupy once inserted.
    pub fn index(&self) -> usize {
        self.entry.index()
    }

    /// Inserts the value into the map and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        &mut self.entry.insert((self.key, value)).1
    }
}

/// A view into an occupied entry in the map.
pub struct OccupiedEntry<'a, K, V, S = DefaultHashBuilder, A: Allocator = Global> {
    entry: crate::hash_table::OccupiedEntry<'a, (K, V), A>,
    hash_builder: &'a S,
}

impl<'a, K, V, S, A> OccupiedEntry<'a, K, V, S, A>
where
    K: Hash,
    S: BuildHasher,
    A: Allocator,
{
    /// Gets a reference to the key in the entry.
    pub fn key(&self) -> &K {
        &self.entry.get().0
    }

    /// Store slot of the pair.
    pub fn index(&self) -> usize {
        self.entry.index()
    }

    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        &self.entry.get().1
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.entry.get_mut().1
    }

    /// Converts the entry into a mutable reference to the value.
    pub fn into_mut(self) -> &'a mut V {
        &mut self.entry.into_mut().1
    }

    /// Inserts a value into the entry and returns the old value.
    pub fn insert(&mut self, value: V) -> V {
        mem::replace(&mut self.entry.get_mut().1, value)
    }

    /// Removes the entry from the map and returns the value.
    pub fn remove(self) -> V {
        self.remove_entry().1
    }

    /// Removes the entry from the map and returns the key and value.
    pub fn remove_entry(self) -> (K, V) {
        self.entry.remove(make_hasher(self.hash_builder))
    }
}

/// An iterator over the key-value pairs of a `HashMap`.
pub struct Iter<'a, K, V> {
    inner: crate::hash_table::Iter<'a, (K, V)>,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            inner: self.inner.clone(),
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(k, v)| (k, v))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// A mutable iterator over the key-value pairs of a `HashMap`.
pub struct IterMut<'a, K, V> {
    inner: crate::hash_table::IterMut<'a, (K, V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (&*k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for IterMut<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(k, v)| (&*k, v))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// An iterator over the keys of a `HashMap`.
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Keys<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(k, _)| k)
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}
impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// An iterator over the values of a `HashMap`.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Values<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(_, v)| v)
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
impl<K, V> FusedIterator for Values<'_, K, V> {}

/// A mutable iterator over the values of a `HashMap`.
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}
impl<K, V> FusedIterator for ValuesMut<'_, K, V> {}

/// An owning iterator over the key-value pairs of a `HashMap`.
pub struct IntoIter<K, V, A: Allocator = Global> {
    inner: crate::hash_table::IntoIter<(K, V), A>,
}

impl<K, V, A: Allocator> Iterator for IntoIter<K, V, A> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, A: Allocator> DoubleEndedIterator for IntoIter<K, V, A> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<K, V, A: Allocator> ExactSizeIterator for IntoIter<K, V, A> {}
impl<K, V, A: Allocator> FusedIterator for IntoIter<K, V, A> {}

/// An owning iterator over the keys of a `HashMap`.
pub struct IntoKeys<K, V, A: Allocator = Global> {
    inner: IntoIter<K, V, A>,
}

impl<K, V, A: Allocator> Iterator for IntoKeys<K, V, A> {
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, A: Allocator> ExactSizeIterator for IntoKeys<K, V, A> {}
impl<K, V, A: Allocator> FusedIterator for IntoKeys<K, V, A> {}

/// An owning iterator over the values of a `HashMap`.
pub struct IntoValues<K, V, A: Allocator = Global> {
    inner: IntoIter<K, V, A>,
}

impl<K, V, A: Allocator> Iterator for IntoValues<K, V, A> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, A: Allocator> ExactSizeIterator for IntoValues<K, V, A> {}
impl<K, V, A: Allocator> FusedIterator for IntoValues<K, V, A> {}

/// A draining iterator over the key-value pairs of a `HashMap`.
pub struct Drain<'a, K, V, A: Allocator = Global> {
    inner: crate::hash_table::Drain<'a, (K, V), A>,
}

impl<K, V, A: Allocator> Iterator for Drain<'_, K, V, A> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, A: Allocator> ExactSizeIterator for Drain<'_, K, V, A> {}
impl<K, V, A: Allocator> FusedIterator for Drain<'_, K, V, A> {}

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeMap;
    use alloc::format;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::hash::BuildHasher;
    use core::hash::Hasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone)]
    struct SipHashBuilder {
        k1: u64,
        k2: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k1, self.k2)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k1: rng.try_next_u64().unwrap_or(0),
                k2: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    /// Hashes a `u64` key to itself, so tests control main positions.
    #[derive(Clone, Default)]
    struct IdentityBuilder;

    #[derive(Default)]
    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = (self.0 << 8) | u64::from(b);
            }
        }

        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }
    }

    impl BuildHasher for IdentityBuilder {
        type Hasher = IdentityHasher;

        fn build_hasher(&self) -> Self::Hasher {
            IdentityHasher::default()
        }
    }

    fn check<K: Hash + Eq, V, S: BuildHasher>(map: &HashMap<K, V, S>) {
        map.table
            .check_invariants(make_hasher(&map.hash_builder));
    }

    #[test]
    fn test_new_and_with_hasher() {
        let map: HashMap<i32, String, SipHashBuilder> =
            HashMap::with_hasher(SipHashBuilder::default());
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
        assert_eq!(map.bucket_count(), 0);
    }

    #[test]
    fn test_with_capacity() {
        let map: HashMap<i32, String, SipHashBuilder> =
            HashMap::with_capacity_and_hasher(100, SipHashBuilder::default());
        assert!(map.capacity() >= 100);
        assert!(map.is_empty());
    }

    #[test]
    fn test_insert_and_get() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());

        assert!(map.insert(1, "hello".to_string()).1);
        assert!(map.insert(2, "world".to_string()).1);
        assert_eq!(map.len(), 2);

        let (value, inserted) = map.insert(1, "hi".to_string());
        assert!(!inserted);
        assert_eq!(value, "hello");
        assert_eq!(map.len(), 2);

        assert_eq!(map.get(&1), Some(&"hello".to_string()));
        assert_eq!(map.get(&2), Some(&"world".to_string()));
        assert_eq!(map.get(&3), None);
    }

    #[test]
    fn test_insert_or_assign() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        assert!(map.insert_or_assign("k", 1).1);
        let (value, inserted) = map.insert_or_assign("k", 2);
        assert!(!inserted);
        assert_eq!(*value, 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("k"), Some(&2));
    }

    #[test]
    fn test_try_emplace_builds_once() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        let mut calls = 0;
        for _ in 0..3 {
            map.try_emplace(7, || {
                calls += 1;
                vec![1, 2, 3]
            });
        }
        assert_eq!(calls, 1);
        assert_eq!(map.get(&7), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn test_replace_and_try_set() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        assert_eq!(map.replace(1, 10), None);
        assert_eq!(map.replace(1, 11), Some(10));
        assert!(map.try_set(&1, 12));
        assert!(!map.try_set(&2, 20));
        assert_eq!(map.get(&1), Some(&12));
        assert!(!map.contains_key(&2));
    }

    #[test]
    fn test_get_or_default() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert("a", 5u32);
        assert_eq!(map.get_or_default("a"), 5);
        assert_eq!(map.get_or_default("b"), 0);
        assert!(!map.contains_key("b"));
    }

    #[test]
    fn test_get_or_insert_default() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        *map.get_or_insert_default("x".to_string()) = 1;
        *map.get_or_insert_default("x".to_string()) = 2;
        assert_eq!(map.len(), 1);
        assert_eq!(map["x"], 2);
    }

    #[test]
    fn test_get_mut() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello".to_string());

        if let Some(value) = map.get_mut(&1) {
            value.push_str(" world");
        }

        assert_eq!(map.get(&1), Some(&"hello world".to_string()));
        assert_eq!(map.get_mut(&2), None);
    }

    #[test]
    fn test_contains_and_count() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello".to_string());

        assert!(map.contains_key(&1));
        assert!(!map.contains_key(&2));
        assert_eq!(map.count(&1), 1);
        assert_eq!(map.count(&2), 0);
    }

    #[test]
    fn test_at() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, 10);
        assert_eq!(*map.at(&1), 10);
        *map.at_mut(&1) += 1;
        assert_eq!(map[&1], 11);
    }

    #[test]
    #[should_panic(expected = "key not present in map")]
    fn test_at_missing_panics() {
        let map: HashMap<i32, i32, SipHashBuilder> = HashMap::with_hasher(SipHashBuilder::default());
        map.at(&1);
    }

    #[test]
    fn test_remove() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello".to_string());
        map.insert(2, "world".to_string());

        assert_eq!(map.remove(&1), Some("hello".to_string()));
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key(&1));
        assert!(map.contains_key(&2));

        assert_eq!(map.remove(&1), None);
        assert_eq!(map.remove(&3), None);
    }

    #[test]
    fn test_remove_entry() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello".to_string());

        assert_eq!(map.remove_entry(&1), Some((1, "hello".to_string())));
        assert_eq!(map.len(), 0);
        assert_eq!(map.remove_entry(&1), None);
    }

    #[test]
    fn test_erase_counts() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, ());
        assert_eq!(map.erase(&1), 1);
        assert_eq!(map.erase(&1), 0);
    }

    #[test]
    fn test_remove_moves_last_pair() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert("a", 1);
        map.insert("b", 2);
        map.insert("c", 3);
        assert_eq!(map.get_index_of("c"), Some(2));

        map.remove("a");
        assert_eq!(map.get_index_of("c"), Some(0));
        assert_eq!(map.get_index(0), Some((&"c", &3)));
        assert_eq!(map.get_index(2), None);
        check(&map);
    }

    #[test]
    fn test_swap_remove_index() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..5 {
            map.insert(i, i * 10);
        }
        assert_eq!(map.swap_remove_index(1), Some((1, 10)));
        assert_eq!(map.get_index(1), Some((&4, &40)));
        assert_eq!(map.swap_remove_index(4), None);
        check(&map);
    }

    #[test]
    fn test_retain() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..100 {
            map.insert(i, i);
        }
        map.retain(|k, v| {
            *v += 1;
            k % 4 == 0
        });
        assert_eq!(map.len(), 25);
        for i in (0..100).step_by(4) {
            assert_eq!(map.get(&i), Some(&(i + 1)));
        }
        check(&map);
    }

    #[test]
    fn test_merge() {
        let mut a = HashMap::with_hasher(SipHashBuilder::default());
        let mut b = HashMap::with_hasher(a.hasher().clone());
        for i in 0..10 {
            a.insert(i, "a");
        }
        for i in 5..20 {
            b.insert(i, "b");
        }

        a.merge(&mut b);
        assert_eq!(a.len(), 20);
        assert_eq!(b.len(), 5);
        for i in 0..10 {
            assert_eq!(a[&i], "a");
        }
        for i in 10..20 {
            assert_eq!(a[&i], "b");
        }
        for i in 5..10 {
            assert_eq!(b[&i], "b");
        }
        check(&a);
        check(&b);
    }

    #[test]
    fn test_merge_into_empty_swaps() {
        let mut a: HashMap<i32, i32, SipHashBuilder> = HashMap::with_hasher(SipHashBuilder::default());
        let mut b = HashMap::with_hasher(SipHashBuilder::default());
        b.insert(1, 1);

        a.merge(&mut b);
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello".to_string());
        map.insert(2, "world".to_string());

        assert_eq!(map.len(), 2);
        map.clear();
        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
        assert!(!map.contains_key(&1));
        assert!(!map.contains_key(&2));
    }

    #[test]
    fn test_reserve() {
        let mut map = HashMap::<i32, String, _>::with_hasher(SipHashBuilder::default());
        let initial_capacity = map.capacity();

        map.reserve(1000);
        assert!(map.capacity() >= initial_capacity + 1000);
        let buckets = map.bucket_count();
        for i in 0..1000 {
            map.insert(i, String::new());
        }
        assert_eq!(map.bucket_count(), buckets);
    }

    #[test]
    fn test_try_reserve_leaves_map_intact() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, 1);
        let buckets = map.bucket_count();
        assert_eq!(map.try_reserve(usize::MAX), Err(TryReserveError::CapacityOverflow));
        assert_eq!(map.bucket_count(), buckets);
        assert_eq!(map.get(&1), Some(&1));
    }

    #[test]
    fn test_rehash_and_shrink() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..10 {
            map.insert(i, i);
        }
        map.rehash(1000);
        assert_eq!(map.bucket_count(), 1024);
        check(&map);

        map.shrink_to_fit();
        assert_eq!(map.bucket_count(), 16);
        for i in 0..10 {
            assert_eq!(map.get(&i), Some(&i));
        }
        check(&map);
    }

    #[test]
    fn test_load_factor_bound_after_growth() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.set_max_load_factor(0.8);
        let mut buckets = map.bucket_count();
        for i in 0..5000 {
            map.insert(i, ());
            if map.bucket_count() != buckets {
                buckets = map.bucket_count();
                assert!(map.load_factor() <= map.max_load_factor());
            }
        }
    }

    #[test]
    fn test_entry_api() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());

        let value = map.entry(1).or_insert("hello".to_string());
        assert_eq!(value, &"hello".to_string());
        assert_eq!(map.len(), 1);

        let value = map.entry(1).or_insert("world".to_string());
        assert_eq!(value, &"hello".to_string());
        assert_eq!(map.len(), 1);

        map.entry(2).or_insert_with(|| "computed".to_string());
        assert_eq!(map.get(&2), Some(&"computed".to_string()));

        map.entry(3).or_insert_with_key(|k| format!("key {k}"));
        assert_eq!(map.get(&3), Some(&"key 3".to_string()));

        map.entry(1)
            .and_modify(|v| v.push_str(" world"))
            .or_insert("default".to_string());
        assert_eq!(map.get(&1), Some(&"hello world".to_string()));

        assert_eq!(map.entry(4).key(), &4);
    }

    #[test]
    fn test_entry_or_default() {
        let mut map: HashMap<i32, Vec<i32>, SipHashBuilder> =
            HashMap::with_hasher(SipHashBuilder::default());

        map.entry(1).or_default().push(42);
        assert_eq!(map.get(&1), Some(&vec![42]));

        map.entry(1).or_default().push(24);
        assert_eq!(map.get(&1), Some(&vec![42, 24]));
    }

    #[test]
    fn test_occupied_entry() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello".to_string());

        match map.entry(1) {
            Entry::Occupied(mut entry) => {
                assert_eq!(entry.key(), &1);
                assert_eq!(entry.index(), 0);
                assert_eq!(entry.get(), &"hello".to_string());

                *entry.get_mut() = "world".to_string();
                assert_eq!(entry.get(), &"world".to_string());

                let old_value = entry.insert("new".to_string());
                assert_eq!(old_value, "world".to_string());
                assert_eq!(entry.get(), &"new".to_string());

                let (key, value) = entry.remove_entry();
                assert_eq!(key, 1);
                assert_eq!(value, "new".to_string());
            }
            Entry::Vacant(_) => panic!("Expected occupied entry"),
        }

        assert!(map.is_empty());
    }

    #[test]
    fn test_vacant_entry() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());

        match map.entry(1) {
            Entry::Vacant(entry) => {
                assert_eq!(entry.key(), &1);
                assert_eq!(entry.index(), 0);

                let value = entry.insert("hello".to_string());
                assert_eq!(value, &"hello".to_string());
            }
            Entry::Occupied(_) => panic!("Expected vacant entry"),
        }

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(&"hello".to_string()));
    }

    #[test]
    fn test_entry_grows_only_on_insert() {
        let mut map: HashMap<u64, u64, IdentityBuilder> = HashMap::with_hasher(IdentityBuilder);
        map.set_max_load_factor(0.8);
        for i in 0..6 {
            map.insert(i, i);
        }
        assert_eq!(map.bucket_count(), 8);

        // At the limit, touching an existing key must not grow.
        *map.entry(3).or_insert(0) += 1;
        assert_eq!(map.bucket_count(), 8);

        map.entry(6).or_insert(6);
        assert_eq!(map.bucket_count(), 16);
        check(&map);
    }

    #[test]
    fn test_iterators() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "one".to_string());
        map.insert(2, "two".to_string());
        map.insert(3, "three".to_string());

        let pairs: BTreeMap<i32, String> =
            map.iter().map(|(k, v)| (*k, v.clone())).collect();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs.get(&1), Some(&"one".to_string()));
        assert_eq!(pairs.get(&2), Some(&"two".to_string()));
        assert_eq!(pairs.get(&3), Some(&"three".to_string()));

        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(map.keys().rev().copied().collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(map.values().len(), 3);

        for v in map.values_mut() {
            v.make_ascii_uppercase();
        }
        for (_, v) in &mut map {
            v.push('!');
        }
        assert_eq!(map.get(&2), Some(&"TWO!".to_string()));

        let mut values: Vec<String> = map.clone().into_values().collect();
        values.sort();
        assert_eq!(values, vec!["ONE!", "THREE!", "TWO!"]);
        assert_eq!(map.into_keys().sum::<i32>(), 6);
    }

    #[test]
    fn test_drain() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "one".to_string());
        map.insert(2, "two".to_string());
        map.insert(3, "three".to_string());

        let drained: BTreeMap<i32, String> = map.drain().collect();
        assert_eq!(drained.len(), 3);
        assert!(map.is_empty());

        assert_eq!(drained.get(&1), Some(&"one".to_string()));
        assert_eq!(drained.get(&2), Some(&"two".to_string()));
        assert_eq!(drained.get(&3), Some(&"three".to_string()));

        map.insert(4, "four".to_string());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_multiple_insertions() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());

        for i in 0..100 {
            map.insert(i, format!("value_{}", i));
        }

        assert_eq!(map.len(), 100);

        for i in 0..100 {
            assert_eq!(map.get(&i), Some(&format!("value_{}", i)));
        }
        check(&map);
    }

    #[test]
    fn test_collision_handling() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());

        for i in 0..1000 {
            map.insert(i, i * 2);
        }

        assert_eq!(map.len(), 1000);

        for i in 0..1000 {
            assert_eq!(map.get(&i), Some(&(i * 2)));
        }

        for i in (0..1000).step_by(2) {
            assert_eq!(map.remove(&i), Some(i * 2));
        }

        assert_eq!(map.len(), 500);

        for i in (1..1000).step_by(2) {
            assert_eq!(map.get(&i), Some(&(i * 2)));
        }
        check(&map);
    }

    #[test]
    fn test_forced_kickouts() {
        let mut map: HashMap<u64, u64, IdentityBuilder> = HashMap::with_hasher(IdentityBuilder);
        // Keys congruent mod 8 chain up and spill into neighbouring buckets,
        // whose owners then kick the guests out.
        for i in 0..64u64 {
            map.insert(i * 8, i);
            map.insert(i * 8 + 1, i);
            check(&map);
        }
        for i in 0..64u64 {
            assert_eq!(map.get(&(i * 8)), Some(&i));
            assert_eq!(map.get(&(i * 8 + 1)), Some(&i));
        }
        for i in (0..64u64).step_by(3) {
            assert_eq!(map.remove(&(i * 8)), Some(i));
            check(&map);
        }
    }

    #[test]
    fn test_string_keys() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());

        map.insert("hello".to_string(), 1);
        map.insert("world".to_string(), 2);
        map.insert("rust".to_string(), 3);

        assert_eq!(map.get("hello"), Some(&1));
        assert_eq!(map.get(&"world".to_string()), Some(&2));
        assert_eq!(map.get("rust"), Some(&3));
        assert_eq!(map.get("missing"), None);
    }

    #[test]
    fn test_default_trait() {
        let map: HashMap<i32, String, SipHashBuilder> = HashMap::default();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_clone_and_eq() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..50 {
            map.insert(i, i.to_string());
        }
        let mut cloned = map.clone();
        assert_eq!(map, cloned);
        check(&cloned);

        cloned.insert_or_assign(7, "seven".to_string());
        assert_ne!(map, cloned);
        assert_eq!(map.get(&7), Some(&"7".to_string()));
    }

    #[test]
    fn test_swap() {
        let mut a = HashMap::with_hasher(SipHashBuilder::default());
        let mut b = HashMap::with_hasher(SipHashBuilder::default());
        a.insert(1, 1);
        b.insert(2, 2);
        b.insert(3, 3);

        a.swap(&mut b);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
        assert!(a.contains_key(&3));
        assert!(b.contains_key(&1));
    }

    #[test]
    fn test_extend_and_from_iter() {
        let mut map: HashMap<i32, i32, SipHashBuilder> =
            [(1, 1), (2, 2), (1, 10)].into_iter().collect();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1], 10);

        let extra = [(3, 3), (4, 4)];
        map.extend(extra.iter().map(|(k, v)| (k, v)));
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_insert_unique() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        for i in 0..20 {
            *map.insert_unique(i, 0) += i;
        }
        assert_eq!(map.len(), 20);
        assert_eq!(map.get(&19), Some(&19));
        check(&map);
    }

    #[test]
    fn test_debug() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());
        map.insert(1, "a");
        assert_eq!(format!("{map:?}"), r#"{1: "a"}"#);
    }

    #[test]
    fn test_complex_values() {
        let mut map = HashMap::with_hasher(SipHashBuilder::default());

        let vec1 = vec![1, 2, 3];
        let vec2 = vec![4, 5, 6];

        map.insert("first".to_string(), vec1.clone());
        map.insert("second".to_string(), vec2.clone());

        assert_eq!(map.get("first"), Some(&vec1));
        assert_eq!(map.get("second"), Some(&vec2));

        if let Some(v) = map.get_mut("first") {
            v.push(4);
        }

        assert_eq!(map.get("first"), Some(&vec![1, 2, 3, 4]));
    }
}
