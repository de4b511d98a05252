//! The raw main-position table.
//!
//! [`HashTable`] is the engine behind [`HashMap`](crate::HashMap) and
//! [`HashSet`](crate::HashSet). It keeps two arrays in one arena:
//!
//! - a **bucket index** of `num_buckets` links (`num_buckets` is a power of
//!   two). Each link is `(next, slot)`: `next` is either `INACTIVE`, the next
//!   bucket of the collision chain, or the bucket itself for the chain tail;
//!   `slot` points into the value store, and the bits above the bucket mask
//!   cache a fragment of the hash for cheap mismatch rejection.
//! - a **dense value store** holding exactly `len()` values with no holes.
//!
//! Every chain is rooted at its main position (`hash & mask`). A bucket may
//! host a value from a foreign chain only as a link reached from that value's
//! own main bucket; when a value whose main position is that bucket arrives,
//! the guest is kicked out to a free bucket and its chain relinked.
//!
//! Removal unlinks the bucket and then moves the last value of the store into
//! the freed slot, so the store stays packed. Iteration walks the store and
//! never touches the index.
//!
//! Like hashbrown's `HashTable`, the table does not own a hasher: callers
//! provide the hash, an equality predicate and, for operations that may have
//! to relocate values, a function rehashing a stored value.

use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::fmt::Debug;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem;
use core::ptr;
use core::ptr::NonNull;
use core::slice;

use allocator_api2::alloc::Allocator;
use allocator_api2::alloc::Global;

use crate::DEFAULT_MAX_LOAD_FACTOR;
use crate::error::TryReserveError;

/// `next` value of an unoccupied bucket.
///
/// All bits set, so a fresh index is initialized with a single byte fill and
/// no valid bucket index can collide with it.
const INACTIVE: u32 = u32::MAX;

/// Smallest bucket count ever allocated.
pub const MIN_BUCKETS: usize = 8;

/// Largest bucket count. Bucket indexes must stay below `INACTIVE`.
const MAX_BUCKETS: usize = 1 << 31;

/// Buckets probed linearly (two at a time) around the chain tail before the
/// empty-bucket search falls back to the roving cursor.
const LINEAR_PROBE: u32 = 2 + 64 / 16;

/// Accepted range (exclusive) for the maximum load factor.
const MIN_LOAD_FACTOR: f32 = 0.2;
const MAX_LOAD_FACTOR: f32 = 0.9999;

macro_rules! trace_rehash {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "mainpos_hash::rehash", $($arg)*);
    };
}

/// Folds a 64-bit hash into the 32 bits used for bucket selection and the
/// cached fragment.
#[inline(always)]
fn fold(hash: u64) -> u32 {
    (hash ^ (hash >> 32)) as u32
}

/// Number of values a table with `buckets` buckets may hold. Always leaves at
/// least one bucket free so the empty-bucket search terminates.
#[inline]
fn max_filled_for(buckets: usize, max_load_factor: f32) -> usize {
    if buckets == 0 {
        return 0;
    }
    ((buckets as f64 * max_load_factor as f64) as usize).min(buckets - 1)
}

/// Smallest legal bucket count able to hold `count` values.
fn buckets_for(count: usize, max_load_factor: f32) -> Option<usize> {
    let quotient = count as f64 / max_load_factor as f64;
    if quotient > MAX_BUCKETS as f64 {
        return None;
    }

    // Integer round-up; `f64::ceil` is not available without `std`.
    let mut wanted = quotient as usize;
    if (wanted as f64) < quotient {
        wanted += 1;
    }

    let mut buckets = wanted
        .max(MIN_BUCKETS)
        .checked_next_power_of_two()?;
    while max_filled_for(buckets, max_load_factor) < count {
        buckets = buckets.checked_mul(2)?;
    }

    (buckets <= MAX_BUCKETS).then_some(buckets)
}

/// Whether memory allocation errors should return an error or abort.
#[derive(Copy, Clone)]
enum Fallibility {
    Fallible,
    Infallible,
}

impl Fallibility {
    #[inline]
    fn capacity_overflow(self) -> TryReserveError {
        match self {
            Fallibility::Fallible => TryReserveError::CapacityOverflow,
            Fallibility::Infallible => panic!("Hash table capacity overflow"),
        }
    }

    #[inline]
    fn alloc_err(self, layout: Layout) -> TryReserveError {
        match self {
            Fallibility::Fallible => TryReserveError::AllocError { layout },
            Fallibility::Infallible => handle_alloc_error(layout),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
struct Index {
    next: u32,
    slot: u32,
}

impl Index {
    const VACANT: Index = Index {
        next: INACTIVE,
        slot: INACTIVE,
    };

    #[inline(always)]
    fn is_vacant(self) -> bool {
        self.next == INACTIVE
    }
}

#[derive(Debug)]
struct DataLayout {
    layout: Layout,
    pairs_offset: usize,
}

impl DataLayout {
    fn new<T>(buckets: usize, pairs: usize) -> Option<Self> {
        let index_layout = Layout::array::<Index>(buckets).ok()?;
        let pairs_layout = Layout::array::<T>(pairs).ok()?;

        let (layout, pairs_offset) = index_layout.extend(pairs_layout).ok()?;

        Some(DataLayout {
            layout: layout.pad_to_align(),
            pairs_offset,
        })
    }

    fn empty() -> Self {
        DataLayout {
            layout: Layout::new::<()>(),
            pairs_offset: 0,
        }
    }
}

/// Allocates an arena for `buckets` links and `pairs` values, with every link
/// marked vacant.
fn allocate_arena<T, A: Allocator>(
    alloc: &A,
    buckets: usize,
    pairs: usize,
    fallibility: Fallibility,
) -> Result<(DataLayout, NonNull<u8>), TryReserveError> {
    debug_assert!(buckets.is_power_of_two() && buckets >= MIN_BUCKETS);
    if buckets > MAX_BUCKETS {
        return Err(fallibility.capacity_overflow());
    }

    let layout = match DataLayout::new::<T>(buckets, pairs) {
        Some(layout) => layout,
        None => return Err(fallibility.capacity_overflow()),
    };

    let arena = match alloc.allocate(layout.layout) {
        Ok(block) => block.cast::<u8>(),
        Err(_) => return Err(fallibility.alloc_err(layout.layout)),
    };

    // SAFETY: The arena was just allocated with room for `buckets` links at
    // offset 0. An all-ones byte pattern is `Index::VACANT`.
    unsafe {
        ptr::write_bytes(arena.as_ptr(), 0xFF, buckets * mem::size_of::<Index>());
    }

    Ok((layout, arena))
}

/// Where a value that is not yet in the table will be linked.
#[derive(Clone, Copy, Debug)]
enum Vacancy {
    /// The main bucket is free.
    Main(u32),
    /// The main bucket hosts a guest from the chain rooted at `main`; the
    /// guest moves out and the new value takes the bucket.
    Kickout { bucket: u32, main: u32 },
    /// The main bucket owns a chain ending at `tail`; the new value is
    /// appended at a free bucket.
    Append { tail: u32 },
}

/// Low-level statistics about the chains of a table.
///
/// Only available with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct TableStats {
    /// Number of values in the table
    pub populated: usize,
    /// Number of buckets in the index
    pub buckets: usize,
    /// Values allowed before the next growth
    pub capacity: usize,
    /// Current load factor (populated / buckets)
    pub load_factor: f64,
    /// Configured maximum load factor
    pub max_load_factor: f32,
    /// Number of distinct collision chains
    pub chains: usize,
    /// Values stored in their main bucket
    pub in_main_position: usize,
    /// Length of the longest chain
    pub longest_chain: usize,
    /// `chain_lengths[n]` is the number of chains of length `n`
    pub chain_lengths: alloc::vec::Vec<usize>,
    /// Bytes held by the arena
    pub total_bytes: usize,
    /// Bytes held by unused links and unused value slots
    pub wasted_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl TableStats {
    /// Average number of buckets visited by a successful lookup.
    pub fn average_probe(&self) -> f64 {
        if self.populated == 0 {
            return 0.0;
        }
        let visits: usize = self
            .chain_lengths
            .iter()
            .enumerate()
            .map(|(len, count)| count * len * (len + 1) / 2)
            .sum();
        visits as f64 / self.populated as f64
    }

    /// Pretty-print the statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Main-position table statistics ===");
        println!(
            "Population: {}/{} buckets ({:.2}% load, max {:.2}%)",
            self.populated,
            self.buckets,
            self.load_factor * 100.0,
            self.max_load_factor * 100.0
        );
        println!(
            "Chains: {} (longest {}), {} values in main position ({:.2}%)",
            self.chains,
            self.longest_chain,
            self.in_main_position,
            if self.populated == 0 {
                0.0
            } else {
                self.in_main_position as f64 * 100.0 / self.populated as f64
            }
        );
        println!("Average probe on hit: {:.3}", self.average_probe());
        for (len, &count) in self.chain_lengths.iter().enumerate().skip(1) {
            if count == 0 {
                continue;
            }
            println!(
                "  {:>3} | {:>10} chains | {:>6.2}% of values",
                len,
                count,
                (count * len) as f64 * 100.0 / self.populated.max(1) as f64
            );
        }
        println!(
            "Memory: {} bytes, {} wasted ({:.02}%)",
            self.total_bytes,
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}

/// A hash table using main-position chaining over a densely packed store.
///
/// `HashTable<T>` stores values of type `T`. Like the hashbrown `HashTable`
/// it does not hash on its own: every operation takes the hash of the value
/// it targets, an equality predicate, and where values may be relocated, a
/// function that rehashes a stored value.
///
/// ## Performance Characteristics
///
/// - **Memory**: 8 bytes per bucket plus `size_of::<T>()` per value slot;
///   value slots are only reserved up to the load-factor limit.
/// - **Iteration**: a plain slice walk over exactly `len()` values.
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use mainpos_hash::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # #[derive(Debug, PartialEq)]
/// # struct Person {
/// #     id: u64,
/// #     name: String,
/// # }
/// #
/// # fn hash_id(id: u64) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     id.hash(&mut hasher);
/// #     hasher.finish()
/// # }
///
/// let mut table = HashTable::with_capacity(100);
///
/// match table.entry(hash_id(123), |p: &Person| p.id == 123, |p| hash_id(p.id)) {
///     mainpos_hash::hash_table::Entry::Vacant(entry) => {
///         entry.insert(Person {
///             id: 123,
///             name: "Alice".to_string(),
///         });
///     }
///     mainpos_hash::hash_table::Entry::Occupied(_) => {
///         println!("Person already exists");
///     }
/// }
///
/// assert_eq!(table.find(hash_id(123), |p| p.id == 123).unwrap().name, "Alice");
/// ```
pub struct HashTable<T, A: Allocator = Global> {
    layout: DataLayout,
    arena: NonNull<u8>,

    /// Bucket count; zero while nothing is allocated.
    num_buckets: usize,
    mask: u32,

    num_filled: usize,
    max_filled: usize,
    pairs_capacity: usize,
    max_load_factor: f32,

    /// Roving cursor of the empty-bucket search.
    last: u32,

    alloc: A,
    _phantom: PhantomData<T>,
}

// SAFETY: The table owns its values; sending or sharing it is sound exactly
// when it is for `T` and the allocator.
unsafe impl<T: Send, A: Allocator + Send> Send for HashTable<T, A> {}
// SAFETY: See above.
unsafe impl<T: Sync, A: Allocator + Sync> Sync for HashTable<T, A> {}

impl<T, A> Debug for HashTable<T, A>
where
    T: Debug,
    A: Allocator,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::ToString;
        use alloc::vec::Vec;

        f.debug_struct("HashTable")
            .field(
                "index",
                &self
                    .index()
                    .iter()
                    .enumerate()
                    .map(|(bucket, link)| {
                        if link.is_vacant() {
                            ".........".to_string()
                        } else {
                            format!(
                                "{bucket:02}->{:02}@{}",
                                link.next,
                                link.slot & self.mask
                            )
                        }
                    })
                    .collect::<Vec<_>>(),
            )
            .field("pairs", &self.as_slice())
            .field("populated", &self.num_filled)
            .field("buckets", &self.num_buckets)
            .field("capacity", &self.max_filled)
            .finish()
    }
}

impl<T, A> Clone for HashTable<T, A>
where
    T: Clone,
    A: Allocator + Clone,
{
    fn clone(&self) -> Self {
        if self.num_buckets == 0 {
            let mut table = Self::new_in(self.alloc.clone());
            table.max_load_factor = self.max_load_factor;
            return table;
        }

        let (layout, arena) = match allocate_arena::<T, A>(
            &self.alloc,
            self.num_buckets,
            self.pairs_capacity,
            Fallibility::Infallible,
        ) {
            Ok(arena) => arena,
            Err(_) => unreachable!(),
        };

        let mut table = Self {
            layout,
            arena,
            num_buckets: self.num_buckets,
            mask: self.mask,
            num_filled: 0,
            max_filled: self.max_filled,
            pairs_capacity: self.pairs_capacity,
            max_load_factor: self.max_load_factor,
            last: self.last,
            alloc: self.alloc.clone(),
            _phantom: PhantomData,
        };

        // The count is bumped after each clone so a panicking `clone` only
        // drops what was already written.
        for (slot, value) in self.as_slice().iter().enumerate() {
            // SAFETY: `slot < self.num_filled <= pairs_capacity`, and the
            // target slot is uninitialized.
            unsafe {
                table.pairs_ptr().as_ptr().add(slot).write(value.clone());
            }
            table.num_filled = slot + 1;
        }
        table.index_mut().copy_from_slice(self.index());

        table
    }
}

impl<T, A: Allocator> Drop for HashTable<T, A> {
    fn drop(&mut self) {
        // SAFETY: The first `num_filled` slots are initialized and dropped
        // exactly once here. The arena was allocated by `self.alloc` with
        // `self.layout`.
        unsafe {
            ptr::drop_in_place(self.as_mut_slice() as *mut [T]);
            if self.num_buckets != 0 {
                self.alloc.deallocate(self.arena, self.layout.layout);
            }
        }
    }
}

impl<T> HashTable<T, Global> {
    /// Creates an empty table. Nothing is allocated until the first insert.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64> = HashTable::new();
    /// assert_eq!(table.bucket_count(), 0);
    /// ```
    pub fn new() -> Self {
        Self::new_in(Global)
    }

    /// Creates a new hash table able to hold at least `capacity` values
    /// without growing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::hash_table::HashTable;
    /// #
    /// let table: HashTable<String> = HashTable::with_capacity(100);
    /// assert!(table.capacity() >= 100);
    /// assert!(table.bucket_count().is_power_of_two());
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Global)
    }
}

impl<T> Default for HashTable<T, Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: Allocator> HashTable<T, A> {
    /// Creates an empty table backed by `alloc`.
    pub fn new_in(alloc: A) -> Self {
        Self {
            layout: DataLayout::empty(),
            arena: NonNull::dangling(),
            num_buckets: 0,
            mask: 0,
            num_filled: 0,
            max_filled: 0,
            pairs_capacity: 0,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            last: 0,
            alloc,
            _phantom: PhantomData,
        }
    }

    /// Creates a table backed by `alloc` able to hold `capacity` values
    /// without growing.
    ///
    /// # Panics
    ///
    /// Panics if the capacity cannot be represented, and aborts through
    /// [`handle_alloc_error`] if the allocator fails.
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Self {
        match Self::fallible_with_capacity(capacity, alloc, Fallibility::Infallible) {
            Ok(table) => table,
            Err(_) => unreachable!(),
        }
    }

    /// Fallible version of [`with_capacity_in`](Self::with_capacity_in).
    pub fn try_with_capacity_in(capacity: usize, alloc: A) -> Result<Self, TryReserveError> {
        Self::fallible_with_capacity(capacity, alloc, Fallibility::Fallible)
    }

    fn fallible_with_capacity(
        capacity: usize,
        alloc: A,
        fallibility: Fallibility,
    ) -> Result<Self, TryReserveError> {
        let mut table = Self::new_in(alloc);
        if capacity == 0 {
            return Ok(table);
        }

        let buckets = match buckets_for(capacity, table.max_load_factor) {
            Some(buckets) => buckets,
            None => return Err(fallibility.capacity_overflow()),
        };
        let pairs = max_filled_for(buckets, table.max_load_factor);
        let (layout, arena) = allocate_arena::<T, A>(&table.alloc, buckets, pairs, fallibility)?;

        table.layout = layout;
        table.arena = arena;
        table.num_buckets = buckets;
        table.mask = (buckets - 1) as u32;
        table.max_filled = pairs;
        table.pairs_capacity = pairs;
        Ok(table)
    }

    /// Returns a reference to the underlying allocator.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    #[inline(always)]
    fn index(&self) -> &[Index] {
        // SAFETY: While allocated, the arena starts with `num_buckets`
        // initialized links. Otherwise the slice is empty and the pointer is
        // dangling but aligned.
        unsafe {
            let ptr = if self.num_buckets == 0 {
                NonNull::<Index>::dangling()
            } else {
                self.arena.cast::<Index>()
            };
            slice::from_raw_parts(ptr.as_ptr(), self.num_buckets)
        }
    }

    #[inline(always)]
    fn index_mut(&mut self) -> &mut [Index] {
        // SAFETY: See `index`.
        unsafe {
            let ptr = if self.num_buckets == 0 {
                NonNull::<Index>::dangling()
            } else {
                self.arena.cast::<Index>()
            };
            slice::from_raw_parts_mut(ptr.as_ptr(), self.num_buckets)
        }
    }

    #[inline(always)]
    fn pairs_ptr(&self) -> NonNull<T> {
        if self.num_buckets == 0 {
            return NonNull::dangling();
        }
        // SAFETY: `pairs_offset` lies within the allocation and is aligned
        // for `T` by construction of the layout.
        unsafe { self.arena.add(self.layout.pairs_offset).cast() }
    }

    #[inline(always)]
    fn link(&self, bucket: u32) -> Index {
        self.index()[bucket as usize]
    }

    #[inline(always)]
    fn set_link(&mut self, bucket: u32, link: Index) {
        self.index_mut()[bucket as usize] = link;
    }

    #[inline(always)]
    fn set_next(&mut self, bucket: u32, next: u32) {
        self.index_mut()[bucket as usize].next = next;
    }

    #[inline(always)]
    fn is_vacant(&self, bucket: u32) -> bool {
        self.link(bucket).is_vacant()
    }

    #[inline(always)]
    fn slot_of(&self, bucket: u32) -> usize {
        (self.link(bucket).slot & self.mask) as usize
    }

    #[inline(always)]
    fn fragment(&self, folded: u32) -> u32 {
        folded & !self.mask
    }

    #[inline(always)]
    fn main_bucket(&self, folded: u32) -> u32 {
        folded & self.mask
    }

    /// Main bucket of the value linked at `bucket`.
    #[inline]
    fn main_bucket_of(&self, bucket: u32, hasher: &impl Fn(&T) -> u64) -> u32 {
        let slot = self.slot_of(bucket);
        self.main_bucket(fold(hasher(&self.as_slice()[slot])))
    }

    /// Returns the values as a slice, in store order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.insert_unique(10, 10u32, |&v| v as u64);
    /// table.insert_unique(20, 20u32, |&v| v as u64);
    /// assert_eq!(table.as_slice(), &[10, 20]);
    /// ```
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: The first `num_filled` slots are initialized.
        unsafe { slice::from_raw_parts(self.pairs_ptr().as_ptr(), self.num_filled) }
    }

    /// Returns the values as a mutable slice, in store order.
    ///
    /// Mutating a value must not change its hash or its equality with other
    /// values.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: The first `num_filled` slots are initialized.
        unsafe { slice::from_raw_parts_mut(self.pairs_ptr().as_ptr(), self.num_filled) }
    }

    /// Returns an iterator over the values in store order.
    ///
    /// The order is whatever insertions and swap-removals left behind; it is
    /// not related to hash order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.as_slice().iter(),
        }
    }

    /// Returns an iterator over mutable references to the values.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            inner: self.as_mut_slice().iter_mut(),
        }
    }

    /// Removes every value, returning them in store order.
    ///
    /// The table is empty as soon as this returns, even if the iterator is
    /// leaked. Capacity is kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.insert_unique(7, "seven".to_string(), |_| 7);
    ///
    /// let values: Vec<String> = table.drain().collect();
    /// assert!(table.is_empty());
    /// assert_eq!(values, vec!["seven".to_string()]);
    /// ```
    pub fn drain(&mut self) -> Drain<'_, T, A> {
        let end = self.num_filled;
        self.num_filled = 0;
        self.reset_index();
        Drain {
            next: 0,
            end,
            table: self,
        }
    }

    /// Returns the number of values in the table.
    pub fn len(&self) -> usize {
        self.num_filled
    }

    /// Returns `true` if the table holds no values.
    pub fn is_empty(&self) -> bool {
        self.num_filled == 0
    }

    /// Number of values the table can hold before it has to grow.
    pub fn capacity(&self) -> usize {
        self.max_filled
    }

    /// Number of buckets in the index. Zero before the first allocation.
    pub fn bucket_count(&self) -> usize {
        self.num_buckets
    }

    /// Current `len() / bucket_count()`.
    pub fn load_factor(&self) -> f32 {
        if self.num_buckets == 0 {
            return 0.0;
        }
        self.num_filled as f32 / self.num_buckets as f32
    }

    /// The load factor above which an insertion grows the table.
    pub fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    /// Returns the value stored at `slot` of the dense store.
    pub fn get_index(&self, slot: usize) -> Option<&T> {
        self.as_slice().get(slot)
    }

    /// Returns the value stored at `slot` of the dense store, mutably.
    pub fn get_index_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(slot)
    }

    fn reset_index(&mut self) {
        self.index_mut().fill(Index::VACANT);
        self.last = 0;
    }

    /// Removes all values, keeping the allocation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.insert_unique(1, 1u64, |&v| v);
    /// let buckets = table.bucket_count();
    ///
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.bucket_count(), buckets);
    /// ```
    pub fn clear(&mut self) {
        let filled = mem::replace(&mut self.num_filled, 0);
        self.reset_index();

        // SAFETY: The first `filled` slots were initialized; the count was
        // reset first so a panicking destructor leaks instead of double
        // dropping.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                self.pairs_ptr().as_ptr(),
                filled,
            ));
        }
    }

    /// Finds the bucket linking the value matching `eq`.
    #[inline]
    fn find_bucket(&self, hash: u64, eq: impl Fn(&T) -> bool) -> Option<u32> {
        if self.num_filled == 0 {
            return None;
        }

        let folded = fold(hash);
        let fragment = self.fragment(folded);
        let pairs = self.as_slice();

        let bucket = self.main_bucket(folded);
        let link = self.link(bucket);
        if link.is_vacant() {
            return None;
        }
        if link.slot & !self.mask == fragment && eq(&pairs[(link.slot & self.mask) as usize]) {
            return Some(bucket);
        }
        if link.next == bucket {
            return None;
        }

        let mut next = link.next;
        loop {
            let link = self.link(next);
            if link.slot & !self.mask == fragment && eq(&pairs[(link.slot & self.mask) as usize])
            {
                return Some(next);
            }
            if link.next == next {
                return None;
            }
            next = link.next;
        }
    }

    /// Returns a reference to the value matching `eq`, if any.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.insert_unique(42, (42u64, "answer"), |&(k, _)| k);
    ///
    /// assert_eq!(table.find(42, |&(k, _)| k == 42), Some(&(42, "answer")));
    /// assert_eq!(table.find(7, |&(k, _)| k == 7), None);
    /// ```
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&T) -> bool) -> Option<&T> {
        let bucket = self.find_bucket(hash, eq)?;
        Some(&self.as_slice()[self.slot_of(bucket)])
    }

    /// Returns a mutable reference to the value matching `eq`, if any.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&T) -> bool) -> Option<&mut T> {
        let bucket = self.find_bucket(hash, eq)?;
        let slot = self.slot_of(bucket);
        Some(&mut self.as_mut_slice()[slot])
    }

    /// Returns the store slot of the value matching `eq`, if any.
    #[inline]
    pub fn find_index(&self, hash: u64, eq: impl Fn(&T) -> bool) -> Option<usize> {
        let bucket = self.find_bucket(hash, eq)?;
        Some(self.slot_of(bucket))
    }

    /// Works out where a value hashing to `folded` goes, or finds the bucket
    /// already linking an equal value.
    fn probe(
        &self,
        folded: u32,
        eq: &impl Fn(&T) -> bool,
        hasher: &impl Fn(&T) -> u64,
    ) -> Result<u32, Vacancy> {
        let fragment = self.fragment(folded);
        let pairs = self.as_slice();

        let bucket = self.main_bucket(folded);
        let link = self.link(bucket);
        if link.is_vacant() {
            return Err(Vacancy::Main(bucket));
        }
        if link.slot & !self.mask == fragment && eq(&pairs[(link.slot & self.mask) as usize]) {
            return Ok(bucket);
        }

        // A guest in our main bucket means no value with this main position
        // exists yet.
        let main = self.main_bucket_of(bucket, hasher);
        if main != bucket {
            return Err(Vacancy::Kickout { bucket, main });
        }
        if link.next == bucket {
            return Err(Vacancy::Append { tail: bucket });
        }

        let mut next = link.next;
        loop {
            let link = self.link(next);
            if link.slot & !self.mask == fragment && eq(&pairs[(link.slot & self.mask) as usize])
            {
                return Ok(next);
            }
            if link.next == next {
                return Err(Vacancy::Append { tail: next });
            }
            next = link.next;
        }
    }

    /// Like [`probe`](Self::probe) for a value known to be absent.
    fn unique_vacancy(&self, folded: u32, hasher: &impl Fn(&T) -> u64) -> Vacancy {
        let bucket = self.main_bucket(folded);
        if self.is_vacant(bucket) {
            return Vacancy::Main(bucket);
        }

        let main = self.main_bucket_of(bucket, hasher);
        if main != bucket {
            return Vacancy::Kickout { bucket, main };
        }

        Vacancy::Append {
            tail: self.find_last_bucket(bucket),
        }
    }

    /// Applies a vacancy to the index and returns the bucket the new value
    /// must be linked at.
    fn claim(&mut self, vacancy: Vacancy) -> u32 {
        match vacancy {
            Vacancy::Main(bucket) => bucket,
            Vacancy::Kickout { bucket, main } => {
                self.kickout_bucket(main, bucket);
                bucket
            }
            Vacancy::Append { tail } => {
                let bucket = self.find_empty_bucket(tail);
                self.set_next(tail, bucket);
                bucket
            }
        }
    }

    /// Writes `value` at the end of the store and links it, as a chain tail,
    /// at `bucket`.
    fn push(&mut self, bucket: u32, folded: u32, value: T) -> usize {
        let slot = self.num_filled;
        debug_assert!(slot < self.pairs_capacity);
        debug_assert!(self.is_vacant(bucket));

        // SAFETY: `slot < pairs_capacity`, so it lies inside the store, and it
        // is past the initialized prefix.
        unsafe {
            self.pairs_ptr().as_ptr().add(slot).write(value);
        }
        self.set_link(
            bucket,
            Index {
                next: bucket,
                slot: slot as u32 | self.fragment(folded),
            },
        );
        self.num_filled += 1;
        slot
    }

    /// Moves the guest linked at `bucket` (a member of the chain rooted at
    /// `main`) to a free bucket and leaves `bucket` vacant.
    ///
    /// before: main -> .. -> prev -> bucket -> next
    /// after:  main -> .. -> prev -> moved  -> next
    fn kickout_bucket(&mut self, main: u32, bucket: u32) {
        let link = self.link(bucket);
        let moved = self.find_empty_bucket(link.next);
        let prev = self.find_prev_bucket(main, bucket);

        let next = if link.next == bucket { moved } else { link.next };
        self.set_link(
            moved,
            Index {
                next,
                slot: link.slot,
            },
        );
        self.set_next(prev, moved);
        self.set_link(bucket, Index::VACANT);
    }

    /// Finds a vacant bucket, starting next to `from`.
    ///
    /// Probes a cache line's worth of buckets after `from`, then alternates
    /// between the roving cursor and a forward scan. The forward scan alone
    /// visits every bucket within `num_buckets` steps, and the load-factor
    /// limit keeps at least one bucket vacant.
    fn find_empty_bucket(&mut self, from: u32) -> u32 {
        let mask = self.mask;

        let mut bucket = from;
        for _ in 0..2 {
            bucket = bucket.wrapping_add(1) & mask;
            if self.is_vacant(bucket) {
                return bucket;
            }
        }

        let mut offset = 2;
        while offset < LINEAR_PROBE {
            let candidate = bucket.wrapping_add(offset) & mask;
            if self.is_vacant(candidate) {
                return candidate;
            }
            let candidate = candidate.wrapping_add(1) & mask;
            if self.is_vacant(candidate) {
                return candidate;
            }
            offset += 2;
        }

        let mut probe = bucket.wrapping_add(offset) & mask;
        for _ in 0..=mask {
            self.last = self.last.wrapping_add(1) & mask;
            if self.is_vacant(self.last) {
                return self.last;
            }

            if self.is_vacant(probe) {
                return probe;
            }
            probe = probe.wrapping_add(1) & mask;
        }

        unreachable!(
            "no vacant bucket among {} buckets holding {} values",
            self.num_buckets, self.num_filled
        )
    }

    fn find_last_bucket(&self, main: u32) -> u32 {
        let mut bucket = main;
        loop {
            let next = self.link(bucket).next;
            if next == bucket {
                return bucket;
            }
            bucket = next;
        }
    }

    /// Finds the chain member linking to `bucket`. `bucket` must be a
    /// non-head member of the chain rooted at `main`.
    fn find_prev_bucket(&self, main: u32, bucket: u32) -> u32 {
        let mut prev = main;
        loop {
            let next = self.link(prev).next;
            if next == bucket {
                return prev;
            }
            debug_assert_ne!(next, prev, "bucket {bucket} is not on chain {main}");
            prev = next;
        }
    }

    /// Finds the bucket whose link points at `slot`, and that value's main
    /// bucket.
    fn locate_slot(&self, slot: usize, hasher: &impl Fn(&T) -> u64) -> (u32, u32) {
        let main = self.main_bucket(fold(hasher(&self.as_slice()[slot])));
        let mut bucket = main;
        loop {
            let link = self.link(bucket);
            if (link.slot & self.mask) as usize == slot {
                return (bucket, main);
            }
            debug_assert_ne!(link.next, bucket, "slot {slot} is not linked");
            bucket = link.next;
        }
    }

    /// Unlinks `bucket` from the chain rooted at `main` and returns the
    /// bucket left unused.
    ///
    /// A chain head with a successor takes over the successor's link, so the
    /// successor's bucket is the one freed.
    fn erase_bucket(&mut self, bucket: u32, main: u32) -> u32 {
        let next = self.link(bucket).next;
        if bucket == main {
            if next != main {
                let successor = self.link(next);
                self.set_link(
                    main,
                    Index {
                        next: if successor.next == next {
                            main
                        } else {
                            successor.next
                        },
                        slot: successor.slot,
                    },
                );
            }
            return next;
        }

        let prev = self.find_prev_bucket(main, bucket);
        self.set_next(prev, if next == bucket { prev } else { next });
        bucket
    }

    /// Removes the value linked at `bucket` and closes the hole in the store
    /// by moving the last value into it.
    fn remove_bucket(&mut self, bucket: u32, main: u32, hasher: &impl Fn(&T) -> u64) -> T {
        let slot = self.slot_of(bucket);
        let last = self.num_filled - 1;

        // Run the hasher before anything is modified.
        let last_bucket = (slot != last).then(|| self.locate_slot(last, hasher).0);

        let freed = self.erase_bucket(bucket, main);
        let pairs = self.pairs_ptr().as_ptr();

        // SAFETY: `slot` and `last` are initialized slots. The value at `slot`
        // is read out exactly once; if `slot != last` the last value is moved
        // into the hole and its old slot is forgotten by lowering the count.
        let value = unsafe { pairs.add(slot).read() };
        if let Some(last_bucket) = last_bucket {
            // The head of the chain may just have taken over the link of the
            // bucket that was freed.
            let last_bucket = if last_bucket == freed { main } else { last_bucket };
            unsafe {
                ptr::copy_nonoverlapping(pairs.add(last), pairs.add(slot), 1);
            }
            let link = self.link(last_bucket);
            self.set_link(
                last_bucket,
                Index {
                    next: link.next,
                    slot: slot as u32 | (link.slot & !self.mask),
                },
            );
        }

        self.set_link(freed, Index::VACANT);
        self.num_filled = last;
        value
    }

    /// Removes and returns the value matching `eq`.
    ///
    /// If the removed value was not last in store order, the last value
    /// moves into its slot.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.insert_unique(42, 42u64, |&v| v);
    ///
    /// assert_eq!(table.remove(42, |&v| v == 42, |&v| v), Some(42));
    /// assert!(table.is_empty());
    /// assert_eq!(table.remove(99, |&v| v == 99, |&v| v), None);
    /// ```
    pub fn remove(
        &mut self,
        hash: u64,
        eq: impl Fn(&T) -> bool,
        hasher: impl Fn(&T) -> u64,
    ) -> Option<T> {
        let bucket = self.find_bucket(hash, eq)?;
        let main = self.main_bucket(fold(hash));
        Some(self.remove_bucket(bucket, main, &hasher))
    }

    /// Removes the value at `slot` of the dense store.
    ///
    /// The last value moves into `slot`, so a forward walk that removes at
    /// `slot` must look at `slot` again next.
    pub fn swap_remove_index(&mut self, slot: usize, hasher: impl Fn(&T) -> u64) -> Option<T> {
        if slot >= self.num_filled {
            return None;
        }
        let (bucket, main) = self.locate_slot(slot, &hasher);
        Some(self.remove_bucket(bucket, main, &hasher))
    }

    /// Keeps only the values for which `f` returns `true`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// for v in 0..10u64 {
    ///     table.insert_unique(v, v, |&v| v);
    /// }
    /// table.retain(|v| *v % 2 == 0, |&v| v);
    /// assert_eq!(table.len(), 5);
    /// ```
    pub fn retain(&mut self, mut f: impl FnMut(&mut T) -> bool, hasher: impl Fn(&T) -> u64) {
        let mut slot = 0;
        while slot < self.num_filled {
            if f(&mut self.as_mut_slice()[slot]) {
                slot += 1;
            } else {
                let (bucket, main) = self.locate_slot(slot, &hasher);
                drop(self.remove_bucket(bucket, main, &hasher));
            }
        }
    }

    /// Gets an entry for the given hash and equality predicate.
    ///
    /// The table only grows when the entry turns out vacant and the table is
    /// at its load-factor limit; looking up an existing value never
    /// reallocates.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::hash_table::Entry;
    /// # use mainpos_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<(u64, u32)> = HashTable::new();
    /// let hasher = |&(k, _): &(u64, u32)| k.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    ///
    /// match table.entry(hasher(&(5, 0)), |&(k, _)| k == 5, hasher) {
    ///     Entry::Vacant(entry) => {
    ///         entry.insert((5, 1));
    ///     }
    ///     Entry::Occupied(mut entry) => entry.get_mut().1 += 1,
    /// }
    ///
    /// table
    ///     .entry(hasher(&(5, 0)), |&(k, _)| k == 5, hasher)
    ///     .and_modify(|(_, count)| *count += 1);
    /// assert_eq!(table.find(hasher(&(5, 0)), |&(k, _)| k == 5), Some(&(5, 2)));
    /// ```
    #[inline]
    pub fn entry(
        &mut self,
        hash: u64,
        eq: impl Fn(&T) -> bool,
        hasher: impl Fn(&T) -> u64,
    ) -> Entry<'_, T, A> {
        let folded = fold(hash);

        if self.num_buckets != 0 {
            match self.probe(folded, &eq, &hasher) {
                Ok(bucket) => {
                    return Entry::Occupied(OccupiedEntry {
                        main: self.main_bucket(folded),
                        bucket,
                        table: self,
                    });
                }
                Err(vacancy) if self.num_filled < self.max_filled => {
                    return Entry::Vacant(VacantEntry {
                        folded,
                        vacancy,
                        table: self,
                    });
                }
                Err(_) => {}
            }
        }

        self.grow(&hasher);
        let vacancy = self.unique_vacancy(folded, &hasher);
        Entry::Vacant(VacantEntry {
            folded,
            vacancy,
            table: self,
        })
    }

    /// Inserts a value the caller guarantees is not in the table yet,
    /// skipping the equality walk.
    ///
    /// Inserting a duplicate this way does not break memory safety, but the
    /// table will then hold two equal values and lookups may return either.
    pub fn insert_unique(&mut self, hash: u64, value: T, hasher: impl Fn(&T) -> u64) -> &mut T {
        if self.num_filled >= self.max_filled {
            self.grow(&hasher);
        }

        let folded = fold(hash);
        let vacancy = self.unique_vacancy(folded, &hasher);
        let bucket = self.claim(vacancy);
        let slot = self.push(bucket, folded, value);
        &mut self.as_mut_slice()[slot]
    }

    #[cold]
    #[inline(never)]
    fn grow(&mut self, hasher: &impl Fn(&T) -> u64) {
        if self
            .reserve_rehash(1, hasher, Fallibility::Infallible)
            .is_err()
        {
            unreachable!()
        }
    }

    /// Reserves room for at least `additional` more values.
    ///
    /// # Panics
    ///
    /// Panics if the new bucket count overflows the 32-bit index, and aborts
    /// through [`handle_alloc_error`] if allocation fails.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.reserve(50, |&v| v);
    /// assert!(table.capacity() >= 50);
    /// ```
    pub fn reserve(&mut self, additional: usize, hasher: impl Fn(&T) -> u64) {
        if self
            .reserve_rehash(additional, &hasher, Fallibility::Infallible)
            .is_err()
        {
            unreachable!()
        }
    }

    /// Tries to reserve room for at least `additional` more values.
    ///
    /// On error the table is left untouched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::TryReserveError;
    /// # use mainpos_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// assert!(table.try_reserve(100, |&v| v).is_ok());
    /// assert_eq!(
    ///     table.try_reserve(usize::MAX, |&v| v),
    ///     Err(TryReserveError::CapacityOverflow)
    /// );
    /// ```
    pub fn try_reserve(
        &mut self,
        additional: usize,
        hasher: impl Fn(&T) -> u64,
    ) -> Result<(), TryReserveError> {
        self.reserve_rehash(additional, &hasher, Fallibility::Fallible)
    }

    fn reserve_rehash(
        &mut self,
        additional: usize,
        hasher: &impl Fn(&T) -> u64,
        fallibility: Fallibility,
    ) -> Result<(), TryReserveError> {
        let required = match self.num_filled.checked_add(additional) {
            Some(required) => required,
            None => return Err(fallibility.capacity_overflow()),
        };
        if required <= self.max_filled {
            return Ok(());
        }

        let buckets = match buckets_for(required, self.max_load_factor) {
            Some(buckets) => buckets.max(self.num_buckets),
            None => return Err(fallibility.capacity_overflow()),
        };
        self.resize(buckets, hasher, fallibility)
    }

    /// Rebuilds the index with at least `buckets` buckets (rounded up to a
    /// power of two, and never below what the current population needs).
    ///
    /// Unlike automatic growth this may shrink the table.
    pub fn rehash(&mut self, buckets: usize, hasher: impl Fn(&T) -> u64) {
        let needed = match buckets_for(self.num_filled, self.max_load_factor) {
            Some(needed) => needed,
            None => panic!("Hash table capacity overflow"),
        };
        let buckets = match buckets.max(MIN_BUCKETS).checked_next_power_of_two() {
            Some(buckets) => buckets.max(needed),
            None => panic!("Hash table capacity overflow"),
        };

        if self
            .resize(buckets, &hasher, Fallibility::Infallible)
            .is_err()
        {
            unreachable!()
        }
    }

    /// Shrinks the table to the smallest bucket count able to hold its
    /// values. An empty table releases its allocation entirely.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::with_capacity(1000);
    /// table.insert_unique(5, 5, |&v| v);
    ///
    /// table.shrink_to_fit(|&v| v);
    /// assert_eq!(table.bucket_count(), 8);
    /// assert_eq!(table.find(5, |&v| v == 5), Some(&5));
    /// ```
    pub fn shrink_to_fit(&mut self, hasher: impl Fn(&T) -> u64) {
        if self.num_filled == 0 {
            if self.num_buckets != 0 {
                trace_rehash!(from = self.num_buckets, "releasing empty table");
                // SAFETY: The arena was allocated by `self.alloc` with
                // `self.layout` and holds no live values.
                unsafe {
                    self.alloc.deallocate(self.arena, self.layout.layout);
                }
                self.arena = NonNull::dangling();
                self.layout = DataLayout::empty();
                self.num_buckets = 0;
                self.mask = 0;
                self.max_filled = 0;
                self.pairs_capacity = 0;
                self.last = 0;
            }
            return;
        }

        if let Some(buckets) = buckets_for(self.num_filled, self.max_load_factor)
            && (buckets < self.num_buckets
                || self.pairs_capacity > max_filled_for(buckets, self.max_load_factor))
            && self
                .resize(buckets, &hasher, Fallibility::Infallible)
                .is_err()
        {
            unreachable!()
        }
    }

    /// Sets the maximum load factor. Values outside `(0.2, 0.9999)` are
    /// ignored.
    ///
    /// If the table is now above the new limit it grows immediately.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.set_max_load_factor(0.5, |&v| v);
    /// assert_eq!(table.max_load_factor(), 0.5);
    ///
    /// table.set_max_load_factor(1.5, |&v| v);
    /// assert_eq!(table.max_load_factor(), 0.5);
    /// ```
    pub fn set_max_load_factor(&mut self, max_load_factor: f32, hasher: impl Fn(&T) -> u64) {
        if !(max_load_factor > MIN_LOAD_FACTOR && max_load_factor < MAX_LOAD_FACTOR) {
            return;
        }

        self.max_load_factor = max_load_factor;
        if self.num_buckets == 0 {
            return;
        }

        let allowed = max_filled_for(self.num_buckets, max_load_factor);
        self.max_filled = allowed.min(self.pairs_capacity);
        if self.num_filled > allowed
            && self
                .reserve_rehash(0, &hasher, Fallibility::Infallible)
                .is_err()
        {
            unreachable!()
        }
    }

    /// Moves the store into a fresh arena with `buckets` buckets and relinks
    /// every value.
    ///
    /// The store is copied bitwise in one piece; values are never
    /// reconstructed. On error nothing has been modified.
    fn resize(
        &mut self,
        buckets: usize,
        hasher: &impl Fn(&T) -> u64,
        fallibility: Fallibility,
    ) -> Result<(), TryReserveError> {
        let pairs_capacity = max_filled_for(buckets, self.max_load_factor);
        debug_assert!(pairs_capacity >= self.num_filled);

        let (layout, arena) =
            allocate_arena::<T, A>(&self.alloc, buckets, pairs_capacity, fallibility)?;

        // SAFETY: The new store has room for `pairs_capacity >= num_filled`
        // values and does not overlap the old arena. After the copy the old
        // store only holds moved-from bits and is released without dropping.
        unsafe {
            ptr::copy_nonoverlapping(
                self.pairs_ptr().as_ptr(),
                arena.add(layout.pairs_offset).cast::<T>().as_ptr(),
                self.num_filled,
            );
        }

        let old_layout = mem::replace(&mut self.layout, layout);
        let old_arena = mem::replace(&mut self.arena, arena);
        let old_buckets = mem::replace(&mut self.num_buckets, buckets);
        self.mask = (buckets - 1) as u32;
        self.max_filled = pairs_capacity;
        self.pairs_capacity = pairs_capacity;
        self.last = 0;

        if old_buckets != 0 {
            // SAFETY: The old arena was allocated by `self.alloc` with
            // `old_layout`, and its values were moved out above.
            unsafe {
                self.alloc.deallocate(old_arena, old_layout.layout);
            }
        }

        trace_rehash!(
            from = old_buckets,
            to = buckets,
            populated = self.num_filled,
            "rehashing"
        );

        for slot in 0..self.num_filled {
            let folded = fold(hasher(&self.as_slice()[slot]));
            let vacancy = self.unique_vacancy(folded, hasher);
            let bucket = self.claim(vacancy);
            self.set_link(
                bucket,
                Index {
                    next: bucket,
                    slot: slot as u32 | self.fragment(folded),
                },
            );
        }

        Ok(())
    }

    /// Collects chain statistics.
    #[cfg(any(test, feature = "stats"))]
    pub fn stats(&self, hasher: impl Fn(&T) -> u64) -> TableStats {
        let mut chain_lengths = alloc::vec![0usize; 2];
        let mut chains = 0;
        let mut longest_chain = 0;

        for bucket in 0..self.num_buckets as u32 {
            if self.is_vacant(bucket) || self.main_bucket_of(bucket, &hasher) != bucket {
                continue;
            }

            let mut len = 1;
            let mut cur = bucket;
            while self.link(cur).next != cur {
                cur = self.link(cur).next;
                len += 1;
            }

            chains += 1;
            longest_chain = longest_chain.max(len);
            if chain_lengths.len() <= len {
                chain_lengths.resize(len + 1, 0);
            }
            chain_lengths[len] += 1;
        }

        TableStats {
            populated: self.num_filled,
            buckets: self.num_buckets,
            capacity: self.max_filled,
            load_factor: if self.num_buckets == 0 {
                0.0
            } else {
                self.num_filled as f64 / self.num_buckets as f64
            },
            max_load_factor: self.max_load_factor,
            chains,
            in_main_position: chains,
            longest_chain,
            chain_lengths,
            total_bytes: self.layout.layout.size(),
            wasted_bytes: (self.num_buckets - self.num_filled) * mem::size_of::<Index>()
                + (self.pairs_capacity - self.num_filled) * mem::size_of::<T>(),
        }
    }

    /// Asserts every structural invariant of the index.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self, hasher: impl Fn(&T) -> u64) {
        use alloc::vec;

        assert!(self.num_filled <= self.max_filled);
        assert!(self.max_filled <= self.pairs_capacity);
        if self.num_buckets == 0 {
            assert_eq!(self.num_filled, 0);
            return;
        }
        assert!(self.num_buckets.is_power_of_two());
        assert!(self.num_filled < self.num_buckets);

        let mut claimed = vec![false; self.num_filled];
        let mut occupied = 0;
        for bucket in 0..self.num_buckets as u32 {
            let link = self.link(bucket);
            if link.is_vacant() {
                continue;
            }
            occupied += 1;

            let slot = (link.slot & self.mask) as usize;
            assert!(slot < self.num_filled, "bucket {bucket} links dead slot {slot}");
            assert!(!claimed[slot], "slot {slot} linked twice");
            claimed[slot] = true;

            let folded = fold(hasher(&self.as_slice()[slot]));
            assert_eq!(link.slot & !self.mask, self.fragment(folded));

            // The chain must be rooted at the value's main bucket, whose head
            // holds a value of the same main position.
            let main = self.main_bucket(folded);
            assert_eq!(self.main_bucket_of(main, &hasher), main);
            let mut cur = main;
            let mut steps = 0;
            while cur != bucket {
                let next = self.link(cur).next;
                assert_ne!(next, cur, "bucket {bucket} unreachable from {main}");
                assert!(!self.is_vacant(next));
                cur = next;
                steps += 1;
                assert!(steps <= self.num_buckets, "cycle on chain {main}");
            }
        }

        assert_eq!(occupied, self.num_filled);
        assert!(claimed.into_iter().all(|c| c));
    }
}

/// A view into a single entry in the table, which may be vacant or occupied.
///
/// Created by [`HashTable::entry`].
pub enum Entry<'a, T, A: Allocator = Global> {
    /// No value matched.
    Vacant(VacantEntry<'a, T, A>),
    /// A value matched.
    Occupied(OccupiedEntry<'a, T, A>),
}

impl<'a, T, A: Allocator> Entry<'a, T, A> {
    /// Ensures a value is present by inserting `default` if vacant.
    pub fn or_insert(self, default: T) -> &'a mut T {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Ensures a value is present by inserting the result of `default` if
    /// vacant.
    pub fn or_insert_with(self, default: impl FnOnce() -> T) -> &'a mut T {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Runs `f` on an occupied value and returns it, or `None` when vacant.
    pub fn and_modify(self, f: impl FnOnce(&mut T)) -> Option<&'a mut T> {
        match self {
            Entry::Occupied(entry) => {
                let value = entry.into_mut();
                f(value);
                Some(value)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Inserts `T::default()` if vacant.
    pub fn or_default(self) -> &'a mut T
    where
        T: Default,
    {
        self.or_insert_with(Default::default)
    }
}

/// A vacant entry. Nothing in the table changes until [`insert`] runs.
///
/// [`insert`]: VacantEntry::insert
pub struct VacantEntry<'a, T, A: Allocator = Global> {
    table: &'a mut HashTable<T, A>,
    folded: u32,
    vacancy: Vacancy,
}

impl<'a, T, A: Allocator> VacantEntry<'a, T, A> {
    /// Inserts `value` and returns a reference to it.
    pub fn insert(self, value: T) -> &'a mut T {
        let bucket = self.table.claim(self.vacancy);
        let slot = self.table.push(bucket, self.folded, value);
        &mut self.table.as_mut_slice()[slot]
    }

    /// Store slot the value will occupy once inserted.
    pub fn index(&self) -> usize {
        self.table.num_filled
    }
}

/// An occupied entry.
pub struct OccupiedEntry<'a, T, A: Allocator = Global> {
    table: &'a mut HashTable<T, A>,
    bucket: u32,
    main: u32,
}

impl<'a, T, A: Allocator> OccupiedEntry<'a, T, A> {
    /// Store slot of the value.
    pub fn index(&self) -> usize {
        self.table.slot_of(self.bucket)
    }

    /// Returns a reference to the value.
    pub fn get(&self) -> &T {
        &self.table.as_slice()[self.index()]
    }

    /// Returns a mutable reference to the value.
    pub fn get_mut(&mut self) -> &mut T {
        let slot = self.index();
        &mut self.table.as_mut_slice()[slot]
    }

    /// Converts the entry into a mutable reference bound to the table.
    pub fn into_mut(self) -> &'a mut T {
        let slot = self.index();
        &mut self.table.as_mut_slice()[slot]
    }

    /// Removes the value. The last value of the store moves into its slot.
    pub fn remove(self, hasher: impl Fn(&T) -> u64) -> T {
        self.table.remove_bucket(self.bucket, self.main, &hasher)
    }
}

/// Iterator over the values of a [`HashTable`], in store order.
pub struct Iter<'a, T> {
    inner: slice::Iter<'a, T>,
}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Iter {
            inner: self.inner.clone(),
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

/// Mutable iterator over the values of a [`HashTable`], in store order.
pub struct IterMut<'a, T> {
    inner: slice::IterMut<'a, T>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}
impl<T> FusedIterator for IterMut<'_, T> {}

/// Draining iterator returned by [`HashTable::drain`].
pub struct Drain<'a, T, A: Allocator = Global> {
    table: &'a mut HashTable<T, A>,
    next: usize,
    end: usize,
}

impl<T, A: Allocator> Iterator for Drain<'_, T, A> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == self.end {
            return None;
        }
        // SAFETY: Slots `next..end` still hold values that were detached
        // from the table when the drain started; each is read once.
        let value = unsafe { self.table.pairs_ptr().as_ptr().add(self.next).read() };
        self.next += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.end - self.next;
        (len, Some(len))
    }
}

impl<T, A: Allocator> DoubleEndedIterator for Drain<'_, T, A> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.next == self.end {
            return None;
        }
        self.end -= 1;
        // SAFETY: See `next`.
        Some(unsafe { self.table.pairs_ptr().as_ptr().add(self.end).read() })
    }
}

impl<T, A: Allocator> ExactSizeIterator for Drain<'_, T, A> {}
impl<T, A: Allocator> FusedIterator for Drain<'_, T, A> {}

impl<T, A: Allocator> Drop for Drain<'_, T, A> {
    fn drop(&mut self) {
        let remaining = mem::replace(&mut self.next, self.end);
        // SAFETY: Slots `remaining..end` were never yielded.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                self.table.pairs_ptr().as_ptr().add(remaining),
                self.end - remaining,
            ));
        }
    }
}

/// Owning iterator over the values of a [`HashTable`], in store order.
pub struct IntoIter<T, A: Allocator = Global> {
    table: HashTable<T, A>,
    next: usize,
    end: usize,
}

impl<T, A: Allocator> IntoIterator for HashTable<T, A> {
    type Item = T;
    type IntoIter = IntoIter<T, A>;

    fn into_iter(mut self) -> Self::IntoIter {
        let end = mem::replace(&mut self.num_filled, 0);
        IntoIter {
            table: self,
            next: 0,
            end,
        }
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a HashTable<T, A> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a mut HashTable<T, A> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T, A: Allocator> Iterator for IntoIter<T, A> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == self.end {
            return None;
        }
        // SAFETY: Slots `next..end` hold values the table no longer counts;
        // each is read once.
        let value = unsafe { self.table.pairs_ptr().as_ptr().add(self.next).read() };
        self.next += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.end - self.next;
        (len, Some(len))
    }
}

impl<T, A: Allocator> DoubleEndedIterator for IntoIter<T, A> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.next == self.end {
            return None;
        }
        self.end -= 1;
        // SAFETY: See `next`.
        Some(unsafe { self.table.pairs_ptr().as_ptr().add(self.end).read() })
    }
}

impl<T, A: Allocator> ExactSizeIterator for IntoIter<T, A> {}
impl<T, A: Allocator> FusedIterator for IntoIter<T, A> {}

impl<T, A: Allocator> Drop for IntoIter<T, A> {
    fn drop(&mut self) {
        let remaining = mem::replace(&mut self.next, self.end);
        // SAFETY: Slots `remaining..end` were never yielded. The table drops
        // nothing itself because its count was zeroed.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                self.table.pairs_ptr().as_ptr().add(remaining),
                self.end - remaining,
            ));
        }
    }
}
