use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::Chain;
use core::iter::FusedIterator;

use allocator_api2::alloc::Allocator;
use allocator_api2::alloc::Global;
use equivalent::Equivalent;

use crate::DefaultHashBuilder;
use crate::error::TryReserveError;
use crate::hash_table::Entry;
use crate::hash_table::HashTable;

/// A hash set implemented on the main-position [`HashTable`].
///
/// `HashSet<T, S>` stores values of type `T` where `T` implements `Hash + Eq`
/// and uses a configurable hasher builder `S` to hash values. Values sit in a
/// dense store; removing one moves the last value into its slot.
///
/// # Performance Characteristics
///
/// - **Memory**: 8 bytes per bucket, plus the size of `T` per value slot.
#[derive(Clone)]
pub struct HashSet<T, S = DefaultHashBuilder, A: Allocator = Global> {
    table: HashTable<T, A>,
    hash_builder: S,
}

impl<T, S, A> PartialEq for HashSet<T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|v| other.contains(v))
    }
}

impl<T, S, A> Eq for HashSet<T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
}

impl<T, S, A> Debug for HashSet<T, S, A>
where
    T: Debug,
    A: Allocator,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(any(feature = "foldhash", feature = "std"))]
impl<T> HashSet<T, DefaultHashBuilder> {
    /// Creates an empty set using the default hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashSet;
    /// #
    /// let set: HashSet<i32> = HashSet::new();
    /// assert!(set.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates a set able to hold `capacity` values without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<T, S> HashSet<T, S> {
    /// Creates a new hash set with the given hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_hasher_in(hash_builder, Global)
    }

    /// Creates a new hash set with the specified capacity and hasher builder.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }
}

impl<T, S, A: Allocator> HashSet<T, S, A> {
    /// Creates an empty set with the given hasher builder and allocator.
    pub fn with_hasher_in(hash_builder: S, alloc: A) -> Self {
        Self {
            table: HashTable::new_in(alloc),
            hash_builder,
        }
    }

    /// Returns a reference to the set's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the number of elements in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of values the set can hold before it has to grow.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Number of buckets in the index.
    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    /// Current `len() / bucket_count()`.
    pub fn load_factor(&self) -> f32 {
        self.table.load_factor()
    }

    /// Removes all elements, keeping the allocation.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns an iterator over the values in store order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Clears the set, returning all values as an iterator.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashSet;
    /// #
    /// let mut set: HashSet<i32> = [1, 2, 3].into_iter().collect();
    /// let mut drained: Vec<_> = set.drain().collect();
    /// drained.sort();
    /// assert_eq!(drained, vec![1, 2, 3]);
    /// assert!(set.is_empty());
    /// ```
    pub fn drain(&mut self) -> Drain<'_, T, A> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<T, S, A> HashSet<T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    /// Reserves capacity for at least `additional` more values.
    pub fn reserve(&mut self, additional: usize) {
        self.table
            .reserve(additional, |v| self.hash_builder.hash_one(v));
    }

    /// Tries to reserve capacity for at least `additional` more values.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.table
            .try_reserve(additional, |v| self.hash_builder.hash_one(v))
    }

    /// Shrinks the set to the smallest bucket count able to hold its values.
    pub fn shrink_to_fit(&mut self) {
        self.table
            .shrink_to_fit(|v| self.hash_builder.hash_one(v));
    }

    /// Adds a value to the set. Returns whether it was newly inserted; an
    /// equal value already present is kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashSet;
    /// #
    /// let mut set = HashSet::new();
    /// assert!(set.insert(2));
    /// assert!(!set.insert(2));
    /// assert_eq!(set.len(), 1);
    /// ```
    pub fn insert(&mut self, value: T) -> bool {
        let hash = self.hash_builder.hash_one(&value);
        match self
            .table
            .entry(hash, |v| *v == value, |v| self.hash_builder.hash_one(v))
        {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    /// Adds a value, replacing and returning an equal value already present.
    pub fn replace(&mut self, value: T) -> Option<T> {
        let hash = self.hash_builder.hash_one(&value);
        match self
            .table
            .entry(hash, |v| *v == value, |v| self.hash_builder.hash_one(v))
        {
            Entry::Occupied(mut entry) => Some(core::mem::replace(entry.get_mut(), value)),
            Entry::Vacant(entry) => {
                entry.insert(value);
                None
            }
        }
    }

    /// Returns `true` if the set contains a value equal to `value`.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<T>,
    {
        self.get(value).is_some()
    }

    /// Returns a reference to the stored value equal to `value`.
    pub fn get<Q>(&self, value: &Q) -> Option<&T>
    where
        Q: ?Sized + Hash + Equivalent<T>,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.find(hash, |v| value.equivalent(v))
    }

    /// Removes a value from the set. Returns whether it was present.
    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<T>,
    {
        self.take(value).is_some()
    }

    /// Removes and returns the stored value equal to `value`.
    pub fn take<Q>(&mut self, value: &Q) -> Option<T>
    where
        Q: ?Sized + Hash + Equivalent<T>,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.remove(
            hash,
            |v| value.equivalent(v),
            |v| self.hash_builder.hash_one(v),
        )
    }

    /// Retains only the elements specified by the predicate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashSet;
    /// #
    /// let mut set: HashSet<i32> = (1..=4).collect();
    /// set.retain(|&x| x % 2 == 0);
    /// assert_eq!(set.len(), 2);
    /// assert!(set.contains(&2));
    /// assert!(set.contains(&4));
    /// ```
    pub fn retain(&mut self, mut f: impl FnMut(&T) -> bool) {
        self.table
            .retain(|v| f(v), |v| self.hash_builder.hash_one(v));
    }

    /// Returns `true` if `self` has no elements in common with `other`.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.iter().all(|v| !large.contains(v))
    }

    /// Returns `true` if every element of `self` is in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.iter().all(|v| other.contains(v))
    }

    /// Returns `true` if every element of `other` is in `self`.
    pub fn is_superset(&self, other: &Self) -> bool {
        other.is_subset(self)
    }

    /// Visits the values of `self`, then those of `other` not in `self`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use mainpos_hash::HashSet;
    /// #
    /// let a: HashSet<i32> = [1, 2].into_iter().collect();
    /// let b: HashSet<i32> = [2, 3].into_iter().collect();
    ///
    /// let mut union: Vec<_> = a.union(&b).copied().collect();
    /// union.sort();
    /// assert_eq!(union, vec![1, 2, 3]);
    /// ```
    pub fn union<'a>(&'a self, other: &'a Self) -> Union<'a, T, S, A> {
        Union {
            iter: self.iter().chain(other.difference(self)),
        }
    }

    /// Visits the values present in both sets.
    pub fn intersection<'a>(&'a self, other: &'a Self) -> Intersection<'a, T, S, A> {
        let (iter, other) = if self.len() <= other.len() {
            (self.iter(), other)
        } else {
            (other.iter(), self)
        };
        Intersection { iter, other }
    }

    /// Visits the values of `self` that are not in `other`.
    pub fn difference<'a>(&'a self, other: &'a Self) -> Difference<'a, T, S, A> {
        Difference {
            iter: self.iter(),
            other,
        }
    }

    /// Visits the values in exactly one of the two sets.
    pub fn symmetric_difference<'a>(&'a self, other: &'a Self) -> SymmetricDifference<'a, T, S, A> {
        SymmetricDifference {
            iter: self.difference(other).chain(other.difference(self)),
        }
    }
}

impl<T, S, A> Default for HashSet<T, S, A>
where
    S: Default,
    A: Allocator + Default,
{
    fn default() -> Self {
        Self::with_hasher_in(S::default(), A::default())
    }
}

impl<T, S, A> Extend<T> for HashSet<T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for value in iter {
            self.insert(value);
        }
    }
}

impl<'a, T, S, A> Extend<&'a T> for HashSet<T, S, A>
where
    T: Hash + Eq + Copy + 'a,
    S: BuildHasher,
    A: Allocator,
{
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        self.extend(iter.into_iter().copied());
    }
}

impl<T, S, A> FromIterator<T> for HashSet<T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
    A: Allocator + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::default();
        set.extend(iter);
        set
    }
}

impl<T, S, A: Allocator> IntoIterator for HashSet<T, S, A> {
    type Item = T;
    type IntoIter = IntoIter<T, A>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, T, S, A: Allocator> IntoIterator for &'a HashSet<T, S, A> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the values of a `HashSet`.
pub struct Iter<'a, T> {
    inner: crate::hash_table::Iter<'a, T>,
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

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

/// A draining iterator over the values of a `HashSet`.
pub struct Drain<'a, T, A: Allocator = Global> {
    inner: crate::hash_table::Drain<'a, T, A>,
}

impl<T, A: Allocator> Iterator for Drain<'_, T, A> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T, A: Allocator> ExactSizeIterator for Drain<'_, T, A> {}
impl<T, A: Allocator> FusedIterator for Drain<'_, T, A> {}

/// An owning iterator over the values of a `HashSet`.
pub struct IntoIter<T, A: Allocator = Global> {
    inner: crate::hash_table::IntoIter<T, A>,
}

impl<T, A: Allocator> Iterator for IntoIter<T, A> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T, A: Allocator> ExactSizeIterator for IntoIter<T, A> {}
impl<T, A: Allocator> FusedIterator for IntoIter<T, A> {}

/// An iterator over the union of two sets.
pub struct Union<'a, T, S, A: Allocator = Global> {
    iter: Chain<Iter<'a, T>, Difference<'a, T, S, A>>,
}

impl<'a, T, S, A> Iterator for Union<'a, T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// An iterator over the intersection of two sets.
pub struct Intersection<'a, T, S, A: Allocator = Global> {
    iter: Iter<'a, T>,
    other: &'a HashSet<T, S, A>,
}

impl<'a, T, S, A> Iterator for Intersection<'a, T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let v = self.iter.next()?;
            if self.other.contains(v) {
                return Some(v);
            }
        }
    }
}

/// An iterator over the difference of two sets.
pub struct Difference<'a, T, S, A: Allocator = Global> {
    iter: Iter<'a, T>,
    other: &'a HashSet<T, S, A>,
}

impl<'a, T, S, A> Iterator for Difference<'a, T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let v = self.iter.next()?;
            if !self.other.contains(v) {
                return Some(v);
            }
        }
    }
}

/// An iterator over the symmetric difference of two sets.
pub struct SymmetricDifference<'a, T, S, A: Allocator = Global> {
    iter: Chain<Difference<'a, T, S, A>, Difference<'a, T, S, A>>,
}

impl<'a, T, S, A> Iterator for SymmetricDifference<'a, T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::hash::BuildHasher;

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
            Self {
                k1: OsRng.try_next_u64().unwrap_or(0),
                k2: OsRng.try_next_u64().unwrap_or(0),
            }
        }
    }

    fn set_of(values: &[i32], hash_builder: &SipHashBuilder) -> HashSet<i32, SipHashBuilder> {
        let mut set = HashSet::with_hasher(hash_builder.clone());
        set.extend(values);
        set
    }

    fn sorted<'a>(iter: impl Iterator<Item = &'a i32>) -> Vec<i32> {
        let mut values: Vec<i32> = iter.copied().collect();
        values.sort();
        values
    }

    #[test]
    fn test_new_and_with_hasher() {
        let set: HashSet<i32, SipHashBuilder> = HashSet::with_hasher(SipHashBuilder::default());
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert_eq!(set.bucket_count(), 0);
    }

    #[test]
    fn test_with_capacity() {
        let set: HashSet<i32, SipHashBuilder> =
            HashSet::with_capacity_and_hasher(100, SipHashBuilder::default());
        assert!(set.capacity() >= 100);
        assert!(set.is_empty());
    }

    #[test]
    fn test_insert_and_contains() {
        let mut set = HashSet::with_hasher(SipHashBuilder::default());
        assert!(set.insert(1));
        assert!(set.insert(2));
        assert!(!set.insert(1));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&1));
        assert!(set.contains(&2));
        assert!(!set.contains(&3));
    }

    #[test]
    fn test_remove_and_take() {
        let mut set = HashSet::with_hasher(SipHashBuilder::default());
        set.insert("a".to_string());
        set.insert("b".to_string());

        assert!(set.remove("a"));
        assert!(!set.remove("a"));
        assert_eq!(set.take("b"), Some("b".to_string()));
        assert_eq!(set.take("b"), None);
        assert!(set.is_empty());
    }

    #[test]
    fn test_get_and_replace() {
        let mut set = HashSet::with_hasher(SipHashBuilder::default());
        set.insert(String::from("key"));
        assert_eq!(set.get("key"), Some(&"key".to_string()));
        assert_eq!(set.replace("key".to_string()), Some("key".to_string()));
        assert_eq!(set.replace("other".to_string()), None);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_clear_and_reserve() {
        let mut set = HashSet::with_hasher(SipHashBuilder::default());
        set.reserve(100);
        assert!(set.capacity() >= 100);
        for i in 0..100 {
            set.insert(i);
        }
        let buckets = set.bucket_count();
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.bucket_count(), buckets);
        assert!(set.try_reserve(10).is_ok());

        set.shrink_to_fit();
        assert_eq!(set.bucket_count(), 0);
    }

    #[test]
    fn test_iter_and_into_iter() {
        let mut set = HashSet::with_hasher(SipHashBuilder::default());
        for i in [5, 3, 9] {
            set.insert(i);
        }
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![5, 3, 9]);
        assert_eq!(set.iter().len(), 3);
        assert_eq!((&set).into_iter().count(), 3);

        let mut owned: Vec<i32> = set.into_iter().collect();
        owned.sort();
        assert_eq!(owned, vec![3, 5, 9]);
    }

    #[test]
    fn test_drain() {
        let hash_builder = SipHashBuilder::default();
        let mut set = set_of(&[1, 2, 3], &hash_builder);
        assert_eq!(set.drain().count(), 3);
        assert!(set.is_empty());
        assert!(set.insert(4));
    }

    #[test]
    fn test_retain() {
        let mut set = HashSet::with_hasher(SipHashBuilder::default());
        set.extend(0..100);
        set.retain(|v| v % 10 == 0);
        assert_eq!(set.len(), 10);
        assert!(set.contains(&90));
        assert!(!set.contains(&91));
    }

    #[test]
    fn test_insert_remove_cycle() {
        let mut set = HashSet::with_hasher(SipHashBuilder::default());
        for round in 0..5 {
            for i in 0..200 {
                assert!(set.insert(i + round));
            }
            for i in 0..200 {
                assert!(set.remove(&(i + round)));
            }
            assert!(set.is_empty());
        }
    }

    #[test]
    fn test_eq_and_debug() {
        let hash_builder = SipHashBuilder::default();
        let a = set_of(&[1, 2, 3], &hash_builder);
        let b = set_of(&[3, 2, 1], &hash_builder);
        let c = set_of(&[1, 2], &hash_builder);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(alloc::format!("{c:?}"), "{1, 2}");
    }

    #[test]
    fn test_is_disjoint() {
        let hash_builder = SipHashBuilder::default();
        let a = set_of(&[1, 2, 3], &hash_builder);
        let mut b = set_of(&[4, 5, 6], &hash_builder);

        assert!(a.is_disjoint(&b));
        assert!(b.is_disjoint(&a));

        b.insert(2);
        assert!(!a.is_disjoint(&b));
        assert!(!b.is_disjoint(&a));
    }

    #[test]
    fn test_is_subset_and_superset() {
        let hash_builder = SipHashBuilder::default();
        let a = set_of(&[1, 2], &hash_builder);
        let b = set_of(&[1, 2, 3], &hash_builder);

        assert!(a.is_subset(&b));
        assert!(!b.is_subset(&a));
        assert!(a.is_subset(&a));
        assert!(b.is_superset(&a));
        assert!(!a.is_superset(&b));
    }

    #[test]
    fn test_set_algebra() {
        let hash_builder = SipHashBuilder::default();
        let a = set_of(&[1, 2, 3], &hash_builder);
        let b = set_of(&[3, 4, 5], &hash_builder);

        assert_eq!(sorted(a.union(&b)), vec![1, 2, 3, 4, 5]);
        assert_eq!(sorted(a.intersection(&b)), vec![3]);
        assert_eq!(sorted(a.difference(&b)), vec![1, 2]);
        assert_eq!(sorted(b.difference(&a)), vec![4, 5]);
        assert_eq!(sorted(a.symmetric_difference(&b)), vec![1, 2, 4, 5]);
    }
}
