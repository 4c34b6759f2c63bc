use crate::raw;
use seize::{Collector, Guard, LocalGuard};

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

/// A lock-free concurrent hash table.
///
/// Most operations require a [`Guard`](crate::Guard), which can be acquired through
/// [`HashMap::guard`] or using the [`HashMap::pin`] API. See the [crate-level
/// documentation](crate) for more details.
pub struct HashMap<K, V, S = RandomState> {
    raw: raw::HashMap<K, V, S>,
}

/// How keys are located within the slot array.
///
/// The strategy is fixed when the map is created. See [`HashMapBuilder::probe_strategy`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProbeStrategy {
    /// Scan a bounded window of consecutive slots starting at the ideal index.
    ///
    /// Lookups stop early at the first slot that was never written.
    Linear,

    /// Follow per-bucket jump offsets recorded in the slots.
    ///
    /// Lookups only visit slots holding keys that hash to the same ideal
    /// index, which keeps probe lengths short at high load.
    #[default]
    Leapfrog,
}

/// A builder for a [`HashMap`].
///
/// # Examples
///
/// ```rust
/// use leapmap::{HashMap, ProbeStrategy};
/// use std::collections::hash_map::RandomState;
///
/// let map: HashMap<i32, i32> = HashMap::builder()
///     // Set the initial capacity.
///     .capacity(2048)
///     // Set the hasher.
///     .hasher(RandomState::new())
///     // Set the probe strategy.
///     .probe_strategy(ProbeStrategy::Linear)
///     // Construct the hash map.
///     .build();
/// ```
pub struct HashMapBuilder<K, V, S = RandomState> {
    hasher: S,
    capacity: usize,
    probe: ProbeStrategy,
    collector: Collector,
    _kv: PhantomData<(K, V)>,
}

impl<K, V> HashMapBuilder<K, V> {
    /// Set the hash builder used to hash keys.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed
    /// to allow HashMaps to be resistant to attacks that cause many collisions
    /// and very poor performance. Setting it manually using this function can
    /// expose a DoS attack vector.
    pub fn hasher<S>(self, hasher: S) -> HashMapBuilder<K, V, S> {
        HashMapBuilder {
            hasher,
            capacity: self.capacity,
            probe: self.probe,
            collector: self.collector,
            _kv: PhantomData,
        }
    }
}

impl<K, V, S> HashMapBuilder<K, V, S> {
    /// Set the initial capacity of the slot array.
    ///
    /// The capacity is rounded up to a power of two, and is at least 16. The
    /// map grows once the number of entries reaches two thirds of its capacity.
    pub fn capacity(self, capacity: usize) -> HashMapBuilder<K, V, S> {
        HashMapBuilder {
            capacity,
            hasher: self.hasher,
            probe: self.probe,
            collector: self.collector,
            _kv: PhantomData,
        }
    }

    /// Set the probe strategy of the map.
    ///
    /// Defaults to [`ProbeStrategy::Leapfrog`].
    pub fn probe_strategy(self, probe: ProbeStrategy) -> Self {
        HashMapBuilder {
            probe,
            hasher: self.hasher,
            capacity: self.capacity,
            collector: self.collector,
            _kv: PhantomData,
        }
    }

    /// Set the [`seize::Collector`] used for memory reclamation.
    ///
    /// This method may be useful when you want more control over memory reclamation.
    /// See [`seize::Collector`] for details.
    ///
    /// Note that all `Guard` references used to access the map must be produced by
    /// `collector`.
    pub fn collector(self, collector: Collector) -> Self {
        HashMapBuilder {
            collector,
            hasher: self.hasher,
            capacity: self.capacity,
            probe: self.probe,
            _kv: PhantomData,
        }
    }

    /// Construct a [`HashMap`] from the builder, using the configured options.
    pub fn build(self) -> HashMap<K, V, S> {
        HashMap {
            raw: raw::HashMap::new(self.capacity, self.hasher, self.collector, self.probe),
        }
    }
}

impl<K, V, S> fmt::Debug for HashMapBuilder<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMapBuilder")
            .field("capacity", &self.capacity)
            .field("probe", &self.probe)
            .finish()
    }
}

impl<K, V> HashMap<K, V> {
    /// Creates an empty `HashMap` with the default capacity of 32 slots.
    ///
    /// # Examples
    ///
    /// ```
    /// use leapmap::HashMap;
    /// let map: HashMap<&str, i32> = HashMap::new();
    /// ```
    pub fn new() -> HashMap<K, V> {
        HashMap::builder().build()
    }

    /// Creates an empty `HashMap` with at least the given slot capacity.
    ///
    /// # Examples
    ///
    /// ```
    /// use leapmap::HashMap;
    /// let map: HashMap<&str, i32> = HashMap::with_capacity(100);
    /// assert_eq!(map.capacity(), 128);
    /// ```
    pub fn with_capacity(capacity: usize) -> HashMap<K, V> {
        HashMap::builder().capacity(capacity).build()
    }

    /// Returns a builder for a `HashMap`.
    ///
    /// The builder can be used for more complex configuration, such as using
    /// a custom [`Collector`], or [`ProbeStrategy`].
    pub fn builder() -> HashMapBuilder<K, V> {
        HashMapBuilder {
            capacity: 32,
            hasher: RandomState::default(),
            probe: ProbeStrategy::default(),
            collector: Collector::new(),
            _kv: PhantomData,
        }
    }
}

impl<K, V, S> Default for HashMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        HashMap::with_hasher(S::default())
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty `HashMap` which will use the given hash builder to hash
    /// keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use leapmap::HashMap;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let s = RandomState::new();
    /// let map = HashMap::with_hasher(s);
    /// map.pin().add_or_update(1, 2);
    /// ```
    pub fn with_hasher(hash_builder: S) -> HashMap<K, V, S> {
        HashMap::with_capacity_and_hasher(32, hash_builder)
    }

    /// Creates an empty `HashMap` with at least the given slot capacity, using
    /// `hash_builder` to hash the keys.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> HashMap<K, V, S> {
        HashMap {
            raw: raw::HashMap::new(
                capacity,
                hash_builder,
                Collector::new(),
                ProbeStrategy::default(),
            ),
        }
    }

    /// Returns a pinned reference to the map.
    ///
    /// The returned reference manages a guard internally, preventing garbage
    /// collection for as long as it is held.
    #[inline]
    pub fn pin(&self) -> HashMapRef<'_, K, V, S, LocalGuard<'_>> {
        HashMapRef {
            guard: self.raw.guard(),
            map: self,
        }
    }

    /// Returns a guard for use with this map.
    ///
    /// Note that holding on to a guard prevents garbage collection.
    /// See the [crate-level documentation](crate) for details.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.raw.guard()
    }

    /// Returns the number of entries in the map.
    ///
    /// The count is a snapshot of concurrently updated state, and may be stale
    /// by the time it is used.
    ///
    /// # Examples
    ///
    /// ```
    /// use leapmap::HashMap;
    ///
    /// let map = HashMap::new();
    ///
    /// map.pin().add_or_update(1, "a");
    /// map.pin().add_or_update(2, "b");
    /// assert!(map.count() == 2);
    /// ```
    #[inline]
    pub fn count(&self) -> usize {
        self.raw.count()
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    ///
    /// # Examples
    ///
    /// ```
    /// use leapmap::HashMap;
    ///
    /// let map = HashMap::new();
    /// assert!(map.is_empty());
    /// map.pin().add_or_update("a", 1);
    /// assert!(!map.is_empty());
    /// ```
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Returns the capacity of the slot array currently in use.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity(&self.raw.guard())
    }

    /// Returns the probe strategy of this map.
    #[inline]
    pub fn probe_strategy(&self) -> ProbeStrategy {
        self.raw.probe_strategy()
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// The key may be any borrowed form of the map's key type, but
    /// [`Hash`] and [`Eq`] on the borrowed form *must* match those for
    /// the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use leapmap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.pin().add_or_update(1, "a");
    /// assert_eq!(map.pin().contains_key(&1), true);
    /// assert_eq!(map.pin().contains_key(&2), false);
    /// ```
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q, guard: &impl Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key, guard).is_some()
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// The reference is valid for as long as the guard is held, even if the
    /// entry is concurrently updated or removed.
    ///
    /// # Examples
    ///
    /// ```
    /// use leapmap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.pin().add_or_update(1, "a");
    /// assert_eq!(map.pin().find(&1), Some(&"a"));
    /// assert_eq!(map.pin().find(&2), None);
    /// ```
    #[inline]
    pub fn find<'g, Q>(&self, key: &Q, guard: &'g impl Guard) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.raw.verify(guard);
        self.raw.find(key, guard)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map already has a value for this key, the value is replaced.
    /// The key is not updated, which matters for types that can be `==`
    /// without being identical. A key that was removed is revived in place.
    ///
    /// # Examples
    ///
    /// ```
    /// use leapmap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.pin().add_or_update(37, "a");
    /// map.pin().add_or_update(37, "b");
    /// assert_eq!(map.pin().find(&37), Some(&"b"));
    /// assert_eq!(map.count(), 1);
    /// ```
    #[inline]
    pub fn add_or_update(&self, key: K, value: V, guard: &impl Guard) {
        self.raw.verify(guard);
        self.raw.add_or_update(key, value, guard)
    }

    /// Removes a key from the map, returning `true` if it was present.
    ///
    /// The slot keeps a tombstone for the key until the map next migrates.
    ///
    /// # Examples
    ///
    /// ```
    /// use leapmap::HashMap;
    ///
    /// let map = HashMap::new();
    /// map.pin().add_or_update(1, "a");
    /// assert_eq!(map.pin().remove(&1), true);
    /// assert_eq!(map.pin().remove(&1), false);
    /// ```
    #[inline]
    pub fn remove<Q>(&self, key: &Q, guard: &impl Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.raw.verify(guard);
        self.raw.remove(key, guard)
    }
}

impl<K, V, S> fmt::Debug for HashMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMap")
            .field("count", &self.count())
            .field("capacity", &self.capacity())
            .field("probe", &self.probe_strategy())
            .finish()
    }
}

/// A pinned reference to a [`HashMap`].
///
/// This type is created with [`HashMap::pin`] and can be used to easily access a [`HashMap`]
/// without explicitly managing a guard. See the [crate-level documentation](crate#usage) for details.
pub struct HashMapRef<'map, K, V, S, G> {
    guard: G,
    map: &'map HashMap<K, V, S>,
}

impl<'map, K, V, S, G> HashMapRef<'map, K, V, S, G>
where
    K: Hash + Eq,
    S: BuildHasher,
    G: Guard,
{
    /// Returns a reference to the inner [`HashMap`].
    #[inline]
    pub fn map(&self) -> &'map HashMap<K, V, S> {
        self.map
    }

    /// Returns the number of entries in the map.
    ///
    /// See [`HashMap::count`] for details.
    #[inline]
    pub fn count(&self) -> usize {
        self.map.count()
    }

    /// Returns `true` if the map is empty. Otherwise returns `false`.
    ///
    /// See [`HashMap::is_empty`] for details.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// See [`HashMap::contains_key`] for details.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).is_some()
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// See [`HashMap::find`] for details.
    #[inline]
    pub fn find<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.raw.find(key, &self.guard)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// See [`HashMap::add_or_update`] for details.
    #[inline]
    pub fn add_or_update(&self, key: K, value: V) {
        self.map.raw.add_or_update(key, value, &self.guard)
    }

    /// Removes a key from the map, returning `true` if it was present.
    ///
    /// See [`HashMap::remove`] for details.
    #[inline]
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.raw.remove(key, &self.guard)
    }
}

impl<K, V, S, G> fmt::Debug for HashMapRef<'_, K, V, S, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.map.fmt(f)
    }
}
