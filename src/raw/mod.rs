mod alloc;
mod probe;
mod utils;

use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use seize::{Collector, Guard, LocalGuard};

use self::alloc::{RawTable, Slot, Table};
use self::probe::Chain;
use self::utils::{trace, AtomicPtrFetchOps, Counter, StrictProvenance, Tagged, Unpack};
use crate::map::ProbeStrategy;

/// A lock-free open-addressing hash table.
///
/// Writers only ever write to the primary array. While a migration is in
/// progress they help copy the primary array into the migration target, and
/// continue once the target has been promoted.
pub struct HashMap<K, V, S> {
    /// The primary slot array.
    slots: AtomicPtr<RawTable<Entry<K, V>>>,

    /// The array being migrated to, or null.
    migrating: AtomicPtr<RawTable<Entry<K, V>>>,

    /// The number of live entries.
    count: Counter,

    /// Collector for memory reclamation.
    collector: Collector,

    /// The probe strategy, fixed at construction.
    probe: ProbeStrategy,

    /// Hasher for keys.
    pub build_hasher: S,

    _kv: PhantomData<(K, V, *const ())>,
}

// Safety: Keys and values are only shared through `&self`, and may be dropped
// on whichever thread retires them.
unsafe impl<K: Send, V: Send, S: Send> Send for HashMap<K, V, S> {}

// Safety: `&K` and `&V` are handed out to every thread holding a reference to
// the map, and removed entries may be dropped on a different thread than the
// one that inserted them.
unsafe impl<K: Send + Sync, V: Send + Sync, S: Sync> Sync for HashMap<K, V, S> {}

/// A key-value pair, allocated once and never mutated.
///
/// Updates replace the entry pointer of a slot wholesale, so readers never
/// see a torn pair.
#[repr(C, align(8))]
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
}

// Tags stored in the low bits of an entry pointer.
mod tag {
    /// The slot was frozen by a migration. No writer may change it.
    pub const COPYING: usize = 0b01;

    /// The entry was removed. The key is kept so the slot retains its identity.
    pub const DEAD: usize = 0b10;
}

impl<K, V> Unpack for Entry<K, V> {
    const MASK: usize = !(tag::COPYING | tag::DEAD);
}

// Encoding of the hash word of a slot.
mod meta {
    /// The slot was never written.
    pub const EMPTY: u32 = 0;

    /// The entry in the slot was removed.
    pub const TOMBSTONE: u32 = !1;

    /// The bits that select the ideal index.
    #[inline]
    pub fn h1(hash: u64) -> usize {
        hash as usize
    }

    /// The hash word stored for a key.
    ///
    /// The low bit is always set, so a real hash never reads as a sentinel.
    #[inline]
    pub fn h2(hash: u64) -> u32 {
        let h2 = ((hash >> 32) as u32 ^ hash as u32) | 1;
        debug_assert!(h2 != EMPTY && h2 != TOMBSTONE);
        h2
    }
}

// The number of source slots a copier claims at once.
const COPY_CHUNK: usize = 1024;

// The result of claiming a slot for an entry.
enum Claim<K, V> {
    // The entry was written to an empty slot.
    Inserted,

    // The key already has a slot at the given index.
    Found(usize, Tagged<Entry<K, V>>),

    // A slot on the probe path was frozen by a migration.
    Frozen,

    // The probe window is exhausted.
    Full { tombstones: usize },
}

// The outcome of visiting a single slot while claiming.
enum Visit<K, V> {
    Claimed,
    Match(Tagged<Entry<K, V>>),
    Frozen,
    Occupied { tombstone: bool },
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates a map with the given configuration.
    pub fn new(
        capacity: usize,
        build_hasher: S,
        collector: Collector,
        probe: ProbeStrategy,
    ) -> HashMap<K, V, S> {
        let table = Table::<Entry<K, V>>::alloc(probe::capacity_for(capacity));

        HashMap {
            slots: AtomicPtr::new(table.raw),
            migrating: AtomicPtr::new(ptr::null_mut()),
            count: Counter::default(),
            collector,
            probe,
            build_hasher,
            _kv: PhantomData,
        }
    }

    /// Returns a guard for use with this map.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Verify a guard is valid to use with this map.
    #[inline]
    pub fn verify(&self, guard: &impl Guard) {
        assert_eq!(
            *guard.collector(),
            self.collector,
            "Attempted to access map with incorrect guard"
        );
    }

    /// Returns the number of live entries in the map.
    #[inline]
    pub fn count(&self) -> usize {
        self.count.sum()
    }

    /// Returns the probe strategy of this map.
    #[inline]
    pub fn probe_strategy(&self) -> ProbeStrategy {
        self.probe
    }

    /// Returns the capacity of the primary array.
    #[inline]
    pub fn capacity(&self, guard: &impl Guard) -> usize {
        self.primary(guard).capacity()
    }

    // Load the primary array.
    #[inline]
    fn primary(&self, guard: &impl Guard) -> Table<Entry<K, V>> {
        let raw = guard.protect(&self.slots, Ordering::SeqCst);

        // Safety: The primary array is never null, and was loaded under the guard.
        unsafe { Table::from_raw(raw) }
    }

    // Load the primary array and the migration target as of the same instant.
    //
    // A returned migration target is always being filled from the returned
    // primary array.
    #[inline]
    fn active(&self, guard: &impl Guard) -> (Table<Entry<K, V>>, Option<Table<Entry<K, V>>>) {
        let mut slots = guard.protect(&self.slots, Ordering::SeqCst);

        loop {
            let next = guard.protect(&self.migrating, Ordering::SeqCst);
            let current = guard.protect(&self.slots, Ordering::SeqCst);

            if current == slots {
                // Safety: Both pointers were loaded under the guard, and point to
                // live table allocations or are null.
                let table = unsafe { Table::from_raw(slots) };

                // The target was promoted but `migrating` is not cleared yet.
                if next.is_null() || next == slots {
                    return (table, None);
                }

                return (table, Some(unsafe { Table::from_raw(next) }));
            }

            slots = current;
        }
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    #[inline]
    fn hash<Q>(&self, key: &Q) -> u64
    where
        Q: Hash + ?Sized,
    {
        self.build_hasher.hash_one(key)
    }

    /// Returns a reference to the value for a key.
    #[inline]
    pub fn find<'g, Q>(&self, key: &Q, guard: &'g impl Guard) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);

        // Nobody writes to a migration target before it is promoted, so the
        // primary array holds the latest value of every key.
        let table = self.primary(guard);

        match self.search(&table, hash, key, guard) {
            Some((_, found)) if !found.has(tag::DEAD) => {
                // Safety: The entry was loaded under the guard and is non-null.
                Some(unsafe { &(*found.ptr).value })
            }
            _ => None,
        }
    }

    /// Inserts a key-value pair, replacing the value of an existing key.
    pub fn add_or_update(&self, key: K, value: V, guard: &impl Guard) {
        let hash = self.hash(&key);
        let new = Box::into_raw(Box::new(Entry { key, value }));

        loop {
            let (table, next) = self.active(guard);

            if next.is_some() {
                self.migrate(&table, guard);
                continue;
            }

            if self.overloaded(&table) {
                self.resize(&table, None, guard);
                continue;
            }

            // Safety: `new` is a valid allocation that we own until it is claimed.
            match unsafe { self.claim(&table, hash, new, guard) } {
                Claim::Inserted => {
                    self.count.increment(guard);
                    return;
                }

                Claim::Found(i, found) => {
                    let h2 = meta::h2(hash);

                    // Safety: `found` was loaded from slot `i` under the guard.
                    match unsafe { self.replace(&table, i, found, new, h2, guard) } {
                        Some(revived) => {
                            if revived {
                                self.count.increment(guard);
                            }

                            return;
                        }
                        None => continue,
                    }
                }

                // A migration started, help it along and retry.
                Claim::Frozen => continue,

                Claim::Full { tombstones } => self.resize(&table, Some(tombstones), guard),
            }
        }
    }

    /// Removes a key from the map, returning `true` if a live entry was removed.
    pub fn remove<Q>(&self, key: &Q, guard: &impl Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);

        'retry: loop {
            let (table, next) = self.active(guard);

            if next.is_some() {
                self.migrate(&table, guard);
                continue;
            }

            let Some((i, mut found)) = self.search(&table, hash, key, guard) else {
                return false;
            };

            let slot = table.slot(i);
            loop {
                // A migration started, help it along and retry.
                if found.has(tag::COPYING) {
                    continue 'retry;
                }

                if found.has(tag::DEAD) {
                    return false;
                }

                match guard.compare_exchange(
                    &slot.entry,
                    found.raw,
                    found.with(tag::DEAD),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => {
                        self.count.decrement(guard);

                        // The entry is the source of truth, so losing this race to
                        // a revival only leaves a stale filter word behind.
                        let _ = slot.hash.compare_exchange(
                            meta::h2(hash),
                            meta::TOMBSTONE,
                            Ordering::SeqCst,
                            Ordering::Relaxed,
                        );

                        return true;
                    }
                    Err(current) => found = current.unpack(),
                }
            }
        }
    }

    // Search for the slot holding `key`, including tombstones.
    fn search<Q>(
        &self,
        table: &Table<Entry<K, V>>,
        hash: u64,
        key: &Q,
        guard: &impl Guard,
    ) -> Option<(usize, Tagged<Entry<K, V>>)>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let h2 = meta::h2(hash);
        let ideal = meta::h1(hash) & table.mask;

        match self.probe {
            ProbeStrategy::Linear => {
                for i in probe::linear(ideal, table) {
                    let slot = table.slot(i);
                    let word = slot.hash.load(Ordering::SeqCst);

                    // No key was ever written past an empty slot.
                    if word == meta::EMPTY {
                        return None;
                    }

                    // Safety: The slot belongs to `table`, which was loaded under the guard.
                    if let Some(found) = unsafe { self.match_key(slot, word, h2, key, guard) } {
                        return Some((i, found));
                    }
                }

                None
            }
            ProbeStrategy::Leapfrog => Chain::new(ideal, table).find_map(|i| {
                let slot = table.slot(i);
                let word = slot.hash.load(Ordering::SeqCst);

                // Safety: The slot belongs to `table`, which was loaded under the guard.
                unsafe { self.match_key(slot, word, h2, key, guard) }.map(|found| (i, found))
            }),
        }
    }

    // Returns the entry of the slot if it holds `key`.
    //
    // # Safety
    //
    // The slot must belong to a table loaded under `guard`.
    #[inline]
    unsafe fn match_key<Q>(
        &self,
        slot: &Slot<Entry<K, V>>,
        word: u32,
        h2: u32,
        key: &Q,
        guard: &impl Guard,
    ) -> Option<Tagged<Entry<K, V>>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        if word != h2 && word != meta::TOMBSTONE {
            return None;
        }

        let found = guard.protect(&slot.entry, Ordering::SeqCst).unpack();

        // Safety: Entries are only retired once no array that is reachable by
        // a new guard refers to them, and this one was loaded under the guard.
        if !found.ptr.is_null() && unsafe { (*found.ptr).key.borrow() } == key {
            return Some(found);
        }

        None
    }

    // Find the slot for the key of `new`, or claim an empty one for it.
    //
    // # Safety
    //
    // `new` must be a valid entry pointer, and `table` must have been loaded
    // under the guard.
    unsafe fn claim(
        &self,
        table: &Table<Entry<K, V>>,
        hash: u64,
        new: *mut Entry<K, V>,
        guard: &impl Guard,
    ) -> Claim<K, V> {
        let h2 = meta::h2(hash);
        let ideal = meta::h1(hash) & table.mask;
        let mut tombstones = 0;

        match self.probe {
            ProbeStrategy::Linear => {
                for i in probe::linear(ideal, table) {
                    match unsafe { self.visit(table, i, h2, new, guard) } {
                        Visit::Claimed => return Claim::Inserted,
                        Visit::Match(found) => return Claim::Found(i, found),
                        Visit::Frozen => return Claim::Frozen,
                        Visit::Occupied { tombstone } => tombstones += usize::from(tombstone),
                    }
                }
            }
            ProbeStrategy::Leapfrog => {
                // The ideal slot heads the chain of its bucket.
                match unsafe { self.visit(table, ideal, h2, new, guard) } {
                    Visit::Claimed => return Claim::Inserted,
                    Visit::Match(found) => return Claim::Found(ideal, found),
                    Visit::Frozen => return Claim::Frozen,
                    Visit::Occupied { .. } => {}
                }

                // Safety: `new` is valid for reads.
                let key = unsafe { &(*new).key };

                for i in Chain::new(ideal, table).skip(1) {
                    let slot = table.slot(i);
                    let word = slot.hash.load(Ordering::SeqCst);

                    if let Some(found) = unsafe { self.match_key(slot, word, h2, key, guard) } {
                        return Claim::Found(i, found);
                    }
                }

                // The key is not in the chain, extend it with the first empty slot.
                for i in probe::extend(ideal, table) {
                    match unsafe { self.visit(table, i, h2, new, guard) } {
                        Visit::Claimed => {
                            probe::link(ideal, i, table);
                            return Claim::Inserted;
                        }

                        // Another thread claimed a slot for this key, but may
                        // not have linked it yet.
                        Visit::Match(found) => {
                            probe::link(ideal, i, table);
                            return Claim::Found(i, found);
                        }

                        Visit::Frozen => return Claim::Frozen,
                        Visit::Occupied { tombstone } => tombstones += usize::from(tombstone),
                    }
                }
            }
        }

        Claim::Full { tombstones }
    }

    // Visit the slot at `i`, claiming it for `new` if it is empty.
    //
    // # Safety
    //
    // `new` must be a valid entry pointer, and `table` must have been loaded
    // under the guard.
    #[inline]
    unsafe fn visit(
        &self,
        table: &Table<Entry<K, V>>,
        i: usize,
        h2: u32,
        new: *mut Entry<K, V>,
        guard: &impl Guard,
    ) -> Visit<K, V> {
        let slot = table.slot(i);

        let found = match slot.hash.load(Ordering::SeqCst) {
            meta::EMPTY => {
                match guard.compare_exchange(
                    &slot.entry,
                    ptr::null_mut(),
                    new,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => {
                        // A thread that lost the race for this slot may have published
                        // the hash word already.
                        let _ = slot.hash.compare_exchange(
                            meta::EMPTY,
                            h2,
                            Ordering::SeqCst,
                            Ordering::Relaxed,
                        );

                        return Visit::Claimed;
                    }
                    Err(found) => {
                        let found = found.unpack();

                        if found.has(tag::COPYING) {
                            return Visit::Frozen;
                        }

                        // Publish the hash word on behalf of the winner, so that lookups
                        // do not stop at this slot.
                        //
                        // Safety: Non-null entries loaded under the guard are valid for reads.
                        let hash = meta::h2(self.hash(unsafe { &(*found.ptr).key }));
                        let _ = slot.hash.compare_exchange(
                            meta::EMPTY,
                            hash,
                            Ordering::SeqCst,
                            Ordering::Relaxed,
                        );

                        if hash != h2 {
                            return Visit::Occupied { tombstone: false };
                        }

                        found
                    }
                }
            }

            word if word == h2 || word == meta::TOMBSTONE => {
                guard.protect(&slot.entry, Ordering::SeqCst).unpack()
            }

            _ => return Visit::Occupied { tombstone: false },
        };

        if found.has(tag::COPYING) {
            return Visit::Frozen;
        }

        // Safety: A slot with a hash word always has a non-null entry, and `new` is valid.
        if unsafe { (*found.ptr).key == (*new).key } {
            return Visit::Match(found);
        }

        Visit::Occupied {
            tombstone: found.has(tag::DEAD),
        }
    }

    // Replace the entry of an existing key with `new`.
    //
    // Returns `Some(true)` if the key was revived from a tombstone, `Some(false)`
    // if a live value was replaced, and `None` if the slot was frozen by a migration.
    //
    // # Safety
    //
    // `found` must have been loaded from slot `i` of `table` under the guard,
    // and `new` must be a valid entry pointer that is not yet shared.
    unsafe fn replace(
        &self,
        table: &Table<Entry<K, V>>,
        i: usize,
        mut found: Tagged<Entry<K, V>>,
        new: *mut Entry<K, V>,
        h2: u32,
        guard: &impl Guard,
    ) -> Option<bool> {
        let slot = table.slot(i);

        loop {
            if found.has(tag::COPYING) {
                return None;
            }

            match guard.compare_exchange(
                &slot.entry,
                found.raw,
                new,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    let revived = found.has(tag::DEAD);
                    if revived {
                        let _ = slot.hash.compare_exchange(
                            meta::TOMBSTONE,
                            h2,
                            Ordering::SeqCst,
                            Ordering::Relaxed,
                        );
                    }

                    // Safety: The slot was not frozen, so no migration target holds the
                    // old entry. Older arrays that still refer to it were retired before
                    // this array was promoted, so only existing guards can reach it.
                    unsafe { guard.defer_retire(found.ptr, reclaim_entry::<K, V>) };

                    return Some(revived);
                }

                // The entry was updated, removed or frozen concurrently. The key of the
                // slot never changes, so the new state is still ours to replace.
                Err(current) => found = current.unpack(),
            }
        }
    }

    // Returns `true` if the table has reached its load factor.
    #[inline]
    fn overloaded(&self, table: &Table<Entry<K, V>>) -> bool {
        let count = self.count.sum();
        count + count / 2 >= table.capacity()
    }

    // Start migrating to a new array, unless another thread already has.
    #[cold]
    #[inline(never)]
    fn resize(&self, table: &Table<Entry<K, V>>, tombstones: Option<usize>, guard: &impl Guard) {
        // The array was already replaced, or a migration is in progress that the
        // caller will help with on its next attempt.
        if self.slots.load(Ordering::SeqCst) != table.raw
            || !self.migrating.load(Ordering::SeqCst).is_null()
        {
            return;
        }

        let capacity = table.capacity();
        let capacity = match tombstones {
            // The probe window was mostly tombstones in a sparse table, purge them
            // without growing.
            Some(tombstones) if tombstones * 2 >= table.window && self.count() * 2 < capacity => {
                capacity
            }
            _ => capacity.checked_mul(2).expect("capacity overflow"),
        };

        let next = Table::alloc(capacity);

        if self
            .migrating
            .compare_exchange(
                ptr::null_mut(),
                next.raw,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            // Safety: The table was never shared.
            unsafe { Table::dealloc(next) };
            return;
        }

        // Another migration may have completed between the check above and our
        // exchange, in which case the target is sized for an older array. A target
        // that turns out to be too small is replaced during the copy.
        let (source, _) = self.active(guard);

        trace!(
            from = source.capacity(),
            to = next.capacity(),
            full = tombstones.is_some(),
            "starting migration"
        );

        self.migrate(&source, guard);
    }

    // Copy every slot of `table` into the migration target and promote it.
    //
    // Any number of threads may run this concurrently. Returns once `table` is
    // no longer the primary array.
    fn migrate(&self, table: &Table<Entry<K, V>>, guard: &impl Guard) {
        'copy: loop {
            let next = guard.protect(&self.migrating, Ordering::SeqCst);

            // The migration already completed.
            if next.is_null() || self.slots.load(Ordering::SeqCst) != table.raw {
                return;
            }

            // Safety: The target was loaded under the guard.
            let next = unsafe { Table::from_raw(next) };
            let state = next.state();
            let chunk = table.len.min(COPY_CHUNK);

            loop {
                // Every slot has already been claimed.
                if state.claim.load(Ordering::Relaxed) >= table.len {
                    break;
                }

                let start = state.claim.fetch_add(chunk, Ordering::Relaxed);

                let mut copied = 0;
                for i in start..(start + chunk).min(table.len) {
                    // Safety: Both tables were loaded under the guard.
                    if unsafe { !self.copy_slot(table, i, &next) } {
                        self.abort(&next, guard);
                        continue 'copy;
                    }

                    copied += 1;
                }

                if self.try_promote(table, &next, copied, guard) {
                    return;
                }
            }

            // Wait for the remaining chunks, or for the target to be replaced.
            utils::spin_until(|| {
                self.slots.load(Ordering::SeqCst) != table.raw
                    || self.migrating.load(Ordering::SeqCst) != next.raw
            });
        }
    }

    // Record `copied` slots, promoting `next` if every slot of `table` was copied.
    //
    // Returns `true` if `table` is no longer the primary array.
    fn try_promote(
        &self,
        table: &Table<Entry<K, V>>,
        next: &Table<Entry<K, V>>,
        copied: usize,
        guard: &impl Guard,
    ) -> bool {
        let state = next.state();

        let total = if copied == 0 {
            state.copied.load(Ordering::Acquire)
        } else {
            state.copied.fetch_add(copied, Ordering::AcqRel) + copied
        };

        if total == table.len {
            self.promote(table, next, guard);
        }

        self.slots.load(Ordering::SeqCst) != table.raw
    }

    // Make `next` the primary array once every slot of `table` was copied.
    fn promote(&self, table: &Table<Entry<K, V>>, next: &Table<Entry<K, V>>, guard: &impl Guard) {
        match self.slots.compare_exchange(
            table.raw,
            next.raw,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                // No migration can start while `migrating` is set, so it still holds `next`.
                self.migrating.store(ptr::null_mut(), Ordering::SeqCst);

                trace!(capacity = next.capacity(), "promoted migration target");

                // Safety: The table is unreachable from `slots` and `migrating`, and every
                // live entry in it was copied to `next`.
                unsafe { guard.defer_retire(table.raw, reclaim_table::<K, V>) };
            }

            Err(_) => trace!("migration was promoted by another thread"),
        }
    }

    // Replace a migration target that has no room for a copied entry with a
    // larger one, restarting the copy.
    #[cold]
    #[inline(never)]
    fn abort(&self, next: &Table<Entry<K, V>>, guard: &impl Guard) {
        let capacity = next.capacity().checked_mul(2).expect("capacity overflow");
        let grown = Table::alloc(capacity);

        match self.migrating.compare_exchange(
            next.raw,
            grown.raw,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                trace!(from = next.capacity(), to = capacity, "migration target is full");

                // Safety: A target that failed a copy can never be promoted, and is now
                // unreachable from `migrating`. It only refers to entries of the primary array.
                unsafe { guard.defer_retire(next.raw, reclaim_target::<K, V>) };
            }

            // Another copier replaced the target first.
            Err(_) => unsafe { Table::dealloc(grown) },
        }
    }

    // Freeze slot `i` of `table` and copy its entry into `next`.
    //
    // Returns `false` if `next` has no room for the entry.
    //
    // # Safety
    //
    // Both tables must have been loaded under the guard, and `next` must be
    // the migration target of `table`.
    unsafe fn copy_slot(
        &self,
        table: &Table<Entry<K, V>>,
        i: usize,
        next: &Table<Entry<K, V>>,
    ) -> bool {
        // The slot may already be frozen by a copy into an aborted target. Frozen
        // entries never change.
        let found = table
            .slot(i)
            .entry
            .fetch_or(tag::COPYING, Ordering::SeqCst)
            .unpack();

        // Empty slots and tombstones are frozen, but not copied.
        if found.ptr.is_null() || found.has(tag::DEAD) {
            return true;
        }

        // Safety: Nobody can replace or retire a frozen entry while `table` is the
        // primary array, and copiers of `table` hold a guard.
        unsafe { self.insert_copy(found.ptr, next) }
    }

    // Write an entry into an empty slot of the migration target.
    //
    // Every key has a single slot in the source array, and nobody else writes to
    // the target, so no key comparisons are needed.
    //
    // # Safety
    //
    // The entry must be valid for reads.
    unsafe fn insert_copy(&self, entry: *mut Entry<K, V>, next: &Table<Entry<K, V>>) -> bool {
        // Safety: Guaranteed by the caller.
        let hash = self.hash(unsafe { &(*entry).key });
        let h2 = meta::h2(hash);
        let ideal = meta::h1(hash) & next.mask;

        match self.probe {
            ProbeStrategy::Linear => {
                probe::linear(ideal, next).any(|i| next.claim_empty(i, entry, h2))
            }
            ProbeStrategy::Leapfrog => {
                if next.claim_empty(ideal, entry, h2) {
                    return true;
                }

                for i in probe::extend(ideal, next) {
                    if next.claim_empty(i, entry, h2) {
                        probe::link(ideal, i, next);
                        return true;
                    }
                }

                false
            }
        }
    }
}

impl<T> Table<T> {
    // Write `entry` to slot `i` if nobody has claimed it yet.
    #[inline]
    fn claim_empty(&self, i: usize, entry: *mut T, h2: u32) -> bool {
        let slot = self.slot(i);

        if slot.hash.load(Ordering::Acquire) != meta::EMPTY {
            return false;
        }

        match slot.entry.compare_exchange(
            ptr::null_mut(),
            entry,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                slot.hash.store(h2, Ordering::Release);
                true
            }
            Err(_) => false,
        }
    }
}

impl<K, V, S> Drop for HashMap<K, V, S> {
    fn drop(&mut self) {
        // Retired entries and tables are reclaimed first.
        //
        // Safety: We have unique access to the collector.
        unsafe { self.collector.reclaim_all() };

        let slots = *self.slots.get_mut();
        let next = *self.migrating.get_mut();

        // Safety: We have unique access to both tables, and they are not accessed
        // after this call.
        unsafe {
            // A migration target only refers to entries owned by the primary array.
            if !next.is_null() && next != slots {
                Table::dealloc(Table::<Entry<K, V>>::from_raw(next));
            }

            drop_table(Table::from_raw(slots));
        }
    }
}

// Drop the entries owned by the primary array and deallocate it.
//
// # Safety
//
// The table must not be accessed after this call.
unsafe fn drop_table<K, V>(table: Table<Entry<K, V>>) {
    for i in 0..table.len {
        let entry = table.slot(i).entry.load(Ordering::Relaxed).unpack();

        if !entry.ptr.is_null() {
            // Safety: The entry is owned by this table.
            drop(unsafe { Box::from_raw(entry.ptr) });
        }
    }

    unsafe { Table::dealloc(table) };
}

// Reclaim a replaced entry.
unsafe fn reclaim_entry<K, V>(entry: *mut Entry<K, V>, _collector: &Collector) {
    // Safety: Entries are allocated with `Box`, and retired exactly once.
    drop(unsafe { Box::from_raw(entry) });
}

// Reclaim a migrated table along with the tombstones it owned.
unsafe fn reclaim_table<K, V>(raw: *mut RawTable<Entry<K, V>>, _collector: &Collector) {
    // Safety: The table was retired after promotion, and nobody holds a reference to it.
    let table = unsafe { Table::from_raw(raw) };

    for i in 0..table.len {
        let entry = table.slot(i).entry.load(Ordering::Relaxed).unpack();

        // Live entries were moved to the new table.
        if !entry.ptr.is_null() && entry.has(tag::DEAD) {
            drop(unsafe { Box::from_raw(entry.ptr) });
        }
    }

    unsafe { Table::dealloc(table) };
}

// Reclaim an aborted migration target, which owns none of its entries.
unsafe fn reclaim_target<K, V>(raw: *mut RawTable<Entry<K, V>>, _collector: &Collector) {
    // Safety: The table was retired after it was replaced, and nobody holds a reference to it.
    unsafe { Table::dealloc(Table::from_raw(raw)) };
}
