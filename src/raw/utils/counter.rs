use std::sync::{
    atomic::{AtomicIsize, Ordering},
    OnceLock,
};

use super::CachePadded;

// The number of live entries in a map, sharded per thread.
//
// Inserts and removals only touch the shard of the current thread, so
// the count never becomes a point of contention between writers. Reads
// sum every shard and may observe a stale value.
pub struct Counter(Box<[CachePadded<AtomicIsize>]>);

impl Default for Counter {
    fn default() -> Counter {
        // available_parallelism is quite slow (microseconds).
        static CPUS: OnceLock<usize> = OnceLock::new();
        let num_cpus = *CPUS.get_or_init(|| {
            std::thread::available_parallelism()
                .map(Into::into)
                .unwrap_or(1)
        });

        // Round up to the next power-of-two for fast modulo.
        let shards = (0..num_cpus.next_power_of_two())
            .map(|_| Default::default())
            .collect();

        Counter(shards)
    }
}

impl Counter {
    // Return the shard for the thread owning the guard.
    #[inline]
    pub fn get(&self, guard: &impl seize::Guard) -> &AtomicIsize {
        let shard = guard.thread_id() & (self.0.len() - 1);
        &self.0[shard].value
    }

    // Record a new live entry.
    #[inline]
    pub fn increment(&self, guard: &impl seize::Guard) {
        self.get(guard).fetch_add(1, Ordering::Relaxed);
    }

    // Record a removed or discarded entry.
    #[inline]
    pub fn decrement(&self, guard: &impl seize::Guard) {
        self.get(guard).fetch_sub(1, Ordering::Relaxed);
    }

    // Returns the sum of all counter shards.
    #[inline]
    pub fn sum(&self) -> usize {
        self.0
            .iter()
            .map(|x| x.value.load(Ordering::Relaxed))
            .sum::<isize>()
            .try_into()
            // A removal can be counted on one shard before the matching
            // insert is counted on another, so the sum may dip below zero.
            .unwrap_or(0)
    }
}
