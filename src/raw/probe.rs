use std::ops::Range;

use super::alloc::{Link, Table};

// The largest distance a leapfrog jump offset can encode.
pub const MAX_JUMP: usize = i16::MAX as usize;

// The minimum table capacity.
pub const MIN_CAPACITY: usize = 16;

// Returns the probe window for a table of the given capacity.
//
// Probing never wraps around, so the table is padded by one window past its
// capacity.
#[inline]
pub fn window(capacity: usize) -> usize {
    (capacity / 4).clamp(1, MAX_JUMP)
}

// Returns the table capacity used for a requested capacity.
pub fn capacity_for(capacity: usize) -> usize {
    capacity
        .max(MIN_CAPACITY)
        .checked_next_power_of_two()
        .expect("capacity overflow")
}

// The slots searched by bounded linear probing, starting at the ideal index.
#[inline]
pub fn linear<T>(ideal: usize, table: &Table<T>) -> Range<usize> {
    ideal..ideal + table.window
}

// The slots a leapfrog insert may claim when extending the chain of `ideal`.
#[inline]
pub fn extend<T>(ideal: usize, table: &Table<T>) -> Range<usize> {
    ideal + 1..ideal + table.window + 1
}

// The members of a leapfrog bucket, starting from its ideal slot.
//
// Yields the ideal index followed by every slot linked from it through the
// bucket's jump offsets.
pub struct Chain<'t, T> {
    table: &'t Table<T>,
    next: Option<usize>,
    link: Link,
}

impl<'t, T> Chain<'t, T> {
    #[inline]
    pub fn new(ideal: usize, table: &'t Table<T>) -> Chain<'t, T> {
        Chain {
            table,
            next: Some(ideal),
            link: Link::First,
        }
    }
}

impl<T> Iterator for Chain<'_, T> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        let i = self.next?;

        let delta = self.table.slot(i).links().get(self.link);
        self.link = Link::Next;
        self.next = (delta != 0).then(|| i.wrapping_add_signed(delta as isize));

        Some(i)
    }
}

// Link the slot at `index` into the chain of the bucket at `ideal`.
//
// Any thread that knows `index` holds a key of this bucket may call this,
// and it returns once the slot is reachable from the chain. Links are only
// appended at the tail, so a lost race just retries from the new tail.
pub fn link<T>(ideal: usize, index: usize, table: &Table<T>) {
    debug_assert!(index > ideal && index - ideal <= table.window);

    loop {
        let mut tail = ideal;
        for i in Chain::new(ideal, table) {
            if i == index {
                return;
            }

            tail = i;
        }

        let link = if tail == ideal { Link::First } else { Link::Next };
        let delta = index as isize - tail as isize;
        let delta = i16::try_from(delta).expect("leapfrog jump out of range");

        if table.slot(tail).try_link(link, delta) {
            return;
        }
    }
}
