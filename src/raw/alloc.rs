use std::alloc::Layout;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicUsize, Ordering};
use std::{alloc, mem, ptr};

use super::probe;

// A slot array laid out in a single allocation.
#[repr(transparent)]
pub struct RawTable<T>(u8, PhantomData<T>);

// The layout of the table allocation.
#[repr(C)]
struct TableLayout {
    mask: usize,
    window: usize,
    len: usize,
    state: State,
    slots: [Slot<()>; 0],
}

// Progress of a migration into this table.
#[derive(Default)]
pub struct State {
    // The next slot of the source array to be claimed by a copier.
    pub claim: AtomicUsize,
    // The number of source slots that were copied into this table.
    pub copied: AtomicUsize,
}

// A single slot of the array.
//
// A zeroed slot is empty: no hash, no jump offsets and a null entry.
#[repr(C)]
pub struct Slot<T> {
    // The encoded hash of the key, `meta::EMPTY` or `meta::TOMBSTONE`.
    pub hash: AtomicU32,
    // Leapfrog jump offsets, see `Links`.
    pub links: AtomicU32,
    // The (tagged) entry pointer.
    pub entry: AtomicPtr<T>,
}

// Which of the two jump offsets of a slot to follow.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Link {
    // From the ideal slot to the first member of its bucket.
    First,
    // From a bucket member to the next member.
    Next,
}

// The two signed 16-bit jump offsets of a slot, packed into one word.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Links(u32);

impl Links {
    // Returns the offset for the given link, zero if it is unset.
    #[inline]
    pub fn get(self, link: Link) -> i16 {
        match link {
            Link::First => self.0 as u16 as i16,
            Link::Next => (self.0 >> 16) as u16 as i16,
        }
    }

    // Returns a copy with the given link set to `delta`.
    #[inline]
    pub fn set(self, link: Link, delta: i16) -> Links {
        match link {
            Link::First => Links((self.0 & 0xFFFF_0000) | delta as u16 as u32),
            Link::Next => Links((self.0 & 0x0000_FFFF) | ((delta as u16 as u32) << 16)),
        }
    }
}

impl<T> Slot<T> {
    // Load the jump offsets of this slot.
    #[inline]
    pub fn links(&self) -> Links {
        Links(self.links.load(Ordering::Acquire))
    }

    // Set the given link if it is still unset.
    //
    // Returns `false` if another thread set the link first. Links are only
    // ever written once, so a set link never changes.
    #[inline]
    pub fn try_link(&self, link: Link, delta: i16) -> bool {
        debug_assert_ne!(delta, 0);

        let mut current = self.links.load(Ordering::Acquire);
        loop {
            let links = Links(current);
            if links.get(link) != 0 {
                return false;
            }

            match self.links.compare_exchange_weak(
                current,
                links.set(link, delta).0,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                // The other link of this slot was updated concurrently.
                Err(found) => current = found,
            }
        }
    }
}

// A handle to a table allocation.
pub struct Table<T> {
    // Mask for the capacity of the table.
    pub mask: usize,
    // The length of a probe window, which is also the overflow margin.
    pub window: usize,
    // The number of slots, including the overflow margin.
    pub len: usize,
    // The raw table pointer.
    pub raw: *mut RawTable<T>,
}

impl<T> Copy for Table<T> {}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Table<T> {
    // Allocate a table with the given capacity.
    pub fn alloc(capacity: usize) -> Table<T> {
        assert!(capacity.is_power_of_two());

        let mask = capacity - 1;
        let window = probe::window(capacity);
        let len = capacity.checked_add(window).expect("capacity overflow");

        unsafe {
            let layout = Self::layout(len);

            // Allocate the table, zeroing the slots.
            let ptr = alloc::alloc_zeroed(layout);
            if ptr.is_null() {
                alloc::handle_alloc_error(layout);
            }

            ptr.cast::<TableLayout>().write(TableLayout {
                mask,
                window,
                len,
                state: State::default(),
                slots: [],
            });

            Table {
                mask,
                window,
                len,
                raw: ptr.cast::<RawTable<T>>(),
            }
        }
    }

    // Creates a `Table` from a raw pointer.
    //
    // # Safety
    //
    // The pointer must be a live allocation created by `Table::alloc`.
    #[inline]
    pub unsafe fn from_raw(raw: *mut RawTable<T>) -> Table<T> {
        debug_assert!(!raw.is_null());

        let layout = unsafe { &*raw.cast::<TableLayout>() };

        Table {
            mask: layout.mask,
            window: layout.window,
            len: layout.len,
            raw,
        }
    }

    // Returns the slot at the given index.
    #[inline]
    pub fn slot(&self, i: usize) -> &Slot<T> {
        assert!(i < self.len, "slot index out of bounds");

        // Safety: `i` is in-bounds and the table allocation holds `len` slots
        // directly after the header.
        unsafe {
            let slots = ptr::addr_of!((*self.raw.cast::<TableLayout>()).slots);
            &*slots.cast::<Slot<T>>().add(i)
        }
    }

    // Returns the migration state of the table.
    #[inline]
    pub fn state(&self) -> &State {
        // Safety: The header is initialized by `alloc` and lives as long as the table.
        unsafe { &(*self.raw.cast::<TableLayout>()).state }
    }

    // Returns the capacity of the table, excluding the overflow margin.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    // Deallocate the table.
    //
    // # Safety
    //
    // The table must not be accessed after this call. Entries are not dropped.
    pub unsafe fn dealloc(table: Table<T>) {
        let layout = Self::layout(table.len);
        unsafe { alloc::dealloc(table.raw.cast::<u8>(), layout) }
    }

    // The layout used for a table of `len` slots.
    fn layout(len: usize) -> Layout {
        let size = mem::size_of::<Slot<()>>()
            .checked_mul(len)
            .and_then(|slots| slots.checked_add(mem::size_of::<TableLayout>()))
            .expect("capacity overflow");

        Layout::from_size_align(size, mem::align_of::<TableLayout>()).expect("capacity overflow")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let table: Table<u64> = Table::alloc(32);
        let table: Table<u64> = unsafe { Table::from_raw(table.raw) };
        assert_eq!(table.mask, 31);
        assert_eq!(table.capacity(), 32);
        assert_eq!(table.window, 8);
        assert_eq!(table.len, 40);

        // Every slot starts out empty.
        for i in 0..table.len {
            let slot = table.slot(i);
            assert_eq!(slot.hash.load(Ordering::Relaxed), 0);
            assert_eq!(slot.links(), Links::default());
            assert!(slot.entry.load(Ordering::Relaxed).is_null());
        }

        assert_eq!(table.state().claim.load(Ordering::Relaxed), 0);
        assert_eq!(table.state().copied.load(Ordering::Relaxed), 0);

        unsafe { Table::dealloc(table) };
    }

    #[test]
    fn links_are_independent() {
        let links = Links::default()
            .set(Link::First, -3)
            .set(Link::Next, i16::MAX);
        assert_eq!(links.get(Link::First), -3);
        assert_eq!(links.get(Link::Next), i16::MAX);

        let links = links.set(Link::First, 12);
        assert_eq!(links.get(Link::First), 12);
        assert_eq!(links.get(Link::Next), i16::MAX);
    }

    #[test]
    fn links_are_set_once() {
        let table: Table<u64> = Table::alloc(16);
        let slot = table.slot(3);

        assert!(slot.try_link(Link::Next, 2));
        assert!(!slot.try_link(Link::Next, 5));
        assert!(slot.try_link(Link::First, 1));
        assert_eq!(slot.links().get(Link::Next), 2);
        assert_eq!(slot.links().get(Link::First), 1);

        unsafe { Table::dealloc(table) };
    }
}
