use std::mem::align_of;
use std::sync::atomic::{AtomicPtr, Ordering};

// Polyfill for the strict-provenance pointer APIs.
#[allow(clippy::missing_safety_doc)]
#[allow(dead_code)] // `strict_provenance` has stabilized on newer toolchains.
pub unsafe trait StrictProvenance<T>: Sized {
    fn addr(self) -> usize;
    fn map_addr(self, f: impl FnOnce(usize) -> usize) -> Self;
    fn unpack(self) -> Tagged<T>
    where
        T: Unpack;
}

// A type whose pointers carry tag bits in their low alignment bits.
pub trait Unpack {
    // A mask for the untagged portion of the pointer.
    const MASK: usize;
}

// Fails to compile if the alignment of `T` leaves no room for its tag bits.
const fn static_assert_align_of<T: Unpack>() {
    struct Dummy<T>(T);
    impl<T: Unpack> Dummy<T> {
        const ASSERT: () = assert!(align_of::<T>() > !T::MASK);
    }
    Dummy::<T>::ASSERT
}

unsafe impl<T> StrictProvenance<T> for *mut T {
    #[inline(always)]
    fn addr(self) -> usize {
        self as usize
    }

    #[inline(always)]
    fn map_addr(self, f: impl FnOnce(usize) -> usize) -> Self {
        f(self.addr()) as Self
    }

    #[inline(always)]
    fn unpack(self) -> Tagged<T>
    where
        T: Unpack,
    {
        static_assert_align_of::<T>();
        Tagged {
            raw: self,
            ptr: self.map_addr(|addr| addr & T::MASK),
        }
    }
}

// A pointer split into its raw (tagged) and untagged forms.
pub struct Tagged<T> {
    // The pointer as stored in the slot.
    pub raw: *mut T,

    // The pointer with the tag bits cleared, safe to dereference when non-null.
    pub ptr: *mut T,
}

impl<T> Tagged<T>
where
    T: Unpack,
{
    // Returns the tag bits.
    #[inline]
    pub fn tag(self) -> usize {
        self.raw.addr() & !T::MASK
    }

    // Returns `true` if any of the given tag bits are set.
    #[inline]
    pub fn has(self, tag: usize) -> bool {
        self.tag() & tag != 0
    }

    // Returns the raw pointer with additional tag bits set.
    #[inline]
    pub fn with(self, tag: usize) -> *mut T {
        self.raw.map_addr(|addr| addr | tag)
    }
}

impl<T> Copy for Tagged<T> {}

impl<T> Clone for Tagged<T> {
    fn clone(&self) -> Self {
        *self
    }
}

// Polyfill for the `atomic_ptr_strict_provenance` APIs.
pub trait AtomicPtrFetchOps<T> {
    fn fetch_or(&self, value: usize, ordering: Ordering) -> *mut T;
}

impl<T> AtomicPtrFetchOps<T> for AtomicPtr<T> {
    #[inline]
    fn fetch_or(&self, value: usize, ordering: Ordering) -> *mut T {
        #[cfg(not(miri))]
        {
            use std::sync::atomic::AtomicUsize;

            // Safety: `AtomicPtr` and `AtomicUsize` have the same size and alignment.
            // This loses provenance, but there is no stable alternative.
            unsafe { &*(self as *const AtomicPtr<T> as *const AtomicUsize) }
                .fetch_or(value, ordering) as *mut T
        }

        // Avoid ptr2int under Miri.
        #[cfg(miri)]
        {
            const fn read_ordering(ordering: Ordering) -> Ordering {
                match ordering {
                    Ordering::SeqCst => Ordering::SeqCst,
                    Ordering::AcqRel => Ordering::Acquire,
                    _ => Ordering::Relaxed,
                }
            }

            match self.fetch_update(ordering, read_ordering(ordering), |ptr| {
                Some(ptr.map_addr(|addr| addr | value))
            }) {
                Ok(prev) | Err(prev) => prev,
            }
        }
    }
}
