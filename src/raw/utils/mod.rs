mod counter;
mod tagged;

pub use counter::Counter;
pub use tagged::{AtomicPtrFetchOps, StrictProvenance, Tagged, Unpack};

use std::{hint, thread};

// Emits a trace event when the `tracing` feature is enabled.
macro_rules! trace {
    ($($tt:tt)*) => {{
        #[cfg(feature = "tracing")]
        {
            tracing::trace!($($tt)*)
        }
    }};
}

pub(crate) use trace;

// Spin until `done` returns `true`, backing off to the scheduler after a while.
//
// Only used to wait for other threads to finish copying their chunks of a
// migration, which is a bounded amount of work.
#[cold]
#[inline(never)]
pub fn spin_until(mut done: impl FnMut() -> bool) {
    // Avoid spinning in tests, which can hide race conditions.
    const SPIN: u32 = if cfg!(any(test, debug_assertions)) {
        1
    } else {
        6
    };

    let mut spun = 0;
    while !done() {
        if spun < SPIN {
            for _ in 0..(spun * spun) {
                hint::spin_loop();
            }

            spun += 1;
        } else {
            thread::yield_now();
        }
    }
}

/// Pads and aligns a value to the length of a cache line.
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq)]
// Source: https://github.com/crossbeam-rs/crossbeam/blob/master/crossbeam-utils/src/cache_padded.rs#L63.
#[cfg_attr(
    any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "powerpc64",
    ),
    repr(align(128))
)]
#[cfg_attr(
    any(
        target_arch = "arm",
        target_arch = "mips",
        target_arch = "mips32r6",
        target_arch = "mips64",
        target_arch = "mips64r6",
        target_arch = "riscv64",
    ),
    repr(align(32))
)]
#[cfg_attr(target_arch = "s390x", repr(align(256)))]
#[cfg_attr(
    not(any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "powerpc64",
        target_arch = "arm",
        target_arch = "mips",
        target_arch = "mips32r6",
        target_arch = "mips64",
        target_arch = "mips64r6",
        target_arch = "riscv64",
        target_arch = "s390x",
    )),
    repr(align(64))
)]
pub struct CachePadded<T> {
    value: T,
}
