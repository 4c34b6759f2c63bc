#![allow(dead_code)]

use leapmap::{HashMap, ProbeStrategy};

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;

// Run the test on different configurations of a `HashMap`.
pub fn with_map<K, V>(test: impl FnMut(&dyn Fn() -> HashMap<K, V>)) {
    with_hasher::<K, V, RandomState>(test)
}

// Run the test on different configurations of a `HashMap` with the given hasher.
pub fn with_hasher<K, V, S>(mut test: impl FnMut(&dyn Fn() -> HashMap<K, V, S>))
where
    S: BuildHasher + Default,
{
    // Bounded linear probing.
    if !cfg!(leapmap_stress) {
        test(
            &(|| {
                HashMap::builder()
                    .hasher(S::default())
                    .probe_strategy(ProbeStrategy::Linear)
                    .build()
            }),
        );
    }

    // Leapfrog probing.
    test(
        &(|| {
            HashMap::builder()
                .hasher(S::default())
                .probe_strategy(ProbeStrategy::Leapfrog)
                .build()
        }),
    );

    // The smallest table for each strategy, to force frequent migrations.
    for probe in [ProbeStrategy::Linear, ProbeStrategy::Leapfrog] {
        test(
            &(move || {
                HashMap::builder()
                    .hasher(S::default())
                    .capacity(0)
                    .probe_strategy(probe)
                    .build()
            }),
        );
    }
}

// Prints a log message if `RUST_LOG=debug` is set.
#[macro_export]
macro_rules! debug {
    ($($x:tt)*) => {
        if std::env::var("RUST_LOG").as_deref() == Ok("debug") {
            println!($($x)*);
        }
    };
}

// Returns the number of threads to use for stress testing.
pub fn threads() -> usize {
    if cfg!(miri) {
        2
    } else {
        num_cpus::get_physical().next_power_of_two()
    }
}
