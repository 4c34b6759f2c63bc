// adapted from: https://github.com/jonhoo/flurry/blob/main/tests/basic.rs

use leapmap::{HashMap, ProbeStrategy};

use std::hash::{BuildHasher, BuildHasherDefault, Hasher};
use std::sync::Arc;

mod common;
use common::{with_hasher, with_map};

#[test]
fn new() {
    with_map::<usize, usize>(|map| drop(map()));
}

#[test]
fn insert() {
    with_map::<usize, usize>(|map| {
        let map = map();
        let guard = map.guard();
        map.add_or_update(42, 0, &guard);
        assert_eq!(map.count(), 1);
    });
}

#[test]
fn find_empty() {
    with_map::<usize, usize>(|map| {
        let map = map();
        let guard = map.guard();
        let e = map.find(&42, &guard);
        assert!(e.is_none());
    });
}

#[test]
fn remove_empty() {
    with_map::<usize, usize>(|map| {
        let map = map();
        let guard = map.guard();
        assert!(!map.remove(&42, &guard));
        assert_eq!(map.count(), 0);
    });
}

#[test]
fn insert_and_remove() {
    with_map::<usize, usize>(|map| {
        let map = map();
        let guard = map.guard();
        map.add_or_update(42, 0, &guard);
        assert!(map.remove(&42, &guard));
        assert!(map.find(&42, &guard).is_none());
        assert!(map.is_empty());
    });
}

#[test]
fn insert_and_find() {
    with_map::<usize, usize>(|map| {
        let map = map();
        map.add_or_update(42, 0, &map.guard());

        {
            let guard = map.guard();
            let e = map.find(&42, &guard).unwrap();
            assert_eq!(e, &0);
        }
    });
}

#[test]
fn update_is_idempotent() {
    with_map::<usize, usize>(|map| {
        let map = map();
        let guard = map.guard();

        map.add_or_update(42, 0, &guard);
        map.add_or_update(42, 1, &guard);
        map.add_or_update(42, 1, &guard);

        assert_eq!(map.find(&42, &guard), Some(&1));
        assert_eq!(map.count(), 1);
    });
}

#[test]
fn reinsert_after_remove() {
    with_map::<usize, usize>(|map| {
        let map = map();
        let guard = map.guard();

        for i in 0..8 {
            map.add_or_update(i, i, &guard);
        }

        assert!(map.remove(&3, &guard));
        assert!(!map.remove(&3, &guard));
        assert_eq!(map.find(&3, &guard), None);
        assert_eq!(map.count(), 7);

        // Other keys are unaffected by the tombstone.
        for i in (0..8).filter(|&i| i != 3) {
            assert_eq!(map.find(&i, &guard), Some(&i));
        }

        map.add_or_update(3, 30, &guard);
        assert_eq!(map.find(&3, &guard), Some(&30));
        assert_eq!(map.count(), 8);
    });
}

#[test]
fn remove_and_reinsert_repeatedly() {
    with_map::<usize, usize>(|map| {
        let map = map();
        let guard = map.guard();

        for round in 0..100 {
            map.add_or_update(7, round, &guard);
            assert_eq!(map.find(&7, &guard), Some(&round));
            assert!(map.remove(&7, &guard));
        }

        assert!(map.is_empty());
    });
}

#[test]
fn resize_preserves_membership() {
    with_map::<usize, usize>(|map| {
        let map = map();
        let guard = map.guard();

        for i in 0..1000 {
            map.add_or_update(i, i * 2, &guard);
        }

        assert_eq!(map.count(), 1000);
        assert!(map.capacity() >= 1500);
        for i in 0..1000 {
            assert_eq!(map.find(&i, &guard), Some(&(i * 2)));
        }
        assert_eq!(map.find(&1000, &guard), None);
    });
}

#[test]
fn churn_purges_tombstones() {
    with_map::<usize, usize>(|map| {
        let map = map();
        let guard = map.guard();

        // A sliding window of live keys leaves a trail of tombstones behind.
        for i in 0..10_000 {
            map.add_or_update(i, i, &guard);
            if i >= 4 {
                assert!(map.remove(&(i - 4), &guard));
            }
        }

        assert_eq!(map.count(), 4);
        for i in 9996..10_000 {
            assert_eq!(map.find(&i, &guard), Some(&i));
        }
        for i in 0..9996 {
            assert_eq!(map.find(&i, &guard), None);
        }
    });
}

#[test]
fn borrowed_keys() {
    with_map::<String, usize>(|map| {
        let map = map();
        let guard = map.guard();

        map.add_or_update("foo".to_owned(), 1, &guard);
        map.add_or_update("bar".to_owned(), 2, &guard);

        assert_eq!(map.find("foo", &guard), Some(&1));
        assert!(map.contains_key("bar", &guard));
        assert!(map.remove("bar", &guard));
        assert!(!map.contains_key("bar", &guard));
    });
}

#[test]
fn pinned() {
    with_map::<usize, &'static str>(|map| {
        let map = map();
        let pinned = map.pin();

        pinned.add_or_update(1, "a");
        pinned.add_or_update(2, "b");
        assert_eq!(pinned.find(&1), Some(&"a"));
        assert!(pinned.contains_key(&2));
        assert!(pinned.remove(&2));
        assert_eq!(pinned.count(), 1);
        assert!(!pinned.is_empty());
        assert_eq!(pinned.map().probe_strategy(), map.probe_strategy());
    });
}

#[test]
fn concurrent_insert() {
    with_map::<usize, usize>(|map| {
        let map = Arc::new(map());

        let map1 = map.clone();
        let t1 = std::thread::spawn(move || {
            for i in 0..64 {
                map1.add_or_update(i, 0, &map1.guard());
            }
        });
        let map2 = map.clone();
        let t2 = std::thread::spawn(move || {
            for i in 0..64 {
                map2.add_or_update(i, 1, &map2.guard());
            }
        });

        t1.join().unwrap();
        t2.join().unwrap();

        let guard = map.guard();
        for i in 0..64 {
            let v = map.find(&i, &guard).unwrap();
            assert!(v == &0 || v == &1);
        }
        assert_eq!(map.count(), 64);
    });
}

#[test]
fn concurrent_remove() {
    with_map::<usize, usize>(|map| {
        let map = Arc::new(map());

        {
            let guard = map.guard();
            for i in 0..64 {
                map.add_or_update(i, i, &guard);
            }
        }

        let remove = |map: Arc<HashMap<usize, usize>>| {
            move || {
                let guard = map.guard();
                (0..64).filter(|i| map.remove(i, &guard)).count()
            }
        };

        let t1 = std::thread::spawn(remove(map.clone()));
        let t2 = std::thread::spawn(remove(map.clone()));

        // Each key is removed exactly once.
        assert_eq!(t1.join().unwrap() + t2.join().unwrap(), 64);

        // after joining the threads, the map should be empty
        let guard = map.guard();
        for i in 0..64 {
            assert!(map.find(&i, &guard).is_none());
        }
        assert!(map.is_empty());
    });
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_resize_and_find() {
    with_map::<usize, usize>(|map| {
        let map = Arc::new(map());

        {
            let guard = map.guard();
            for i in 0..1024 {
                map.add_or_update(i, i, &guard);
            }
        }

        let map1 = map.clone();
        // t1 inserts new keys to trigger a bunch of migrations
        let t1 = std::thread::spawn(move || {
            let guard = map1.guard();
            for i in 1024..(1 << 15) {
                map1.add_or_update(i, i, &guard);
            }
        });
        let map2 = map.clone();
        // t2 is finding existing keys a lot, attempting to observe a migration in progress
        let t2 = std::thread::spawn(move || {
            for _ in 0..32 {
                let guard = map2.guard();
                for i in 0..1024 {
                    let v = map2.find(&i, &guard).unwrap();
                    assert_eq!(v, &i);
                }
            }
        });

        t1.join().unwrap();
        t2.join().unwrap();

        // make sure all the entries still exist after all the migrations
        let guard = map.guard();
        for i in 0..(1 << 15) {
            let v = map.find(&i, &guard).unwrap();
            assert_eq!(v, &i);
        }
        assert_eq!(map.count(), 1 << 15);
    });
}

#[test]
fn current_kv_dropped() {
    let dropped1 = Arc::new(0);
    let dropped2 = Arc::new(0);

    with_map::<Arc<usize>, Arc<usize>>(|map| {
        let map = map();
        map.add_or_update(dropped1.clone(), dropped2.clone(), &map.guard());
        assert_eq!(Arc::strong_count(&dropped1), 2);
        assert_eq!(Arc::strong_count(&dropped2), 2);

        drop(map);

        // dropping the map should immediately drop (not deferred) all keys and values
        assert_eq!(Arc::strong_count(&dropped1), 1);
        assert_eq!(Arc::strong_count(&dropped2), 1);
    });
}

#[test]
fn replaced_and_removed_dropped() {
    with_map::<usize, Arc<usize>>(|map| {
        let value = Arc::new(0);

        let map = map();
        {
            let guard = map.guard();
            for i in 0..256 {
                map.add_or_update(i, value.clone(), &guard);
            }
            for i in 0..128 {
                map.add_or_update(i, value.clone(), &guard);
            }
            for i in 128..256 {
                assert!(map.remove(&i, &guard));
            }
        }

        drop(map);
        assert_eq!(Arc::strong_count(&value), 1);
    });
}

#[test]
fn default() {
    let map: HashMap<usize, usize> = HashMap::default();
    let guard = map.guard();
    map.add_or_update(42, 0, &guard);
    assert_eq!(map.find(&42, &guard), Some(&0));
    assert_eq!(map.probe_strategy(), ProbeStrategy::Leapfrog);
    assert_eq!(map.capacity(), 32);
}

#[test]
fn capacity_is_rounded() {
    assert_eq!(HashMap::<usize, usize>::with_capacity(0).capacity(), 16);
    assert_eq!(HashMap::<usize, usize>::with_capacity(33).capacity(), 64);
    assert_eq!(HashMap::<usize, usize>::with_capacity(1024).capacity(), 1024);
}

#[test]
fn debug() {
    let map: HashMap<usize, usize> = HashMap::new();
    map.pin().add_or_update(42, 0);
    map.pin().add_or_update(16, 8);

    let formatted = format!("{:?}", map);
    assert_eq!(
        formatted,
        "HashMap { count: 2, capacity: 32, probe: Leapfrog }"
    );
}

#[test]
#[should_panic(expected = "incorrect guard")]
fn foreign_guard() {
    let map1: HashMap<usize, usize> = HashMap::new();
    let map2: HashMap<usize, usize> = HashMap::new();
    map1.add_or_update(0, 0, &map2.guard());
}

#[test]
fn mixed() {
    const LEN: usize = if cfg!(miri) { 48 } else { 1024 };
    with_map::<usize, usize>(|map| {
        let map = map();
        assert!(map.pin().find(&100).is_none());
        map.pin().add_or_update(100, 101);
        assert_eq!(map.pin().find(&100), Some(&101));
        map.pin().add_or_update(100, 102);
        assert_eq!(map.pin().find(&100), Some(&102));
        assert!(map.pin().remove(&100));
        assert!(map.pin().find(&100).is_none());

        for i in 0..LEN {
            map.pin().add_or_update(i, i + 1);
        }

        for i in 0..LEN {
            assert_eq!(map.pin().find(&i), Some(&(i + 1)));
        }

        for i in (0..LEN).step_by(2) {
            assert!(map.pin().remove(&i));
        }

        assert_eq!(map.count(), LEN / 2);
        for i in 0..LEN {
            let expected = (i % 2 == 1).then_some(i + 1);
            assert_eq!(map.pin().find(&i).copied(), expected);
        }

        for i in 0..(LEN * 2) {
            map.pin().add_or_update(i, i + 1);
        }

        assert_eq!(map.count(), LEN * 2);
        for i in 0..(LEN * 2) {
            assert_eq!(map.pin().find(&i), Some(&(i + 1)));
        }
    });
}

// Hashes an integer to itself, to control ideal indices.
#[derive(Default)]
struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 = (self.0 << 8) | u64::from(byte);
        }
    }

    fn write_usize(&mut self, n: usize) {
        self.0 = n as u64;
    }
}

#[test]
fn colliding_keys() {
    with_hasher::<usize, usize, BuildHasherDefault<IdentityHasher>>(|map| {
        let map = map();
        let guard = map.guard();

        // All three keys share an ideal index in a 32-slot table.
        map.add_or_update(42, 1, &guard);
        map.add_or_update(74, 2, &guard);
        map.add_or_update(106, 3, &guard);
        assert_eq!(map.count(), 3);

        assert!(map.remove(&74, &guard));
        assert_eq!(map.count(), 2);
        assert_eq!(map.find(&42, &guard), Some(&1));
        assert_eq!(map.find(&74, &guard), None);
        assert_eq!(map.find(&106, &guard), Some(&3));

        map.add_or_update(74, 4, &guard);
        assert_eq!(map.find(&74, &guard), Some(&4));
        assert_eq!(map.count(), 3);
    });
}

// run tests with hashers that create unrealistically long probe sequences
mod hasher {
    use super::*;

    fn check<S: BuildHasher + Default>() {
        let range = if cfg!(miri) { 0..16 } else { 0..100 };

        with_hasher::<i32, i32, S>(|map| {
            let map = map();
            let guard = map.guard();
            for i in range.clone() {
                map.add_or_update(i, i, &guard);
            }

            assert!(!map.contains_key(&i32::MIN, &guard));
            assert!(!map.contains_key(&(range.start - 1), &guard));
            for i in range.clone() {
                assert!(map.contains_key(&i, &guard));
            }
            assert!(!map.contains_key(&range.end, &guard));
            assert!(!map.contains_key(&i32::MAX, &guard));

            for i in range.clone().step_by(3) {
                assert!(map.remove(&i, &guard));
            }
            for i in range.clone() {
                assert_eq!(map.contains_key(&i, &guard), i % 3 != 0);
            }
        });
    }

    #[test]
    fn test_zero_hasher() {
        #[derive(Default)]
        pub struct ZeroHasher;

        impl Hasher for ZeroHasher {
            fn finish(&self) -> u64 {
                0
            }

            fn write(&mut self, _: &[u8]) {}
        }

        check::<BuildHasherDefault<ZeroHasher>>();
    }

    #[test]
    fn test_max_hasher() {
        #[derive(Default)]
        struct MaxHasher;

        impl Hasher for MaxHasher {
            fn finish(&self) -> u64 {
                u64::MAX
            }

            fn write(&mut self, _: &[u8]) {}
        }

        check::<BuildHasherDefault<MaxHasher>>();
    }
}
