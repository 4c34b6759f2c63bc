#![no_main]

use libfuzzer_sys::fuzz_target;

use arbitrary::Arbitrary;
use leapmap::{HashMap as LeapHashMap, ProbeStrategy};
use std::collections::HashMap as StdHashMap;

#[derive(Debug, Arbitrary)]
enum Operation<K, V> {
    AddOrUpdate(K, V),
    Remove(K),
    Find(K),
    Contains(K),
    Count,
    IsEmpty,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    linear: bool,
    capacity: u8,
    operations: Vec<Operation<u16, u32>>,
}

fn fuzz_hashmap(input: FuzzInput) {
    let probe = if input.linear {
        ProbeStrategy::Linear
    } else {
        ProbeStrategy::Leapfrog
    };

    let mut std_map = StdHashMap::new();
    let leap_raw = LeapHashMap::builder()
        .capacity(usize::from(input.capacity))
        .probe_strategy(probe)
        .build();
    let leap_map = leap_raw.pin();

    for op in input.operations {
        match op {
            Operation::AddOrUpdate(k, v) => {
                std_map.insert(k, v);
                leap_map.add_or_update(k, v);
            }
            Operation::Remove(k) => {
                let std_result = std_map.remove(&k).is_some();
                let leap_result = leap_map.remove(&k);
                assert_eq!(std_result, leap_result);
            }
            Operation::Find(k) => {
                let std_result = std_map.get(&k);
                let leap_result = leap_map.find(&k);
                assert_eq!(std_result, leap_result);
            }
            Operation::Contains(k) => {
                let std_result = std_map.contains_key(&k);
                let leap_result = leap_map.contains_key(&k);
                assert_eq!(std_result, leap_result);
            }
            Operation::Count => {
                assert_eq!(std_map.len(), leap_map.count());
            }
            Operation::IsEmpty => {
                assert_eq!(std_map.is_empty(), leap_map.is_empty());
            }
        }
    }

    // Final consistency checks
    for (k, v) in std_map.iter() {
        assert_eq!(Some(v), leap_map.find(k));
    }
    assert_eq!(std_map.len(), leap_map.count());
    assert_eq!(std_map.is_empty(), leap_map.is_empty());
}

fuzz_target!(|data: FuzzInput| {
    fuzz_hashmap(data);
});
