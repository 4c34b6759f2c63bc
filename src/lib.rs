#![allow(unstable_name_collisions)]
#![doc = include_str!("../README.md")]

mod map;
mod raw;

pub use map::{HashMap, HashMapBuilder, HashMapRef, ProbeStrategy};
pub use seize::{Collector, Guard, LocalGuard};
