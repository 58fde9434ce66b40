//! Record id allocation
//!
//! Ids have the form `<millis>_<counter>_<random>`: wall-clock millis
//! zero-padded to 13 digits, a process-local monotone counter padded to 6,
//! and a 6-character random suffix so ids stay unique across restarts.
//! The format sorts lexicographically in allocation order.

use crate::value::now_millis;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

const SUFFIX_LEN: usize = 6;
const SUFFIX_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Allocates record ids for one database instance
#[derive(Debug, Default)]
pub struct IdAllocator {
    counter: AtomicU64,
}

impl IdAllocator {
    /// Create a fresh allocator (counter starts at 0)
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id
    pub fn allocate(&self) -> String {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) % 1_000_000;
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_CHARS[rng.gen_range(0..SUFFIX_CHARS.len())] as char)
            .collect();
        format!("{:013}_{:06}_{}", now_millis(), counter, suffix)
    }
}
