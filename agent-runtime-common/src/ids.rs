//! Monotonic id generation, in the spirit of `quickwit_common::coolid`
//! but backed by `ulid` so ids sort lexicographically by creation time,
//! the property the activity id (§3) needs ("ULID-like, monotonic
//! preferred").

use std::sync::Mutex;

use once_cell::sync::Lazy;
use ulid::Generator;

static GENERATOR: Lazy<Mutex<Generator>> = Lazy::new(|| Mutex::new(Generator::new()));

/// Generates a new ULID, monotonic with respect to previously generated
/// ids within the same millisecond.
pub fn new_monotonic_ulid() -> ulid::Ulid {
    let mut generator = GENERATOR.lock().expect("ulid generator mutex poisoned");
    generator
        .generate()
        .expect("ulid generator exhausted its per-millisecond entropy budget")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_ulid_is_increasing() {
        let a = new_monotonic_ulid();
        let b = new_monotonic_ulid();
        assert!(b > a);
    }
}
