//! ULID generation.
//!
//! Entity ids are ULIDs: time-sortable, 26 Crockford base32 characters.
//! A process-wide generator keeps ids monotonic within a millisecond.

use std::sync::Mutex;
use ulid::{Generator, Ulid};

static GENERATOR: Mutex<Option<Generator>> = Mutex::new(None);

/// Generate a new ULID, monotonic within this process.
///
/// On the (practically unreachable) random-part overflow within one
/// millisecond, falls back to a fresh non-monotonic ULID.
pub fn new_ulid() -> Ulid {
    let mut guard = match GENERATOR.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    let generator = guard.get_or_insert_with(Generator::new);
    generator.generate().unwrap_or_else(|_| Ulid::new())
}

/// Generate a new ULID as its canonical string form.
pub fn new_id() -> String {
    new_ulid().to_string()
}

/// Check whether a string is a well-formed ULID.
pub fn is_ulid(s: &str) -> bool {
    Ulid::from_string(s).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_valid_ulids() {
        let id = new_id();
        assert_eq!(id.len(), 26);
        assert!(is_ulid(&id));
    }

    #[test]
    fn ids_are_monotonic_in_sequence() {
        let mut prev = new_id();
        for _ in 0..1000 {
            let next = new_id();
            assert!(next > prev, "{next} should sort after {prev}");
            prev = next;
        }
    }

    #[test]
    fn timestamp_is_not_in_the_future() {
        let id = new_ulid();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        assert!(id.timestamp_ms() <= now + 1);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!is_ulid("not-a-ulid"));
        assert!(!is_ulid(""));
        assert!(!is_ulid("01ARZ3NDEKTSV4RRFFQ69G5FA")); // 25 chars
    }
}
