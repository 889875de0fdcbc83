// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Host-populated registries for named comparators and filter predicates.
//
// The original design resolved comparator and filter symbols from shared
// libraries at runtime. Here the host registers them explicitly at startup
// and configurations refer to them by name; "default" is always available.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// A total order over raw key bytes.
pub type CompareFn = fn(&[u8], &[u8]) -> Ordering;

/// A predicate over a key (and, for map entries, its value), applied by
/// list operations when the mode selects a named filter.
pub trait FilterPredicate: Send + Sync {
    /// True if the entry should be emitted.
    fn check(&self, key: &[u8], value: &[u8]) -> bool;
}

/// The default byte order: lexicographic, shorter before longer on ties.
pub fn default_compare(lhs: &[u8], rhs: &[u8]) -> Ordering {
    lhs.cmp(rhs)
}

fn comparators() -> &'static RwLock<HashMap<String, CompareFn>> {
    static TABLE: OnceLock<RwLock<HashMap<String, CompareFn>>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(HashMap::new()))
}

fn predicates() -> &'static RwLock<HashMap<String, Arc<dyn FilterPredicate>>> {
    static TABLE: OnceLock<RwLock<HashMap<String, Arc<dyn FilterPredicate>>>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a named comparator. Re-registering a name replaces it.
pub fn register_comparator(name: impl Into<String>, cmp: CompareFn) {
    comparators()
        .write()
        .expect("comparator registry poisoned")
        .insert(name.into(), cmp);
}

/// Look up a comparator by name. `"default"` resolves without registration.
pub fn lookup_comparator(name: &str) -> Option<CompareFn> {
    if name == "default" {
        return Some(default_compare);
    }
    comparators()
        .read()
        .expect("comparator registry poisoned")
        .get(name)
        .copied()
}

/// Register a named filter predicate. Re-registering a name replaces it.
pub fn register_filter_predicate(name: impl Into<String>, pred: Arc<dyn FilterPredicate>) {
    predicates()
        .write()
        .expect("predicate registry poisoned")
        .insert(name.into(), pred);
}

/// Look up a filter predicate by name.
pub fn lookup_filter_predicate(name: &str) -> Option<Arc<dyn FilterPredicate>> {
    predicates()
        .read()
        .expect("predicate registry poisoned")
        .get(name)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reversed(lhs: &[u8], rhs: &[u8]) -> Ordering {
        rhs.cmp(lhs)
    }

    struct EvenLength;

    impl FilterPredicate for EvenLength {
        fn check(&self, key: &[u8], _value: &[u8]) -> bool {
            key.len() % 2 == 0
        }
    }

    #[test]
    fn test_default_compare_shorter_first() {
        assert_eq!(default_compare(b"abc", b"abd"), Ordering::Less);
        assert_eq!(default_compare(b"ab", b"abc"), Ordering::Less);
        assert_eq!(default_compare(b"abc", b"abc"), Ordering::Equal);
    }

    #[test]
    fn test_default_is_always_available() {
        let cmp = lookup_comparator("default").unwrap();
        assert_eq!(cmp(b"a", b"b"), Ordering::Less);
    }

    #[test]
    fn test_registered_comparator_resolves() {
        register_comparator("test-reversed", reversed);
        let cmp = lookup_comparator("test-reversed").unwrap();
        assert_eq!(cmp(b"a", b"b"), Ordering::Greater);
        assert!(lookup_comparator("test-unknown").is_none());
    }

    #[test]
    fn test_registered_predicate_resolves() {
        register_filter_predicate("test-even", Arc::new(EvenLength));
        let pred = lookup_filter_predicate("test-even").unwrap();
        assert!(pred.check(b"ab", b""));
        assert!(!pred.check(b"abc", b""));
        assert!(lookup_filter_predicate("test-missing").is_none());
    }
}
